//! Standard (non-git) versions.
//!
//! A version string is split into alternating numeric and alphabetic
//! components separated by `.`, `-` or `_`. Components compare left to
//! right: alphabetic components sort below numeric ones, and the
//! development-branch names in [`INFINITY_NAMES`] sort above everything.
//! A trailing `alpha`/`beta`/`rc` marker makes the version a pre-release
//! of its release components, so `1.2.0rc1 < 1.2.0`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionError};

/// Branch names that compare greater than any numbered release,
/// lowest first.
pub const INFINITY_NAMES: [&str; 7] = ["stable", "nightly", "trunk", "head", "master", "main", "develop"];

/// One component of a version.
///
/// Variant order is significant: strings < numbers < infinity names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Str(String),
    Number(u64),
    Infinity(usize),
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Str(s) => write!(f, "{s}"),
            Component::Number(n) => write!(f, "{n}"),
            Component::Infinity(rank) => {
                write!(f, "{}", INFINITY_NAMES.get(*rank).copied().unwrap_or("infinity"))
            }
        }
    }
}

/// Pre-release stage. `Floor` only appears in computed range bounds and
/// sorts below every parseable pre-release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Floor,
    Alpha,
    Beta,
    Rc,
    Final,
}

impl Stage {
    fn from_word(word: &str) -> Option<Stage> {
        match word {
            "alpha" => Some(Stage::Alpha),
            "beta" => Some(Stage::Beta),
            "rc" => Some(Stage::Rc),
            _ => None,
        }
    }

    fn word(self) -> &'static str {
        match self {
            Stage::Alpha => "alpha",
            Stage::Beta => "beta",
            Stage::Rc => "rc",
            Stage::Floor | Stage::Final => "",
        }
    }
}

/// Pre-release marker: stage plus its number (`rc2` is `(Rc, 2)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prerelease {
    pub stage: Stage,
    pub number: u64,
}

impl Prerelease {
    pub const FINAL: Prerelease = Prerelease {
        stage: Stage::Final,
        number: 0,
    };
    const FLOOR: Prerelease = Prerelease {
        stage: Stage::Floor,
        number: 0,
    };
}

/// A release version such as `1.2.3`, `2.0rc1` or `develop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StandardVersion {
    release: Vec<Component>,
    pre: Prerelease,
    text: String,
}

impl StandardVersion {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(VersionError::format(input, "empty version"));
        }
        if let Some(bad) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        {
            return Err(VersionError::format(input, format!("illegal character '{bad}'")));
        }
        if !input.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return Err(VersionError::format(input, "must start with a letter or digit"));
        }

        let mut release = Vec::new();
        let chars: Vec<char> = input.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let start = i;
            if chars[i].is_ascii_digit() {
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let n = digits
                    .parse::<u64>()
                    .map_err(|_| VersionError::format(input, "numeric component too large"))?;
                release.push(Component::Number(n));
            } else if chars[i].is_ascii_alphabetic() {
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match INFINITY_NAMES.iter().position(|name| *name == word) {
                    Some(rank) => release.push(Component::Infinity(rank)),
                    None => release.push(Component::Str(word)),
                }
            }
            while i < chars.len() && matches!(chars[i], '.' | '-' | '_') {
                i += 1;
            }
        }
        if release.is_empty() {
            return Err(VersionError::format(input, "no version components"));
        }

        let pre = split_prerelease(&mut release);
        Ok(StandardVersion {
            release,
            pre,
            text: input.to_string(),
        })
    }

    fn from_parts(release: Vec<Component>, pre: Prerelease) -> Self {
        let mut text = release
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        if !matches!(pre.stage, Stage::Final | Stage::Floor) {
            text.push_str(pre.stage.word());
            text.push_str(&pre.number.to_string());
        }
        StandardVersion { release, pre, text }
    }

    /// Release components, excluding any pre-release marker.
    pub fn components(&self) -> &[Component] {
        &self.release
    }

    pub fn prerelease(&self) -> Prerelease {
        self.pre
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.stage != Stage::Final
    }

    /// True for branch-like versions such as `develop` or `main`.
    pub fn is_develop(&self) -> bool {
        self.release.iter().any(|c| matches!(c, Component::Infinity(_)))
    }

    /// Whether `self` equals `prefix` or extends it with more components.
    pub fn has_prefix(&self, prefix: &StandardVersion) -> bool {
        if prefix.is_prerelease() {
            return self == prefix;
        }
        self.release.len() >= prefix.release.len() && self.release[..prefix.release.len()] == prefix.release[..]
    }

    /// The smallest version above every version that has `self` as a
    /// prefix. Used as the exclusive upper bound of `lo:self`.
    pub fn successor(&self) -> StandardVersion {
        if self.pre.stage != Stage::Final {
            let pre = Prerelease {
                stage: self.pre.stage,
                number: self.pre.number + 1,
            };
            return StandardVersion::from_parts(self.release.clone(), pre);
        }
        let mut release = self.release.clone();
        if let Some(last) = release.last_mut() {
            *last = match last {
                Component::Number(n) => Component::Number(*n + 1),
                Component::Str(s) => Component::Str(next_str(s)),
                Component::Infinity(rank) => Component::Infinity(*rank + 1),
            };
        }
        StandardVersion::from_parts(release, Prerelease::FLOOR)
    }

    /// Inverse of [`successor`](Self::successor), when one exists.
    pub fn predecessor(&self) -> Option<StandardVersion> {
        match self.pre.stage {
            Stage::Floor => {
                let mut release = self.release.clone();
                let last = release.last_mut()?;
                *last = match last {
                    Component::Number(0) => return None,
                    Component::Number(n) => Component::Number(*n - 1),
                    Component::Str(s) => Component::Str(prev_str(s)),
                    Component::Infinity(0) => return None,
                    Component::Infinity(rank) => Component::Infinity(*rank - 1),
                };
                Some(StandardVersion::from_parts(release, Prerelease::FINAL))
            }
            Stage::Final => None,
            stage => {
                let number = self.pre.number.checked_sub(1)?;
                Some(StandardVersion::from_parts(
                    self.release.clone(),
                    Prerelease { stage, number },
                ))
            }
        }
    }

    /// Key used for ordering and equality. Separators are ignored.
    fn key(&self) -> (&[Component], Prerelease) {
        (&self.release, self.pre)
    }
}

/// Detach a trailing `alpha`/`beta`/`rc` marker (with optional number)
/// that follows a numeric component.
fn split_prerelease(release: &mut Vec<Component>) -> Prerelease {
    let n = release.len();
    let (word_at, number) = match release.as_slice() {
        [.., Component::Number(_), Component::Str(_), Component::Number(num)] => (n - 2, *num),
        [.., Component::Number(_), Component::Str(_)] => (n - 1, 0),
        _ => return Prerelease::FINAL,
    };
    let stage = match &release[word_at] {
        Component::Str(word) => Stage::from_word(word),
        _ => None,
    };
    match stage {
        Some(stage) => {
            release.truncate(word_at);
            Prerelease { stage, number }
        }
        None => Prerelease::FINAL,
    }
}

/// Next string in the `A-Z` then `a-z` alphabet.
fn next_str(s: &str) -> String {
    match s.chars().last() {
        None | Some('z') => format!("{s}A"),
        Some(last) => {
            let head = &s[..s.len() - 1];
            let next = if last == 'Z' { 'a' } else { (last as u8 + 1) as char };
            format!("{head}{next}")
        }
    }
}

fn prev_str(s: &str) -> String {
    match s.chars().last() {
        None => String::new(),
        Some('A') => s[..s.len() - 1].to_string(),
        Some(last) => {
            let head = &s[..s.len() - 1];
            let prev = if last == 'a' { 'Z' } else { (last as u8 - 1) as char };
            format!("{head}{prev}")
        }
    }
}

impl PartialEq for StandardVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for StandardVersion {}

impl Hash for StandardVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for StandardVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StandardVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for StandardVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for StandardVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        StandardVersion::parse(s)
    }
}

impl TryFrom<String> for StandardVersion {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self> {
        StandardVersion::parse(&s)
    }
}

impl From<StandardVersion> for String {
    fn from(v: StandardVersion) -> String {
        v.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> StandardVersion {
        StandardVersion::parse(s).unwrap()
    }

    #[test]
    fn numeric_ordering() {
        assert!(v("1.0") < v("1.2"));
        assert!(v("1.2") < v("1.10"));
        assert!(v("1.2") < v("1.2.0"));
        assert!(v("1.9.9") < v("2"));
    }

    #[test]
    fn strings_sort_below_numbers() {
        assert!(v("1.a") < v("1.0"));
        assert!(v("1.2a") < v("1.2.1"));
        assert!(v("1.2a") < v("1.2b"));
    }

    #[test]
    fn prerelease_sorts_below_release() {
        assert!(v("1.2.0rc1") < v("1.2.0"));
        assert!(v("1.2.0alpha2") < v("1.2.0beta1"));
        assert!(v("1.2.0beta1") < v("1.2.0rc1"));
        assert!(v("1.2.0rc1") < v("1.2.0rc2"));
        assert!(v("1.2.0-rc.1") == v("1.2.0rc1"));
        assert!(v("1.1.9") < v("1.2.0rc1"));
    }

    #[test]
    fn develop_is_highest() {
        assert!(v("develop") > v("1.99.99"));
        assert!(v("main") > v("99999"));
        assert!(v("develop") > v("main"));
        assert!(v("stable") < v("master"));
        assert!(v("develop").is_develop());
        assert!(!v("1.0").is_develop());
    }

    #[test]
    fn separators_do_not_affect_equality() {
        assert_eq!(v("1.2.3"), v("1-2_3"));
        assert_eq!(v("1-2_3").to_string(), "1-2_3");
    }

    #[test]
    fn rejects_illegal_characters() {
        assert!(matches!(StandardVersion::parse("1.2+3"), Err(VersionError::Format { .. })));
        assert!(matches!(StandardVersion::parse(""), Err(VersionError::Format { .. })));
        assert!(matches!(StandardVersion::parse(".1"), Err(VersionError::Format { .. })));
    }

    #[test]
    fn successor_bounds_prefix_family() {
        let hi = v("1.2").successor();
        assert!(v("1.2.9") < hi);
        assert!(v("1.2.9rc1") < hi);
        assert!(v("1.3rc1") > hi);
        assert!(v("1.3") > hi);
        assert_eq!(hi.predecessor().unwrap(), v("1.2"));
    }

    #[test]
    fn successor_of_strings_and_prereleases() {
        assert_eq!(next_str("abc"), "abd");
        assert_eq!(next_str("z"), "zA");
        assert_eq!(prev_str("zA"), "z");
        assert_eq!(prev_str(&next_str("aZ")), "aZ");

        let hi = v("2.0rc1").successor();
        assert_eq!(hi, v("2.0rc2"));
        assert_eq!(hi.predecessor().unwrap(), v("2.0rc1"));
    }

    #[test]
    fn prefix_matching() {
        assert!(v("1.2.3").has_prefix(&v("1.2")));
        assert!(v("1.2").has_prefix(&v("1.2")));
        assert!(!v("1.20").has_prefix(&v("1.2")));
    }

    #[test]
    fn string_form_keeps_original_text() {
        assert_eq!(String::from(v("1.2-rc1")), "1.2-rc1");
        assert_eq!(v("1.2-rc1"), v("1.2rc1"));
    }
}
