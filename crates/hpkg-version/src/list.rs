//! Reduced, sorted lists of versions and ranges.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionError};
use crate::git::is_git_version;
use crate::range::VersionRange;
use crate::standard::StandardVersion;
use crate::version::Version;

/// One entry of a [`VersionList`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionItem {
    /// Exactly this version (`=1.2.3` or a git ref).
    Exact(Version),
    Range(VersionRange),
}

impl VersionItem {
    fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Some(exact) = input.strip_prefix('=') {
            return Ok(VersionItem::Exact(Version::parse(exact)?));
        }
        if is_git_version(input) {
            return Ok(VersionItem::Exact(Version::parse(input)?));
        }
        Ok(VersionItem::Range(VersionRange::parse(input)?))
    }

    /// Position of the item's lowest point, for list ordering.
    fn start(&self) -> Option<&StandardVersion> {
        match self {
            VersionItem::Exact(v) => v.effective(),
            VersionItem::Range(r) => r.lo(),
        }
    }
}

fn item_order(a: &VersionItem, b: &VersionItem) -> Ordering {
    match (a, b) {
        (VersionItem::Exact(x), VersionItem::Exact(y)) => x.cmp(y),
        (VersionItem::Range(x), VersionItem::Range(y)) => {
            x.lo().cmp(&y.lo()).then_with(|| match (x.hi(), y.hi()) {
                (Some(p), Some(q)) => p.cmp(q),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
            })
        }
        // An exact version sorts before a range starting at the same point.
        (VersionItem::Exact(_), VersionItem::Range(_)) => a.start().cmp(&b.start()).then(Ordering::Less),
        (VersionItem::Range(_), VersionItem::Exact(_)) => a.start().cmp(&b.start()).then(Ordering::Greater),
    }
}

impl fmt::Display for VersionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionItem::Exact(Version::Standard(v)) => write!(f, "={v}"),
            VersionItem::Exact(v) => write!(f, "{v}"),
            VersionItem::Range(r) => write!(f, "{r}"),
        }
    }
}

/// A set of versions, kept sorted with overlapping or adjoining ranges
/// merged and exact versions inside ranges absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionList {
    items: Vec<VersionItem>,
}

impl VersionList {
    /// The unconstrained list (`:`).
    pub fn any() -> Self {
        VersionList {
            items: vec![VersionItem::Range(VersionRange::any())],
        }
    }

    /// The list admitting no version.
    pub fn empty() -> Self {
        VersionList { items: Vec::new() }
    }

    pub fn exact(v: Version) -> Self {
        VersionList {
            items: vec![VersionItem::Exact(v)],
        }
    }

    pub fn from_range(r: VersionRange) -> Self {
        VersionList {
            items: vec![VersionItem::Range(r)],
        }
    }

    /// Build a list from arbitrary items, reducing it.
    pub fn from_items(items: impl IntoIterator<Item = VersionItem>) -> Self {
        VersionList {
            items: reduce(items.into_iter().collect()),
        }
    }

    /// Parse a comma separated list such as `1.0:1.4,=2.0.1,git.main`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionError::format(input, "empty version list"));
        }
        let items = input
            .split(',')
            .map(VersionItem::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(VersionList::from_items(items))
    }

    pub fn items(&self) -> &[VersionItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_any(&self) -> bool {
        matches!(self.items.as_slice(), [VersionItem::Range(r)] if r.is_any())
    }

    /// The single version this list pins, if it pins one.
    pub fn concrete(&self) -> Option<&Version> {
        match self.items.as_slice() {
            [VersionItem::Exact(v)] => Some(v),
            _ => None,
        }
    }

    pub fn contains(&self, v: &Version) -> bool {
        self.items.iter().any(|item| match item {
            VersionItem::Exact(e) => e == v || same_ref(e, v),
            VersionItem::Range(r) => r.contains(v),
        })
    }

    /// The highest of `candidates` admitted by this list.
    pub fn highest<'a>(&self, candidates: impl IntoIterator<Item = &'a Version>) -> Option<&'a Version> {
        candidates.into_iter().filter(|v| self.contains(v)).max()
    }

    /// Whether every version admitted by `self` is admitted by `other`.
    pub fn satisfies(&self, other: &VersionList) -> bool {
        self.items.iter().all(|item| match item {
            VersionItem::Exact(v) => other.contains(v),
            VersionItem::Range(r) => other.items.iter().any(|o| match o {
                VersionItem::Range(or) => r.is_subset_of(or),
                VersionItem::Exact(_) => false,
            }),
        })
    }

    pub fn intersects(&self, other: &VersionList) -> bool {
        !self.intersection(other).is_empty()
    }

    pub fn intersection(&self, other: &VersionList) -> VersionList {
        let mut out = Vec::new();
        for a in &self.items {
            for b in &other.items {
                match (a, b) {
                    (VersionItem::Exact(x), VersionItem::Exact(y)) if x == y => out.push(a.clone()),
                    (VersionItem::Exact(x), VersionItem::Exact(y)) if same_ref(x, y) => {
                        out.push(if x.needs_lookup() { b.clone() } else { a.clone() })
                    }
                    // An unresolved ref cannot be placed yet; the range is
                    // checked again once the ref has an anchor.
                    (VersionItem::Exact(x), VersionItem::Range(_)) if x.needs_lookup() => out.push(a.clone()),
                    (VersionItem::Range(_), VersionItem::Exact(y)) if y.needs_lookup() => out.push(b.clone()),
                    (VersionItem::Exact(x), VersionItem::Range(r)) if r.contains(x) => out.push(a.clone()),
                    (VersionItem::Range(r), VersionItem::Exact(y)) if r.contains(y) => out.push(b.clone()),
                    (VersionItem::Range(x), VersionItem::Range(y)) => {
                        if let Some(both) = x.intersection(y) {
                            out.push(VersionItem::Range(both));
                        }
                    }
                    _ => {}
                }
            }
        }
        VersionList::from_items(out)
    }

    pub fn union(&self, other: &VersionList) -> VersionList {
        VersionList::from_items(self.items.iter().chain(other.items.iter()).cloned())
    }

    /// Resolve every git ref in the list.
    pub fn resolve_git(
        &mut self,
        lookup: &dyn crate::git::RefLookup,
        repo: &str,
        known: &[StandardVersion],
    ) -> Result<()> {
        for item in &mut self.items {
            if let VersionItem::Exact(v) = item {
                v.resolve(lookup, repo, known)?;
            }
        }
        let items = std::mem::take(&mut self.items);
        self.items = reduce(items);
        Ok(())
    }

    /// Git refs in the list that still need a lookup.
    pub fn unresolved(&self) -> impl Iterator<Item = &Version> {
        self.items.iter().filter_map(|item| match item {
            VersionItem::Exact(v) if v.needs_lookup() => Some(v),
            _ => None,
        })
    }
}

/// Sort items and merge anything that overlaps or adjoins.
fn reduce(mut items: Vec<VersionItem>) -> Vec<VersionItem> {
    items.sort_by(item_order);
    let mut ranges: Vec<VersionRange> = Vec::new();
    let mut exacts: Vec<Version> = Vec::new();
    for item in items {
        match item {
            VersionItem::Range(r) => match ranges.last_mut() {
                Some(last) if last.touches(&r) => *last = last.hull(&r),
                _ => ranges.push(r),
            },
            VersionItem::Exact(v) => {
                if exacts.last() != Some(&v) {
                    exacts.push(v);
                }
            }
        }
    }
    exacts.retain(|v| !ranges.iter().any(|r| r.contains(v)));

    let mut out: Vec<VersionItem> = exacts
        .into_iter()
        .map(VersionItem::Exact)
        .chain(ranges.into_iter().map(VersionItem::Range))
        .collect();
    out.sort_by(item_order);
    out
}

impl Default for VersionList {
    fn default() -> Self {
        VersionList::any()
    }
}

/// Two spellings of one git ref, at most one of them resolved.
fn same_ref(x: &Version, y: &Version) -> bool {
    match (x, y) {
        (Version::Git(a), Version::Git(b)) => {
            a.reference() == b.reference() && !(a.is_resolved() && b.is_resolved())
        }
        _ => false,
    }
}

impl fmt::Display for VersionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.items.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for VersionList {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        VersionList::parse(s)
    }
}

impl TryFrom<String> for VersionList {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self> {
        VersionList::parse(&s)
    }
}

impl From<VersionList> for String {
    fn from(list: VersionList) -> String {
        list.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(s: &str) -> VersionList {
        VersionList::parse(s).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn sv(s: &str) -> StandardVersion {
        StandardVersion::parse(s).unwrap()
    }

    #[test]
    fn disjoint_half_open_ranges_do_not_intersect() {
        let a = VersionList::from_range(VersionRange::half_open(Some(sv("1.0")), Some(sv("2.0"))));
        let b = VersionList::from_range(VersionRange::half_open(Some(sv("2.0")), Some(sv("3.0"))));
        assert!(a.intersection(&b).is_empty());
        assert!(!a.intersects(&b));
    }

    #[test]
    fn union_merges_adjoining_ranges() {
        let a = VersionList::from_range(VersionRange::half_open(Some(sv("1.0")), Some(sv("2.0"))));
        let b = VersionList::from_range(VersionRange::half_open(Some(sv("2.0")), Some(sv("3.0"))));
        let joined = a.union(&b);
        assert_eq!(joined.items().len(), 1);
        assert!(joined.contains(&v("2.5")));

        let merged = l("1.0:1.4,1.2:2.0");
        assert_eq!(merged.to_string(), "1.0:2.0");
        let overlapping = l("1.0:1.4,1.4.5:2.0");
        assert_eq!(overlapping.to_string(), "1.0:2.0");
        // 1.5 prereleases fall between the two ranges.
        assert_eq!(l("1.0:1.4,1.5:2.0").items().len(), 2);
        let gap = l("1.0:1.4,1.6:2.0");
        assert_eq!(gap.items().len(), 2);
    }

    #[test]
    fn exact_versions_absorbed_by_ranges() {
        let list = l("=1.2.3,1.0:1.4,=3.0,=3.0");
        assert_eq!(list.to_string(), "1.0:1.4,=3.0");
    }

    #[test]
    fn satisfies_is_subset() {
        assert!(l("1.2").satisfies(&l("1.0:2.0")));
        assert!(!l("1.0:2.0").satisfies(&l("1.2")));
        assert!(l("=1.2.3").satisfies(&l("1.2")));
        assert!(l("=1.2.3").satisfies(&l("=1.2.3")));
        assert!(!l("1.2").satisfies(&l("=1.2")));
        assert!(l("1.2,1.5").satisfies(&l(":")));
    }

    #[test]
    fn intersection_narrows() {
        assert_eq!(l("1.0:2.0").intersection(&l("1.5:")).to_string(), "1.5:2.0");
        assert_eq!(l("1.0:2.0").intersection(&l("=1.7")).to_string(), "=1.7");
        assert!(l("=1.0").intersection(&l("=1.1")).is_empty());
        assert_eq!(l(":").intersection(&l("1.2")), l("1.2"));
    }

    #[test]
    fn unresolved_refs_survive_ranges_until_resolved() {
        let sha = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(l(":").intersection(&l("git.main")), l("git.main"));
        assert_eq!(l("git.main").intersection(&l("1.0:")), l("git.main"));
        assert_eq!(l(":").intersection(&l(sha)).to_string(), sha);
        assert!(l("2:").intersects(&l("git.main")));
        assert!(!l("git.main").satisfies(&l("2:")));
        assert!(l("git.main").intersection(&l("git.other")).is_empty());
        assert!(l("git.main=1.2").intersection(&l("2:")).is_empty());

        let resolved = l("git.main=1.2");
        assert_eq!(l("git.main").intersection(&resolved), resolved);
        assert_eq!(resolved.intersection(&l("git.main")), resolved);
        assert!(resolved.satisfies(&l("git.main")));
    }

    #[test]
    fn concrete_only_for_single_exact() {
        assert_eq!(l("=1.2").concrete(), Some(&v("1.2")));
        assert_eq!(l("1.2").concrete(), None);
        assert!(l("git.main").concrete().is_some());
    }

    #[test]
    fn display_round_trips() {
        for text in ["1.0:1.4,=2.0.1", ":", "1.2", ":3", "git.main,=1.0"] {
            let list = l(text);
            assert_eq!(l(&list.to_string()), list, "{text}");
        }
    }

    #[test]
    fn highest_admitted_candidate() {
        let declared = [v("1.0"), v("1.4.2"), v("2.1"), v("develop")];
        assert_eq!(l("1.0:1.4").highest(&declared), Some(&v("1.4.2")));
        assert_eq!(l(":").highest(&declared), Some(&v("develop")));
        assert_eq!(l("3:").highest(&declared), Some(&v("develop")));
        assert_eq!(l("3:4").highest(&declared), None);
    }

    #[test]
    fn rejects_bad_lists() {
        assert!(VersionList::parse("").is_err());
        assert!(VersionList::parse("1.0:bad!").is_err());
        assert!(VersionList::parse("3:1").is_err());
    }
}
