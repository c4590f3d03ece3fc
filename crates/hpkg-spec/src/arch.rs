//! Architecture triples: platform, operating system and target.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConstraintKind, Result, SpecError};

/// Platform / OS / target. Fields are `None` while unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ArchSpec {
    pub fn new(platform: &str, os: &str, target: &str) -> Self {
        ArchSpec {
            platform: Some(platform.to_string()),
            os: Some(os.to_string()),
            target: Some(target.to_string()),
        }
    }

    /// The architecture of the running machine.
    pub fn host() -> Self {
        let os = std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|text| os_release_name(&text))
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        ArchSpec::new(std::env::consts::OS, &os, std::env::consts::ARCH)
    }

    /// Parse `platform-os-target`. Missing trailing parts and `None` leave
    /// a field unconstrained.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SpecError::parse(input, "empty architecture"));
        }
        let mut parts = input.splitn(3, '-');
        let mut field = || -> Result<Option<String>> {
            match parts.next() {
                None | Some("None") => Ok(None),
                Some("") => Err(SpecError::parse(input, "empty architecture component")),
                Some(part) => {
                    if part.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.')) {
                        Ok(Some(part.to_string()))
                    } else {
                        Err(SpecError::parse(input, format!("illegal architecture component '{part}'")))
                    }
                }
            }
        };
        Ok(ArchSpec {
            platform: field()?,
            os: field()?,
            target: field()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.platform.is_none() && self.os.is_none() && self.target.is_none()
    }

    pub fn is_concrete(&self) -> bool {
        self.platform.is_some() && self.os.is_some() && self.target.is_some()
    }

    fn fields(&self) -> [&Option<String>; 3] {
        [&self.platform, &self.os, &self.target]
    }

    /// Every field constrained by `other` has the same value here.
    pub fn satisfies(&self, other: &ArchSpec) -> bool {
        self.fields()
            .iter()
            .zip(other.fields())
            .all(|(mine, theirs)| theirs.is_none() || *mine == theirs)
    }

    pub fn intersects(&self, other: &ArchSpec) -> bool {
        self.fields()
            .iter()
            .zip(other.fields())
            .all(|(mine, theirs)| match (mine, theirs) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            })
    }

    /// Fill unconstrained fields from `other`. Returns whether anything
    /// changed.
    pub fn constrain(&mut self, other: &ArchSpec) -> Result<bool> {
        if !self.intersects(other) {
            return Err(SpecError::unsatisfiable(ConstraintKind::Architecture, &*self, other));
        }
        let mut changed = false;
        for (mine, theirs) in [
            (&mut self.platform, &other.platform),
            (&mut self.os, &other.os),
            (&mut self.target, &other.target),
        ] {
            if mine.is_none() && theirs.is_some() {
                *mine = theirs.clone();
                changed = true;
            }
        }
        Ok(changed)
    }
}

fn os_release_name(text: &str) -> Option<String> {
    let value = |key: &str| {
        text.lines()
            .find_map(|line| line.strip_prefix(key))
            .map(|v| v.trim_matches('"').to_string())
    };
    let id = value("ID=")?;
    let version = value("VERSION_ID=").unwrap_or_default();
    let name: String = format!("{id}{version}")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
        .collect();
    (!name.is_empty()).then_some(name)
}

impl fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_else(|| "None".to_string());
        write!(f, "{}-{}-{}", part(&self.platform), part(&self.os), part(&self.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_and_partial() {
        let arch = ArchSpec::parse("linux-ubuntu22.04-x86_64").unwrap();
        assert_eq!(arch, ArchSpec::new("linux", "ubuntu22.04", "x86_64"));
        assert!(arch.is_concrete());

        let partial = ArchSpec::parse("linux-None-aarch64").unwrap();
        assert_eq!(partial.os, None);
        assert_eq!(partial.target.as_deref(), Some("aarch64"));
        assert!(!partial.is_concrete());
        assert_eq!(partial.to_string(), "linux-None-aarch64");

        assert!(ArchSpec::parse("linux--x86_64").is_err());
    }

    #[test]
    fn satisfies_and_constrain() {
        let full = ArchSpec::new("linux", "rhel8", "x86_64");
        let target_only = ArchSpec {
            target: Some("x86_64".into()),
            ..Default::default()
        };
        assert!(full.satisfies(&target_only));
        assert!(!target_only.satisfies(&full));

        let mut narrowed = target_only.clone();
        assert!(narrowed.constrain(&full).unwrap());
        assert_eq!(narrowed, full);
        assert!(!narrowed.constrain(&full).unwrap());

        let mut other = ArchSpec::new("linux", "rhel8", "aarch64");
        assert!(matches!(
            other.constrain(&full),
            Err(SpecError::Unsatisfiable {
                kind: ConstraintKind::Architecture,
                ..
            })
        ));
    }

    #[test]
    fn os_release_parsing() {
        let text = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\n";
        assert_eq!(os_release_name(text).as_deref(), Some("ubuntu22.04"));
        assert_eq!(os_release_name("NAME=x\n"), None);
    }
}
