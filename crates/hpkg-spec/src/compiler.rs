//! Compiler constraints (`%gcc@12:`).

use std::fmt;
use std::str::FromStr;

use hpkg_version::{Version, VersionList};
use serde::{Deserialize, Serialize};

use crate::error::{ConstraintKind, Result, SpecError};

/// A compiler name and the versions of it that are acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompilerSpec {
    pub name: String,
    pub versions: VersionList,
}

impl CompilerSpec {
    pub fn new(name: &str, versions: VersionList) -> Self {
        CompilerSpec {
            name: name.to_string(),
            versions,
        }
    }

    /// Parse `name` or `name@versions`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (name, versions) = match input.split_once('@') {
            Some((name, versions)) => (name, VersionList::parse(versions)?),
            None => (input, VersionList::any()),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-')) {
            return Err(SpecError::parse(input, "invalid compiler name"));
        }
        Ok(CompilerSpec::new(name, versions))
    }

    /// The pinned compiler version, if any.
    pub fn version(&self) -> Option<&Version> {
        self.versions.concrete()
    }

    pub fn is_concrete(&self) -> bool {
        self.version().is_some()
    }

    pub fn satisfies(&self, other: &CompilerSpec) -> bool {
        self.name == other.name && self.versions.satisfies(&other.versions)
    }

    pub fn intersects(&self, other: &CompilerSpec) -> bool {
        self.name == other.name && self.versions.intersects(&other.versions)
    }

    /// Narrow to the versions both accept.
    pub fn constrain(&mut self, other: &CompilerSpec) -> Result<bool> {
        if self.name != other.name {
            return Err(SpecError::unsatisfiable(ConstraintKind::Compiler, &*self, other));
        }
        let narrowed = self.versions.intersection(&other.versions);
        if narrowed.is_empty() {
            return Err(SpecError::unsatisfiable(ConstraintKind::Compiler, &*self, other));
        }
        let changed = narrowed != self.versions;
        self.versions = narrowed;
        Ok(changed)
    }
}

impl fmt::Display for CompilerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.versions.is_any() {
            write!(f, "@{}", self.versions)?;
        }
        Ok(())
    }
}

impl FromStr for CompilerSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self> {
        CompilerSpec::parse(s)
    }
}

impl TryFrom<String> for CompilerSpec {
    type Error = SpecError;

    fn try_from(s: String) -> Result<Self> {
        CompilerSpec::parse(&s)
    }
}

impl From<CompilerSpec> for String {
    fn from(c: CompilerSpec) -> String {
        c.to_string()
    }
}
