//! Dependency types carried on edges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecError};

/// Why a dependency is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepType {
    Build,
    Link,
    Run,
    Test,
}

impl DepType {
    pub const ALL: [DepType; 4] = [DepType::Build, DepType::Link, DepType::Run, DepType::Test];

    pub fn name(self) -> &'static str {
        match self {
            DepType::Build => "build",
            DepType::Link => "link",
            DepType::Run => "run",
            DepType::Test => "test",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A set of [`DepType`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<DepType>", into = "Vec<DepType>")]
pub struct DepTypes(u8);

impl DepTypes {
    pub const BUILD: DepTypes = DepTypes(1);
    pub const LINK: DepTypes = DepTypes(2);
    pub const RUN: DepTypes = DepTypes(4);
    pub const TEST: DepTypes = DepTypes(8);
    /// What a dependency gets when no type is given.
    pub const DEFAULT: DepTypes = DepTypes(1 | 2);

    /// Parse a comma separated list such as `build,link`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut types = DepTypes(0);
        for word in input.split(',').map(str::trim).filter(|w| !w.is_empty()) {
            let ty = DepType::ALL
                .into_iter()
                .find(|t| t.name() == word)
                .ok_or_else(|| SpecError::parse(input, format!("unknown dependency type '{word}'")))?;
            types = types.with(ty);
        }
        if types.is_empty() {
            return Err(SpecError::parse(input, "no dependency types given"));
        }
        Ok(types)
    }

    pub fn with(self, ty: DepType) -> Self {
        DepTypes(self.0 | ty.bit())
    }

    pub fn union(self, other: DepTypes) -> Self {
        DepTypes(self.0 | other.0)
    }

    pub fn contains(self, ty: DepType) -> bool {
        self.0 & ty.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = DepType> {
        DepType::ALL.into_iter().filter(move |t| self.contains(*t))
    }

    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(DepType::name).collect()
    }
}

impl Default for DepTypes {
    fn default() -> Self {
        DepTypes::DEFAULT
    }
}

impl fmt::Debug for DepTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DepTypes({self})")
    }
}

impl fmt::Display for DepTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(","))
    }
}

impl TryFrom<Vec<DepType>> for DepTypes {
    type Error = SpecError;

    fn try_from(types: Vec<DepType>) -> Result<Self> {
        let set = types.into_iter().fold(DepTypes(0), DepTypes::with);
        if set.is_empty() {
            return Err(SpecError::Document("dependency edge without types".into()));
        }
        Ok(set)
    }
}

impl From<DepTypes> for Vec<DepType> {
    fn from(types: DepTypes) -> Vec<DepType> {
        types.iter().collect()
    }
}
