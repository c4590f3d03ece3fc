//! Build-system tags and the rules each one implies.

use std::fmt;
use std::str::FromStr;

use hpkg_spec::{DepTypes, VariantDef};
use serde::{Deserialize, Serialize};

use crate::error::RepoError;

/// How a package is built. Each tag may add variants and dependencies to
/// every package that carries it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    #[default]
    Generic,
    Autotools,
    #[serde(rename = "cmake")]
    CMake,
    Makefile,
    Python,
    /// No build of its own; only pulls in dependencies.
    Bundle,
}

impl BuildSystem {
    pub const ALL: [BuildSystem; 6] = [
        BuildSystem::Generic,
        BuildSystem::Autotools,
        BuildSystem::CMake,
        BuildSystem::Makefile,
        BuildSystem::Python,
        BuildSystem::Bundle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuildSystem::Generic => "generic",
            BuildSystem::Autotools => "autotools",
            BuildSystem::CMake => "cmake",
            BuildSystem::Makefile => "makefile",
            BuildSystem::Python => "python",
            BuildSystem::Bundle => "bundle",
        }
    }

    pub fn implicit_variants(self) -> Vec<VariantDef> {
        match self {
            BuildSystem::CMake => vec![VariantDef::single(
                "build_type",
                "RelWithDebInfo",
                &["Debug", "Release", "RelWithDebInfo", "MinSizeRel"],
                "CMake build type",
            )],
            _ => Vec::new(),
        }
    }

    pub fn implicit_dependencies(self) -> Vec<(&'static str, DepTypes)> {
        match self {
            BuildSystem::CMake => vec![("cmake", DepTypes::BUILD)],
            BuildSystem::Autotools | BuildSystem::Makefile => vec![("gmake", DepTypes::BUILD)],
            BuildSystem::Python => vec![("python", DepTypes::BUILD.union(DepTypes::RUN))],
            BuildSystem::Generic | BuildSystem::Bundle => Vec::new(),
        }
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildSystem {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildSystem::ALL
            .into_iter()
            .find(|b| b.name() == s)
            .ok_or_else(|| RepoError::invalid(s, "unknown build system"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for bs in BuildSystem::ALL {
            assert_eq!(bs.name().parse::<BuildSystem>().unwrap(), bs);
        }
        assert!("scons".parse::<BuildSystem>().is_err());
    }

    #[test]
    fn python_needs_python_at_run_time() {
        let deps = BuildSystem::Python.implicit_dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].1.to_string(), "build,run");
        assert!(BuildSystem::Bundle.implicit_dependencies().is_empty());
    }
}
