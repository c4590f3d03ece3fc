//! `package.toml` parsing.
//!
//! ```toml
//! [package]
//! name = "hdf5"
//! description = "HDF5 data model and file format"
//! build-system = "cmake"
//!
//! [[version]]
//! version = "1.14.3"
//! preferred = true
//!
//! [[variant]]
//! name = "api"
//! default = "default"
//! values = ["default", "v110", "v112"]
//! description = "Default API version"
//!
//! [[depends-on]]
//! spec = "mpi"
//! when = "+mpi"
//!
//! [[conflicts]]
//! spec = "%intel"
//! when = "@:1.8"
//! ```

use std::path::Path;

use hpkg_spec::{VariantDef, VariantDomain, VariantValue};
use serde::{Deserialize, Serialize};

use crate::build_system::BuildSystem;
use crate::error::{RepoError, Result};
use crate::package::{PackageBuilder, PackageDefinition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPackageFile {
    package: RawPackage,
    #[serde(default)]
    version: Vec<RawVersion>,
    #[serde(default)]
    variant: Vec<RawVariant>,
    #[serde(default)]
    depends_on: Vec<RawDependency>,
    #[serde(default)]
    conflicts: Vec<RawConflict>,
    #[serde(default)]
    provides: Vec<RawProvides>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPackage {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    build_system: BuildSystem,
    #[serde(default)]
    git: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawVersion {
    version: String,
    #[serde(default)]
    preferred: bool,
    #[serde(default)]
    deprecated: bool,
}

/// A variant default: its shape decides the variant's kind when no
/// `values` are listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum RawDefault {
    Bool(bool),
    Value(String),
    Values(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawVariant {
    name: String,
    default: RawDefault,
    #[serde(default)]
    description: String,
    #[serde(default)]
    values: Option<Vec<String>>,
    #[serde(default)]
    multi: bool,
    #[serde(default)]
    sticky: bool,
    #[serde(default)]
    when: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDependency {
    spec: String,
    #[serde(default, rename = "type")]
    types: Option<Vec<String>>,
    #[serde(default)]
    when: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConflict {
    spec: String,
    #[serde(default)]
    when: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawProvides {
    spec: String,
    #[serde(default)]
    when: String,
}

impl RawVariant {
    fn into_def(self, package: &str) -> Result<(VariantDef, String)> {
        let invalid = |detail: String| RepoError::invalid(package, format!("variant '{}': {detail}", self.name));
        let (default, domain) = match (&self.default, &self.values) {
            (RawDefault::Bool(b), None) => (VariantValue::Bool(*b), VariantDomain::Bool),
            (RawDefault::Bool(_), Some(_)) => {
                return Err(invalid("a boolean variant cannot list values".into()));
            }
            (RawDefault::Value(v), None) if !self.multi => (VariantValue::Single(v.clone()), VariantDomain::Any),
            (RawDefault::Value(v), Some(values)) if !self.multi => {
                (VariantValue::Single(v.clone()), VariantDomain::Single(values.clone()))
            }
            (RawDefault::Value(v), Some(values)) => {
                (VariantValue::multi([v.clone()]), VariantDomain::Multi(values.clone()))
            }
            (RawDefault::Values(vs), Some(values)) => {
                (VariantValue::multi(vs.iter().cloned()), VariantDomain::Multi(values.clone()))
            }
            (RawDefault::Value(_) | RawDefault::Values(_), None) => {
                return Err(invalid("a multi-valued variant must list its values".into()));
            }
        };
        let def = VariantDef {
            name: self.name.clone(),
            default,
            description: self.description.clone(),
            domain,
            sticky: self.sticky,
        };
        Ok((def, self.when))
    }
}

/// Parse a package definition from `package.toml` text.
pub fn parse_package(text: &str, path: &Path) -> Result<PackageDefinition> {
    let raw: RawPackageFile = toml::from_str(text).map_err(|source| RepoError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    let name = raw.package.name.clone();

    let mut builder = PackageBuilder::new(&name)
        .description(&raw.package.description)
        .build_system(raw.package.build_system);
    if let Some(git) = &raw.package.git {
        builder = builder.git(git);
    }
    for v in &raw.version {
        builder = builder.version_with(&v.version, v.preferred, v.deprecated);
    }
    for variant in raw.variant {
        let (def, when) = variant.into_def(&name)?;
        builder = builder.variant_when(def, &when);
    }
    for dep in &raw.depends_on {
        let types = dep.types.as_ref().map(|t| t.join(","));
        builder = builder.depends_on_with(&dep.spec, types.as_deref(), &dep.when);
    }
    for conflict in &raw.conflicts {
        builder = builder.conflicts_with_message(&conflict.spec, &conflict.when, conflict.message.as_deref());
    }
    for provides in &raw.provides {
        builder = builder.provides_when(&provides.spec, &provides.when);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpkg_spec::DepTypes;

    const HDF5: &str = r#"
[package]
name = "hdf5"
description = "HDF5 data model"
build-system = "cmake"
git = "https://github.com/HDFGroup/hdf5.git"

[[version]]
version = "1.14.3"

[[version]]
version = "1.12.2"
preferred = true

[[version]]
version = "1.8.0"
deprecated = true

[[variant]]
name = "mpi"
default = true
description = "Enable MPI support"

[[variant]]
name = "api"
default = "default"
values = ["default", "v110", "v112"]
description = "Default API version"
when = "@1.10:"

[[variant]]
name = "languages"
default = ["c"]
values = ["c", "cxx", "fortran"]

[[depends-on]]
spec = "mpi"
when = "+mpi"

[[depends-on]]
spec = "zlib@1.2:"
type = ["build", "link", "run"]

[[conflicts]]
spec = "%intel"
when = "@:1.8"
message = "intel fails on old releases"

[[provides]]
spec = "h5-api"
"#;

    #[test]
    fn parses_full_file() {
        let pkg = parse_package(HDF5, Path::new("hdf5/package.toml")).unwrap();
        assert_eq!(pkg.name, "hdf5");
        assert_eq!(pkg.build_system, BuildSystem::CMake);
        assert_eq!(pkg.git.as_deref(), Some("https://github.com/HDFGroup/hdf5.git"));
        assert_eq!(pkg.versions.len(), 3);
        assert!(pkg.versions[1].preferred);
        assert!(pkg.versions[2].deprecated);

        let api = &pkg.variant_rules("api").next().unwrap().def;
        assert_eq!(api.domain, VariantDomain::Single(vec!["default".into(), "v110".into(), "v112".into()]));
        let langs = &pkg.variant_rules("languages").next().unwrap().def;
        assert_eq!(langs.default, VariantValue::multi(["c"]));

        assert_eq!(pkg.dependencies[1].types, DepTypes::DEFAULT.union(DepTypes::RUN));
        assert_eq!(pkg.conflicts[0].message.as_deref(), Some("intel fails on old releases"));
        assert!(pkg.may_provide("h5-api"));
    }

    #[test]
    fn toml_errors_name_the_file() {
        let err = parse_package("[package", Path::new("broken/package.toml")).unwrap_err();
        assert!(err.to_string().contains("broken/package.toml"));
    }

    #[test]
    fn variant_shapes_are_checked() {
        let text = r#"
[package]
name = "a"

[[variant]]
name = "langs"
default = ["c"]
"#;
        assert!(matches!(
            parse_package(text, Path::new("a")),
            Err(RepoError::InvalidDefinition { .. })
        ));
    }
}
