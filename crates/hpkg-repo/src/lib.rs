//! Package metadata for the hpkg concretizer.
//!
//! A [`PackageDefinition`] is a closed record: declared versions, variant
//! rules, dependency rules, conflicts and provided virtuals, each guarded
//! by a `when` spec. Behavior that depends on how a package is built comes
//! from its [`BuildSystem`] tag.
//!
//! Definitions are served through the [`PackageRepository`] trait, either
//! from memory ([`InMemoryRepository`]) or from a directory of
//! `package.toml` files ([`LocalRepository`]).

pub mod build_system;
pub mod error;
pub mod local;
pub mod manifest;
pub mod package;
pub mod repository;

pub use build_system::BuildSystem;
pub use error::{RepoError, Result};
pub use local::LocalRepository;
pub use manifest::parse_package;
pub use package::{
    ConflictRule, DependencyRule, PackageBuilder, PackageDefinition, ProvidesRule, VariantRule, VersionDecl,
};
pub use repository::{InMemoryRepository, PackageRepository};
