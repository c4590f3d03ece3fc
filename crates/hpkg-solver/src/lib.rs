//! Concretizer for hpkg.
//!
//! Turns abstract specs into concrete ones against a package repository
//! and a solver configuration. The search unifies constraints through a
//! worklist and backtracks over decisions (externals, virtual providers,
//! versions, variants, compilers) in a fixed order, so the same inputs
//! always produce the same graph.
//!
//! # Architecture
//!
//! - **Configuration** ([`SolverConfig`]): architecture, compilers,
//!   per-package preferences, externals and search limits, read from TOML
//! - **Context** ([`SolveContext`]): repository, configuration and git
//!   lookup for one solve
//! - **Concretizer** ([`concretize`], [`concretize_separately`])
//! - **Store** ([`SpecStore`]): content-addressed cache of concrete results
//!
//! Failures carry a [`ResolutionFailure`] listing every conflicting rule.

pub mod concretizer;
pub mod config;
pub mod context;
pub mod error;
pub mod failure;
pub mod policy;
pub mod store;
pub mod tree;

// Re-exports for convenience.
pub use concretizer::{concretize, concretize_separately};
pub use config::{CompilerEntry, External, PackagePrefs, SolverConfig, SolverSettings, ALL_PACKAGES};
pub use context::SolveContext;
pub use error::{ConfigError, Result, SolveError};
pub use failure::{Problem, ProblemKind, ResolutionFailure};
pub use policy::{VersionCandidate, VersionPolicy, DEFAULT_VERSION_POLICY};
pub use store::{concretize_cached, request_key, SpecStore};
pub use tree::format_tree;
