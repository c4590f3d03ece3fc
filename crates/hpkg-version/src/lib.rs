//! Version model for the hpkg concretizer.
//!
//! Provides concrete versions (releases and git refs), half-open version
//! ranges and reduced version lists, together with the lookup machinery that
//! places git refs in the release order.
//!
//! # Ordering
//!
//! Release components compare left to right. Alphabetic components sort
//! below numeric ones, development branch names (`develop`, `main`, ...)
//! sort above every numbered release, and `alpha`/`beta`/`rc` suffixes mark
//! pre-releases that sort below the final release.

pub mod error;
pub mod git;
pub mod list;
pub mod range;
pub mod standard;
pub mod version;

// Re-exports for convenience.
pub use error::{Result, VersionError};
pub use git::{version_for_tag, CachedLookup, GitCliLookup, GitVersion, RefLookup, RefResolution};
pub use list::{VersionItem, VersionList};
pub use range::VersionRange;
pub use standard::StandardVersion;
pub use version::Version;
