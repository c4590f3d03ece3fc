//! CLI command implementations.

pub mod audit;
pub mod hash;
pub mod providers;
pub mod spec;
pub mod versions;
