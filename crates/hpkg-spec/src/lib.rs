//! Spec data model for the hpkg concretizer.
//!
//! A [`Spec`] is a rooted graph of package constraints. While abstract it
//! is a request (`hdf5@1.12: +mpi ^zlib`); once every node is pinned and
//! [`Spec::mark_concrete`] has run it describes one buildable configuration
//! and is identified by its [`SpecHash`].
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Constraints are
//! narrowed with [`Spec::constrain`] and checked with [`Spec::satisfies`];
//! neither ever widens a node.

pub mod arch;
pub mod compiler;
pub mod deptypes;
pub mod error;
pub mod flags;
pub mod graph;
pub mod hash;
pub mod node;
pub mod parse;
pub mod serialize;
pub mod variant;

pub use arch::ArchSpec;
pub use compiler::CompilerSpec;
pub use deptypes::{DepType, DepTypes};
pub use error::{ConstraintKind, Result, SpecError};
pub use flags::{FlagMap, FLAG_NAMES};
pub use graph::{DependencyEdge, NodeId, Order, Spec, Traversal, Visit};
pub use hash::{node_hashes, SpecHash};
pub use node::SpecNode;
pub use parse::{parse_node, parse_spec};
pub use serialize::{
    from_json, from_serializable, read_spec_file, to_json, to_serializable, write_spec_file, SpecDocument,
};
pub use variant::{format_assignment, VariantDef, VariantDomain, VariantMap, VariantValue};
