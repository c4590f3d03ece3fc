//! Content hashes of spec graphs.
//!
//! A node's hash covers its name, versions, variants, compiler,
//! architecture and flags, plus the name, hash, dependency types and
//! virtuals of every dependency, sorted by (name, types). Hashes are
//! computed children first, so equal graphs hash equally regardless of the
//! order their nodes and edges were added. External prefixes and the
//! concrete flag are not part of the hash.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::arch::ArchSpec;
use crate::error::{Result, SpecError};
use crate::flags::FlagMap;
use crate::graph::Spec;
use crate::variant::VariantMap;

/// A SHA-256 content hash as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecHash(String);

impl SpecHash {
    /// Hash arbitrary bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        SpecHash(hex_encode(&hasher.finalize()))
    }

    /// Accept a stored hash string, checking its shape.
    pub fn from_hex(text: &str) -> Result<Self> {
        if text.len() == 64 && text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            Ok(SpecHash(text.to_string()))
        } else {
            Err(SpecError::Document(format!("'{text}' is not a spec hash")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for SpecHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Serialize)]
struct HashedNode<'a> {
    name: &'a str,
    versions: String,
    variants: &'a VariantMap,
    compiler: Option<String>,
    arch: &'a ArchSpec,
    flags: &'a FlagMap,
    dependencies: Vec<HashedEdge<'a>>,
}

#[derive(Serialize, PartialEq, Eq, PartialOrd, Ord)]
struct HashedEdge<'a> {
    name: &'a str,
    deptypes: Vec<&'static str>,
    hash: &'a str,
    virtuals: &'a BTreeSet<String>,
}

/// Hash of every node, indexed by [`NodeId::index`](crate::NodeId::index).
///
/// Fails on cyclic graphs.
pub fn node_hashes(spec: &Spec) -> Result<Vec<SpecHash>> {
    let order = spec.topological_order()?;
    let mut hashes: Vec<Option<SpecHash>> = vec![None; spec.node_count()];
    for id in order.into_iter().rev() {
        let node = spec.node(id);
        let mut dependencies = Vec::new();
        for edge in spec.dependencies(id) {
            let hash = hashes[edge.child.index()]
                .as_ref()
                .ok_or_else(|| SpecError::CircularDependency(node.name.clone()))?;
            dependencies.push(HashedEdge {
                name: &spec.node(edge.child).name,
                deptypes: edge.types.names(),
                hash: hash.as_str(),
                virtuals: &edge.virtuals,
            });
        }
        dependencies.sort();
        let record = HashedNode {
            name: &node.name,
            versions: node.versions.to_string(),
            variants: &node.variants,
            compiler: node.compiler.as_ref().map(ToString::to_string),
            arch: &node.arch,
            flags: &node.flags,
            dependencies,
        };
        let bytes = serde_json::to_vec(&record)?;
        hashes[id.index()] = Some(SpecHash::compute(&bytes));
    }
    hashes
        .into_iter()
        .enumerate()
        .map(|(i, h)| h.ok_or(SpecError::NodeNotFound(i)))
        .collect()
}

impl Spec {
    /// Hash of the whole graph: the root's node hash.
    pub fn dag_hash(&self) -> Result<SpecHash> {
        if let Some(hash) = self.root_node().hash.as_ref().filter(|_| self.is_concrete()) {
            return Ok(hash.clone());
        }
        let mut hashes = node_hashes(self)?;
        Ok(hashes.swap_remove(self.root().index()))
    }

    /// Check that every node is fully determined, then freeze the graph:
    /// node hashes are stored and every node is marked concrete.
    pub fn mark_concrete(&mut self, require_compiler: bool) -> Result<()> {
        let mut names = BTreeSet::new();
        for id in self.node_ids() {
            let node = self.node(id);
            let not_concrete = |detail: &str| SpecError::NotConcrete {
                name: node.name.clone(),
                detail: detail.to_string(),
            };
            if node.is_anonymous() {
                return Err(not_concrete("anonymous node"));
            }
            if !names.insert(node.name.clone()) {
                return Err(not_concrete("appears more than once in the graph"));
            }
            if node.version().is_none() {
                return Err(not_concrete("version is not a single point"));
            }
            if node.versions.unresolved().next().is_some() {
                return Err(not_concrete("git version is not resolved"));
            }
            if !node.has_concrete_attributes(require_compiler) {
                return Err(not_concrete("architecture or compiler is not fully determined"));
            }
        }
        let hashes = node_hashes(self)?;
        let ids: Vec<_> = self.node_ids().collect();
        for (id, hash) in ids.into_iter().zip(hashes) {
            let node = self.node_mut(id);
            node.hash = Some(hash);
            node.concrete = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deptypes::DepTypes;
    use crate::parse::parse_node;

    fn concrete(text: &str) -> crate::SpecNode {
        parse_node(&format!("{text} arch=linux-rhel8-x86_64")).unwrap()
    }

    fn graph(order: &[(&str, &str)]) -> Spec {
        let mut spec = Spec::new(concrete("app@=1.0"));
        for (parent, child) in order {
            let parent = spec.find(parent).unwrap();
            let child = match spec.find(child) {
                Some(id) => id,
                None => spec.add_node(concrete(&format!("{child}@=2.0"))),
            };
            spec.add_dependency(parent, child, DepTypes::DEFAULT, BTreeSet::new()).unwrap();
        }
        spec
    }

    #[test]
    fn hash_is_hex_sha256() {
        let spec = graph(&[]);
        let hash = spec.dag_hash().unwrap();
        assert_eq!(hash.as_str().len(), 64);
        assert_eq!(hash.short().len(), 7);
        assert!(SpecHash::from_hex(hash.as_str()).is_ok());
        assert!(SpecHash::from_hex("abc").is_err());
    }

    #[test]
    fn stable_under_insertion_order() {
        let a = graph(&[("app", "zlib"), ("app", "cmake"), ("cmake", "zlib")]);
        let b = graph(&[("app", "cmake"), ("cmake", "zlib"), ("app", "zlib")]);
        assert_eq!(a.dag_hash().unwrap(), b.dag_hash().unwrap());
    }

    #[test]
    fn attributes_change_the_hash() {
        let base = graph(&[("app", "zlib")]);
        let mut variant = base.clone();
        let zlib = variant.find("zlib").unwrap();
        variant.node_mut(zlib).constrain(&parse_node("+shared").unwrap()).unwrap();
        assert_ne!(base.dag_hash().unwrap(), variant.dag_hash().unwrap());

        let mut typed = base.clone();
        let root = typed.root();
        typed.edge_mut(root, zlib).unwrap().types = DepTypes::BUILD;
        assert_ne!(base.dag_hash().unwrap(), typed.dag_hash().unwrap());
    }

    #[test]
    fn external_prefix_is_not_hashed() {
        let base = graph(&[("app", "zlib")]);
        let mut external = base.clone();
        let zlib = external.find("zlib").unwrap();
        external.node_mut(zlib).external = Some("/usr".into());
        assert_eq!(base.dag_hash().unwrap(), external.dag_hash().unwrap());
    }

    #[test]
    fn mark_concrete_stores_hashes() {
        let mut spec = graph(&[("app", "zlib")]);
        spec.mark_concrete(false).unwrap();
        assert!(spec.is_concrete());
        let expected = node_hashes(&spec).unwrap();
        assert_eq!(spec.root_node().hash.as_ref(), Some(&expected[0]));
        assert_eq!(spec.dag_hash().unwrap(), expected[0]);
    }

    #[test]
    fn mark_concrete_rejects_open_attributes() {
        let mut spec = Spec::new(parse_node("app@1.0: arch=linux-rhel8-x86_64").unwrap());
        assert!(matches!(spec.mark_concrete(false), Err(SpecError::NotConcrete { .. })));

        let mut spec = graph(&[]);
        assert!(matches!(spec.mark_concrete(true), Err(SpecError::NotConcrete { .. })));
    }
}
