//! Persisted form of a spec graph.
//!
//! A spec is stored as a flat list of node records, root first, each
//! naming its dependencies by node hash:
//!
//! ```json
//! { "spec": { "_meta": { "version": 1 },
//!             "nodes": [ { "name": "app", "versions": "=1.0", ...,
//!                          "hash": "…",
//!                          "dependencies": [ { "name": "zlib", "hash": "…",
//!                            "parameters": { "deptypes": ["build", "link"],
//!                                            "virtuals": [] } } ] } ] } }
//! ```
//!
//! Reading a document recomputes every node hash and rejects the document
//! if any differs from the stored one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use hpkg_version::VersionList;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::arch::ArchSpec;
use crate::compiler::CompilerSpec;
use crate::deptypes::DepTypes;
use crate::error::{Result, SpecError};
use crate::flags::FlagMap;
use crate::graph::{NodeId, Order, Spec};
use crate::hash::{node_hashes, SpecHash};
use crate::node::SpecNode;
use crate::variant::VariantMap;

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    pub spec: DocumentBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBody {
    #[serde(rename = "_meta")]
    pub meta: DocumentMeta,
    pub nodes: Vec<NodeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub versions: VersionList,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: VariantMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerSpec>,
    #[serde(default)]
    pub arch: ArchSpec,
    #[serde(default, skip_serializing_if = "FlagMap::is_empty")]
    pub flags: FlagMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<PathBuf>,
    #[serde(default)]
    pub concrete: bool,
    pub hash: SpecHash,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub name: String,
    pub hash: SpecHash,
    pub parameters: EdgeParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeParameters {
    pub deptypes: DepTypes,
    #[serde(default)]
    pub virtuals: BTreeSet<String>,
}

/// Flatten a spec into its document form.
pub fn to_serializable(spec: &Spec) -> Result<SpecDocument> {
    let hashes = node_hashes(spec)?;
    let nodes = spec
        .traverse(Order::Pre, true)
        .map(|visit| {
            let node = spec.node(visit.node);
            NodeRecord {
                name: node.name.clone(),
                versions: node.versions.clone(),
                variants: node.variants.clone(),
                compiler: node.compiler.clone(),
                arch: node.arch.clone(),
                flags: node.flags.clone(),
                external: node.external.clone(),
                concrete: node.concrete,
                hash: hashes[visit.node.index()].clone(),
                dependencies: spec
                    .dependencies(visit.node)
                    .into_iter()
                    .map(|edge| DependencyRecord {
                        name: spec.node(edge.child).name.clone(),
                        hash: hashes[edge.child.index()].clone(),
                        parameters: EdgeParameters {
                            deptypes: edge.types,
                            virtuals: edge.virtuals.clone(),
                        },
                    })
                    .collect(),
            }
        })
        .collect();
    Ok(SpecDocument {
        spec: DocumentBody {
            meta: DocumentMeta {
                version: FORMAT_VERSION,
            },
            nodes,
        },
    })
}

/// Rebuild a spec from its document form, verifying every node hash.
pub fn from_serializable(document: &SpecDocument) -> Result<Spec> {
    let body = &document.spec;
    if body.meta.version != FORMAT_VERSION {
        return Err(SpecError::Document(format!(
            "unsupported format version {}",
            body.meta.version
        )));
    }
    let Some((root, rest)) = body.nodes.split_first() else {
        return Err(SpecError::Document("document has no nodes".into()));
    };

    let mut spec = Spec::new(node_from_record(root));
    let mut by_hash: BTreeMap<&SpecHash, NodeId> = BTreeMap::new();
    by_hash.insert(&root.hash, spec.root());
    for record in rest {
        let id = spec.add_node(node_from_record(record));
        if by_hash.insert(&record.hash, id).is_some() {
            return Err(SpecError::Document(format!(
                "node {} listed twice",
                record.hash
            )));
        }
    }

    for record in &body.nodes {
        let parent = by_hash[&record.hash];
        for dep in &record.dependencies {
            let child = *by_hash.get(&dep.hash).ok_or_else(|| {
                SpecError::Document(format!("'{}' depends on missing node {}", record.name, dep.hash))
            })?;
            if spec.node(child).name != dep.name {
                return Err(SpecError::Document(format!(
                    "dependency '{}' of '{}' points at '{}'",
                    dep.name,
                    record.name,
                    spec.node(child).name
                )));
            }
            spec.add_dependency(
                parent,
                child,
                dep.parameters.deptypes,
                dep.parameters.virtuals.clone(),
            )?;
        }
    }

    let computed = node_hashes(&spec)?;
    for (record, id) in &by_hash {
        let actual = &computed[id.index()];
        if actual != *record {
            return Err(SpecError::IntegrityFailed {
                name: spec.node(*id).name.clone(),
                expected: record.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(spec)
}

fn node_from_record(record: &NodeRecord) -> SpecNode {
    SpecNode {
        name: record.name.clone(),
        versions: record.versions.clone(),
        variants: record.variants.clone(),
        compiler: record.compiler.clone(),
        arch: record.arch.clone(),
        flags: record.flags.clone(),
        external: record.external.clone(),
        concrete: record.concrete,
        hash: record.concrete.then(|| record.hash.clone()),
    }
}

pub fn to_json(spec: &Spec) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_serializable(spec)?)?)
}

pub fn from_json(text: &str) -> Result<Spec> {
    let document: SpecDocument = serde_json::from_str(text)?;
    from_serializable(&document)
}

pub fn write_spec_file(path: &Path, spec: &Spec) -> Result<()> {
    std::fs::write(path, to_json(spec)?)?;
    debug!("wrote spec '{}' to {}", spec.name(), path.display());
    Ok(())
}

pub fn read_spec_file(path: &Path) -> Result<Spec> {
    let text = std::fs::read_to_string(path)?;
    from_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_spec;

    fn concrete_spec() -> Spec {
        let mut spec = parse_spec(
            "app@=1.0%gcc@=12.2.0+mpi build_type=Release cflags=-O2 arch=linux-rhel8-x86_64 \
             ^[virtuals=mpi deptypes=build,link,run] openmpi@=4.1.5%gcc@=12.2.0 arch=linux-rhel8-x86_64 \
             ^zlib@=1.3%gcc@=12.2.0 arch=linux-rhel8-x86_64",
        )
        .unwrap();
        let openmpi = spec.find("openmpi").unwrap();
        let zlib = spec.find("zlib").unwrap();
        spec.add_dependency(openmpi, zlib, DepTypes::LINK, BTreeSet::new()).unwrap();
        spec.node_mut(zlib).external = Some("/usr".into());
        spec.mark_concrete(true).unwrap();
        spec
    }

    #[test]
    fn round_trip_concrete_spec() {
        let spec = concrete_spec();
        let back = from_serializable(&to_serializable(&spec).unwrap()).unwrap();
        assert_eq!(back, spec);
        assert_eq!(back.dag_hash().unwrap(), spec.dag_hash().unwrap());
        let openmpi = back.find("openmpi").unwrap();
        assert!(back.edge(back.root(), "openmpi").unwrap().virtuals.contains("mpi"));
        assert_eq!(back.edge(openmpi, "zlib").unwrap().types, DepTypes::LINK);
        assert_eq!(back.node(back.find("zlib").unwrap()).external, Some(PathBuf::from("/usr")));
    }

    #[test]
    fn round_trip_abstract_spec() {
        let spec = parse_spec("app@1.2: +debug ^zlib@1.2").unwrap();
        let back = from_json(&to_json(&spec).unwrap()).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn document_layout() {
        let json = to_json(&concrete_spec()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["spec"]["_meta"]["version"], 1);
        let nodes = value["spec"]["nodes"].as_array().unwrap();
        assert_eq!(nodes[0]["name"], "app");
        assert_eq!(nodes[0]["versions"], "=1.0");
        assert_eq!(nodes[0]["compiler"], "gcc@=12.2.0");
        let deps = nodes[0]["dependencies"].as_array().unwrap();
        assert_eq!(deps[0]["parameters"]["virtuals"][0], "mpi");
    }

    #[test]
    fn tampered_document_fails_integrity() {
        let mut document = to_serializable(&concrete_spec()).unwrap();
        let zlib = document.spec.nodes.iter_mut().find(|n| n.name == "zlib").unwrap();
        zlib.versions = VersionList::parse("=1.2.13").unwrap();
        assert!(matches!(
            from_serializable(&document),
            Err(SpecError::IntegrityFailed { .. })
        ));
    }

    #[test]
    fn dangling_dependency_rejected() {
        let mut document = to_serializable(&concrete_spec()).unwrap();
        document.spec.nodes.retain(|n| n.name != "zlib");
        assert!(matches!(from_serializable(&document), Err(SpecError::Document(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        let spec = concrete_spec();
        write_spec_file(&path, &spec).unwrap();
        assert_eq!(read_spec_file(&path).unwrap(), spec);
    }
}
