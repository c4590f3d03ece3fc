//! Dependency tree display.
//!
//! Formats a concrete spec as an ASCII tree with hash prefixes:
//! ```text
//! 3a4fb2c  hdf5@1.14.3%gcc@12.2.0 +mpi
//! 7e90e1d  ├── openmpi@4.1.5%gcc@12.2.0 [mpi]
//! c9b5a2d  │   └── zlib@1.3%gcc@12.2.0
//! c9b5a2d  └── zlib@1.3%gcc@12.2.0 (shared)
//! ```

use std::collections::BTreeSet;

use hpkg_spec::{format_assignment, NodeId, Spec, SpecNode};

/// Format a spec as a human-readable tree. Nodes reached a second time
/// are marked `(shared)` and not expanded again.
pub fn format_tree(spec: &Spec) -> String {
    let root = spec.root();
    let mut writer = TreeWriter {
        spec,
        out: format!("{}  {}\n", hash_prefix(spec.node(root)), label(spec.node(root))),
        seen: BTreeSet::from([root]),
        total: 0,
    };
    writer.children(root, "");

    let unique = writer.seen.len() - 1;
    let mut out = writer.out;
    out.push_str(&format!("\n{} dependencies ({unique} unique)\n", writer.total));
    out
}

struct TreeWriter<'s> {
    spec: &'s Spec,
    out: String,
    seen: BTreeSet<NodeId>,
    /// Dependency lines written, including repeats.
    total: usize,
}

impl TreeWriter<'_> {
    fn children(&mut self, id: NodeId, prefix: &str) {
        let spec = self.spec;
        let deps = spec.dependencies(id);
        let count = deps.len();
        for (i, edge) in deps.into_iter().enumerate() {
            let virtuals: Vec<&str> = edge.virtuals.iter().map(String::as_str).collect();
            self.dependency(edge.child, &virtuals, prefix, i == count - 1);
        }
    }

    fn dependency(&mut self, id: NodeId, virtuals: &[&str], prefix: &str, is_last: bool) {
        self.total += 1;
        let spec = self.spec;
        let node = spec.node(id);
        let connector = if is_last { "└── " } else { "├── " };
        let provided = if virtuals.is_empty() {
            String::new()
        } else {
            format!(" [{}]", virtuals.join(","))
        };
        let first_visit = self.seen.insert(id);
        let shared_marker = if first_visit { "" } else { " (shared)" };

        self.out.push_str(&format!(
            "{}  {prefix}{connector}{}{provided}{shared_marker}\n",
            hash_prefix(node),
            label(node)
        ));
        if !first_visit {
            return;
        }

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };
        self.children(id, &child_prefix);
    }
}

fn hash_prefix(node: &SpecNode) -> String {
    match &node.hash {
        Some(hash) => hash.short().to_string(),
        None => "-".repeat(7),
    }
}

/// `name@version%compiler` followed by variant settings.
fn label(node: &SpecNode) -> String {
    let mut out = node.name.clone();
    match node.version() {
        Some(version) => out.push_str(&format!("@{version}")),
        None if !node.versions.is_any() => out.push_str(&format!("@{}", node.versions)),
        None => {}
    }
    if let Some(compiler) = &node.compiler {
        out.push_str(&format!("%{}", compiler.name));
        if let Some(version) = compiler.version() {
            out.push_str(&format!("@{version}"));
        }
    }
    let variants: Vec<String> = node
        .variants
        .iter()
        .map(|(name, value)| format_assignment(name, value))
        .collect();
    if !variants.is_empty() {
        out.push(' ');
        out.push_str(&variants.join(" "));
    }
    if node.external.is_some() {
        out.push_str(" [external]");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concretizer::concretize;
    use crate::config::SolverConfig;
    use crate::context::SolveContext;
    use hpkg_repo::{InMemoryRepository, PackageDefinition};
    use hpkg_spec::VariantDef;

    fn solved(request: &str) -> Spec {
        let repo = InMemoryRepository::new([
            PackageDefinition::builder("hdf5")
                .version("1.14.3")
                .variant(VariantDef::boolean("mpi", true, "Parallel I/O"))
                .depends_on_when("mpi", "+mpi")
                .depends_on("zlib")
                .build()
                .unwrap(),
            PackageDefinition::builder("openmpi")
                .version("4.1.5")
                .provides("mpi")
                .depends_on("zlib")
                .build()
                .unwrap(),
            PackageDefinition::builder("zlib").version("1.3").build().unwrap(),
        ]);
        let config = SolverConfig::from_toml_str(
            "[arch]\nplatform = \"linux\"\nos = \"ubuntu22.04\"\ntarget = \"x86_64\"\n\n[[compilers]]\nspec = \"gcc@=12.2.0\"\n",
        )
        .unwrap();
        let ctx = SolveContext::new(&repo, &config);
        concretize(&ctx, &[Spec::parse(request).unwrap()]).unwrap().remove(0)
    }

    #[test]
    fn shared_dependency_is_marked_once() {
        let output = format_tree(&solved("hdf5"));
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].ends_with("hdf5@1.14.3%gcc@12.2.0 +mpi"), "{output}");
        assert!(lines[1].contains("├── openmpi@4.1.5%gcc@12.2.0 [mpi]"), "{output}");
        assert!(lines[2].contains("│   └── zlib@1.3%gcc@12.2.0"), "{output}");
        assert!(lines[3].contains("└── zlib@1.3%gcc@12.2.0 (shared)"), "{output}");
        assert!(output.contains("3 dependencies (2 unique)"), "{output}");
    }

    #[test]
    fn lines_start_with_node_hashes() {
        let spec = solved("hdf5~mpi");
        let output = format_tree(&spec);
        let hash = spec.dag_hash().unwrap();
        assert!(output.starts_with(hash.short()), "{output}");
        assert!(output.contains("1 dependencies (1 unique)"), "{output}");
        assert!(!output.contains("openmpi"));
    }

    #[test]
    fn abstract_specs_render_without_hashes() {
        let output = format_tree(&Spec::parse("app@1.2: ^zlib").unwrap());
        assert!(output.starts_with("-------  app@"), "{output}");
        assert!(output.contains("└── zlib"), "{output}");
    }
}
