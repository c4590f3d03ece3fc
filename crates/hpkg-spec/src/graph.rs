//! The spec graph: an arena of nodes joined by typed dependency edges.
//!
//! Nodes are addressed by [`NodeId`] indices into the arena, so copying a
//! spec is a plain clone and no node ever holds a pointer to another.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::deptypes::DepTypes;
use crate::error::{ConstraintKind, Result, SpecError};
use crate::node::SpecNode;

/// Index of a node in its spec's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A dependency from `parent` on `child`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub parent: NodeId,
    pub child: NodeId,
    pub types: DepTypes,
    /// Virtual packages this edge is satisfied through (`mpi` for an edge
    /// to `openmpi`).
    pub virtuals: BTreeSet<String>,
}

/// Traversal order for [`Spec::traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Pre,
    Post,
}

/// A spec: a rooted graph of package constraints.
#[derive(Debug, Clone)]
pub struct Spec {
    nodes: Vec<SpecNode>,
    edges: Vec<DependencyEdge>,
    root: NodeId,
}

impl Spec {
    /// A spec consisting of a single root node.
    pub fn new(root: SpecNode) -> Self {
        Spec {
            nodes: vec![root],
            edges: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn named(name: &str) -> Self {
        Spec::new(SpecNode::new(name))
    }

    /// Independent deep copy of the whole graph.
    pub fn copy(&self) -> Spec {
        self.clone()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &SpecNode {
        &self.nodes[self.root.0]
    }

    pub fn root_node_mut(&mut self) -> &mut SpecNode {
        &mut self.nodes[self.root.0]
    }

    pub fn name(&self) -> &str {
        &self.root_node().name
    }

    /// Panics if `id` does not belong to this spec.
    pub fn node(&self, id: NodeId) -> &SpecNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SpecNode {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Result<&SpecNode> {
        self.nodes.get(id.0).ok_or(SpecError::NodeNotFound(id.0))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// First node with the given name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// Add a node without connecting it.
    pub fn add_node(&mut self, node: SpecNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Connect `parent` to `child`.
    ///
    /// An existing edge to the same node gains the new types and virtuals.
    /// An existing edge to a different node of the same name is merged into
    /// when both are abstract; if either is concrete this is a
    /// [`SpecError::DuplicateDependency`].
    pub fn add_dependency(
        &mut self,
        parent: NodeId,
        child: NodeId,
        types: DepTypes,
        virtuals: BTreeSet<String>,
    ) -> Result<NodeId> {
        self.get(parent)?;
        let child_name = self.get(child)?.name.clone();

        let existing = self
            .edges
            .iter()
            .position(|e| e.parent == parent && self.nodes[e.child.0].name == child_name);
        let Some(index) = existing else {
            self.edges.push(DependencyEdge {
                parent,
                child,
                types,
                virtuals,
            });
            return Ok(child);
        };

        let current = self.edges[index].child;
        if current != child {
            if self.nodes[current.0].concrete || self.nodes[child.0].concrete {
                return Err(SpecError::DuplicateDependency {
                    parent: self.nodes[parent.0].name.clone(),
                    name: child_name,
                });
            }
            let incoming = self.nodes[child.0].clone();
            self.nodes[current.0].constrain(&incoming)?;
        }
        let edge = &mut self.edges[index];
        edge.types = edge.types.union(types);
        edge.virtuals.extend(virtuals);
        Ok(current)
    }

    /// Edges leaving `id`, ordered by child name.
    pub fn dependencies(&self, id: NodeId) -> Vec<&DependencyEdge> {
        let mut out: Vec<&DependencyEdge> = self.edges.iter().filter(|e| e.parent == id).collect();
        out.sort_by(|a, b| self.nodes[a.child.0].name.cmp(&self.nodes[b.child.0].name));
        out
    }

    /// Edges entering `id`, ordered by parent name.
    pub fn dependents(&self, id: NodeId) -> Vec<&DependencyEdge> {
        let mut out: Vec<&DependencyEdge> = self.edges.iter().filter(|e| e.child == id).collect();
        out.sort_by(|a, b| self.nodes[a.parent.0].name.cmp(&self.nodes[b.parent.0].name));
        out
    }

    /// The edge from `parent` to its dependency called `name`.
    pub fn edge(&self, parent: NodeId, name: &str) -> Option<&DependencyEdge> {
        self.edges
            .iter()
            .find(|e| e.parent == parent && self.nodes[e.child.0].name == name)
    }

    pub fn edge_mut(&mut self, parent: NodeId, child: NodeId) -> Option<&mut DependencyEdge> {
        self.edges.iter_mut().find(|e| e.parent == parent && e.child == child)
    }

    /// Walk the graph from the root. With `dedupe`, each node is visited
    /// once; otherwise shared nodes are revisited through every path.
    pub fn traverse(&self, order: Order, dedupe: bool) -> Traversal<'_> {
        self.traverse_from(self.root, order, dedupe)
    }

    pub fn traverse_from(&self, start: NodeId, order: Order, dedupe: bool) -> Traversal<'_> {
        let mut seen = HashSet::new();
        seen.insert(start);
        Traversal {
            spec: self,
            order,
            dedupe,
            seen,
            stack: vec![Frame::new(self, start, 0, None)],
        }
    }

    /// Nodes reachable from `start`, including `start`.
    pub fn reachable(&self, start: NodeId) -> Vec<NodeId> {
        self.traverse_from(start, Order::Pre, true).map(|v| v.node).collect()
    }

    /// Whether any node (other than the root) is named `name`, or reached
    /// through an edge providing the virtual `name`.
    pub fn depends_on(&self, name: &str) -> bool {
        self.reachable(self.root)
            .into_iter()
            .skip(1)
            .any(|id| self.nodes[id.0].name == name)
            || self.edges.iter().any(|e| e.virtuals.contains(name))
    }

    /// Nodes in dependency order: every node after all of its dependents.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut indegree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            indegree[edge.child.0] += 1;
        }
        let mut ready: BTreeMap<(String, usize), NodeId> = BTreeMap::new();
        for id in self.node_ids() {
            if indegree[id.0] == 0 {
                ready.insert((self.nodes[id.0].name.clone(), id.0), id);
            }
        }
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some((_, id)) = ready.pop_first() {
            order.push(id);
            for edge in self.edges.iter().filter(|e| e.parent == id) {
                indegree[edge.child.0] -= 1;
                if indegree[edge.child.0] == 0 {
                    ready.insert((self.nodes[edge.child.0].name.clone(), edge.child.0), edge.child);
                }
            }
        }
        if order.len() != self.nodes.len() {
            let stuck = self
                .node_ids()
                .find(|id| indegree[id.0] > 0)
                .map(|id| self.nodes[id.0].name.clone())
                .unwrap_or_default();
            return Err(SpecError::CircularDependency(stuck));
        }
        Ok(order)
    }

    /// Copy of the part of the graph reachable from `start`, rooted there.
    pub fn subgraph(&self, start: NodeId) -> Spec {
        let ids = self.reachable(start);
        let mut remap = BTreeMap::new();
        let mut nodes = Vec::with_capacity(ids.len());
        for (new, old) in ids.iter().enumerate() {
            remap.insert(*old, NodeId(new));
            nodes.push(self.nodes[old.0].clone());
        }
        let edges = self
            .edges
            .iter()
            .filter_map(|e| {
                Some(DependencyEdge {
                    parent: *remap.get(&e.parent)?,
                    child: *remap.get(&e.child)?,
                    types: e.types,
                    virtuals: e.virtuals.clone(),
                })
            })
            .collect();
        Spec {
            nodes,
            edges,
            root: NodeId(0),
        }
    }

    /// Whether every node is concrete.
    pub fn is_concrete(&self) -> bool {
        self.nodes.iter().all(|n| n.concrete)
    }

    /// The node in this graph that `wanted` (a dependency of some other
    /// spec) refers to: a node of the same name, or the target of an edge
    /// providing `wanted` as a virtual.
    fn counterpart(&self, wanted: &SpecNode) -> Option<NodeId> {
        self.find(&wanted.name).or_else(|| {
            self.edges
                .iter()
                .find(|e| e.virtuals.contains(&wanted.name))
                .map(|e| e.child)
        })
    }

    /// Whether `self` meets every constraint of `other`. Dependencies of
    /// `other` are matched by name anywhere in `self`.
    pub fn satisfies(&self, other: &Spec) -> bool {
        if !self.root_node().satisfies(other.root_node()) {
            return false;
        }
        for id in other.node_ids().filter(|id| *id != other.root) {
            let wanted = other.node(id);
            let Some(mine) = self.counterpart(wanted) else {
                return false;
            };
            let mut target = wanted.clone();
            if self.nodes[mine.0].name != wanted.name {
                target.name.clear();
            }
            if !self.nodes[mine.0].satisfies(&target) {
                return false;
            }
            for edge in other.dependents(id) {
                for virtual_name in &edge.virtuals {
                    if !self.edges.iter().any(|e| e.child == mine && e.virtuals.contains(virtual_name)) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Whether `self` and `other` could describe the same concrete graph.
    pub fn intersects(&self, other: &Spec) -> bool {
        if !self.root_node().intersects(other.root_node()) {
            return false;
        }
        other
            .node_ids()
            .filter(|id| *id != other.root)
            .all(|id| match self.find(&other.node(id).name) {
                Some(mine) => self.nodes[mine.0].intersects(other.node(id)),
                None => true,
            })
    }

    /// Add every constraint of `other` to `self`, merging dependencies by
    /// name. Returns whether anything changed.
    pub fn constrain(&mut self, other: &Spec) -> Result<bool> {
        let root = self.root;
        let mut changed = self.nodes[root.0].constrain(other.root_node())?;

        let mut mapped: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        mapped.insert(other.root, root);
        for id in other.traverse(Order::Pre, true).map(|v| v.node).skip(1) {
            let theirs = other.node(id);
            let mine = match self.find(&theirs.name) {
                Some(mine) => {
                    changed |= self.nodes[mine.0].constrain(theirs)?;
                    mine
                }
                None => {
                    if self.nodes[root.0].concrete {
                        return Err(SpecError::unsatisfiable(
                            ConstraintKind::Dependency,
                            &*self,
                            format!("^{theirs}"),
                        ));
                    }
                    changed = true;
                    self.add_node(theirs.clone())
                }
            };
            mapped.insert(id, mine);
        }
        for edge in other.edges() {
            let (Some(parent), Some(child)) = (mapped.get(&edge.parent), mapped.get(&edge.child)) else {
                continue;
            };
            let known = self
                .edges
                .iter()
                .any(|e| e.parent == *parent && e.child == *child && edge.virtuals.is_subset(&e.virtuals));
            if !known {
                self.add_dependency(*parent, *child, edge.types, edge.virtuals.clone())?;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Structural equality: same root, same nodes by name, same edges.
impl PartialEq for Spec {
    fn eq(&self, other: &Self) -> bool {
        if self.root_node() != other.root_node() || self.nodes.len() != other.nodes.len() {
            return false;
        }
        let by_name = |spec: &Spec| -> BTreeMap<String, SpecNode> {
            spec.nodes.iter().map(|n| (n.name.clone(), n.clone())).collect()
        };
        let edge_set = |spec: &Spec| -> BTreeSet<(String, String, DepTypes, BTreeSet<String>)> {
            spec.edges
                .iter()
                .map(|e| {
                    (
                        spec.nodes[e.parent.0].name.clone(),
                        spec.nodes[e.child.0].name.clone(),
                        e.types,
                        e.virtuals.clone(),
                    )
                })
                .collect()
        };
        by_name(self) == by_name(other) && edge_set(self) == edge_set(other)
    }
}

impl Eq for Spec {}

/// Spec syntax: the root node followed by `^dep` for every other node.
impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root_node().write_syntax(f)?;
        for visit in self.traverse(Order::Pre, true).skip(1) {
            write!(f, " ^")?;
            if let Some(edge) = visit.edge.map(|i| &self.edges[i]) {
                let mut attrs = Vec::new();
                if !edge.virtuals.is_empty() {
                    let names: Vec<&str> = edge.virtuals.iter().map(String::as_str).collect();
                    attrs.push(format!("virtuals={}", names.join(",")));
                }
                if edge.types != DepTypes::DEFAULT {
                    attrs.push(format!("deptypes={}", edge.types));
                }
                if !attrs.is_empty() {
                    write!(f, "[{}] ", attrs.join(" "))?;
                }
            }
            self.nodes[visit.node.0].write_syntax(f)?;
        }
        Ok(())
    }
}

/// One step of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub node: NodeId,
    pub depth: usize,
    /// Index into [`Spec::edges`] of the edge followed to get here.
    pub edge: Option<usize>,
}

#[derive(Debug, Clone)]
struct Frame {
    visit: Visit,
    children: Vec<usize>,
    next: usize,
    entered: bool,
}

impl Frame {
    fn new(spec: &Spec, node: NodeId, depth: usize, edge: Option<usize>) -> Self {
        let mut children: Vec<usize> = spec
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.parent == node)
            .map(|(i, _)| i)
            .collect();
        children.sort_by(|a, b| {
            let name = |i: &usize| &spec.nodes[spec.edges[*i].child.0].name;
            name(a).cmp(name(b))
        });
        Frame {
            visit: Visit { node, depth, edge },
            children,
            next: 0,
            entered: false,
        }
    }
}

/// Lazy depth-first walk over a spec. Children are visited in name order.
#[derive(Debug, Clone)]
pub struct Traversal<'a> {
    spec: &'a Spec,
    order: Order,
    dedupe: bool,
    seen: HashSet<NodeId>,
    stack: Vec<Frame>,
}

impl Iterator for Traversal<'_> {
    type Item = Visit;

    fn next(&mut self) -> Option<Visit> {
        loop {
            let top = self.stack.last_mut()?;
            if !top.entered {
                top.entered = true;
                if self.order == Order::Pre {
                    return Some(top.visit);
                }
            }
            if top.next < top.children.len() {
                let edge_index = top.children[top.next];
                top.next += 1;
                let depth = top.visit.depth + 1;
                let child = self.spec.edges[edge_index].child;
                if self.dedupe && !self.seen.insert(child) {
                    continue;
                }
                if self.stack.iter().any(|f| f.visit.node == child) {
                    continue;
                }
                let frame = Frame::new(self.spec, child, depth, Some(edge_index));
                self.stack.push(frame);
                continue;
            }
            let done = self.stack.pop()?;
            if self.order == Order::Post {
                return Some(done.visit);
            }
        }
    }
}
