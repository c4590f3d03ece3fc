//! Concretization: turning abstract specs into concrete ones.
//!
//! The solver keeps one working graph for the whole request. Pending
//! dependency edges are drained from a worklist: a dependency whose name
//! already has a node is unified with it, otherwise a node is created and
//! its guarded rules are evaluated. Once nothing changes, one decision is
//! taken (external, provider, version, variant or compiler, in that
//! order) and propagation starts again. A failed branch returns to the
//! latest decision with untried alternatives.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use hpkg_repo::{PackageDefinition, RepoError, VariantRule};
use hpkg_spec::{format_assignment, DepTypes, NodeId, Spec, SpecError, SpecNode, VariantValue};
use hpkg_version::{StandardVersion, VersionError, VersionList};
use log::{debug, info, warn};

use crate::context::SolveContext;
use crate::error::{Result, SolveError};
use crate::failure::{Problem, ProblemKind, ResolutionFailure};
use crate::policy::VersionCandidate;

const USER_REQUEST: &str = "user request";

/// Why a branch stopped: a recoverable conflict or an error that ends the
/// whole solve.
enum Failure {
    Conflict(Vec<Problem>),
    Fatal(SolveError),
}

impl From<SolveError> for Failure {
    fn from(e: SolveError) -> Self {
        Failure::Fatal(e)
    }
}

impl From<SpecError> for Failure {
    fn from(e: SpecError) -> Self {
        Failure::Fatal(e.into())
    }
}

impl From<RepoError> for Failure {
    fn from(e: RepoError) -> Self {
        Failure::Fatal(e.into())
    }
}

impl From<VersionError> for Failure {
    fn from(e: VersionError) -> Self {
        Failure::Fatal(e.into())
    }
}

type Step<T> = std::result::Result<T, Failure>;

fn conflict(problem: Problem) -> Failure {
    Failure::Conflict(vec![problem])
}

fn guard_text(when: &Spec) -> Option<String> {
    let text = when.to_string();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// The rule a constraint came from.
#[derive(Debug, Clone)]
struct Origin {
    rule: String,
    guard: Option<String>,
}

impl Origin {
    fn user() -> Self {
        Origin {
            rule: USER_REQUEST.to_string(),
            guard: None,
        }
    }

    fn dependency(package: &str, spec: &Spec, when: &Spec) -> Self {
        Origin {
            rule: format!("{package}: depends_on({spec})"),
            guard: guard_text(when),
        }
    }

    fn decision(package: &str, choice: &Choice) -> Self {
        Origin {
            rule: format!("{package}: chose {choice}"),
            guard: None,
        }
    }
}

/// A dependency edge still to be resolved.
#[derive(Debug, Clone)]
struct Pending {
    parent: NodeId,
    request: Spec,
    types: DepTypes,
    origin: Origin,
}

/// A virtual dependency bound to a provider, checked once the provider is
/// concrete.
#[derive(Debug, Clone)]
struct VirtualRequest {
    provider: NodeId,
    request: SpecNode,
    origin: Origin,
}

/// Everything a decision can change; cloned at each choice point.
#[derive(Debug, Clone)]
struct State {
    /// Working graph. Its anonymous root anchors the requested specs.
    graph: Spec,
    pending: VecDeque<Pending>,
    /// Virtual dependencies waiting for a provider decision.
    parked: Vec<Pending>,
    /// Dependency rules already pushed, by node and rule index.
    applied: BTreeSet<(NodeId, usize)>,
    /// Nodes whose external-or-build decision is made.
    settled: BTreeSet<NodeId>,
    /// Rules that narrowed each node.
    sources: BTreeMap<NodeId, Vec<String>>,
    virtuals: Vec<VirtualRequest>,
}

impl State {
    fn anchor(&self) -> NodeId {
        self.graph.root()
    }

    fn package_nodes(&self) -> Vec<NodeId> {
        let anchor = self.anchor();
        self.graph.node_ids().filter(|id| *id != anchor).collect()
    }

    fn record_source(&mut self, id: NodeId, rule: &str) {
        let sources = self.sources.entry(id).or_default();
        if !sources.iter().any(|s| s == rule) {
            sources.push(rule.to_string());
        }
    }
}

#[derive(Debug, Clone)]
enum Choice {
    /// Use the configured external at `index`, or build when `None`.
    External { node: NodeId, index: Option<usize> },
    /// Bind the first parked virtual to `provider`.
    Provider { provider: String },
    Version { node: NodeId, version: hpkg_version::Version },
    Variant { node: NodeId, name: String, value: VariantValue },
    Compiler { node: NodeId, index: usize },
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::External { index: Some(i), .. } => write!(f, "external #{i}"),
            Choice::External { index: None, .. } => write!(f, "build from source"),
            Choice::Provider { provider } => write!(f, "provider {provider}"),
            Choice::Version { version, .. } => write!(f, "version {version}"),
            Choice::Variant { name, value, .. } => f.write_str(&format_assignment(name, value)),
            Choice::Compiler { index, .. } => write!(f, "compiler #{index}"),
        }
    }
}

struct ChoicePoint {
    state: State,
    alternatives: Vec<Choice>,
}

enum Next {
    Decide(Vec<Choice>),
    Done,
}

struct Solver<'c, 'a> {
    ctx: &'c SolveContext<'a>,
    roots: &'c [Spec],
    /// `^dep` constraints from the request, by package name.
    user: BTreeMap<String, SpecNode>,
    steps: Cell<usize>,
    started: Instant,
}

/// Concretize `roots` together into one consistent graph and return one
/// concrete spec per root, in request order.
pub fn concretize(ctx: &SolveContext<'_>, roots: &[Spec]) -> Result<Vec<Spec>> {
    if roots.is_empty() {
        return Ok(Vec::new());
    }
    let solver = Solver::new(ctx, roots)?;
    let names: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
    info!("concretizing {}", names.join(", "));
    let solved = solver.run()?;
    info!("concretized {} root(s) in {} steps", solved.len(), solver.steps.get());
    Ok(solved)
}

/// Concretize each root on its own, in parallel. Roots do not constrain
/// each other, so a shared dependency may be chosen differently per root.
pub fn concretize_separately(ctx: &SolveContext<'_>, roots: &[Spec]) -> Vec<Result<Spec>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = roots
            .iter()
            .map(|root| scope.spawn(move || concretize(ctx, std::slice::from_ref(root))))
            .collect();
        handles
            .into_iter()
            .zip(roots)
            .map(|(handle, root)| match handle.join() {
                Ok(Ok(mut specs)) => specs.pop().ok_or_else(|| SolveError::InvalidRequest {
                    spec: root.to_string(),
                    detail: "no result".to_string(),
                }),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SolveError::WorkerPanicked(root.to_string())),
            })
            .collect()
    })
}

impl<'c, 'a> Solver<'c, 'a> {
    fn new(ctx: &'c SolveContext<'a>, roots: &'c [Spec]) -> Result<Self> {
        let mut user: BTreeMap<String, SpecNode> = BTreeMap::new();
        for root in roots {
            if root.root_node().is_anonymous() {
                return Err(SolveError::InvalidRequest {
                    spec: root.to_string(),
                    detail: "a requested spec needs a package name".to_string(),
                });
            }
            for id in root.node_ids().filter(|id| *id != root.root()) {
                let node = root.node(id);
                match user.get_mut(&node.name) {
                    Some(existing) => match existing.constrain(node) {
                        Ok(_) => {}
                        Err(SpecError::Unsatisfiable { provided, required, .. }) => {
                            let problem = Problem::new(ProblemKind::Unsatisfiable, &node.name, USER_REQUEST)
                                .between(provided, required);
                            return Err(SolveError::Unsatisfiable(ResolutionFailure::new([problem])));
                        }
                        Err(e) => return Err(e.into()),
                    },
                    None => {
                        user.insert(node.name.clone(), node.clone());
                    }
                }
            }
        }
        Ok(Solver {
            ctx,
            roots,
            user,
            steps: Cell::new(0),
            started: Instant::now(),
        })
    }

    fn tick(&self) -> Step<()> {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        let settings = &self.ctx.config.solver;
        let elapsed = self.started.elapsed();
        if steps > settings.max_steps || settings.timeout.is_some_and(|limit| elapsed > limit) {
            return Err(Failure::Fatal(SolveError::Timeout { steps, elapsed }));
        }
        Ok(())
    }

    fn initial_state(&self) -> State {
        let graph = Spec::new(SpecNode::anonymous());
        let anchor = graph.root();
        let pending = self
            .roots
            .iter()
            .map(|root| Pending {
                parent: anchor,
                request: Spec::new(root.root_node().clone()),
                types: DepTypes::DEFAULT,
                origin: Origin::user(),
            })
            .collect();
        State {
            graph,
            pending,
            parked: Vec::new(),
            applied: BTreeSet::new(),
            settled: BTreeSet::new(),
            sources: BTreeMap::new(),
            virtuals: Vec::new(),
        }
    }

    fn run(&self) -> Result<Vec<Spec>> {
        let mut state = self.initial_state();
        let mut stack: Vec<ChoicePoint> = Vec::new();
        let mut problems: BTreeSet<Problem> = BTreeSet::new();
        let mut outcome = self.advance(&mut state);
        loop {
            match outcome {
                Ok(Next::Done) => return self.extract(&state),
                Ok(Next::Decide(mut alternatives)) => {
                    let choice = alternatives.remove(0);
                    if !alternatives.is_empty() {
                        stack.push(ChoicePoint {
                            state: state.clone(),
                            alternatives,
                        });
                    }
                    outcome = self.apply(&mut state, choice).and_then(|()| self.advance(&mut state));
                }
                Err(Failure::Conflict(found)) => {
                    for problem in &found {
                        debug!("branch failed: {problem}");
                    }
                    problems.extend(found);
                    let Some(point) = stack.last_mut() else {
                        return Err(self.failure(problems));
                    };
                    let choice = point.alternatives.remove(0);
                    state = point.state.clone();
                    if point.alternatives.is_empty() {
                        stack.pop();
                    }
                    debug!("backtracking ({} choice points left)", stack.len());
                    outcome = self.apply(&mut state, choice).and_then(|()| self.advance(&mut state));
                }
                Err(Failure::Fatal(e)) => return Err(e),
            }
        }
    }

    fn failure(&self, problems: BTreeSet<Problem>) -> SolveError {
        if let Some(first) = problems.first() {
            if problems.iter().all(|p| p.kind == ProblemKind::UnknownPackage) {
                return SolveError::UnknownPackage {
                    name: first.package.clone(),
                };
            }
        }
        SolveError::Unsatisfiable(ResolutionFailure::new(problems))
    }

    /// Propagate to a fixed point, then pick the next decision or, when
    /// none is left, validate the result.
    fn advance(&self, state: &mut State) -> Step<Next> {
        self.tick()?;
        self.propagate(state)?;
        if let Some(choices) = self.next_decision(state)? {
            return Ok(Next::Decide(choices));
        }
        self.validate(state)?;
        Ok(Next::Done)
    }

    fn package(&self, name: &str) -> Step<Arc<PackageDefinition>> {
        self.ctx
            .package(name)?
            .ok_or_else(|| conflict(Problem::new(ProblemKind::UnknownPackage, name, USER_REQUEST)))
    }

    /// Whether `guard` holds for the node `id` as currently constrained.
    fn holds(&self, state: &State, id: NodeId, guard: &Spec) -> bool {
        if guard.node_count() == 1 {
            return state.graph.node(id).satisfies(guard.root_node());
        }
        state.graph.subgraph(id).satisfies(guard)
    }

    fn active_variant<'p>(
        &self,
        state: &State,
        id: NodeId,
        package: &'p PackageDefinition,
        name: &'p str,
    ) -> Option<&'p VariantRule> {
        package.variant_rules(name).find(|rule| self.holds(state, id, &rule.when))
    }

    // ---- propagation ----

    fn propagate(&self, state: &mut State) -> Step<()> {
        loop {
            self.tick()?;
            // A failed pass reports every clash left in the queue.
            let mut problems = Vec::new();
            while let Some(pending) = state.pending.pop_front() {
                self.tick()?;
                match self.process(state, pending) {
                    Ok(()) => {}
                    Err(Failure::Conflict(found)) => problems.extend(found),
                    Err(fatal) => return Err(fatal),
                }
            }
            if !problems.is_empty() {
                return Err(Failure::Conflict(problems));
            }
            let mut changed = self.reuse_providers(state)?;
            for id in state.package_nodes() {
                changed |= self.refresh(state, id)?;
            }
            if !changed && state.pending.is_empty() {
                return Ok(());
            }
        }
    }

    fn process(&self, state: &mut State, pending: Pending) -> Step<()> {
        let name = pending.request.name().to_string();
        if let Some(id) = state.graph.find(&name) {
            self.unify(state, id, pending.request.root_node(), &pending.origin)?;
            state.graph.add_dependency(pending.parent, id, pending.types, BTreeSet::new())?;
            self.push_extras(state, id, &pending);
            return Ok(());
        }
        if self.ctx.package(&name)?.is_some() {
            let id = self.create(state, pending.request.root_node(), &pending.origin)?;
            state.graph.add_dependency(pending.parent, id, pending.types, BTreeSet::new())?;
            self.push_extras(state, id, &pending);
            return Ok(());
        }
        if self.ctx.is_virtual(&name)? {
            match self.existing_provider(state, &name)? {
                Some(provider) => self.bind_virtual(state, pending, provider)?,
                None => {
                    debug!("virtual '{name}' waits for a provider");
                    state.parked.push(pending);
                }
            }
            return Ok(());
        }
        Err(conflict(
            Problem::new(ProblemKind::UnknownPackage, &name, pending.origin.rule)
                .between("no such package or virtual", "")
                .guarded(pending.origin.guard),
        ))
    }

    /// Dependencies written inside a dependency request (`a ^b`) attach to
    /// the requested node.
    fn push_extras(&self, state: &mut State, id: NodeId, pending: &Pending) {
        let request = &pending.request;
        for extra in request.node_ids().filter(|e| *e != request.root()) {
            state.pending.push_back(Pending {
                parent: id,
                request: Spec::new(request.node(extra).clone()),
                types: DepTypes::DEFAULT,
                origin: pending.origin.clone(),
            });
        }
    }

    /// Intersect node `id` with `request`; an empty intersection fails the
    /// branch.
    fn unify(&self, state: &mut State, id: NodeId, request: &SpecNode, origin: &Origin) -> Step<()> {
        let node = state.graph.node_mut(id);
        match node.constrain(request) {
            Ok(_) => {
                state.record_source(id, &origin.rule);
                Ok(())
            }
            Err(SpecError::Unsatisfiable { provided, required, .. }) => {
                let name = state.graph.node(id).name.clone();
                let sources = state.sources.get(&id).cloned().unwrap_or_default();
                Err(conflict(
                    Problem::new(ProblemKind::Unsatisfiable, &name, origin.rule.clone())
                        .between(provided, required)
                        .guarded(origin.guard.clone())
                        .from_sources(&sources),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(&self, state: &mut State, request: &SpecNode, origin: &Origin) -> Step<NodeId> {
        let name = request.name.clone();
        let config = self.ctx.config;
        let mut node = SpecNode::new(&name);
        node.constrain(request)?;
        if let Some(user) = self.user.get(&name) {
            if let Err(SpecError::Unsatisfiable { provided, required, .. }) = node.constrain(user) {
                return Err(conflict(
                    Problem::new(ProblemKind::Unsatisfiable, &name, USER_REQUEST)
                        .between(provided, required)
                        .from_sources(&[origin.rule.clone()]),
                ));
            }
        }

        let has_externals = !config.externals(&name).is_empty();
        if !has_externals && !config.buildable(&name) {
            return Err(conflict(
                Problem::new(ProblemKind::NoCandidate, &name, origin.rule.clone())
                    .between("not buildable", "no external is configured")
                    .guarded(origin.guard.clone()),
            ));
        }

        let id = state.graph.add_node(node);
        state.record_source(id, &origin.rule);
        if self.user.contains_key(&name) {
            state.record_source(id, USER_REQUEST);
        }
        if !has_externals {
            state.settled.insert(id);
        }
        debug!("added node '{name}' for {}", origin.rule);
        Ok(id)
    }

    /// A node already providing `virtual_name`: the target of an edge
    /// annotated with it, or a node whose active rules provide it.
    fn existing_provider(&self, state: &State, virtual_name: &str) -> Step<Option<NodeId>> {
        if let Some(edge) = state.graph.edges().iter().find(|e| e.virtuals.contains(virtual_name)) {
            return Ok(Some(edge.child));
        }
        for id in state.package_nodes() {
            let package = self.package(&state.graph.node(id).name)?;
            let provides = package
                .provides
                .iter()
                .any(|rule| rule.virtual_name() == virtual_name && self.holds(state, id, &rule.when));
            if provides {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn bind_virtual(&self, state: &mut State, pending: Pending, provider: NodeId) -> Step<()> {
        let virtual_name = pending.request.name().to_string();
        debug!(
            "'{}' provides '{virtual_name}' for {}",
            state.graph.node(provider).name,
            pending.origin.rule
        );
        state
            .graph
            .add_dependency(pending.parent, provider, pending.types, BTreeSet::from([virtual_name]))?;
        state.record_source(provider, &pending.origin.rule);
        state.virtuals.push(VirtualRequest {
            provider,
            request: pending.request.root_node().clone(),
            origin: pending.origin,
        });
        Ok(())
    }

    fn reuse_providers(&self, state: &mut State) -> Step<bool> {
        let mut changed = false;
        for pending in std::mem::take(&mut state.parked) {
            match self.existing_provider(state, pending.request.name())? {
                Some(provider) => {
                    self.bind_virtual(state, pending, provider)?;
                    changed = true;
                }
                None => state.parked.push(pending),
            }
        }
        Ok(changed)
    }

    /// Re-evaluate everything that depends on node `id`'s current
    /// constraints. Returns whether anything changed.
    fn refresh(&self, state: &mut State, id: NodeId) -> Step<bool> {
        let package = self.package(&state.graph.node(id).name)?;
        let mut changed = self.fill_arch(state, id);
        changed |= self.resolve_git(state, id, &package)?;
        changed |= self.normalize_variants(state, id, &package)?;

        // Externals are leaves.
        if state.settled.contains(&id) && state.graph.node(id).external.is_none() {
            for (index, rule) in package.dependencies.iter().enumerate() {
                if state.applied.contains(&(id, index)) || !self.holds(state, id, &rule.when) {
                    continue;
                }
                state.applied.insert((id, index));
                state.pending.push_back(Pending {
                    parent: id,
                    request: rule.spec.clone(),
                    types: rule.types,
                    origin: Origin::dependency(&package.name, &rule.spec, &rule.when),
                });
                changed = true;
            }
        }

        self.check_conflicts(state, id, &package)?;
        Ok(changed)
    }

    /// Fill unset architecture fields from the first dependent with a
    /// complete architecture. Requested roots take the configured default.
    fn fill_arch(&self, state: &mut State, id: NodeId) -> bool {
        if state.graph.node(id).arch.is_concrete() {
            return false;
        }
        let anchor = state.anchor();
        let source = state.graph.dependents(id).into_iter().find_map(|edge| {
            if edge.parent == anchor {
                return Some(self.ctx.config.arch.clone());
            }
            let arch = &state.graph.node(edge.parent).arch;
            arch.is_concrete().then(|| arch.clone())
        });
        let Some(source) = source else {
            return false;
        };
        let arch = &mut state.graph.node_mut(id).arch;
        let before = arch.clone();
        if arch.platform.is_none() {
            arch.platform = source.platform;
        }
        if arch.os.is_none() {
            arch.os = source.os;
        }
        if arch.target.is_none() {
            arch.target = source.target;
        }
        *arch != before
    }

    fn resolve_git(&self, state: &mut State, id: NodeId, package: &PackageDefinition) -> Step<bool> {
        let Some(reference) = state.graph.node(id).versions.unresolved().next().map(|v| v.to_string()) else {
            return Ok(false);
        };
        let lookup_error = |detail: &str| {
            Failure::Fatal(
                VersionError::Lookup {
                    reference: reference.clone(),
                    detail: detail.to_string(),
                }
                .into(),
            )
        };
        let Some(lookup) = self.ctx.lookup else {
            return Err(lookup_error("no git lookup is configured"));
        };
        let Some(url) = &package.git else {
            return Err(lookup_error(&format!("package '{}' has no git repository", package.name)));
        };
        let known: Vec<StandardVersion> = package
            .versions
            .iter()
            .filter_map(|decl| decl.version.as_standard().cloned())
            .collect();
        state.graph.node_mut(id).versions.resolve_git(lookup, url, &known)?;
        Ok(true)
    }

    /// Bring variant values into the shape their declaration expects;
    /// values outside the domain fail the branch.
    fn normalize_variants(&self, state: &mut State, id: NodeId, package: &PackageDefinition) -> Step<bool> {
        let mut changed = false;
        let names: Vec<String> = state.graph.node(id).variants.keys().cloned().collect();
        for name in names {
            let Some(rule) = self.active_variant(state, id, package, &name) else {
                continue;
            };
            let Some(current) = state.graph.node(id).variant(&name).cloned() else {
                continue;
            };
            match rule.def.coerce(&current) {
                Ok(value) if value != current => {
                    state.graph.node_mut(id).variants.insert(name, value);
                    changed = true;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(conflict(
                        Problem::new(ProblemKind::Invalid, &package.name, format!("{}: variant({name})", package.name))
                            .between(format_assignment(&name, &current), e)
                            .guarded(guard_text(&rule.when)),
                    ));
                }
            }
        }
        Ok(changed)
    }

    fn check_conflicts(&self, state: &State, id: NodeId, package: &PackageDefinition) -> Step<()> {
        for rule in &package.conflicts {
            if self.holds(state, id, &rule.when) && self.holds(state, id, &rule.spec) {
                let required = match &rule.message {
                    Some(message) => format!("{} ({message})", rule.spec),
                    None => rule.spec.to_string(),
                };
                return Err(conflict(
                    Problem::new(ProblemKind::Conflict, &package.name, format!("{}: conflicts({})", package.name, rule.spec))
                        .between(state.graph.node(id), required)
                        .guarded(guard_text(&rule.when))
                        .from_sources(state.sources.get(&id).map(Vec::as_slice).unwrap_or_default()),
                ));
            }
        }
        Ok(())
    }

    // ---- decisions ----

    fn next_decision(&self, state: &State) -> Step<Option<Vec<Choice>>> {
        let nodes = state.package_nodes();
        if let Some(id) = nodes.iter().find(|id| !state.settled.contains(id)) {
            return self.external_choices(state, *id).map(Some);
        }
        if !state.parked.is_empty() {
            return self.provider_choices(state).map(Some);
        }
        for id in nodes {
            let package = self.package(&state.graph.node(id).name)?;
            let node = state.graph.node(id);
            if node.version().is_none() {
                return self.version_choices(state, id, &package).map(Some);
            }
            if let Some(choices) = self.variant_choices(state, id, &package) {
                return Ok(Some(choices));
            }
            let compiler_set = node.compiler.as_ref().is_some_and(|c| c.is_concrete());
            if self.ctx.config.require_compiler() && !compiler_set {
                return self.compiler_choices(state, id).map(Some);
            }
        }
        Ok(None)
    }

    fn no_candidate(&self, package: &str, what: &str, left: impl ToString, right: impl ToString) -> Failure {
        conflict(Problem::new(ProblemKind::NoCandidate, package, format!("{package}: {what}")).between(left, right))
    }

    fn external_choices(&self, state: &State, id: NodeId) -> Step<Vec<Choice>> {
        let node = state.graph.node(id);
        let config = self.ctx.config;
        let mut choices: Vec<Choice> = config
            .externals(&node.name)
            .iter()
            .enumerate()
            .filter(|(_, external)| node.intersects(&external.spec))
            .map(|(index, _)| Choice::External {
                node: id,
                index: Some(index),
            })
            .collect();
        if config.buildable(&node.name) {
            choices.push(Choice::External { node: id, index: None });
        }
        if choices.is_empty() {
            let offered: Vec<String> = config.externals(&node.name).iter().map(|e| e.spec.to_string()).collect();
            return Err(self.no_candidate(&node.name, "external", node, offered.join(", ")));
        }
        Ok(choices)
    }

    fn provider_choices(&self, state: &State) -> Step<Vec<Choice>> {
        let request = state.parked[0].request.root_node();
        let virtual_name = request.name.as_str();
        let preferred = self.ctx.config.provider_preferences(virtual_name);

        let mut providers = Vec::new();
        for name in self.ctx.providers_for(virtual_name)? {
            let package = self.package(&name)?;
            let fits = package
                .provides
                .iter()
                .any(|rule| rule.virtual_name() == virtual_name && rule.spec.root_node().versions.intersects(&request.versions));
            if fits {
                providers.push(name);
            }
        }
        providers.sort_by_cached_key(|name| {
            (
                !self.user.contains_key(name),
                preferred.iter().position(|p| p == name).unwrap_or(usize::MAX),
                name.clone(),
            )
        });
        if providers.is_empty() {
            return Err(self.no_candidate(virtual_name, "provider", request, "no package provides it"));
        }
        Ok(providers.into_iter().map(|provider| Choice::Provider { provider }).collect())
    }

    fn version_choices(&self, state: &State, id: NodeId, package: &PackageDefinition) -> Step<Vec<Choice>> {
        let node = state.graph.node(id);
        let preferences = self.ctx.config.version_preferences(&package.name);
        let mut seen = BTreeSet::new();
        let mut candidates: Vec<VersionCandidate> = package
            .versions
            .iter()
            .filter(|decl| node.versions.contains(&decl.version) && seen.insert(decl.version.clone()))
            .map(|decl| VersionCandidate {
                version: decl.version.clone(),
                preferred: decl.preferred,
                deprecated: decl.deprecated,
                config_rank: preferences.iter().position(|p| p.contains(&decl.version)),
            })
            .collect();
        self.ctx.config.solver.version_policy.sort(&mut candidates);
        if candidates.is_empty() {
            let declared: Vec<String> = package.sorted_versions().iter().map(|d| d.version.to_string()).collect();
            return Err(self.no_candidate(
                &package.name,
                "version",
                format!("{}@{}", package.name, node.versions),
                format!("declared versions: {}", declared.join(", ")),
            ));
        }
        Ok(candidates
            .into_iter()
            .map(|c| Choice::Version {
                node: id,
                version: c.version,
            })
            .collect())
    }

    /// Values for the first active variant (by name) still unassigned:
    /// configured value, then declared default, then the alternatives.
    fn variant_choices(&self, state: &State, id: NodeId, package: &PackageDefinition) -> Option<Vec<Choice>> {
        let node = state.graph.node(id);
        let names: BTreeSet<&str> = package.variants.iter().map(|r| r.def.name.as_str()).collect();
        for name in names {
            if node.variants.contains_key(name) {
                continue;
            }
            let Some(rule) = self.active_variant(state, id, package, name) else {
                continue;
            };
            let mut values: Vec<VariantValue> = Vec::new();
            if let Some(configured) = self.ctx.config.variant_preference(&package.name, name) {
                match rule.def.coerce(configured) {
                    Ok(value) => values.push(value),
                    Err(e) => debug!("ignoring configured value for {}: {e}", package.name),
                }
            }
            let default = rule.def.default.clone();
            for value in std::iter::once(default.clone()).chain(rule.def.alternatives(&default)) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            return Some(
                values
                    .into_iter()
                    .map(|value| Choice::Variant {
                        node: id,
                        name: name.to_string(),
                        value,
                    })
                    .collect(),
            );
        }
        None
    }

    fn compiler_choices(&self, state: &State, id: NodeId) -> Step<Vec<Choice>> {
        let node = state.graph.node(id);
        let config = self.ctx.config;
        let preferences = config.compiler_preferences(&node.name);
        let mut ranked: Vec<(usize, usize)> = config
            .compilers
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                node.compiler.as_ref().map_or(true, |wanted| entry.spec.satisfies(wanted))
                    && entry.arch.intersects(&node.arch)
            })
            .map(|(index, entry)| {
                let rank = preferences.iter().position(|p| entry.spec.satisfies(p)).unwrap_or(usize::MAX);
                (rank, index)
            })
            .collect();
        ranked.sort();
        if ranked.is_empty() {
            let wanted = node.compiler.as_ref().map_or_else(|| "any compiler".to_string(), |c| format!("%{c}"));
            return Err(self.no_candidate(
                &node.name,
                "compiler",
                format!("{wanted} on {}", node.arch),
                "no configured compiler matches",
            ));
        }
        Ok(ranked
            .into_iter()
            .map(|(_, index)| Choice::Compiler { node: id, index })
            .collect())
    }

    fn apply(&self, state: &mut State, choice: Choice) -> Step<()> {
        self.tick()?;
        match &choice {
            Choice::External { node, index } => {
                let name = state.graph.node(*node).name.clone();
                debug!("{name}: {choice}");
                if let Some(index) = index {
                    let external = self.ctx.config.externals(&name)[*index].spec.clone();
                    self.unify(state, *node, &external, &Origin::decision(&name, &choice))?;
                }
                state.settled.insert(*node);
            }
            Choice::Provider { provider } => {
                debug!("{}: {choice}", state.parked[0].request.name());
                let pending = state.parked.remove(0);
                let id = match state.graph.find(provider) {
                    Some(id) => id,
                    None => self.create(state, &SpecNode::new(provider), &pending.origin)?,
                };
                self.bind_virtual(state, pending, id)?;
            }
            Choice::Version { node, version } => {
                let name = state.graph.node(*node).name.clone();
                debug!("{name}: {choice}");
                let package = self.package(&name)?;
                if package.declaration(version).is_some_and(|d| d.deprecated) {
                    warn!("selecting deprecated version {name}@{version}");
                }
                let mut pin = SpecNode::anonymous();
                pin.versions = VersionList::exact(version.clone());
                self.unify(state, *node, &pin, &Origin::decision(&name, &choice))?;
            }
            Choice::Variant { node, name, value } => {
                let package = state.graph.node(*node).name.clone();
                debug!("{package}: {choice}");
                let mut pin = SpecNode::anonymous();
                pin.variants.insert(name.clone(), value.clone());
                self.unify(state, *node, &pin, &Origin::decision(&package, &choice))?;
            }
            Choice::Compiler { node, index } => {
                let name = state.graph.node(*node).name.clone();
                let entry = &self.ctx.config.compilers[*index];
                debug!("{name}: compiler {}", entry.spec);
                let mut pin = SpecNode::anonymous();
                pin.compiler = Some(entry.spec.clone());
                pin.flags = entry.flags.clone();
                self.unify(state, *node, &pin, &Origin::decision(&name, &choice))?;
            }
        }
        Ok(())
    }

    // ---- validation and output ----

    /// Which node of the working graph answers the `index`-th request.
    fn root_id(&self, state: &State, index: usize) -> Option<NodeId> {
        let wanted = self.roots[index].name();
        state
            .graph
            .dependencies(state.anchor())
            .into_iter()
            .find(|edge| state.graph.node(edge.child).name == wanted || edge.virtuals.contains(wanted))
            .map(|edge| edge.child)
    }

    /// Re-check every rule against the final assignment and collect all
    /// violations.
    fn validate(&self, state: &State) -> Step<()> {
        let mut problems = Vec::new();

        for id in state.package_nodes() {
            let node = state.graph.node(id);
            let package = self.package(&node.name)?;

            for (name, value) in &node.variants {
                let rule = format!("{}: variant({name})", package.name);
                match self.active_variant(state, id, &package, name) {
                    None => problems.push(
                        Problem::new(ProblemKind::Invalid, &package.name, rule)
                            .between(format_assignment(name, value), "not declared under the chosen configuration"),
                    ),
                    Some(declared) => {
                        if let Err(e) = declared.def.coerce(value) {
                            problems.push(
                                Problem::new(ProblemKind::Invalid, &package.name, rule)
                                    .between(format_assignment(name, value), e),
                            );
                        }
                    }
                }
            }

            match self.check_conflicts(state, id, &package) {
                Ok(()) => {}
                Err(Failure::Conflict(found)) => problems.extend(found),
                Err(fatal) => return Err(fatal),
            }

            for (index, rule) in package.dependencies.iter().enumerate() {
                if !state.applied.contains(&(id, index)) {
                    continue;
                }
                let Some(edge) = state.graph.edge(id, rule.name()) else {
                    continue;
                };
                let child = state.graph.node(edge.child);
                if !child.satisfies(rule.spec.root_node()) {
                    let origin = Origin::dependency(&package.name, &rule.spec, &rule.when);
                    problems.push(
                        Problem::new(ProblemKind::Invalid, &child.name, origin.rule)
                            .between(child, rule.spec.root_node())
                            .guarded(origin.guard),
                    );
                }
            }
        }

        for request in &state.virtuals {
            let provider = state.graph.node(request.provider);
            let package = self.package(&provider.name)?;
            let provided = package.provides.iter().any(|rule| {
                rule.virtual_name() == request.request.name
                    && self.holds(state, request.provider, &rule.when)
                    && rule.spec.root_node().versions.intersects(&request.request.versions)
            });
            if !provided {
                problems.push(
                    Problem::new(ProblemKind::Invalid, &provider.name, request.origin.rule.clone())
                        .between(provider, &request.request)
                        .guarded(request.origin.guard.clone()),
                );
            }
        }

        for (index, root) in self.roots.iter().enumerate() {
            let Some(id) = self.root_id(state, index) else {
                problems.push(Problem::new(ProblemKind::Invalid, root.name(), USER_REQUEST).between("", root));
                continue;
            };
            let solved = state.graph.subgraph(id);
            let mut wanted = root.clone();
            if solved.name() != root.name() {
                // Requested by virtual name: only the dependencies constrain.
                *wanted.root_node_mut() = SpecNode::anonymous();
            }
            if !solved.satisfies(&wanted) {
                problems.push(
                    Problem::new(ProblemKind::Unsatisfiable, root.name(), USER_REQUEST).between(&solved, root),
                );
            }
        }

        if let Err(SpecError::CircularDependency(name)) = state.graph.topological_order() {
            problems.push(Problem::new(ProblemKind::Invalid, &name, "dependency cycle"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Failure::Conflict(problems))
        }
    }

    fn extract(&self, state: &State) -> Result<Vec<Spec>> {
        let require_compiler = self.ctx.config.require_compiler();
        let mut solved = Vec::with_capacity(self.roots.len());
        for (index, root) in self.roots.iter().enumerate() {
            let id = self.root_id(state, index).ok_or_else(|| SolveError::InvalidRequest {
                spec: root.to_string(),
                detail: "request vanished from the solved graph".to_string(),
            })?;
            let mut spec = state.graph.subgraph(id);
            spec.mark_concrete(require_compiler)?;
            debug!("{root} -> {}", spec.dag_hash()?);
            solved.push(spec);
        }
        Ok(solved)
    }
}
