//! Structured reports of why a solve failed.

use std::collections::BTreeSet;
use std::fmt;

/// What kind of rule a problem came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProblemKind {
    /// Two constraints on one node have no common value.
    Unsatisfiable,
    /// A declared `conflicts` rule matched.
    Conflict,
    /// A name is neither a package nor a provided virtual.
    UnknownPackage,
    /// No candidate is left for a decision.
    NoCandidate,
    /// The final assignment breaks a rule that held during the search.
    Invalid,
}

/// One reason a branch of the search was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Problem {
    /// The package whose node could not be assigned.
    pub package: String,
    pub kind: ProblemKind,
    /// The rule that failed to apply, with the package that declared it.
    pub rule: String,
    /// The constraint already in place.
    pub left: String,
    /// The constraint the rule required.
    pub right: String,
    /// The `when` condition under which the rule was active.
    pub guard: Option<String>,
    /// Earlier rules that produced `left`.
    pub sources: Vec<String>,
}

impl Problem {
    pub(crate) fn new(kind: ProblemKind, package: &str, rule: impl Into<String>) -> Self {
        Problem {
            package: package.to_string(),
            kind,
            rule: rule.into(),
            left: String::new(),
            right: String::new(),
            guard: None,
            sources: Vec::new(),
        }
    }

    pub(crate) fn between(mut self, left: impl ToString, right: impl ToString) -> Self {
        self.left = left.to_string();
        self.right = right.to_string();
        self
    }

    pub(crate) fn guarded(mut self, guard: Option<String>) -> Self {
        self.guard = guard;
        self
    }

    pub(crate) fn from_sources(mut self, sources: &[String]) -> Self {
        self.sources = sources.to_vec();
        self
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.package, self.rule)?;
        match (self.left.is_empty(), self.right.is_empty()) {
            (false, false) => write!(f, ": '{}' conflicts with '{}'", self.left, self.right)?,
            (false, true) => write!(f, ": {}", self.left)?,
            (true, false) => write!(f, ": requires '{}'", self.right)?,
            (true, true) => {}
        }
        if let Some(guard) = &self.guard {
            write!(f, " (when {guard})")?;
        }
        if !self.sources.is_empty() {
            write!(f, " [constrained by {}]", self.sources.join("; "))?;
        }
        Ok(())
    }
}

/// Every distinct problem met while searching, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub problems: Vec<Problem>,
}

impl ResolutionFailure {
    pub fn new(problems: impl IntoIterator<Item = Problem>) -> Self {
        let problems: BTreeSet<Problem> = problems.into_iter().collect();
        ResolutionFailure {
            problems: problems.into_iter().collect(),
        }
    }

    /// Packages named by any problem.
    pub fn packages(&self) -> BTreeSet<&str> {
        self.problems.iter().map(|p| p.package.as_str()).collect()
    }

    pub fn involves(&self, package: &str) -> bool {
        self.problems.iter().any(|p| p.package == package)
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.problems.len();
        let noun = if count == 1 { "problem" } else { "problems" };
        write!(f, "no valid configuration found ({count} {noun})")?;
        for problem in &self.problems {
            write!(f, "\n  {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problems_are_deduplicated_and_sorted() {
        let a = Problem::new(ProblemKind::Unsatisfiable, "zlib", "b: depends_on(zlib@2)").between("zlib@1", "zlib@2");
        let b = Problem::new(ProblemKind::Conflict, "app", "app: conflicts(%intel)");
        let failure = ResolutionFailure::new([a.clone(), b.clone(), a.clone()]);
        assert_eq!(failure.problems, vec![b, a]);
        assert!(failure.involves("zlib"));
        assert_eq!(failure.packages().len(), 2);
    }

    #[test]
    fn summary_counts_problems() {
        let one = ResolutionFailure::new([Problem::new(ProblemKind::UnknownPackage, "nosuch", "user request")]);
        assert!(one.to_string().starts_with("no valid configuration found (1 problem)\n"), "{one}");

        let two = ResolutionFailure::new([
            Problem::new(ProblemKind::UnknownPackage, "nosuch", "user request"),
            Problem::new(ProblemKind::Conflict, "app", "app: conflicts(%intel)"),
        ]);
        assert!(two.to_string().starts_with("no valid configuration found (2 problems)\n"), "{two}");
    }

    #[test]
    fn display_names_both_constraints_and_guard() {
        let problem = Problem::new(ProblemKind::Unsatisfiable, "c", "b: depends_on(c@=2.0)")
            .between("c@=1.0", "c@=2.0")
            .guarded(Some("+x".into()))
            .from_sources(&["a: depends_on(c@=1.0)".to_string()]);
        assert_eq!(
            problem.to_string(),
            "c: b: depends_on(c@=2.0): 'c@=1.0' conflicts with 'c@=2.0' (when +x) [constrained by a: depends_on(c@=1.0)]"
        );
    }
}
