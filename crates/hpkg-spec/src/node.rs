//! A single package node of a spec graph.

use std::fmt;
use std::path::PathBuf;

use hpkg_version::{Version, VersionList};

use crate::arch::ArchSpec;
use crate::compiler::CompilerSpec;
use crate::error::{ConstraintKind, Result, SpecError};
use crate::flags::FlagMap;
use crate::hash::SpecHash;
use crate::variant::{format_assignment, VariantMap, VariantValue};

/// Constraints on one package. An empty name makes the node anonymous,
/// which is how `when` guards such as `+feature` are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecNode {
    pub name: String,
    pub versions: VersionList,
    pub variants: VariantMap,
    pub compiler: Option<CompilerSpec>,
    pub arch: ArchSpec,
    pub flags: FlagMap,
    /// Installation prefix of an externally provided package.
    pub external: Option<PathBuf>,
    pub concrete: bool,
    pub hash: Option<SpecHash>,
}

impl SpecNode {
    pub fn new(name: &str) -> Self {
        SpecNode {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        SpecNode::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    /// The pinned version, if any.
    pub fn version(&self) -> Option<&Version> {
        self.versions.concrete()
    }

    pub fn variant(&self, name: &str) -> Option<&VariantValue> {
        self.variants.get(name)
    }

    /// Whether every attribute has a single value: one version, a complete
    /// architecture and, when `require_compiler` is set, a pinned compiler.
    pub fn has_concrete_attributes(&self, require_compiler: bool) -> bool {
        !self.is_anonymous()
            && self.version().is_some()
            && self.arch.is_concrete()
            && (!require_compiler || self.compiler.as_ref().is_some_and(CompilerSpec::is_concrete))
    }

    /// Every constraint in `other` is already implied by `self`.
    pub fn satisfies(&self, other: &SpecNode) -> bool {
        if !other.is_anonymous() && self.name != other.name {
            return false;
        }
        if !self.versions.satisfies(&other.versions) {
            return false;
        }
        if let Some(theirs) = &other.compiler {
            match &self.compiler {
                Some(mine) if mine.satisfies(theirs) => {}
                _ => return false,
            }
        }
        if !self.arch.satisfies(&other.arch) || !self.flags.satisfies(&other.flags) {
            return false;
        }
        other
            .variants
            .iter()
            .all(|(name, value)| self.variants.get(name).is_some_and(|mine| mine.satisfies(value)))
    }

    /// Whether some assignment could satisfy both nodes.
    pub fn intersects(&self, other: &SpecNode) -> bool {
        if !self.is_anonymous() && !other.is_anonymous() && self.name != other.name {
            return false;
        }
        if !self.versions.intersects(&other.versions) || !self.arch.intersects(&other.arch) {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.compiler, &other.compiler) {
            if !a.intersects(b) {
                return false;
            }
        }
        other
            .variants
            .iter()
            .all(|(name, value)| self.variants.get(name).map_or(true, |mine| mine.intersects(value)))
    }

    /// Narrow `self` by everything `other` requires. Returns whether
    /// anything changed.
    pub fn constrain(&mut self, other: &SpecNode) -> Result<bool> {
        if !self.intersects(other) {
            return Err(self.first_conflict(other));
        }
        if self.concrete && !self.satisfies(other) {
            return Err(SpecError::unsatisfiable(ConstraintKind::Name, &*self, other));
        }

        let mut changed = false;
        if self.is_anonymous() && !other.is_anonymous() {
            self.name = other.name.clone();
            changed = true;
        }

        let versions = self.versions.intersection(&other.versions);
        if versions != self.versions {
            self.versions = versions;
            changed = true;
        }

        if let Some(theirs) = &other.compiler {
            match &mut self.compiler {
                Some(mine) => changed |= mine.constrain(theirs)?,
                None => {
                    self.compiler = Some(theirs.clone());
                    changed = true;
                }
            }
        }

        changed |= self.arch.constrain(&other.arch)?;
        changed |= self.flags.constrain(&other.flags);

        for (name, value) in &other.variants {
            match self.variants.get_mut(name) {
                Some(mine) => changed |= mine.constrain(name, value)?,
                None => {
                    self.variants.insert(name.clone(), value.clone());
                    changed = true;
                }
            }
        }

        if self.external.is_none() && other.external.is_some() {
            self.external = other.external.clone();
            changed = true;
        }
        Ok(changed)
    }

    /// Describe the first attribute on which `self` and `other` disagree.
    fn first_conflict(&self, other: &SpecNode) -> SpecError {
        if !self.is_anonymous() && !other.is_anonymous() && self.name != other.name {
            return SpecError::unsatisfiable(ConstraintKind::Name, &self.name, &other.name);
        }
        if !self.versions.intersects(&other.versions) {
            return SpecError::unsatisfiable(
                ConstraintKind::Version,
                format!("{}@{}", self.name, self.versions),
                format!("{}@{}", self.name, other.versions),
            );
        }
        if !self.arch.intersects(&other.arch) {
            return SpecError::unsatisfiable(ConstraintKind::Architecture, &self.arch, &other.arch);
        }
        if let (Some(a), Some(b)) = (&self.compiler, &other.compiler) {
            if !a.intersects(b) {
                return SpecError::unsatisfiable(ConstraintKind::Compiler, format!("%{a}"), format!("%{b}"));
            }
        }
        for (name, value) in &other.variants {
            if let Some(mine) = self.variants.get(name) {
                if !mine.intersects(value) {
                    return SpecError::unsatisfiable(
                        ConstraintKind::Variant,
                        format_assignment(name, mine),
                        format_assignment(name, value),
                    );
                }
            }
        }
        SpecError::unsatisfiable(ConstraintKind::Name, &*self, other)
    }

    /// Spec syntax for the node alone, without dependencies.
    pub(crate) fn write_syntax(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.versions.is_any() {
            write!(f, "@{}", self.versions)?;
        }
        if let Some(compiler) = &self.compiler {
            write!(f, "%{compiler}")?;
        }
        for (name, value) in &self.variants {
            if let VariantValue::Bool(_) = value {
                write!(f, "{}", format_assignment(name, value))?;
            }
        }
        for (name, value) in &self.variants {
            if !matches!(value, VariantValue::Bool(_)) {
                write!(f, " {}", format_assignment(name, value))?;
            }
        }
        if !self.flags.is_empty() {
            write!(f, " {}", self.flags)?;
        }
        if self.arch.is_concrete() {
            write!(f, " arch={}", self.arch)?;
        } else {
            for (key, value) in [
                ("platform", &self.arch.platform),
                ("os", &self.arch.os),
                ("target", &self.arch.target),
            ] {
                if let Some(value) = value {
                    write!(f, " {key}={value}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for SpecNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_syntax(f)
    }
}
