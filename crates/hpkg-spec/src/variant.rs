//! Build variants: declarations on packages and values on specs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConstraintKind, Result, SpecError};

/// A variant value as it appears on a spec.
///
/// `Single` is also what `name=value` parses to before the variant's
/// declaration is known; [`VariantDef::coerce`] turns it into the declared
/// shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Bool(bool),
    Single(String),
    Multi(BTreeSet<String>),
}

impl VariantValue {
    pub fn multi<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VariantValue::Multi(values.into_iter().map(Into::into).collect())
    }

    /// Parse the right-hand side of `name=value`.
    pub fn parse(text: &str) -> VariantValue {
        match text {
            "true" | "True" => VariantValue::Bool(true),
            "false" | "False" => VariantValue::Bool(false),
            _ if text.contains(',') => VariantValue::multi(text.split(',').filter(|s| !s.is_empty())),
            _ => VariantValue::Single(text.to_string()),
        }
    }

    fn values(&self) -> Option<BTreeSet<&str>> {
        match self {
            VariantValue::Bool(_) => None,
            VariantValue::Single(s) => Some(std::iter::once(s.as_str()).collect()),
            VariantValue::Multi(set) => Some(set.iter().map(String::as_str).collect()),
        }
    }

    /// `self` carries at least what `other` asks for.
    pub fn satisfies(&self, other: &VariantValue) -> bool {
        match (self, other) {
            (VariantValue::Bool(a), VariantValue::Bool(b)) => a == b,
            (VariantValue::Single(a), VariantValue::Single(b)) => a == b,
            _ => match (self.values(), other.values()) {
                (Some(mine), Some(theirs)) => theirs.is_subset(&mine),
                _ => false,
            },
        }
    }

    pub fn intersects(&self, other: &VariantValue) -> bool {
        match (self, other) {
            (VariantValue::Bool(a), VariantValue::Bool(b)) => a == b,
            (VariantValue::Single(a), VariantValue::Single(b)) => a == b,
            (VariantValue::Bool(_), _) | (_, VariantValue::Bool(_)) => false,
            _ => true,
        }
    }

    /// Merge `other` into `self`. Multi-valued variants accumulate values;
    /// everything else must agree.
    pub fn constrain(&mut self, name: &str, other: &VariantValue) -> Result<bool> {
        if !self.intersects(other) {
            return Err(SpecError::unsatisfiable(
                ConstraintKind::Variant,
                format_assignment(name, self),
                format_assignment(name, other),
            ));
        }
        let merged = match (&*self, other) {
            (VariantValue::Multi(_), _) | (_, VariantValue::Multi(_)) => {
                let union: BTreeSet<String> = self
                    .values()
                    .into_iter()
                    .flatten()
                    .chain(other.values().into_iter().flatten())
                    .map(str::to_string)
                    .collect();
                VariantValue::Multi(union)
            }
            _ => return Ok(false),
        };
        let changed = merged != *self;
        *self = merged;
        Ok(changed)
    }
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantValue::Bool(b) => write!(f, "{b}"),
            VariantValue::Single(s) => write!(f, "{s}"),
            VariantValue::Multi(set) => {
                let values: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{}", values.join(","))
            }
        }
    }
}

/// Render a variant the way spec syntax writes it: `+name`, `~name` or
/// `name=value`.
pub fn format_assignment(name: &str, value: &VariantValue) -> String {
    match value {
        VariantValue::Bool(true) => format!("+{name}"),
        VariantValue::Bool(false) => format!("~{name}"),
        other => format!("{name}={other}"),
    }
}

/// Variant assignments of one spec node, in name order.
pub type VariantMap = BTreeMap<String, VariantValue>;

/// The values a declared variant accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantDomain {
    Bool,
    /// Exactly one of the listed values.
    Single(Vec<String>),
    /// Any non-empty subset of the listed values.
    Multi(Vec<String>),
    /// Any single free-form value.
    Any,
}

/// A variant declared by a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDef {
    pub name: String,
    pub default: VariantValue,
    pub description: String,
    pub domain: VariantDomain,
    /// Sticky variants keep their default unless a user asks otherwise.
    pub sticky: bool,
}

impl VariantDef {
    pub fn boolean(name: &str, default: bool, description: &str) -> Self {
        VariantDef {
            name: name.to_string(),
            default: VariantValue::Bool(default),
            description: description.to_string(),
            domain: VariantDomain::Bool,
            sticky: false,
        }
    }

    pub fn single(name: &str, default: &str, values: &[&str], description: &str) -> Self {
        VariantDef {
            name: name.to_string(),
            default: VariantValue::Single(default.to_string()),
            description: description.to_string(),
            domain: VariantDomain::Single(values.iter().map(|v| v.to_string()).collect()),
            sticky: false,
        }
    }

    pub fn multi(name: &str, defaults: &[&str], values: &[&str], description: &str) -> Self {
        VariantDef {
            name: name.to_string(),
            default: VariantValue::multi(defaults.iter().copied()),
            description: description.to_string(),
            domain: VariantDomain::Multi(values.iter().map(|v| v.to_string()).collect()),
            sticky: false,
        }
    }

    fn invalid(&self, detail: impl Into<String>) -> SpecError {
        SpecError::InvalidVariant {
            name: self.name.clone(),
            detail: detail.into(),
        }
    }

    /// Convert a parsed value into this variant's shape, rejecting values
    /// outside the domain.
    pub fn coerce(&self, value: &VariantValue) -> Result<VariantValue> {
        match (&self.domain, value) {
            (VariantDomain::Bool, VariantValue::Bool(_)) => Ok(value.clone()),
            (VariantDomain::Bool, _) => Err(self.invalid(format!("expected a boolean, got '{value}'"))),

            (VariantDomain::Single(_) | VariantDomain::Any, VariantValue::Bool(_)) => {
                Err(self.invalid(format!("expected a value, got '{value}'")))
            }
            (VariantDomain::Single(allowed), _) | (VariantDomain::Multi(allowed), _) => {
                let values = value.values().unwrap_or_default();
                if values.is_empty() {
                    return Err(self.invalid("no value given"));
                }
                if let Some(bad) = values.iter().find(|v| !allowed.iter().any(|a| a.as_str() == **v)) {
                    return Err(self.invalid(format!(
                        "'{bad}' is not one of {}",
                        allowed.join(", ")
                    )));
                }
                if matches!(self.domain, VariantDomain::Multi(_)) {
                    Ok(VariantValue::multi(values))
                } else if values.len() == 1 {
                    Ok(VariantValue::Single(values.iter().map(|v| v.to_string()).collect()))
                } else {
                    Err(self.invalid("only one value may be selected"))
                }
            }
            (VariantDomain::Any, VariantValue::Single(_)) => Ok(value.clone()),
            (VariantDomain::Any, VariantValue::Multi(set)) if set.len() == 1 => {
                Ok(VariantValue::Single(set.iter().cloned().collect()))
            }
            (VariantDomain::Any, _) => Err(self.invalid("only one value may be selected")),
        }
    }

    /// Other values the resolver may try, most preferred first, after the
    /// default has failed.
    pub fn alternatives(&self, chosen: &VariantValue) -> Vec<VariantValue> {
        if self.sticky {
            return Vec::new();
        }
        match &self.domain {
            VariantDomain::Bool => match chosen {
                VariantValue::Bool(b) => vec![VariantValue::Bool(!b)],
                _ => Vec::new(),
            },
            VariantDomain::Single(values) => values
                .iter()
                .map(|v| VariantValue::Single(v.clone()))
                .filter(|v| v != chosen)
                .collect(),
            VariantDomain::Multi(_) | VariantDomain::Any => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_values() {
        assert_eq!(VariantValue::parse("true"), VariantValue::Bool(true));
        assert_eq!(VariantValue::parse("Release"), VariantValue::Single("Release".into()));
        assert_eq!(VariantValue::parse("a,b"), VariantValue::multi(["a", "b"]));
    }

    #[test]
    fn multi_values_accumulate() {
        let mut v = VariantValue::Single("a".into());
        assert!(v.constrain("langs", &VariantValue::multi(["b"])).unwrap());
        assert_eq!(v, VariantValue::multi(["a", "b"]));
        assert!(v.satisfies(&VariantValue::Single("a".into())));
        assert!(!v.satisfies(&VariantValue::Single("c".into())));
    }

    #[test]
    fn single_and_bool_must_agree() {
        let mut v = VariantValue::Bool(true);
        assert!(!v.constrain("shared", &VariantValue::Bool(true)).unwrap());
        let err = v.constrain("shared", &VariantValue::Bool(false)).unwrap_err();
        assert!(err.to_string().contains("~shared"));

        let mut s = VariantValue::Single("Debug".into());
        assert!(s.constrain("build_type", &VariantValue::Single("Release".into())).is_err());
    }

    #[test]
    fn coerce_against_domains() {
        let build_type = VariantDef::single("build_type", "Release", &["Debug", "Release"], "CMake build type");
        assert_eq!(
            build_type.coerce(&VariantValue::Single("Debug".into())).unwrap(),
            VariantValue::Single("Debug".into())
        );
        assert!(build_type.coerce(&VariantValue::Single("Fast".into())).is_err());
        assert!(build_type.coerce(&VariantValue::Bool(true)).is_err());

        let langs = VariantDef::multi("languages", &["c"], &["c", "cxx", "fortran"], "Enabled languages");
        assert_eq!(
            langs.coerce(&VariantValue::Single("cxx".into())).unwrap(),
            VariantValue::multi(["cxx"])
        );

        let shared = VariantDef::boolean("shared", true, "Build shared libraries");
        assert!(shared.coerce(&VariantValue::Single("yes".into())).is_err());
    }

    #[test]
    fn alternatives_exclude_chosen_value() {
        let shared = VariantDef::boolean("shared", true, "Build shared libraries");
        assert_eq!(shared.alternatives(&VariantValue::Bool(true)), vec![VariantValue::Bool(false)]);

        let mut sticky = shared.clone();
        sticky.sticky = true;
        assert!(sticky.alternatives(&VariantValue::Bool(true)).is_empty());

        let bt = VariantDef::single("build_type", "Release", &["Debug", "Release", "MinSizeRel"], "");
        assert_eq!(
            bt.alternatives(&VariantValue::Single("Release".into())),
            vec![VariantValue::Single("Debug".into()), VariantValue::Single("MinSizeRel".into())]
        );
    }
}
