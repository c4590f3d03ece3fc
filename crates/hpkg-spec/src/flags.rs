//! Compiler flag assignments.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecError};

/// Flag categories a spec may set.
pub const FLAG_NAMES: [&str; 6] = ["cflags", "cppflags", "cxxflags", "fflags", "ldflags", "ldlibs"];

pub fn is_flag_name(name: &str) -> bool {
    FLAG_NAMES.contains(&name)
}

/// Flags per category, in the order they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagMap(BTreeMap<String, Vec<String>>);

impl FlagMap {
    pub fn new() -> Self {
        FlagMap::default()
    }

    /// Append whitespace-separated flags to a category.
    pub fn add(&mut self, category: &str, flags: &str) -> Result<()> {
        if !is_flag_name(category) {
            return Err(SpecError::parse(category, "unknown compiler flag category"));
        }
        let entry = self.0.entry(category.to_string()).or_default();
        for flag in flags.split_whitespace() {
            if !entry.iter().any(|f| f == flag) {
                entry.push(flag.to_string());
            }
        }
        Ok(())
    }

    pub fn get(&self, category: &str) -> &[String] {
        self.0.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .filter(|(_, flags)| !flags.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Every flag in `other` is present here.
    pub fn satisfies(&self, other: &FlagMap) -> bool {
        other
            .iter()
            .all(|(category, flags)| flags.iter().all(|f| self.get(category).contains(f)))
    }

    /// Add the flags of `other` that are missing here.
    pub fn constrain(&mut self, other: &FlagMap) -> bool {
        let mut changed = false;
        for (category, flags) in other.iter() {
            let entry = self.0.entry(category.to_string()).or_default();
            for flag in flags {
                if !entry.contains(flag) {
                    entry.push(flag.clone());
                    changed = true;
                }
            }
        }
        changed
    }
}

impl fmt::Display for FlagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(category, flags)| format!("{category}=\"{}\"", flags.join(" ")))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_display() {
        let mut flags = FlagMap::new();
        flags.add("cflags", "-O2 -g").unwrap();
        flags.add("ldflags", "-Wl,--as-needed").unwrap();
        assert_eq!(flags.to_string(), "cflags=\"-O2 -g\" ldflags=\"-Wl,--as-needed\"");
        assert!(flags.add("rustflags", "-C opt-level=3").is_err());
    }

    #[test]
    fn satisfies_is_subset_per_category() {
        let mut wide = FlagMap::new();
        wide.add("cflags", "-O2 -g -fPIC").unwrap();
        let mut narrow = FlagMap::new();
        narrow.add("cflags", "-g").unwrap();
        assert!(wide.satisfies(&narrow));
        assert!(!narrow.satisfies(&wide));
        assert!(narrow.satisfies(&FlagMap::new()));
    }

    #[test]
    fn constrain_appends_missing_flags() {
        let mut a = FlagMap::new();
        a.add("cflags", "-O2").unwrap();
        let mut b = FlagMap::new();
        b.add("cflags", "-O2 -march=native").unwrap();
        assert!(a.constrain(&b));
        assert_eq!(a.get("cflags"), ["-O2".to_string(), "-march=native".to_string()]);
        assert!(!a.constrain(&b));
    }
}
