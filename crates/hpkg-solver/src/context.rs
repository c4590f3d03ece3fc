//! Everything one solve reads, passed explicitly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hpkg_repo::{PackageDefinition, PackageRepository, RepoError};
use hpkg_version::RefLookup;

use crate::config::SolverConfig;
use crate::error::Result;

/// The repository, configuration and git lookup a solve runs against.
///
/// Package definitions and provider lists are memoized for the lifetime of
/// the context, so one context should not outlive a change to the
/// repository.
pub struct SolveContext<'a> {
    pub repo: &'a dyn PackageRepository,
    pub config: &'a SolverConfig,
    pub lookup: Option<&'a dyn RefLookup>,
    packages: Mutex<HashMap<String, Option<Arc<PackageDefinition>>>>,
    providers: Mutex<HashMap<String, Vec<String>>>,
}

impl<'a> SolveContext<'a> {
    pub fn new(repo: &'a dyn PackageRepository, config: &'a SolverConfig) -> Self {
        SolveContext {
            repo,
            config,
            lookup: None,
            packages: Mutex::new(HashMap::new()),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve git versions through `lookup`.
    pub fn with_lookup(mut self, lookup: &'a dyn RefLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// The definition of `name`, or `None` when no such package exists.
    pub fn package(&self, name: &str) -> Result<Option<Arc<PackageDefinition>>> {
        if let Some(found) = self.packages.lock().ok().and_then(|m| m.get(name).cloned()) {
            return Ok(found);
        }
        let found = match self.repo.package(name) {
            Ok(package) => Some(package),
            Err(RepoError::UnknownPackage { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        if let Ok(mut map) = self.packages.lock() {
            map.insert(name.to_string(), found.clone());
        }
        Ok(found)
    }

    /// Packages that may provide `virtual_name`, sorted by name.
    pub fn providers_for(&self, virtual_name: &str) -> Result<Vec<String>> {
        if let Some(found) = self.providers.lock().ok().and_then(|m| m.get(virtual_name).cloned()) {
            return Ok(found);
        }
        let mut found = self.repo.providers_for(virtual_name)?;
        found.sort();
        if let Ok(mut map) = self.providers.lock() {
            map.insert(virtual_name.to_string(), found.clone());
        }
        Ok(found)
    }

    /// A name with no package of its own that some package provides.
    pub fn is_virtual(&self, name: &str) -> Result<bool> {
        Ok(self.package(name)?.is_none() && !self.providers_for(name)?.is_empty())
    }
}
