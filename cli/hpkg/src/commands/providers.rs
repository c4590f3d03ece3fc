//! `hpkg providers`: list the packages that provide a virtual.

use anyhow::{bail, Result};

use crate::session::Session;

/// Run `hpkg providers <virtual>`.
pub fn run(session: &Session, name: &str) -> Result<()> {
    print!("{}", render(session, name)?);
    Ok(())
}

/// Providers in the order the solver tries them: configured preferences
/// first, then the rest by name.
pub fn render(session: &Session, name: &str) -> Result<String> {
    let ctx = session.context();
    let mut providers = ctx.providers_for(name)?;
    if providers.is_empty() {
        bail!("'{name}' is not provided by any package");
    }

    let preferred = session.config.provider_preferences(name);
    providers.sort_by_key(|p| preferred.iter().position(|q| q == p).unwrap_or(preferred.len()));

    let mut out = String::new();
    for provider in providers {
        if preferred.contains(&provider) {
            out.push_str(&format!("{provider} (preferred)\n"));
        } else {
            out.push_str(&format!("{provider}\n"));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{repository, session};
    use std::fs;

    #[test]
    fn lists_providers_by_name() {
        let dir = repository();
        let output = render(&session(dir.path()), "mpi").unwrap();
        assert_eq!(output, "mpich\nopenmpi\n");
    }

    #[test]
    fn configured_preference_comes_first() {
        let dir = repository();
        let config = dir.path().join("hpkg.toml");
        let mut text = fs::read_to_string(&config).unwrap();
        text.push_str("\n[packages.all]\nproviders = { mpi = [\"openmpi\"] }\n");
        fs::write(&config, text).unwrap();
        let output = render(&session(dir.path()), "mpi").unwrap();
        assert_eq!(output, "openmpi (preferred)\nmpich\n");
    }

    #[test]
    fn non_virtual_is_an_error() {
        let dir = repository();
        assert!(render(&session(dir.path()), "zlib").is_err());
    }
}
