//! `hpkg hash`: print the DAG hash of each concretized spec.

use anyhow::Result;

use crate::commands::spec::solve;
use crate::session::Session;

/// Run `hpkg hash <specs..>`.
pub fn run(session: &Session, requests: &[String]) -> Result<()> {
    print!("{}", render(session, requests)?);
    Ok(())
}

pub fn render(session: &Session, requests: &[String]) -> Result<String> {
    let mut out = String::new();
    for spec in solve(session, requests, false)? {
        let root = spec.root_node();
        let hash = spec.dag_hash()?;
        match root.version() {
            Some(version) => out.push_str(&format!("{hash}  {}@{version}\n", root.name)),
            None => out.push_str(&format!("{hash}  {}\n", root.name)),
        }
    }
    Ok(out)
}
