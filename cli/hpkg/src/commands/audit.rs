//! `hpkg audit`: check package definitions and configuration.

use anyhow::{Context, Result};
use hpkg_audit::format_report;

use crate::session::Session;

/// Run `hpkg audit [--check <tag>].. [<package>..]`.
pub fn run(session: &Session, checks: &[String], packages: &[String]) -> Result<()> {
    print!("{}", render(session, checks, packages)?);
    Ok(())
}

pub fn render(session: &Session, checks: &[String], packages: &[String]) -> Result<String> {
    let ctx = session.context();
    let findings = hpkg_audit::run(checks, packages, &ctx).context("audit failed")?;
    Ok(format_report(&findings))
}
