//! `hpkg spec`: concretize specs and show the result.

use anyhow::{bail, Context, Result};
use hpkg_solver::{concretize, concretize_cached, concretize_separately, format_tree};
use hpkg_spec::{to_json, Spec};
use log::info;

use crate::session::{parse_specs, Session};

/// Run `hpkg spec <specs..>`.
pub fn run(session: &Session, requests: &[String], json: bool, separately: bool) -> Result<()> {
    print!("{}", render(session, requests, json, separately)?);
    Ok(())
}

pub fn render(session: &Session, requests: &[String], json: bool, separately: bool) -> Result<String> {
    let specs = solve(session, requests, separately)?;
    let mut out = String::new();
    for spec in &specs {
        if json {
            out.push_str(&to_json(spec).with_context(|| format!("serializing {}", spec.name()))?);
            out.push('\n');
        } else {
            out.push_str(&format_tree(spec));
        }
    }
    Ok(out)
}

/// Concretize `requests` as the CLI does: together through the store when
/// `--cache` is set, or one by one with `--separately`.
pub(crate) fn solve(session: &Session, requests: &[String], separately: bool) -> Result<Vec<Spec>> {
    let roots = parse_specs(requests)?;
    let ctx = session.context();

    if separately {
        let mut specs = Vec::new();
        let mut failed = 0;
        for (result, text) in concretize_separately(&ctx, &roots).into_iter().zip(requests) {
            match result {
                Ok(spec) => specs.push(spec),
                Err(e) => {
                    eprintln!("error: cannot concretize '{text}': {e}");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {} specs could not be concretized", requests.len());
        }
        return Ok(specs);
    }

    let specs = match session.store()? {
        Some(store) => concretize_cached(&ctx, &store, &roots),
        None => concretize(&ctx, &roots),
    }
    .with_context(|| format!("cannot concretize {}", requests.join(" ")))?;
    info!("concretized {} root spec(s)", specs.len());
    Ok(specs)
}
