//! `hpkg versions`: list the declared versions of a package.

use anyhow::{Context, Result};

use crate::session::Session;

/// Run `hpkg versions <package>`.
pub fn run(session: &Session, name: &str) -> Result<()> {
    print!("{}", render(session, name)?);
    Ok(())
}

/// Declared versions, newest first, with their preferred and deprecated
/// markers.
pub fn render(session: &Session, name: &str) -> Result<String> {
    let package = session
        .context()
        .package(name)?
        .with_context(|| format!("unknown package '{name}'"))?;

    let mut out = String::new();
    for decl in package.sorted_versions().into_iter().rev() {
        let mut line = decl.version.to_string();
        if decl.preferred {
            line.push_str(" (preferred)");
        }
        if decl.deprecated {
            line.push_str(" (deprecated)");
        }
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{repository, session};

    #[test]
    fn newest_first_with_markers() {
        let dir = repository();
        let output = render(&session(dir.path()), "zlib").unwrap();
        assert_eq!(output, "1.3\n1.2.11 (deprecated)\n");
    }

    #[test]
    fn unknown_package() {
        let dir = repository();
        let err = render(&session(dir.path()), "nosuch").unwrap_err();
        assert_eq!(err.to_string(), "unknown package 'nosuch'");
    }
}
