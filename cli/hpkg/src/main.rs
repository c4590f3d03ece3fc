//! hpkg CLI: concretize, hash and audit package specs.

mod commands;
mod session;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};

use session::Session;

#[derive(Parser)]
#[command(name = "hpkg", version, about = "Concretize package specs against a package repository")]
struct Cli {
    /// Package repository (a directory containing `packages/`)
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,
    /// Solver configuration (default: hpkg.toml in the repository, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for stored results and git clones
    #[arg(long, global = true)]
    cache: Option<PathBuf>,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Concretize specs and print the resulting dependency trees
    Spec {
        /// Specs to concretize, e.g. `hdf5+mpi ^zlib@1.3`
        #[arg(required = true)]
        specs: Vec<String>,
        /// Print the JSON document instead of a tree
        #[arg(long)]
        json: bool,
        /// Concretize each spec on its own instead of as one unified graph
        #[arg(long)]
        separately: bool,
    },
    /// Concretize specs and print their DAG hashes
    Hash {
        #[arg(required = true)]
        specs: Vec<String>,
    },
    /// Check package definitions and configuration for mistakes
    Audit {
        /// Check or group to run (repeatable; default: all)
        #[arg(long = "check")]
        checks: Vec<String>,
        /// Packages to audit (default: all)
        packages: Vec<String>,
    },
    /// List packages that provide a virtual
    Providers {
        /// Virtual package name, e.g. `mpi`
        name: String,
    },
    /// List the declared versions of a package
    Versions {
        /// Package name
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let session = Session::open(&cli.repo, cli.config.as_deref(), cli.cache.as_deref())?;

    match cli.command {
        Commands::Spec {
            specs,
            json,
            separately,
        } => commands::spec::run(&session, &specs, json, separately),
        Commands::Hash { specs } => commands::hash::run(&session, &specs),
        Commands::Audit { checks, packages } => commands::audit::run(&session, &checks, &packages),
        Commands::Providers { name } => commands::providers::run(&session, &name),
        Commands::Versions { name } => commands::versions::run(&session, &name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommands() {
        let cli = Cli::try_parse_from(["hpkg", "spec", "zlib", "--repo", "/srv/repo", "-vv", "--json"]).unwrap();
        assert_eq!(cli.repo, PathBuf::from("/srv/repo"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Spec { json: true, separately: false, .. }));
    }

    #[test]
    fn audit_checks_are_repeatable() {
        let cli = Cli::try_parse_from(["hpkg", "audit", "--check", "externals", "--check", "variant-defaults", "zlib"])
            .unwrap();
        match cli.command {
            Commands::Audit { checks, packages } => {
                assert_eq!(checks, ["externals", "variant-defaults"]);
                assert_eq!(packages, ["zlib"]);
            }
            _ => panic!("expected audit"),
        }
    }

    #[test]
    fn spec_needs_at_least_one_spec() {
        assert!(Cli::try_parse_from(["hpkg", "spec"]).is_err());
    }
}
