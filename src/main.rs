//! ignite-spawn entry point.

use clap::Parser;
use ignite::apis::Uid;
use ignite::config::SpawnConfig;
use ignite::context::Context;
use ignite::supervisor::Supervisor;
use std::ffi::OsString;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: ignite-spawn [VM ID]";

/// ignite-spawn - run one VM inside its container
#[derive(Parser, Debug)]
#[command(name = "ignite-spawn")]
#[command(about = "Run one ignite VM inside its container")]
#[command(version)]
struct Cli {
    /// UID of the VM to start.
    vm_id: String,
}

/// What the command line asks for.
#[derive(Debug)]
enum Invocation {
    Run(Cli),
    /// Wrong number of arguments.
    Usage,
    /// `--help` or `--version`.
    Info(clap::Error),
}

fn parse_args<I, T>(args: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Invocation::Run(cli),
        Err(e) if e.use_stderr() => Invocation::Usage,
        Err(e) => Invocation::Info(e),
    }
}

fn main() {
    let cli = match parse_args(std::env::args_os()) {
        Invocation::Run(cli) => cli,
        Invocation::Usage => {
            println!("{}", USAGE);
            std::process::exit(0);
        }
        Invocation::Info(e) => e.exit(),
    };

    // Initialize logging based on RUST_LOG or default to info
    init_logging();

    tracing::debug!(version = ignite::VERSION, "starting ignite-spawn");

    let uid = match Uid::parse(cli.vm_id) {
        Ok(uid) => uid,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match SpawnConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            SpawnConfig::default()
        }
    };

    let ctx = Context::new(config);
    if let Err(e) = Supervisor::new(&ctx).run(&uid) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ignite=info,ignite_spawn=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_argument_is_the_vm_id() {
        match parse_args(["ignite-spawn", "0123456789abcdef"]) {
            Invocation::Run(cli) => assert_eq!(cli.vm_id, "0123456789abcdef"),
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[test]
    fn test_no_arguments_prints_usage() {
        assert!(matches!(parse_args(["ignite-spawn"]), Invocation::Usage));
    }

    #[test]
    fn test_two_arguments_prints_usage() {
        assert!(matches!(parse_args(["ignite-spawn", "a", "b"]), Invocation::Usage));
    }

    #[test]
    fn test_help_is_not_usage() {
        assert!(matches!(parse_args(["ignite-spawn", "--help"]), Invocation::Info(_)));
    }
}
