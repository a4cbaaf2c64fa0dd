mod cli;
mod commands;
mod engine;
mod orchestrator;
mod paths;
mod privilege;
mod profile;
mod progress;
mod roles;
mod runner;
mod signals;
mod state;
mod system;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use converge::ValidationError;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let state_dir = cli.state_dir.as_deref();

    match cli.command {
        Command::Provision(args) => commands::provision::run(&ctx, state_dir, args),
        Command::Status(args) => commands::status::run(&ctx, state_dir, args),
        Command::State(cmd) => commands::state::run(&ctx, state_dir, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "nodeup", &mut io::stdout());
            Ok(0)
        }
    }
}

/// 2 for problems with the profile or the invocation, 1 otherwise
fn exit_code(err: &anyhow::Error) -> i32 {
    let invalid = err.chain().any(|cause| {
        cause.downcast_ref::<ValidationError>().is_some()
            || cause.downcast_ref::<state::StateError>().is_some()
    });
    if invalid { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let invalid = anyhow::Error::new(ValidationError::MissingField("role".to_string()));
        assert_eq!(exit_code(&invalid), 2);

        let mismatch = anyhow::Error::new(state::StateError::PlanMismatch {
            recorded: "a".to_string(),
            current: "b".to_string(),
        });
        assert_eq!(exit_code(&mismatch), 2);

        let io = anyhow::anyhow!("Failed to write record file");
        assert_eq!(exit_code(&io), 1);
    }

    #[test]
    fn test_context_keeps_validation_exit_code() {
        let err = anyhow::Error::new(ValidationError::Other("x".to_string())).context("while loading");
        assert_eq!(exit_code(&err), 2);
    }
}
