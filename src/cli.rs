use crate::profile::InitSystem;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodeup")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Idempotent, resumable bootstrap of cluster worker nodes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding the record file [default: /var/lib/nodeup as root]
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision this machine for a node role
    Provision(ProvisionArgs),

    /// Probe every step read-only and show the last recorded run
    Status(StatusArgs),

    /// Inspect or remove the record file
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Profile
// ============================================================================

/// Node profile: a file, overridden field by field by flags
#[derive(Args, Debug, Clone, Default)]
pub struct ProfileArgs {
    /// Profile file (TOML, or JSON with a .json extension)
    #[arg(long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Node role (e.g. mesos-agent)
    #[arg(long)]
    pub role: Option<String>,

    /// Cluster registration address (e.g. zk://10.0.0.1:2181/mesos)
    #[arg(long, value_name = "ADDR")]
    pub cluster_endpoint: Option<String>,

    /// Address this node advertises to the cluster
    #[arg(long, value_name = "ADDR")]
    pub advertised_address: Option<String>,

    /// Agent work directory [default: /var/lib/mesos]
    #[arg(long, value_name = "PATH")]
    pub work_dir: Option<String>,

    /// Hostname the agent reports
    #[arg(long)]
    pub hostname: Option<String>,

    /// Init system managing services [default: systemd]
    #[arg(long, value_enum)]
    pub init_system: Option<InitSystem>,

    /// Distribution codename used as repository suite [default: xenial]
    #[arg(long, value_name = "CODENAME")]
    pub distribution: Option<String>,
}

// ============================================================================
// Provision
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Continue a previous run, skipping steps it recorded as satisfied
    #[arg(long)]
    pub resume: bool,

    /// Show what would change without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Reboot afterwards if the profile asks for it and the run changed something
    #[arg(long)]
    pub allow_reboot: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Attempts per package or repository step
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt up to 60s
    #[arg(long, default_value_t = 2, value_name = "SECS")]
    pub retry_delay_secs: u64,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Print status as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// State
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum StateCommand {
    /// Show the recorded run
    Show {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove the record file
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_provision_flags() {
        let cli = Cli::try_parse_from([
            "nodeup",
            "-vv",
            "provision",
            "--role",
            "mesos-agent",
            "--cluster-endpoint",
            "zk://10.0.0.1:2181/mesos",
            "--advertised-address",
            "10.0.0.5",
            "--init-system",
            "upstart",
            "--resume",
            "--max-attempts",
            "5",
            "--state-dir",
            "/tmp/nodeup",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/nodeup")));
        let Command::Provision(args) = cli.command else {
            panic!("expected provision");
        };
        assert_eq!(args.profile.role.as_deref(), Some("mesos-agent"));
        assert_eq!(args.profile.init_system, Some(InitSystem::Upstart));
        assert!(args.resume);
        assert!(!args.dry_run);
        assert_eq!(args.max_attempts, 5);
        assert_eq!(args.retry_delay_secs, 2);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = Cli::try_parse_from(["nodeup", "provision", "--max-attempts", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_clear() {
        let cli = Cli::try_parse_from(["nodeup", "state", "clear", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::State(StateCommand::Clear { yes: true })
        ));
    }
}
