use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dropship_deploy::{CONFIG_FILENAME, DEFAULT_DEPLOYMENTS_DIR, OutputFormat};
use tracing::level_filters::LevelFilter;

/// Default number of seconds to wait for a deployment to confirm.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Parser)]
#[command(name = "dropship")]
#[command(
    author,
    version,
    about = "Deploy a compiled contract to a named EVM network"
)]
pub struct Cli {
    /// The verbosity level. Logs are written to stderr.
    #[arg(short, long, global = true, env = "DROPSHIP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the network configuration file.
    ///
    /// Values can be overridden with `DROPSHIP_NETWORKS__<NAME>__<FIELD>`.
    #[arg(long, alias = "conf", global = true, env = "DROPSHIP_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy one contract and print its address.
    Deploy(DeployArgs),
    /// List the configured networks.
    Networks,
}

#[derive(Debug, Clone, clap::Args)]
pub struct DeployArgs {
    /// Path to a Hardhat or Foundry artifact JSON file.
    #[arg(long, short)]
    pub artifact: PathBuf,

    /// The network profile to use. Defaults to the profile marked as default.
    #[arg(long, short, env = "DROPSHIP_NETWORK")]
    pub network: Option<String>,

    /// A constructor argument, in declaration order. Repeat for each argument.
    #[arg(long = "arg", value_name = "VALUE")]
    pub args: Vec<String>,

    /// Number of blocks, counting the inclusion block, to wait for.
    #[arg(long, env = "DROPSHIP_CONFIRMATIONS", default_value_t = 1)]
    pub confirmations: u64,

    /// Seconds to wait for confirmation after submission.
    #[arg(long, env = "DROPSHIP_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Output format of the result.
    #[arg(long, env = "DROPSHIP_FORMAT", default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Directory deployment records are written to, for profiles with
    /// `save_deployments` enabled.
    #[arg(long, env = "DROPSHIP_DEPLOYMENTS_DIR", default_value = DEFAULT_DEPLOYMENTS_DIR)]
    pub deployments_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from([
            "dropship",
            "deploy",
            "--artifact",
            "out/LootBox.json",
            "--network",
            "rinkeby",
            "--arg",
            "test",
            "--arg",
            "42",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from(CONFIG_FILENAME));
        let Command::Deploy(args) = cli.command else {
            panic!("expected the deploy command");
        };
        assert_eq!(args.network.as_deref(), Some("rinkeby"));
        assert_eq!(args.args, vec!["test".to_string(), "42".to_string()]);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.confirmations, 1);
        assert_eq!(args.timeout, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_artifact_is_required() {
        assert!(Cli::try_parse_from(["dropship", "deploy"]).is_err());
    }
}
