//! dropship deploys a single compiled contract to a named EVM network.

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;

use cli::{Cli, Command, DeployArgs};
use dropship_deploy::{
    ContractArtifact, DeployError, DeploySigner, DeploymentOrchestrator, DeploymentRecord,
    DeploymentRequest, DeploymentResult, HttpNetworkClient, ProfileRegistry, Reporter,
    SignerProvisioner, cancellation,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the result.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Deploy(args) => Ok(deploy(&cli.config, args).await),
        Command::Networks => {
            networks(&cli.config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Everything resolved before the orchestrator takes over.
struct Prepared {
    request: DeploymentRequest,
    signer: DeploySigner,
    client: Arc<HttpNetworkClient>,
}

async fn deploy(config_path: &Path, args: DeployArgs) -> ExitCode {
    let reporter = Reporter::new(args.format);

    // Refined to the resolved profile name once it is known.
    let mut network = args.network.clone().unwrap_or_default();
    let prepared = match prepare(config_path, &args, &mut network).await {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!(error = %e, "Deployment setup failed");
            let result = DeploymentResult::failed(network, e);
            return exit_code(reporter.report(&result));
        }
    };
    let Prepared {
        request,
        signer,
        client,
    } = prepared;

    let (cancel, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling deployment...");
            cancel.cancel();
        }
    });

    let orchestrator = DeploymentOrchestrator::new(client);
    let result = orchestrator.deploy(&request, &signer, signal).await;

    if request.profile.save_deployments {
        if let Some(record) = DeploymentRecord::from_result(&request, &result, signer.chain_id()) {
            if let Err(e) = record.save(&args.deployments_dir) {
                tracing::warn!(error = %e, "Failed to save deployment record");
            }
        }
    }

    exit_code(reporter.report(&result))
}

async fn prepare(
    config_path: &Path,
    args: &DeployArgs,
    network: &mut String,
) -> Result<Prepared, DeployError> {
    let registry = ProfileRegistry::load(config_path)?;
    let profile = registry.resolve(args.network.as_deref())?.clone();
    *network = profile.name.clone();

    let artifact = ContractArtifact::load(&args.artifact)?;

    let client = HttpNetworkClient::new(profile.rpc_url.clone()).map_err(|source| {
        DeployError::Rpc {
            operation: "connect".to_string(),
            source,
        }
    })?;
    let signer = SignerProvisioner::default()
        .provision(&profile, &client)
        .await?;

    let request = DeploymentRequest::new(artifact, profile)
        .with_args(args.args.clone())
        .with_confirmations(args.confirmations)
        .with_timeout(Duration::from_secs(args.timeout));

    Ok(Prepared {
        request,
        signer,
        client: Arc::new(client),
    })
}

fn networks(config_path: &Path) -> Result<()> {
    let registry = ProfileRegistry::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut table = Table::new();
    table.set_header(vec!["Name", "RPC host", "Chain ID", "Gas price", "Default", "Live"]);
    for profile in registry.profiles() {
        table.add_row(vec![
            profile.name.clone(),
            profile.rpc_url.host_str().unwrap_or("-").to_string(),
            profile
                .chain_id
                .map_or_else(|| "auto".to_string(), |id| id.to_string()),
            profile
                .gas_price_override
                .map_or_else(|| "auto".to_string(), |price| price.to_string()),
            yes_no(profile.default_network).to_string(),
            yes_no(profile.live).to_string(),
        ]);
    }
    println!("{table}");

    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
