use konverge::config::RunConfig;
use konverge::deploy::{HelmDeployer, KubeManifestDeployer};
use konverge::fetch::UrlFetcher;
use konverge::ledger::{ConfigMapLedger, LedgerStore, MemoryLedger};
use konverge::namespace::KubeNamespaces;
use konverge::script::ProcessScriptExecutor;
use konverge::tls::SecretTlsProvisioner;
use konverge::{Collaborators, Error, Reconciler, Result};
use konverge_api::AppliedRecord;

use clap::{Parser, Subcommand, ValueEnum};
use kube::Client as KubeClient;
use log;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LedgerBackend {
    /* a ConfigMap in the cluster, see ledger.namespace/ledger.name */
    Configmap,

    /* nothing is remembered between runs */
    Memory,
}

#[derive(Debug, Subcommand)]
enum Command {

    /// Run one reconciliation pass
    Apply {
	#[arg(short = 'f', long)]
	config: PathBuf,

	#[arg(long, value_enum, default_value_t = LedgerBackend::Configmap)]
	ledger: LedgerBackend,
    },

    /// Print the ledger as json
    Ledger {
	#[arg(short = 'f', long)]
	config: PathBuf,
    },

    /// Print the json schema of the run configuration
    Schema,
}

#[derive(Debug, Parser)]
#[command(name = "konverge", version, about = "Converges cluster services toward a declared set")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn collaborators(kube_client: KubeClient, config: &RunConfig, ledger: Arc<dyn LedgerStore>) -> Collaborators {
    Collaborators{
	ledger: ledger,
	fetcher: Arc::new(UrlFetcher::new()),
	releases: Arc::new(HelmDeployer::new(&config.helm.binary, config.helm.kube_context.clone())),
	manifests: Arc::new(KubeManifestDeployer::new(kube_client.clone())),
	namespaces: Arc::new(KubeNamespaces::new(kube_client.clone())),
	tls: Arc::new(SecretTlsProvisioner::new(kube_client.clone(), config.tls.cert_dir.clone())),
	scripts: Arc::new(ProcessScriptExecutor),
    }
}

async fn apply(path: PathBuf, backend: LedgerBackend) -> Result<()> {
    let config = RunConfig::load(&path).await?;
    let kube_client = KubeClient::try_default().await?;

    let ledger: Arc<dyn LedgerStore> = match backend {
	LedgerBackend::Configmap => Arc::new(ConfigMapLedger::new(kube_client.clone(), &config.ledger.name, &config.ledger.namespace)),
	LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
    };

    log::info!("Reconciling {} service(s) from {}", config.services.len(), path.display());
    let reconciler = Reconciler::new(collaborators(kube_client, &config, ledger), config.settings());
    let summary = reconciler.reconcile(&config.services).await?;

    for (name, outcome) in &summary.entries {
	log::info!("  {}: {}", name, outcome);
    }
    if summary.is_partial() {
	log::warn!("Some services drifted and were left untouched: {}", summary.drifted().join(", "));
    }
    Ok(())
}

async fn show_ledger(path: PathBuf) -> Result<()> {
    let config = RunConfig::load(&path).await?;
    let kube_client = KubeClient::try_default().await?;
    let ledger = ConfigMapLedger::new(kube_client, &config.ledger.name, &config.ledger.namespace);

    if !ledger.load().await? {
	let errmsg = format!("ledger {}/{} does not exist", config.ledger.namespace, config.ledger.name);
	return Err(Error::Ledger(errmsg));
    }

    let mut records = serde_json::Map::new();
    for (name, raw) in ledger.snapshot() {
	let record = AppliedRecord::from_json(&raw)?;
	records.insert(name, serde_json::to_value(record)?);
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/*
 * One reconciliation pass per invocation:
 *
 *  1. read the run configuration
 *  2. prune what is recorded but no longer declared
 *  3. install/upgrade what is declared
 *  4. exit non-zero if the pass was aborted
 */
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
	Command::Apply{ config, ledger } => apply(config, ledger).await,
	Command::Ledger{ config } => show_ledger(config).await,
	Command::Schema => RunConfig::schema().map(|schema| println!("{}", schema)),
    };

    if let Err(err) = result {
	log::error!("{} ({:?})", err, err.kind());
	std::process::exit(1);
    }
}
