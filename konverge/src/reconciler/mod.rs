/*
 * The reconciler: one pass that converges the cluster toward a desired set
 * of services and keeps the ledger of what was applied.
 *
 *  1. load the ledger, creating it when it does not exist
 *  2. prune orphans: recorded services that are no longer desired
 *  3. apply every desired service, dispatched by kind
 *  4. persist a fresh record after each successful install/upgrade
 *
 * Services are handled one at a time; the first fatal error ends the pass.
 */

mod apply;
pub mod decision;
mod orphans;


use crate::deploy::{ManifestDeployer, ReleaseDeployer};
use crate::errors::{Error, Result};
use crate::fetch::ArtifactFetcher;
use crate::ledger::LedgerStore;
use crate::namespace::NamespaceEnsurer;
use crate::script::ScriptExecutor;
use crate::tls::TlsProvisioner;
use konverge_api::{AppliedRecord, ServiceKind, ServiceSpec};

use log;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/*
 * Everything the reconciler drives. Each one is a black box to it.
 */
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerStore>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub releases: Arc<dyn ReleaseDeployer>,
    pub manifests: Arc<dyn ManifestDeployer>,
    pub namespaces: Arc<dyn NamespaceEnsurer>,
    pub tls: Arc<dyn TlsProvisioner>,
    pub scripts: Arc<dyn ScriptExecutor>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSettings {

    // global run parameters: template values and script parameters
    pub params: BTreeMap<String, String>,

    pub tls_extensions: Vec<String>,

    // where the per-run scratch directory is created, system temp if unset
    pub scratch_parent: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    Installed { revision: i64 },
    Upgraded { revision: i64 },
    Unchanged,
    Drifted { recorded: String, live: String },
    Pruned,
    Kept { recorded: String, live: String },
    ScriptRan,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self {
	    Outcome::Applied => write!(f, "applied"),
	    Outcome::Installed{ revision } => write!(f, "installed (revision {})", revision),
	    Outcome::Upgraded{ revision } => write!(f, "upgraded (revision {})", revision),
	    Outcome::Unchanged => write!(f, "unchanged"),
	    Outcome::Drifted{ recorded, live } => write!(f, "drifted (recorded revision {:?}, live {}), left untouched", recorded, live),
	    Outcome::Pruned => write!(f, "pruned"),
	    Outcome::Kept{ recorded, live } => write!(f, "orphan kept (recorded revision {:?}, live {})", recorded, live),
	    Outcome::ScriptRan => write!(f, "script ran"),
	    Outcome::Skipped => write!(f, "skipped"),
	}
    }
}

/*
 * Per service outcome of a pass, in the order services were handled.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub entries: Vec<(String, Outcome)>,
}

impl Summary {

    pub fn push(&mut self, name: &str, outcome: Outcome) {
	self.entries.push((name.to_string(), outcome));
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
	self.entries.iter()
	    .find(|(service, _)| service == name)
	    .map(|(_, outcome)| outcome)
    }

    /*
     * Services left alone because their live release drifted. The pass
     * still succeeds, callers wanting stricter semantics can check this.
     */
    pub fn drifted(&self) -> Vec<&str> {
	self.entries.iter()
	    .filter(|(_, outcome)| matches!(outcome, Outcome::Drifted{ .. } | Outcome::Kept{ .. }))
	    .map(|(service, _)| service.as_str())
	    .collect()
    }

    pub fn is_partial(&self) -> bool {
	!self.drifted().is_empty()
    }
}

pub struct Reconciler {
    collab: Collaborators,
    settings: RunSettings,
}

impl Reconciler {

    pub fn new(collab: Collaborators, settings: RunSettings) -> Self {
	Self{
	    collab: collab,
	    settings: settings,
	}
    }

    /*
     * Runs one reconciliation pass. The scratch directory holding the
     * fetched artifacts is removed whatever the outcome; failing to remove
     * it is only logged.
     */
    pub async fn reconcile(&self, desired: &[ServiceSpec]) -> Result<Summary> {
	let mut builder = tempfile::Builder::new();
	builder.prefix("konverge-");
	let scratch = match &self.settings.scratch_parent {
	    Some(parent) => builder.tempdir_in(parent)?,
	    None => builder.tempdir()?,
	};
	log::debug!("Using scratch directory {}", scratch.path().display());

	let result = self.reconcile_in(scratch.path(), desired).await;

	let path = scratch.path().to_path_buf();
	if let Err(err) = scratch.close() {
	    log::warn!("Unable to remove scratch directory {}: {}", path.display(), err);
	}

	match &result {
	    Ok(summary) => log::info!("Reconciliation finished, {} service(s) handled", summary.entries.len()),
	    Err(err) => log::error!("Reconciliation aborted: {}", err),
	}
	result
    }

    async fn reconcile_in(&self, scratch: &Path, desired: &[ServiceSpec]) -> Result<Summary> {
	let names = desired_names(desired)?;

	if !self.collab.ledger.load().await? {
	    log::info!("No ledger found, starting from an empty one");
	    self.collab.ledger.create_empty().await?;
	}
	let records = self.records()?;

	let mut summary = Summary::default();
	self.prune_orphans(scratch, &names, &records, &mut summary).await?;

	for spec in desired {
	    log::debug!("Reconciling {} service {}", spec.kind, spec.name);

	    let (outcome, record) = match spec.kind {
		ServiceKind::Manifest => self.apply_manifest(scratch, spec).await?,
		ServiceKind::Release => self.apply_release(scratch, spec, records.get(&spec.name)).await?,
		ServiceKind::Script => self.apply_script(spec).await?,
	    };

	    if let Some(record) = record {
		self.collab.ledger.upsert(record.name(), record.to_json()?).await?;
	    }

	    log::info!("{}: {}", spec.name, outcome);
	    summary.push(&spec.name, outcome);
	}

	Ok(summary)
    }

    /*
     * Decodes the ledger snapshot taken at load time.
     */
    fn records(&self) -> Result<BTreeMap<String, AppliedRecord>> {
	let mut records = BTreeMap::new();

	for (key, raw) in self.collab.ledger.snapshot() {
	    match AppliedRecord::from_json(&raw) {
		Ok(record) => {
		    records.insert(key, record);
		},
		Err(err) => {
		    let errmsg = format!("record {} can not be decoded: {}", key, err);
		    return Err(Error::Ledger(errmsg));
		}
	    }
	}
	Ok(records)
    }
}

fn desired_names(desired: &[ServiceSpec]) -> Result<BTreeSet<&str>> {
    let mut names = BTreeSet::new();

    for spec in desired {
	if !spec.has_valid_name() {
	    let errmsg = format!("service name {:?} is not a valid ledger key", spec.name);
	    return Err(Error::Configuration(errmsg));
	}
	if !names.insert(spec.name.as_str()) {
	    let errmsg = format!("service {} is declared more than once", spec.name);
	    return Err(Error::Configuration(errmsg));
	}
    }
    Ok(names)
}
