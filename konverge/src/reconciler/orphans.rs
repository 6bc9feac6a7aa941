use crate::deploy::{ManifestTarget, ReleaseTarget};
use crate::errors::{Error, Result};
use crate::fetch;
use crate::reconciler::decision::{decide_orphan, OrphanDecision};
use crate::reconciler::{Outcome, Reconciler, Summary};
use konverge_api::{AppliedRecord, ServiceKind};

use log;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

impl Reconciler {

    /*
     * Removes what the ledger knows about but is no longer desired. This
     * runs before any desired service is applied, so a reused name or
     * namespace never meets stale state.
     */
    pub(super) async fn prune_orphans(&self, scratch: &Path, desired: &BTreeSet<&str>, records: &BTreeMap<String, AppliedRecord>, summary: &mut Summary) -> Result<()> {
	for (name, record) in records {
	    if desired.contains(name.as_str()) {
		continue;
	    }
	    log::info!("{} is no longer desired, pruning it", name);

	    let outcome = match record.spec.kind {
		ServiceKind::Manifest => self.prune_manifest(scratch, name, record).await?,
		ServiceKind::Release => self.prune_release(name, record).await?,
		ServiceKind::Script => {
		    /* scripts are never recorded, but do not choke on it */
		    self.collab.ledger.delete(name).await?;
		    Outcome::Pruned
		},
	    };

	    log::info!("{}: {}", name, outcome);
	    summary.push(name, outcome);
	}

	Ok(())
    }

    /*
     * The ledger key, not the name inside the record, identifies the entry
     * to delete: the two only differ when the ledger was edited by hand.
     */
    async fn prune_manifest(&self, scratch: &Path, key: &str, record: &AppliedRecord) -> Result<Outcome> {
	let spec = &record.spec;
	let source = match &spec.source_url {
	    Some(source) => source,
	    None => {
		let errmsg = format!("recorded manifest service {} has no sourceURL to uninstall from", spec.name);
		return Err(Error::Configuration(errmsg));
	    }
	};

	let dest = scratch.join(format!("{}-orphan.yaml", key));
	self.collab.fetcher.pull(&dest, source).await?;
	fetch::render_file(&dest, &self.settings.params).await?;

	let target = ManifestTarget::new(&spec.name, &spec.namespace, dest);
	match self.collab.manifests.uninstall(&target).await {
	    Ok(()) => {},
	    Err(err) if err.is_not_found() => {
		log::debug!("{} was already gone: {}", spec.name, err);
	    },
	    Err(err) => return Err(err),
	}

	self.collab.ledger.delete(key).await?;
	Ok(Outcome::Pruned)
    }

    async fn prune_release(&self, key: &str, record: &AppliedRecord) -> Result<Outcome> {
	let spec = &record.spec;
	let chart = spec.source_url.clone().or(spec.chart.clone()).unwrap_or_default();
	let target = ReleaseTarget::new(&spec.name, &spec.namespace, &chart);

	let live = self.collab.releases.status(&target).await?;
	match decide_orphan(record, &live) {
	    OrphanDecision::Abort => {
		return Err(Error::UnknownStatus{ service: spec.name.clone() });
	    },
	    OrphanDecision::Forget => {
		log::debug!("{} is not deployed, forgetting it", spec.name);
	    },
	    OrphanDecision::Uninstall => {
		self.collab.releases.uninstall(&target).await?;
	    },
	    OrphanDecision::Keep{ recorded, live } => {
		log::warn!("Not uninstalling {}: live revision {} differs from recorded revision {:?}, it was changed by someone else",
			   spec.name, live, recorded);
		return Ok(Outcome::Kept{ recorded: recorded, live: live });
	    },
	    OrphanDecision::BestEffortUninstall(status) => {
		log::warn!("{} is in unexpected status {}, trying to uninstall it", spec.name, status);
		if let Err(err) = self.collab.releases.uninstall(&target).await {
		    log::error!("Unable to uninstall {} ({}): {}", spec.name, self.collab.releases.name(), err);
		}
	    },
	}

	self.collab.ledger.delete(key).await?;
	Ok(Outcome::Pruned)
    }
}
