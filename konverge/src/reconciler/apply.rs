use crate::deploy::{ManifestTarget, ReleaseTarget};
use crate::errors::{Error, Result};
use crate::fetch;
use crate::reconciler::decision::{decide_release, ReleaseDecision};
use crate::reconciler::{Outcome, Reconciler};
use konverge_api::{AppliedRecord, DeployedStatus, ServiceSpec};

use log;
use std::path::{Path, PathBuf};

/*
 * Every kind handler answers with what happened and, when the ledger has to
 * change, the record to persist.
 */
type Applied = (Outcome, Option<AppliedRecord>);

fn reject_script_ref(spec: &ServiceSpec) -> Result<()> {
    match &spec.script_ref {
	Some(script) => Err(Error::WrongOperation{
	    service: spec.name.clone(),
	    reason: format!("scriptRef {} is only valid for Script services, not {}", script, spec.kind),
	}),
	None => Ok(()),
    }
}

impl Reconciler {

    async fn ensure_namespace(&self, spec: &ServiceSpec) -> Result<()> {
	if spec.is_default_namespace() {
	    return Ok(());
	}
	self.collab.namespaces.create_namespace(&spec.namespace).await
    }

    /*
     * Pulls a text artifact (manifest, values override) and expands its
     * placeholders in place.
     */
    async fn pull_rendered(&self, dest: PathBuf, source: &str) -> Result<PathBuf> {
	self.collab.fetcher.pull(&dest, source).await?;
	fetch::render_file(&dest, &self.settings.params).await?;
	Ok(dest)
    }

    pub(super) async fn apply_manifest(&self, scratch: &Path, spec: &ServiceSpec) -> Result<Applied> {
	reject_script_ref(spec)?;
	let source = match &spec.source_url {
	    Some(source) => source,
	    None => {
		let errmsg = format!("manifest service {} has no sourceURL", spec.name);
		return Err(Error::Configuration(errmsg));
	    }
	};
	self.ensure_namespace(spec).await?;

	let manifest = self.pull_rendered(scratch.join(format!("{}.yaml", spec.name)), source).await?;
	let target = ManifestTarget::new(&spec.name, &spec.namespace, manifest)
	    .with_wait(spec.wait_timeout_seconds);

	self.collab.manifests.install(&target).await?;
	Ok((Outcome::Applied, Some(AppliedRecord::new(spec.clone()))))
    }

    pub(super) async fn apply_release(&self, scratch: &Path, spec: &ServiceSpec, record: Option<&AppliedRecord>) -> Result<Applied> {
	reject_script_ref(spec)?;
	self.ensure_namespace(spec).await?;
	self.collab.tls.provision(&self.settings.tls_extensions, &spec.name, &spec.namespace).await?;

	let mut spec = spec.clone();
	let chart = match (&spec.source_url, &spec.chart) {
	    (Some(source), _) => {
		let dest = scratch.join(format!("{}-chart.tgz", spec.name));
		self.collab.fetcher.pull(&dest, source).await?;
		if spec.chart_hash.is_none() {
		    spec.chart_hash = Some(fetch::hash_file(&dest).await?);
		}
		dest.display().to_string()
	    },
	    (None, Some(chart)) => chart.clone(),
	    (None, None) => {
		let errmsg = format!("release service {} needs either sourceURL or chart", spec.name);
		return Err(Error::Configuration(errmsg));
	    },
	};

	/* the override may be templated from mutable params, never trust a recorded hash */
	let (values, override_hash) = match &spec.override_url {
	    Some(source) => {
		let values = self.pull_rendered(scratch.join(format!("{}-values.yaml", spec.name)), source).await?;
		let hash = fetch::hash_file(&values).await?;
		(Some(values), Some(hash))
	    },
	    None => (None, None),
	};

	let target = ReleaseTarget::new(&spec.name, &spec.namespace, &chart).with_values(values);
	let live = self.collab.releases.status(&target).await?;
	log::debug!("{} live status: {} (revision {})", spec.name, live.status, live.revision);

	match decide_release(record, &live, spec.chart_hash.as_deref(), override_hash.as_deref()) {
	    ReleaseDecision::Abort => Err(Error::UnknownStatus{ service: spec.name.clone() }),
	    ReleaseDecision::Unchanged => Ok((Outcome::Unchanged, None)),
	    ReleaseDecision::Drifted{ recorded, live } => {
		log::warn!("Skipping {}: live revision {} differs from recorded revision {:?}", spec.name, live, recorded);
		Ok((Outcome::Drifted{ recorded: recorded, live: live }, None))
	    },
	    ReleaseDecision::Install => {
		self.install_release(&spec, &target).await?;
		let revision = self.collab.releases.status(&target).await?.revision;
		Ok((Outcome::Installed{ revision: revision }, Some(AppliedRecord::released(spec, revision, override_hash))))
	    },
	    ReleaseDecision::Upgrade => {
		self.collab.releases.upgrade(&target).await?;
		let revision = self.collab.releases.status(&target).await?.revision;
		Ok((Outcome::Upgraded{ revision: revision }, Some(AppliedRecord::released(spec, revision, override_hash))))
	    },
	    ReleaseDecision::Remediate(status) => {
		log::warn!("{} is in unexpected status {}, uninstalling it", spec.name, status);
		if let Err(err) = self.collab.releases.uninstall(&target).await {
		    log::error!("Unable to uninstall {}: {}", spec.name, err);
		}
		Err(Error::WrongStatus{ service: spec.name.clone(), status: status })
	    },
	}
    }

    /*
     * Installs a release, retrying once when the first attempt failed but
     * the release still shows as not deployed: dependent resources are
     * sometimes not ready yet on the first try.
     */
    async fn install_release(&self, spec: &ServiceSpec, target: &ReleaseTarget) -> Result<()> {
	let wait = spec.wait_timeout_seconds.is_some();
	let timeout = spec.wait_timeout_seconds.unwrap_or(0);

	let first = match self.collab.releases.install(target, wait, timeout).await {
	    Ok(()) => return Ok(()),
	    Err(err) => err,
	};
	log::warn!("Install of {} failed: {}", spec.name, first);

	let live = self.collab.releases.status(target).await?;
	if live.status != DeployedStatus::NotDeployed {
	    return Err(first);
	}

	log::info!("{} is still not deployed, retrying install once", spec.name);
	self.collab.releases.install(target, wait, timeout).await
    }

    pub(super) async fn apply_script(&self, spec: &ServiceSpec) -> Result<Applied> {
	match &spec.script_ref {
	    Some(script) => {
		self.collab.scripts.run(script, &self.settings.params, spec).await?;
		Ok((Outcome::ScriptRan, None))
	    },
	    None => {
		log::warn!("Script service {} has no scriptRef, nothing to run", spec.name);
		Ok((Outcome::Skipped, None))
	    },
	}
    }
}
