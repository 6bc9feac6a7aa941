/*
 * Deployers: the things that actually talk to the cluster on behalf of the
 * reconciler. Every call receives the full target it acts upon; deployers
 * keep no "current release/namespace" between calls.
 */

pub mod helm;
pub use helm::HelmDeployer;

pub mod manifest;
pub use manifest::KubeManifestDeployer;

use crate::errors::Result;
use konverge_api::ReleaseStatus;

use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseTarget {
    pub release: String,
    pub namespace: String,

    // local chart archive or a chart reference understood by the deployer
    pub chart: String,

    pub values: Option<PathBuf>,
}

impl ReleaseTarget {

    pub fn new(release: &str, namespace: &str, chart: &str) -> Self {
	Self{
	    release: release.to_string(),
	    namespace: namespace.to_string(),
	    chart: chart.to_string(),
	    values: None,
	}
    }

    pub fn with_values(mut self, values: Option<PathBuf>) -> Self {
	self.values = values;
	self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestTarget {
    pub name: String,
    pub namespace: String,
    pub manifest: PathBuf,
    pub wait_timeout_seconds: Option<u64>,
}

impl ManifestTarget {

    pub fn new(name: &str, namespace: &str, manifest: PathBuf) -> Self {
	Self{
	    name: name.to_string(),
	    namespace: namespace.to_string(),
	    manifest: manifest,
	    wait_timeout_seconds: None,
	}
    }

    pub fn with_wait(mut self, timeout: Option<u64>) -> Self {
	self.wait_timeout_seconds = timeout;
	self
    }
}

#[async_trait]
pub trait ReleaseDeployer: Send + Sync {

    fn name(&self) -> &str;

    /* live status label plus the current release revision (0 if none) */
    async fn status(&self, target: &ReleaseTarget) -> Result<ReleaseStatus>;

    async fn install(&self, target: &ReleaseTarget, wait: bool, timeout_seconds: u64) -> Result<()>;

    async fn upgrade(&self, target: &ReleaseTarget) -> Result<()>;

    async fn uninstall(&self, target: &ReleaseTarget) -> Result<()>;
}

#[async_trait]
pub trait ManifestDeployer: Send + Sync {

    fn name(&self) -> &str;

    /* idempotent apply */
    async fn install(&self, target: &ManifestTarget) -> Result<()>;

    async fn uninstall(&self, target: &ManifestTarget) -> Result<()>;
}
