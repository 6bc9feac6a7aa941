use crate::deploy::{ReleaseDeployer, ReleaseTarget};
use crate::errors::{Error, Result};
use konverge_api::ReleaseStatus;

use async_trait::async_trait;
use log;
use serde::Deserialize;
use tokio::process::Command;

/*
 * Subset of `helm status <release> -o json` we care about:
 *
 *   {
 *     "name": "svcA",
 *     "info": { "status": "deployed", [ ... ] },
 *     "version": 3,
 *     [ ... ]
 *   }
 */
#[derive(Debug, Deserialize)]
struct HelmRelease {
    info: HelmReleaseInfo,
    version: i64,
}

#[derive(Debug, Deserialize)]
struct HelmReleaseInfo {
    status: String,
}

/*
 * Translates helm release statuses into the labels the reconciler knows.
 * Statuses without a translation are passed through so they are reported
 * verbatim.
 */
fn status_label(helm_status: &str) -> &str {
    match helm_status {
	"deployed" => "Deployed",
	"uninstalled" => "Not Deployed",
	"unknown" => "Unknown",
	status if status.starts_with("pending-") => "Pending",
	status => status,
    }
}

fn parse_status(raw: &str) -> Result<ReleaseStatus> {
    let release: HelmRelease = serde_json::from_str(raw)?;

    Ok(ReleaseStatus::new(status_label(&release.info.status), release.version))
}

/*
 * ReleaseDeployer backed by the helm binary.
 */
pub struct HelmDeployer {
    binary: String,
    kube_context: Option<String>,
}

impl HelmDeployer {

    pub fn new(binary: &str, kube_context: Option<String>) -> Self {
	Self{
	    binary: binary.to_string(),
	    kube_context: kube_context,
	}
    }

    fn release_args(&self, verb: &str, target: &ReleaseTarget) -> Vec<String> {
	let mut args = vec![
	    verb.to_string(),
	    target.release.clone(),
	    target.chart.clone(),
	    String::from("--namespace"),
	    target.namespace.clone(),
	];

	if let Some(values) = &target.values {
	    args.push(String::from("--values"));
	    args.push(values.display().to_string());
	}
	args
    }

    async fn helm(&self, args: Vec<String>) -> Result<String> {
	let mut cmd = Command::new(&self.binary);
	cmd.args(&args);
	if let Some(ctx) = &self.kube_context {
	    cmd.arg("--kube-context").arg(ctx);
	}

	log::debug!("Running {} {}", self.binary, args.join(" "));
	let output = cmd.output().await
	    .map_err(|err| Error::deploy(self.name(), format!("unable to run {}: {}", self.binary, err)))?;

	if !output.status.success() {
	    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
	    return Err(Error::deploy(self.name(), stderr));
	}

	Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ReleaseDeployer for HelmDeployer {

    fn name(&self) -> &str {
	"helm"
    }

    async fn status(&self, target: &ReleaseTarget) -> Result<ReleaseStatus> {
	let args = vec![
	    String::from("status"),
	    target.release.clone(),
	    String::from("--namespace"),
	    target.namespace.clone(),
	    String::from("--output"),
	    String::from("json"),
	];

	match self.helm(args).await {
	    Ok(raw) => parse_status(&raw),
	    Err(Error::Deploy{ reason, .. }) if reason.contains("release: not found") => {
		Ok(ReleaseStatus::not_deployed())
	    },
	    Err(err) => Err(err),
	}
    }

    async fn install(&self, target: &ReleaseTarget, wait: bool, timeout_seconds: u64) -> Result<()> {
	let mut args = self.release_args("install", target);
	if wait {
	    args.push(String::from("--wait"));
	    args.push(String::from("--timeout"));
	    args.push(format!("{}s", timeout_seconds));
	}

	self.helm(args).await?;
	Ok(())
    }

    async fn upgrade(&self, target: &ReleaseTarget) -> Result<()> {
	self.helm(self.release_args("upgrade", target)).await?;
	Ok(())
    }

    async fn uninstall(&self, target: &ReleaseTarget) -> Result<()> {
	let args = vec![
	    String::from("uninstall"),
	    target.release.clone(),
	    String::from("--namespace"),
	    target.namespace.clone(),
	];

	self.helm(args).await?;
	Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konverge_api::DeployedStatus;
    use std::path::PathBuf;

    #[test]
    fn helm_statuses_are_translated() {
	assert_eq!(status_label("deployed"), "Deployed");
	assert_eq!(status_label("pending-upgrade"), "Pending");
	assert_eq!(status_label("uninstalled"), "Not Deployed");
	assert_eq!(status_label("unknown"), "Unknown");
	assert_eq!(status_label("failed"), "failed");
    }

    #[test]
    fn status_output_is_parsed() {
	let raw = r#"{"name":"svcA","info":{"status":"deployed","description":"Install complete"},"version":4,"namespace":"apps"}"#;
	let status = parse_status(raw).unwrap();

	assert_eq!(status.status, DeployedStatus::Deployed);
	assert_eq!(status.revision, 4);
    }

    #[test]
    fn release_args_carry_values_file() {
	let helm = HelmDeployer::new("helm", None);
	let target = ReleaseTarget::new("svcA", "apps", "/scratch/svcA.tgz")
	    .with_values(Some(PathBuf::from("/scratch/svcA-values.yaml")));

	assert_eq!(helm.release_args("upgrade", &target), vec![
	    "upgrade", "svcA", "/scratch/svcA.tgz", "--namespace", "apps", "--values", "/scratch/svcA-values.yaml",
	]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_deploy_error() {
	let helm = HelmDeployer::new("/nonexistent/helm-binary", None);
	let target = ReleaseTarget::new("svcA", "apps", "chart");

	let err = helm.upgrade(&target).await.unwrap_err();
	assert_eq!(err.kind(), crate::errors::ErrorKind::Deploy);
    }
}
