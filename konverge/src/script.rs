use crate::errors::{Error, Result};
use konverge_api::ServiceSpec;

use async_trait::async_trait;
use log;
use std::collections::BTreeMap;
use tokio::process::Command;

#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn run(&self, script: &str, params: &BTreeMap<String, String>, spec: &ServiceSpec) -> Result<()>;
}

/*
 * Environment handed to a deployment script:
 *
 *   KONVERGE_SERVICE         the service spec as json
 *   KONVERGE_SERVICE_NAME    spec.name
 *   KONVERGE_NAMESPACE       spec.namespace
 *   KONVERGE_PARAM_<KEY>     one per global run parameter
 */
pub fn script_env(params: &BTreeMap<String, String>, spec: &ServiceSpec) -> Result<Vec<(String, String)>> {
    let mut env = vec![
	(String::from("KONVERGE_SERVICE"), serde_json::to_string(spec)?),
	(String::from("KONVERGE_SERVICE_NAME"), spec.name.clone()),
	(String::from("KONVERGE_NAMESPACE"), spec.namespace.clone()),
    ];

    for (key, value) in params {
	let key = key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_");
	env.push((format!("KONVERGE_PARAM_{}", key), value.clone()));
    }
    Ok(env)
}

pub struct ProcessScriptExecutor;

#[async_trait]
impl ScriptExecutor for ProcessScriptExecutor {

    async fn run(&self, script: &str, params: &BTreeMap<String, String>, spec: &ServiceSpec) -> Result<()> {
	log::info!("Running script {} for {}", script, spec.name);

	let output = Command::new(script)
	    .envs(script_env(params, spec)?)
	    .output()
	    .await
	    .map_err(|err| Error::deploy("script", format!("unable to run {}: {}", script, err)))?;

	let stdout = String::from_utf8_lossy(&output.stdout);
	if !stdout.trim().is_empty() {
	    log::debug!("{} output: {}", script, stdout.trim());
	}

	if !output.status.success() {
	    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
	    let errmsg = format!("{} exited with {}: {}", script, output.status, stderr);
	    return Err(Error::deploy("script", errmsg));
	}
	Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konverge_api::ServiceKind;

    #[test]
    fn params_become_prefixed_env_vars() {
	let spec = ServiceSpec::new("dns", ServiceKind::Script).with_script("/opt/dns.sh");
	let mut params = BTreeMap::new();
	params.insert(String::from("cluster-domain"), String::from("example.com"));

	let env = script_env(&params, &spec).unwrap();

	assert!(env.contains(&(String::from("KONVERGE_SERVICE_NAME"), String::from("dns"))));
	assert!(env.contains(&(String::from("KONVERGE_NAMESPACE"), String::from("default"))));
	assert!(env.contains(&(String::from("KONVERGE_PARAM_CLUSTER_DOMAIN"), String::from("example.com"))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_script_is_an_error() {
	let spec = ServiceSpec::new("dns", ServiceKind::Script);
	let params = BTreeMap::new();

	assert!(ProcessScriptExecutor.run("true", &params, &spec).await.is_ok());
	assert!(ProcessScriptExecutor.run("false", &params, &spec).await.is_err());
    }
}
