use crate::errors::{Error, Result};
use crate::reconciler::RunSettings;
use konverge_api::ServiceSpec;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfig {
    pub namespace: String,
    pub name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
	Self{
	    namespace: String::from("konverge-system"),
	    name: String::from("konverge-ledger"),
	}
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {

    // directory holding <service>.crt / <service>.key pairs
    pub cert_dir: Option<PathBuf>,

    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmConfig {
    pub binary: String,
    pub kube_context: Option<String>,
}

impl Default for HelmConfig {
    fn default() -> Self {
	Self{
	    binary: String::from("helm"),
	    kube_context: None,
	}
    }
}

/*
 * A run description, for example:
 *
 *   ledger:
 *     namespace: konverge-system
 *     name: konverge-ledger
 *   params:
 *     DOMAIN: example.com
 *   tls:
 *     certDir: /etc/konverge/tls
 *     extensions: [ "*.example.com" ]
 *   services:
 *     - name: ingress
 *       kind: Release
 *       namespace: ingress
 *       sourceURL: https://charts.example.com/ingress-4.2.0.tgz
 *       overrideURL: file:///etc/konverge/ingress-values.yaml
 *       waitTimeoutSeconds: 300
 */
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {

    #[serde(default)]
    pub ledger: LedgerConfig,

    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub params: BTreeMap<String, String>,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub helm: HelmConfig,

    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

impl RunConfig {

    /*
     * Parses a run description, yaml or json depending on the extension
     * (yaml when there is none).
     */
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
	let config: RunConfig = match path.extension().and_then(|ext| ext.to_str()) {
	    Some("json") => serde_json::from_str(text)?,
	    _ => serde_yaml::from_str(text)?,
	};

	config.validate()?;
	Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
	let text = tokio::fs::read_to_string(path).await
	    .map_err(|err| Error::Configuration(format!("unable to read {}: {}", path.display(), err)))?;

	Self::parse(path, &text)
    }

    pub fn validate(&self) -> Result<()> {
	let mut names = BTreeSet::new();

	for service in &self.services {
	    if service.name.is_empty() {
		return Err(Error::Configuration(String::from("service without a name")));
	    }
	    if !service.has_valid_name() {
		let errmsg = format!("service name {:?} may only contain letters, digits, '-', '_' and '.'", service.name);
		return Err(Error::Configuration(errmsg));
	    }
	    if !names.insert(service.name.as_str()) {
		return Err(Error::Configuration(format!("service {} is declared more than once", service.name)));
	    }
	}
	Ok(())
    }

    pub fn settings(&self) -> RunSettings {
	RunSettings{
	    params: self.params.clone(),
	    tls_extensions: self.tls.extensions.clone(),
	    scratch_parent: self.scratch_dir.clone(),
	}
    }

    pub fn schema() -> Result<String> {
	let schema = schemars::schema_for!(RunConfig);
	Ok(serde_json::to_string_pretty(&schema)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use konverge_api::ServiceKind;

    const CONFIG: &str = r#"
params:
  DOMAIN: example.com
tls:
  certDir: /etc/konverge/tls
  extensions: [ "*.example.com" ]
services:
  - name: ingress
    kind: Release
    namespace: ingress
    sourceURL: https://charts.example.com/ingress-4.2.0.tgz
    waitTimeoutSeconds: 300
  - name: dns
    kind: Script
    scriptRef: /opt/dns.sh
"#;

    #[test]
    fn yaml_config_is_parsed_with_defaults() {
	let config = RunConfig::parse(Path::new("run.yaml"), CONFIG).unwrap();

	assert_eq!(config.ledger.name, "konverge-ledger");
	assert_eq!(config.ledger.namespace, "konverge-system");
	assert_eq!(config.helm.binary, "helm");
	assert_eq!(config.services.len(), 2);
	assert_eq!(config.services[0].kind, ServiceKind::Release);
	assert_eq!(config.services[0].wait_timeout_seconds, Some(300));
	assert_eq!(config.services[1].namespace, "default");

	let settings = config.settings();
	assert_eq!(settings.params.get("DOMAIN").map(String::as_str), Some("example.com"));
	assert_eq!(settings.tls_extensions, vec!["*.example.com"]);
    }

    #[test]
    fn json_config_is_parsed() {
	let raw = r#"{"services":[{"name":"web","kind":"Manifest","sourceURL":"file:///web.yaml"}]}"#;
	let config = RunConfig::parse(Path::new("run.json"), raw).unwrap();

	assert_eq!(config.services[0].source_url.as_deref(), Some("file:///web.yaml"));
    }

    #[test]
    fn duplicate_services_are_rejected() {
	let raw = "services:\n  - {name: a, kind: Script}\n  - {name: a, kind: Release}\n";
	let err = RunConfig::parse(Path::new("run.yaml"), raw).unwrap_err();

	assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn names_escaping_the_scratch_dir_are_rejected() {
	for raw in ["services:\n  - {name: ../etc, kind: Release}\n", "services:\n  - {name: a/b, kind: Manifest}\n"] {
	    let err = RunConfig::parse(Path::new("run.yaml"), raw).unwrap_err();
	    assert_eq!(err.kind(), ErrorKind::Configuration);
	}
    }

    #[test]
    fn schema_mentions_services() {
	assert!(RunConfig::schema().unwrap().contains("sourceURL"));
    }
}
