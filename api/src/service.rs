use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_NAMESPACE: &str = "default";
const MAX_NAME_LEN: usize = 253;

fn default_namespace() -> String {
    String::from(DEFAULT_NAMESPACE)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ServiceKind {
    /*
     * Plain kubernetes manifests, applied as-is (server-side apply)
     */
    Manifest,

    /*
     * A packaged chart release, tracked by release revision and
     * content hashes
     */
    Release,

    /*
     * Deployed by an operator supplied script, never tracked in the ledger
     */
    Script,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self {
	    ServiceKind::Manifest => write!(f, "manifest"),
	    ServiceKind::Release => write!(f, "release"),
	    ServiceKind::Script => write!(f, "script"),
	}
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {

    // unique key of the service, also used as the ledger key and release name
    pub name: String,

    pub kind: ServiceKind,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    // where the manifest or the chart archive is pulled from
    #[serde(rename = "sourceURL", default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    // chart reference handed verbatim to the release deployer when no
    // sourceURL is given, e.g. `bitnami/nginx` or `oci://registry/chart`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,

    // values override file for releases
    #[serde(rename = "overrideURL", default, skip_serializing_if = "Option::is_none")]
    pub override_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_seconds: Option<u64>,

    // sha256 of the chart archive; computed during reconciliation unless
    // supplied by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_hash: Option<String>,
}

impl ServiceSpec {

    pub fn new(name: &str, kind: ServiceKind) -> Self {
	Self{
	    name: name.to_string(),
	    kind: kind,
	    namespace: default_namespace(),
	    source_url: None,
	    chart: None,
	    override_url: None,
	    script_ref: None,
	    wait_timeout_seconds: None,
	    chart_hash: None,
	}
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
	self.namespace = namespace.to_string();
	self
    }

    pub fn with_source(mut self, url: &str) -> Self {
	self.source_url = Some(url.to_string());
	self
    }

    pub fn with_override(mut self, url: &str) -> Self {
	self.override_url = Some(url.to_string());
	self
    }

    pub fn with_script(mut self, script: &str) -> Self {
	self.script_ref = Some(script.to_string());
	self
    }

    pub fn with_wait(mut self, seconds: u64) -> Self {
	self.wait_timeout_seconds = Some(seconds);
	self
    }

    pub fn is_default_namespace(&self) -> bool {
	self.namespace.is_empty() || self.namespace == DEFAULT_NAMESPACE
    }

    /*
     * The name keys the ledger ConfigMap and names scratch files, so it
     * must be a valid ConfigMap key: [-._a-zA-Z0-9]+, at most 253 long,
     * and neither "." nor "..".
     */
    pub fn has_valid_name(&self) -> bool {
	let name = self.name.as_str();

	!name.is_empty() && name.len() <= MAX_NAME_LEN && name != "." && name != ".."
	    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_configmap_keys() {
	for name in ["svcA", "ingress-nginx", "cert_manager.v1"] {
	    assert!(ServiceSpec::new(name, ServiceKind::Release).has_valid_name(), "{}", name);
	}
	for name in ["", ".", "..", "../etc", "a/b", "with space", "ümlaut"] {
	    assert!(!ServiceSpec::new(name, ServiceKind::Release).has_valid_name(), "{}", name);
	}
	assert!(!ServiceSpec::new(&"a".repeat(254), ServiceKind::Release).has_valid_name());
    }

    #[test]
    fn namespace_defaults_when_missing() {
	let spec: ServiceSpec = serde_json::from_str(r#"{"name":"svcA","kind":"Release","sourceURL":"http://x/a.tgz"}"#).unwrap();

	assert_eq!(spec.namespace, "default");
	assert!(spec.is_default_namespace());
	assert_eq!(spec.source_url.as_deref(), Some("http://x/a.tgz"));
	assert_eq!(spec.chart_hash, None);
    }

    #[test]
    fn unset_fields_are_not_serialized() {
	let spec = ServiceSpec::new("web", ServiceKind::Manifest).with_namespace("apps");
	let json = serde_json::to_value(&spec).unwrap();

	assert_eq!(json, serde_json::json!({"name": "web", "kind": "Manifest", "namespace": "apps"}));
    }
}
