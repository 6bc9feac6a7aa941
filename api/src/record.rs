use crate::service::ServiceSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/*
 * Extra resources tracked along with a release. Only the values override
 * is tracked at the moment, but the list is tagged so new entries can be
 * added without breaking records already stored in the ledger.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppliedResource {
    Override { hash: String },
}

/*
 * AppliedRecord is the ledger entry for a service: a snapshot of the spec
 * that was last reconciled successfully plus what was observed after
 * applying it.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRecord {

    #[serde(flatten)]
    pub spec: ServiceSpec,

    // release revision (as text) right after the last install/upgrade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<AppliedResource>,
}

impl AppliedRecord {

    pub fn new(spec: ServiceSpec) -> Self {
	Self{
	    spec: spec,
	    revision: None,
	    resources: Vec::new(),
	}
    }

    pub fn released(spec: ServiceSpec, revision: i64, override_hash: Option<String>) -> Self {
	let mut resources = Vec::new();
	if let Some(hash) = override_hash {
	    resources.push(AppliedResource::Override{ hash: hash });
	}

	Self{
	    spec: spec,
	    revision: Some(revision.to_string()),
	    resources: resources,
	}
    }

    pub fn name(&self) -> &str {
	&self.spec.name
    }

    pub fn chart_hash(&self) -> Option<&str> {
	self.spec.chart_hash.as_deref()
    }

    pub fn override_hash(&self) -> Option<&str> {
	self.resources.iter()
	    .map(|res| match res { AppliedResource::Override{ hash } => hash.as_str() })
	    .next()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
	serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
	serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceKind;

    #[test]
    fn record_keeps_spec_fields_at_top_level() {
	let mut spec = ServiceSpec::new("svcA", ServiceKind::Release).with_source("http://x/a.tgz");
	spec.chart_hash = Some(String::from("abc"));
	let record = AppliedRecord::released(spec, 3, Some(String::from("def")));

	let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
	assert_eq!(json["name"], "svcA");
	assert_eq!(json["chartHash"], "abc");
	assert_eq!(json["revision"], "3");
	assert_eq!(json["resources"][0]["type"], "override");
	assert_eq!(json["resources"][0]["hash"], "def");
    }

    #[test]
    fn manifest_record_has_no_revision_or_hashes() {
	let raw = r#"{"name":"web","kind":"Manifest","namespace":"apps","sourceURL":"file:///m.yaml"}"#;
	let record = AppliedRecord::from_json(raw).unwrap();

	assert_eq!(record.name(), "web");
	assert_eq!(record.revision, None);
	assert_eq!(record.chart_hash(), None);
	assert_eq!(record.override_hash(), None);
	assert_eq!(record, AppliedRecord::new(record.spec.clone()));
    }
}
