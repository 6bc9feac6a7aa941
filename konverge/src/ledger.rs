use crate::errors::{Error, Result};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::ObjectMeta;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use kube::api::PostParams as KubePostParams;
use log;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

/*
 * LedgerStore keeps one serialized AppliedRecord per service name.
 *
 * Records are always written whole (read-modify-write), there is no field
 * level patching. The snapshot is what was loaded by load() plus whatever
 * this process upserted/deleted since.
 */
#[async_trait]
pub trait LedgerStore: Send + Sync {

    /* loads the ledger, returns false when it does not exist yet */
    async fn load(&self) -> Result<bool>;

    async fn create_empty(&self) -> Result<()>;

    async fn upsert(&self, key: &str, record: String) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    fn snapshot(&self) -> BTreeMap<String, String>;
}

fn locked(data: &Mutex<BTreeMap<String, String>>) -> MutexGuard<'_, BTreeMap<String, String>> {
    data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/*
 * Ledger stored in the .data of a kubernetes ConfigMap, one key per
 * service.
 *
 *   kind: ConfigMap
 *   metadata:
 *     name: konverge-ledger
 *     namespace: konverge-system
 *   data:
 *     svcA: '{"name":"svcA","kind":"Release", [ ... ] "revision":"1"}'
 */
pub struct ConfigMapLedger {
    name: String,
    namespace: String,
    configmaps: KubeApi<KubeConfigMap>,
    data: Mutex<BTreeMap<String, String>>,
}

impl ConfigMapLedger {

    pub fn new(kube_client: KubeClient, name: &str, namespace: &str) -> Self {
	Self{
	    name: name.to_string(),
	    namespace: namespace.to_string(),
	    configmaps: KubeApi::namespaced(kube_client, namespace),
	    data: Mutex::new(BTreeMap::new()),
	}
    }

    pub fn default_labels(&self) -> BTreeMap<String, String> {
	let mut labels = BTreeMap::new();

	labels.insert(String::from("konverge.io/ledger"), self.name.clone());
	labels.insert(String::from("konverge.io/managed"), String::from("true"));
	labels
    }

    async fn patch_data(&self, key: &str, value: serde_json::Value) -> Result<()> {
	let mut data = serde_json::Map::new();
	data.insert(key.to_string(), value);

	let patch = json!({ "data": data });
	let opts = KubePatchParams::default();

	self.configmaps.patch(&self.name, &opts, &KubePatch::Merge(&patch)).await?;
	Ok(())
    }
}

#[async_trait]
impl LedgerStore for ConfigMapLedger {

    async fn load(&self) -> Result<bool> {
	match self.configmaps.get_opt(&self.name).await? {
	    Some(configmap) => {
		let data = configmap.data.unwrap_or_default();
		log::debug!("Loaded ledger {}/{} with {} entries", self.namespace, self.name, data.len());

		*locked(&self.data) = data;
		Ok(true)
	    },
	    None => Ok(false),
	}
    }

    async fn create_empty(&self) -> Result<()> {
	let mut metadata = ObjectMeta::default();
	metadata.name = Some(self.name.clone());
	metadata.namespace = Some(self.namespace.clone());
	metadata.labels = Some(self.default_labels());

	let configmap = KubeConfigMap{
	    metadata: metadata,
	    data: Some(BTreeMap::new()),
	    ..KubeConfigMap::default()
	};

	match self.configmaps.create(&KubePostParams::default(), &configmap).await {
	    Ok(_) => {
		log::info!("Created empty ledger {}/{}", self.namespace, self.name);
		locked(&self.data).clear();
		Ok(())
	    },
	    Err(kube::Error::Api(resp)) if resp.code == 409 => {
		/* someone else created it, and it may already hold records */
		log::warn!("Ledger {}/{} showed up while we were creating it, reloading", self.namespace, self.name);
		match self.load().await? {
		    true => Ok(()),
		    false => Err(Error::Ledger(format!("ledger {}/{} conflicts but can not be read", self.namespace, self.name))),
		}
	    },
	    Err(err) => Err(Error::from(err)),
	}
    }

    async fn upsert(&self, key: &str, record: String) -> Result<()> {
	self.patch_data(key, serde_json::Value::String(record.clone())).await?;

	locked(&self.data).insert(key.to_string(), record);
	Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
	/* a null value removes the key in a json merge patch */
	self.patch_data(key, serde_json::Value::Null).await?;

	locked(&self.data).remove(key);
	Ok(())
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
	locked(&self.data).clone()
    }
}

/*
 * Ledger kept in memory only, for runs that must not touch the cluster
 * state bookkeeping and for tests.
 */
#[derive(Default)]
pub struct MemoryLedger {
    exists: Mutex<bool>,
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryLedger {

    pub fn new() -> Self {
	Self::default()
    }

    pub fn with_entries(entries: BTreeMap<String, String>) -> Self {
	Self{
	    exists: Mutex::new(true),
	    data: Mutex::new(entries),
	}
    }

    fn exists(&self) -> bool {
	*self.exists.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn require(&self) -> Result<()> {
	match self.exists() {
	    true => Ok(()),
	    false => Err(Error::Ledger(String::from("ledger was not created"))),
	}
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {

    async fn load(&self) -> Result<bool> {
	Ok(self.exists())
    }

    async fn create_empty(&self) -> Result<()> {
	*self.exists.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
	locked(&self.data).clear();
	Ok(())
    }

    async fn upsert(&self, key: &str, record: String) -> Result<()> {
	self.require()?;
	locked(&self.data).insert(key.to_string(), record);
	Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
	self.require()?;
	locked(&self.data).remove(key);
	Ok(())
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
	locked(&self.data).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Request, Response, StatusCode};
    use kube::client::Body;
    use std::convert::Infallible;

    fn answer(status: StatusCode, body: serde_json::Value) -> Response<Body> {
	Response::builder()
	    .status(status)
	    .body(Body::from(serde_json::to_vec(&body).unwrap()))
	    .unwrap()
    }

    /*
     * An API server where the ledger ConfigMap already exists: creating it
     * conflicts, reading it returns one record.
     */
    fn existing_ledger_cluster() -> KubeClient {
	let service = tower::service_fn(|request: Request<Body>| async move {
	    let response = match *request.method() {
		Method::POST => answer(StatusCode::CONFLICT, json!({
		    "apiVersion": "v1",
		    "kind": "Status",
		    "metadata": {},
		    "status": "Failure",
		    "message": "configmaps \"konverge-ledger\" already exists",
		    "reason": "AlreadyExists",
		    "code": 409,
		})),
		_ => answer(StatusCode::OK, json!({
		    "apiVersion": "v1",
		    "kind": "ConfigMap",
		    "metadata": { "name": "konverge-ledger", "namespace": "konverge-system" },
		    "data": { "gone": "{\"name\":\"gone\",\"kind\":\"Release\"}" },
		})),
	    };
	    Ok::<_, Infallible>(response)
	});
	KubeClient::new(service, "konverge-system")
    }

    #[tokio::test]
    async fn conflicting_create_reloads_existing_records() {
	let ledger = ConfigMapLedger::new(existing_ledger_cluster(), "konverge-ledger", "konverge-system");

	ledger.create_empty().await.unwrap();

	assert_eq!(ledger.snapshot().into_keys().collect::<Vec<_>>(), vec![String::from("gone")]);
    }

    #[tokio::test]
    async fn memory_ledger_must_be_created_before_writes() {
	let ledger = MemoryLedger::new();

	assert!(!ledger.load().await.unwrap());
	assert!(ledger.upsert("svc", String::from("{}")).await.is_err());

	ledger.create_empty().await.unwrap();
	assert!(ledger.load().await.unwrap());

	ledger.upsert("svc", String::from("{}")).await.unwrap();
	assert_eq!(ledger.snapshot().get("svc").map(String::as_str), Some("{}"));

	ledger.delete("svc").await.unwrap();
	assert!(ledger.snapshot().is_empty());
    }
}
