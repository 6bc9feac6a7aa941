use crate::deploy::{ManifestDeployer, ManifestTarget};
use crate::errors::{Error, Result};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::DeleteParams as KubeDeleteParams;
use kube::api::DynamicObject;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use kube::core::GroupVersionKind;
use kube::discovery::Discovery as KubeDiscovery;
use kube::discovery::Scope as KubeScope;
use log;
use serde::Deserialize;
use std::time::Duration;
use tokio::fs;

const FIELD_MANAGER: &str = "konverge";
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/*
 * Splits a (possibly multi-document) yaml manifest into dynamic objects,
 * skipping empty documents.
 */
pub fn parse_documents(text: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = vec![];

    for document in serde_yaml::Deserializer::from_str(text) {
	let value = serde_yaml::Value::deserialize(document)?;
	if value.is_null() {
	    continue;
	}
	objects.push(serde_yaml::from_value(value)?);
    }

    Ok(objects)
}

fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind> {
    let types = match &obj.types {
	Some(types) => types,
	None => {
	    let errmsg = format!("object {:?} has no apiVersion/kind", obj.metadata.name);
	    return Err(Error::deploy("manifest", errmsg));
	}
    };

    let (group, version) = match types.api_version.split_once('/') {
	Some((group, version)) => (group, version),
	None => ("", types.api_version.as_str()),
    };

    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/*
 * ManifestDeployer that server-side applies every object of the manifest,
 * resolving each kind through the cluster discovery API.
 */
pub struct KubeManifestDeployer {
    kube_client: KubeClient,
}

impl KubeManifestDeployer {

    pub fn new(kube_client: KubeClient) -> Self {
	Self{
	    kube_client: kube_client,
	}
    }

    async fn objects(&self, target: &ManifestTarget) -> Result<Vec<DynamicObject>> {
	let text = fs::read_to_string(&target.manifest).await?;
	parse_documents(&text)
    }

    async fn discover(&self) -> Result<KubeDiscovery> {
	Ok(KubeDiscovery::new(self.kube_client.clone()).run().await?)
    }

    fn dynamic_api(&self, discovery: &KubeDiscovery, obj: &DynamicObject, namespace: &str) -> Result<KubeApi<DynamicObject>> {
	let gvk = gvk_of(obj)?;
	let (resource, caps) = match discovery.resolve_gvk(&gvk) {
	    Some(found) => found,
	    None => {
		let errmsg = format!("NotFound: the cluster does not serve {}/{} {}", gvk.group, gvk.version, gvk.kind);
		return Err(Error::deploy(self.name(), errmsg));
	    }
	};

	let api = match caps.scope {
	    KubeScope::Cluster => KubeApi::all_with(self.kube_client.clone(), &resource),
	    KubeScope::Namespaced => {
		let namespace = obj.metadata.namespace.as_deref().unwrap_or(namespace);
		KubeApi::namespaced_with(self.kube_client.clone(), namespace, &resource)
	    },
	};
	Ok(api)
    }

    async fn poll_deployment(&self, deployments: &KubeApi<KubeDeployment>, name: &str) -> Result<()> {
	loop {
	    if let Some(deployment) = deployments.get_opt(name).await? {
		let wanted = deployment.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
		let available = deployment.status.as_ref().and_then(|status| status.available_replicas).unwrap_or(0);
		if available >= wanted {
		    return Ok(());
		}
		log::debug!("Waiting for deployment {}: {}/{} available", name, available, wanted);
	    }
	    tokio::time::sleep(WAIT_POLL_INTERVAL).await;
	}
    }

    async fn wait_deployment(&self, name: &str, namespace: &str, timeout: Duration) -> Result<()> {
	let deployments: KubeApi<KubeDeployment> = KubeApi::namespaced(self.kube_client.clone(), namespace);

	match tokio::time::timeout(timeout, self.poll_deployment(&deployments, name)).await {
	    Ok(result) => result,
	    Err(_) => {
		let errmsg = format!("timed out after {:?} waiting for deployment {}/{}", timeout, namespace, name);
		Err(Error::deploy(self.name(), errmsg))
	    }
	}
    }
}

#[async_trait]
impl ManifestDeployer for KubeManifestDeployer {

    fn name(&self) -> &str {
	"kube-manifest"
    }

    async fn install(&self, target: &ManifestTarget) -> Result<()> {
	let objects = self.objects(target).await?;
	let discovery = self.discover().await?;
	let params = KubePatchParams::apply(FIELD_MANAGER).force();

	for obj in &objects {
	    let name = match &obj.metadata.name {
		Some(name) => name,
		None => return Err(Error::deploy(self.name(), "manifest object without .metadata.name")),
	    };

	    let api = self.dynamic_api(&discovery, obj, &target.namespace)?;
	    log::debug!("Applying {:?} {}", obj.types, name);
	    api.patch(name, &params, &KubePatch::Apply(obj)).await?;
	}

	if let Some(seconds) = target.wait_timeout_seconds {
	    for obj in objects.iter().filter(|obj| obj.types.as_ref().map(|t| t.kind == "Deployment").unwrap_or(false)) {
		let name = obj.metadata.name.as_deref().unwrap_or_default();
		let namespace = obj.metadata.namespace.as_deref().unwrap_or(&target.namespace);
		self.wait_deployment(name, namespace, Duration::from_secs(seconds)).await?;
	    }
	}

	log::info!("Applied {} object(s) of {}", objects.len(), target.name);
	Ok(())
    }

    async fn uninstall(&self, target: &ManifestTarget) -> Result<()> {
	let objects = self.objects(target).await?;
	let discovery = self.discover().await?;

	/* reverse order, so namespaced things go away before their namespace/CRD */
	for obj in objects.iter().rev() {
	    let name = match &obj.metadata.name {
		Some(name) => name,
		None => continue,
	    };

	    let deleted = match self.dynamic_api(&discovery, obj, &target.namespace) {
		Ok(api) => api.delete(name, &KubeDeleteParams::default()).await.map(|_| ()).map_err(Error::from),
		Err(err) => Err(err),
	    };

	    match deleted {
		Ok(()) => log::debug!("Deleted {:?} {}", obj.types, name),
		Err(err) if err.is_not_found() => log::debug!("{:?} {} already gone", obj.types, name),
		Err(err) => return Err(err),
	    }
	}

	Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: web-config
data:
  key: value
---
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: apps
spec:
  replicas: 2
"#;

    #[test]
    fn multi_document_manifests_are_split() {
	let objects = parse_documents(MANIFEST).unwrap();

	assert_eq!(objects.len(), 2);
	assert_eq!(objects[0].metadata.name.as_deref(), Some("web-config"));
	assert_eq!(objects[1].metadata.namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn group_version_kind_is_derived_from_api_version() {
	let objects = parse_documents(MANIFEST).unwrap();

	let core = gvk_of(&objects[0]).unwrap();
	assert_eq!((core.group.as_str(), core.version.as_str(), core.kind.as_str()), ("", "v1", "ConfigMap"));

	let apps = gvk_of(&objects[1]).unwrap();
	assert_eq!((apps.group.as_str(), apps.version.as_str(), apps.kind.as_str()), ("apps", "v1", "Deployment"));
    }
}
