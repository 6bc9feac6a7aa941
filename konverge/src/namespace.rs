use crate::errors::{Error, Result};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace as KubeNamespace;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::ObjectMeta;
use kube::api::PostParams as KubePostParams;
use log;

#[async_trait]
pub trait NamespaceEnsurer: Send + Sync {

    /* creates the namespace, an already existing namespace is not an error */
    async fn create_namespace(&self, namespace: &str) -> Result<()>;
}

pub struct KubeNamespaces {
    namespaces: KubeApi<KubeNamespace>,
}

impl KubeNamespaces {

    pub fn new(kube_client: KubeClient) -> Self {
	Self{
	    namespaces: KubeApi::all(kube_client),
	}
    }
}

#[async_trait]
impl NamespaceEnsurer for KubeNamespaces {

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
	let mut metadata = ObjectMeta::default();
	metadata.name = Some(namespace.to_string());

	let new = KubeNamespace{
	    metadata: metadata,
	    ..KubeNamespace::default()
	};

	match self.namespaces.create(&KubePostParams::default(), &new).await {
	    Ok(_) => {
		log::info!("Created namespace {}", namespace);
		Ok(())
	    },
	    Err(kube::Error::Api(resp)) if resp.code == 409 => {
		log::debug!("Namespace {} already exists", namespace);
		Ok(())
	    },
	    Err(err) => Err(Error::from(err)),
	}
    }
}
