use crate::errors::{Error, Result};

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret as KubeSecret;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::api::ObjectMeta;
use kube::api::PostParams as KubePostParams;
use log;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const EXTENSIONS_ANNOTATION: &str = "konverge.io/tls-extensions";

#[async_trait]
pub trait TlsProvisioner: Send + Sync {
    async fn provision(&self, extensions: &[String], service: &str, namespace: &str) -> Result<()>;
}

pub fn secret_name(service: &str) -> String {
    format!("{}-tls", service)
}

/*
 * Certificate/key pair of a service, expected as
 *
 *   <cert_dir>/<service>.crt
 *   <cert_dir>/<service>.key
 *
 * Returns None when the service has no material, i.e. it does not need TLS.
 */
pub async fn read_material(cert_dir: &Path, service: &str) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    let crt = cert_dir.join(format!("{}.crt", service));
    let key = cert_dir.join(format!("{}.key", service));

    match (fs::try_exists(&crt).await?, fs::try_exists(&key).await?) {
	(false, false) => Ok(None),
	(true, true) => Ok(Some((fs::read(&crt).await?, fs::read(&key).await?))),
	_ => {
	    let errmsg = format!("TLS material for {} is incomplete, both {} and {} are required",
				 service, crt.display(), key.display());
	    Err(Error::Configuration(errmsg))
	},
    }
}

/*
 * Makes sure a `kubernetes.io/tls` Secret named `<service>-tls` exists in
 * the service namespace. Secrets already present are left alone, they may
 * have been rotated by something else.
 */
pub struct SecretTlsProvisioner {
    kube_client: KubeClient,
    cert_dir: Option<PathBuf>,
}

impl SecretTlsProvisioner {

    pub fn new(kube_client: KubeClient, cert_dir: Option<PathBuf>) -> Self {
	Self{
	    kube_client: kube_client,
	    cert_dir: cert_dir,
	}
    }
}

#[async_trait]
impl TlsProvisioner for SecretTlsProvisioner {

    async fn provision(&self, extensions: &[String], service: &str, namespace: &str) -> Result<()> {
	let cert_dir = match &self.cert_dir {
	    Some(dir) => dir,
	    None => return Ok(()),
	};

	let (crt, key) = match read_material(cert_dir, service).await? {
	    Some(material) => material,
	    None => {
		log::debug!("No TLS material for {}, skipping", service);
		return Ok(());
	    }
	};

	let secrets: KubeApi<KubeSecret> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	let name = secret_name(service);
	if secrets.get_opt(&name).await?.is_some() {
	    log::debug!("TLS secret {}/{} already present", namespace, name);
	    return Ok(());
	}

	let mut metadata = ObjectMeta::default();
	metadata.name = Some(name.clone());
	metadata.namespace = Some(namespace.to_string());
	if !extensions.is_empty() {
	    let mut annotations = BTreeMap::new();
	    annotations.insert(String::from(EXTENSIONS_ANNOTATION), extensions.join(","));
	    metadata.annotations = Some(annotations);
	}

	let mut data = BTreeMap::new();
	data.insert(String::from("tls.crt"), ByteString(crt));
	data.insert(String::from("tls.key"), ByteString(key));

	let secret = KubeSecret{
	    metadata: metadata,
	    type_: Some(String::from("kubernetes.io/tls")),
	    data: Some(data),
	    ..KubeSecret::default()
	};

	match secrets.create(&KubePostParams::default(), &secret).await {
	    Ok(_) => {
		log::info!("Provisioned TLS secret {}/{}", namespace, name);
		Ok(())
	    },
	    Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
	    Err(err) => Err(Error::from(err)),
	}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn material_is_optional_but_must_be_complete() {
	let dir = tempfile::tempdir().unwrap();

	assert!(read_material(dir.path(), "web").await.unwrap().is_none());

	std::fs::write(dir.path().join("web.crt"), "CERT").unwrap();
	let err = read_material(dir.path(), "web").await.unwrap_err();
	assert_eq!(err.kind(), crate::errors::ErrorKind::Configuration);

	std::fs::write(dir.path().join("web.key"), "KEY").unwrap();
	let (crt, key) = read_material(dir.path(), "web").await.unwrap().unwrap();
	assert_eq!((crt, key), (b"CERT".to_vec(), b"KEY".to_vec()));
    }

    #[test]
    fn secrets_are_named_after_the_service() {
	assert_eq!(secret_name("svcA"), "svcA-tls");
    }
}
