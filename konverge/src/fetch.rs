use crate::errors::{Error, Result};

use async_trait::async_trait;
use log;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/*
 * ArtifactFetcher retrieves a chart archive, a values override or a manifest
 * into a local (scratch) path.
 */
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn pull(&self, dest: &Path, source_url: &str) -> Result<()>;
}

/*
 * Fetches artifacts from:
 *
 *   http(s)://host/path   - a plain GET
 *   file:///some/path     - a local copy
 *   /some/path            - same as file://
 */
pub struct UrlFetcher {
    http: reqwest::Client,
}

impl UrlFetcher {

    pub fn new() -> Self {
	Self{
	    http: reqwest::Client::new(),
	}
    }

    async fn pull_http(&self, dest: &Path, source_url: &str) -> Result<()> {
	let resp = self.http.get(source_url).send().await
	    .map_err(|err| Error::fetch(source_url, err))?;

	let status = resp.status();
	if !status.is_success() {
	    return Err(Error::fetch(source_url, format!("server answered {}", status)));
	}

	let body = resp.bytes().await.map_err(|err| Error::fetch(source_url, err))?;
	fs::write(dest, &body).await?;
	Ok(())
    }

    async fn pull_file(&self, dest: &Path, source_url: &str) -> Result<()> {
	let source = source_url.trim_start_matches("file://");
	if let Err(err) = fs::copy(source, dest).await {
	    return Err(Error::fetch(source_url, err));
	}
	Ok(())
    }
}

impl Default for UrlFetcher {
    fn default() -> Self {
	Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for UrlFetcher {

    async fn pull(&self, dest: &Path, source_url: &str) -> Result<()> {
	log::debug!("Pulling {} into {}", source_url, dest.display());

	match source_url {
	    src if src.starts_with("http://") || src.starts_with("https://") => self.pull_http(dest, src).await,
	    src if src.starts_with("file://") || src.starts_with('/') => self.pull_file(dest, src).await,

	    // else
	    _ => Err(Error::fetch(source_url, "unsupported scheme, valid values are: http://, https://, file://")),
	}
    }
}

/*
 * Hex encoded sha256 of the raw artifact bytes. This is the content hash the
 * ledger compares to decide whether a release has to be upgraded.
 */
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub async fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path).await?;
    Ok(sha256_hex(&data))
}

fn is_param_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
	Some(first) if first.is_ascii_alphabetic() || first == '_' => {},
	_ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/*
 * Replaces every `{{ KEY }}` placeholder with params[KEY], KEY being a plain
 * identifier. A placeholder without a value is an error, leaving it in place
 * would only fail later and far less clearly in the deployer. Anything else
 * between braces (go templates such as `{{ .Values.x }}`) is kept as is.
 */
pub fn render(text: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
	out.push_str(&rest[..start]);

	let after = &rest[start + 2..];
	let end = match after.find("}}") {
	    Some(end) => end,
	    None => return Err(Error::Template(String::from("unterminated `{{` placeholder"))),
	};

	let key = after[..end].trim();
	if !is_param_name(key) {
	    /* not ours, e.g. `{{ .Release.Name }}` meant for the chart */
	    out.push_str(&rest[start..start + 2 + end + 2]);
	} else {
	    match params.get(key) {
		Some(value) => out.push_str(value),
		None => return Err(Error::Template(format!("no value for placeholder `{}`", key))),
	    }
	}
	rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}

/*
 * Renders a text artifact that was already pulled, in place.
 */
pub async fn render_file(path: &Path, params: &BTreeMap<String, String>) -> Result<()> {
    let text = fs::read_to_string(path).await?;
    let rendered = render(&text, params)?;

    fs::write(path, rendered).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, String> {
	let mut params = BTreeMap::new();
	params.insert(String::from("DOMAIN"), String::from("example.com"));
	params
    }

    #[test]
    fn sha256_is_lowercase_hex() {
	assert_eq!(sha256_hex(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn placeholders_are_substituted() {
	let rendered = render("host: web.{{ DOMAIN }}\nother: {{DOMAIN}}", &params()).unwrap();
	assert_eq!(rendered, "host: web.example.com\nother: example.com");
    }

    #[test]
    fn missing_placeholder_value_is_an_error() {
	assert!(render("{{ NOPE }}", &params()).is_err());
	assert!(render("{{ DOMAIN", &params()).is_err());
	assert_eq!(render("no placeholders", &params()).unwrap(), "no placeholders");
    }

    #[test]
    fn chart_templates_are_left_alone() {
	let text = "name: {{ .Release.Name }}\nhost: {{ DOMAIN }}\nlabels: {{- include \"app.labels\" . }}";
	let rendered = render(text, &params()).unwrap();

	assert_eq!(rendered, "name: {{ .Release.Name }}\nhost: example.com\nlabels: {{- include \"app.labels\" . }}");
    }

    #[tokio::test]
    async fn pulls_local_files_and_renders_them() {
	let dir = tempfile::tempdir().unwrap();
	let source = dir.path().join("source.yaml");
	let dest = dir.path().join("dest.yaml");
	std::fs::write(&source, "name: {{ DOMAIN }}").unwrap();

	let fetcher = UrlFetcher::new();
	fetcher.pull(&dest, &format!("file://{}", source.display())).await.unwrap();
	render_file(&dest, &params()).await.unwrap();

	assert_eq!(std::fs::read_to_string(&dest).unwrap(), "name: example.com");
	assert_eq!(hash_file(&dest).await.unwrap(), sha256_hex(b"name: example.com"));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let err = UrlFetcher::new().pull(&dir.path().join("x"), "ftp://host/x").await.unwrap_err();

	assert_eq!(err.kind(), crate::errors::ErrorKind::Fetch);
    }
}
