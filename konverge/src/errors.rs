use thiserror::Error;

/*
 * Symbolic classification of an Error, so callers can branch on what went
 * wrong rather than on the message text.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownStatus,
    WrongStatus,
    WrongOperation,
    Configuration,
    Fetch,
    Template,
    Deploy,
    Ledger,
    Kube,
    Io,
    Serialization,
}

#[derive(Error, Debug)]
pub enum Error {

    /* the release deployer could not tell what state the service is in */
    #[error("service {service}: release status is Unknown")]
    UnknownStatus { service: String },

    /* live status we do not know how to converge from */
    #[error("service {service}: wrong status `{status}`")]
    WrongStatus { service: String, status: String },

    #[error("service {service}: {reason}")]
    WrongOperation { service: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unable to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("template error: {0}")]
    Template(String),

    #[error("{deployer} failed: {reason}")]
    Deploy { deployer: String, reason: String },

    #[error("ledger error: {0}")]
    Ledger(String),

    /* encapsulate a kube-rust error */
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {

    pub fn kind(&self) -> ErrorKind {
	match self {
	    Error::UnknownStatus{ .. } => ErrorKind::UnknownStatus,
	    Error::WrongStatus{ .. } => ErrorKind::WrongStatus,
	    Error::WrongOperation{ .. } => ErrorKind::WrongOperation,
	    Error::Configuration(_) => ErrorKind::Configuration,
	    Error::Fetch{ .. } => ErrorKind::Fetch,
	    Error::Template(_) => ErrorKind::Template,
	    Error::Deploy{ .. } => ErrorKind::Deploy,
	    Error::Ledger(_) => ErrorKind::Ledger,
	    Error::Kube(_) => ErrorKind::Kube,
	    Error::Io(_) => ErrorKind::Io,
	    Error::Json(_) | Error::Yaml(_) => ErrorKind::Serialization,
	}
    }

    /*
     * Uninstalling something that is already gone is reported by the
     * deployers with a "NotFound" reason somewhere in the message.
     */
    pub fn is_not_found(&self) -> bool {
	match self {
	    Error::Kube(kube::Error::Api(resp)) => resp.code == 404 || resp.reason == "NotFound",
	    other => other.to_string().contains("NotFound"),
	}
    }

    pub fn deploy(deployer: &str, reason: impl ToString) -> Self {
	Error::Deploy{ deployer: deployer.to_string(), reason: reason.to_string() }
    }

    pub fn fetch(url: &str, reason: impl ToString) -> Self {
	Error::Fetch{ url: url.to_string(), reason: reason.to_string() }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected_from_message() {
	let err = Error::deploy("manifest", "deployments.apps \"web\" NotFound");
	assert!(err.is_not_found());

	let err = Error::deploy("manifest", "connection refused");
	assert!(!err.is_not_found());
    }

    #[test]
    fn kinds_are_symbolic() {
	let err = Error::WrongStatus{ service: String::from("svc"), status: String::from("failed") };
	assert_eq!(err.kind(), ErrorKind::WrongStatus);
	assert_eq!(err.to_string(), "service svc: wrong status `failed`");

	assert_eq!(Error::Configuration(String::from("x")).kind(), ErrorKind::Configuration);
    }
}
