use std::fmt;

/*
 * Live status of a package release as reported by a release deployer.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployedStatus {
    NotDeployed,
    Deployed,
    Pending,
    Unknown,

    /*
     * anything the deployer reported that we do not know how to handle,
     * kept verbatim for error reporting
     */
    Other(String),
}

impl DeployedStatus {

    pub fn from_label(label: &str) -> Self {
	match label {
	    "Deployed" => DeployedStatus::Deployed,
	    "Not Deployed" => DeployedStatus::NotDeployed,
	    "Pending" => DeployedStatus::Pending,
	    "Unknown" => DeployedStatus::Unknown,
	    other => DeployedStatus::Other(other.to_string()),
	}
    }

    pub fn label(&self) -> &str {
	match self {
	    DeployedStatus::NotDeployed => "Not Deployed",
	    DeployedStatus::Deployed => "Deployed",
	    DeployedStatus::Pending => "Pending",
	    DeployedStatus::Unknown => "Unknown",
	    DeployedStatus::Other(label) => label.as_str(),
	}
    }
}

impl fmt::Display for DeployedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStatus {
    pub status: DeployedStatus,
    pub revision: i64,
}

impl ReleaseStatus {

    pub fn new(label: &str, revision: i64) -> Self {
	Self{
	    status: DeployedStatus::from_label(label),
	    revision: revision,
	}
    }

    pub fn not_deployed() -> Self {
	Self{
	    status: DeployedStatus::NotDeployed,
	    revision: 0,
	}
    }

    pub fn revision_label(&self) -> String {
	self.revision.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_parsed() {
	assert_eq!(DeployedStatus::from_label("Deployed"), DeployedStatus::Deployed);
	assert_eq!(DeployedStatus::from_label("Not Deployed"), DeployedStatus::NotDeployed);
	assert_eq!(DeployedStatus::from_label("Pending"), DeployedStatus::Pending);
	assert_eq!(DeployedStatus::from_label("Unknown"), DeployedStatus::Unknown);
	assert_eq!(DeployedStatus::from_label("failed"), DeployedStatus::Other(String::from("failed")));
	assert_eq!(DeployedStatus::from_label("failed").label(), "failed");
    }
}
