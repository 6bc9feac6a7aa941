/*
 * konverge/api - the objects shared by the reconciler and its collaborators:
 * the desired service specs, the ledger records and the live release status
 */

pub mod service;
pub use service::ServiceKind;
pub use service::ServiceSpec;
pub use service::DEFAULT_NAMESPACE;

pub mod record;
pub use record::AppliedRecord;
pub use record::AppliedResource;

pub mod status;
pub use status::DeployedStatus;
pub use status::ReleaseStatus;
