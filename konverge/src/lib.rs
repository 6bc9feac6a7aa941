/*
 * konverge - converges cluster services (manifests, chart releases and
 * scripted deployments) toward a declared set, one pass per invocation,
 * keeping a ledger of what was applied.
 */

pub mod config;
pub mod deploy;
pub mod errors;
pub mod fetch;
pub mod ledger;
pub mod namespace;
pub mod reconciler;
pub mod script;
pub mod tls;

pub use errors::{Error, ErrorKind, Result};
pub use reconciler::{Collaborators, Outcome, Reconciler, RunSettings, Summary};
