//! Desired-state builders for the objects a Wordpress owns. Each managed
//! kind contributes one `DesiredSpec` per reconciliation.

pub mod deployment;

pub use deployment::{WebDeploymentInputs, deployment_syncer};
