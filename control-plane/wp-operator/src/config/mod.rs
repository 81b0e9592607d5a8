mod types;

pub use types::{OperatorConfig, RequeueConfig, SyncConfig};
