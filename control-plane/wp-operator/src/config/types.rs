use std::time::Duration;

use envconfig::Envconfig;
use wp_syncer::RetryPolicy;

use crate::crd::wordpress::DEFAULT_IMAGE;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace to watch; empty means all namespaces.
    /// Env: WP_OPERATOR_NAMESPACE
    #[envconfig(from = "WP_OPERATOR_NAMESPACE", default = "")]
    pub namespace: String,

    /// Runtime image used when a Wordpress does not name one.
    #[envconfig(from = "WP_OPERATOR_DEFAULT_IMAGE", default = "docker.io/bitpoke/wordpress-runtime")]
    pub default_image: String,

    /// Field manager recorded on writes
    #[envconfig(from = "WP_OPERATOR_FIELD_MANAGER", default = "wordpress-operator")]
    pub field_manager: String,

    /// Reported as the event source instance (downward API).
    #[envconfig(from = "POD_NAME")]
    pub pod_name: Option<String>,

    #[envconfig(nested)]
    pub sync: SyncConfig,

    #[envconfig(nested)]
    pub requeue: RequeueConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct SyncConfig {
    /// Attempts per sync call when writes hit version conflicts.
    #[envconfig(from = "WP_SYNC_MAX_ATTEMPTS", default = "5")]
    pub max_attempts: u32,
    #[envconfig(from = "WP_SYNC_INITIAL_BACKOFF_MS", default = "50")]
    pub initial_backoff_ms: u64,
    #[envconfig(from = "WP_SYNC_MAX_BACKOFF_MS", default = "1000")]
    pub max_backoff_ms: u64,
    /// Deadline for all syncs of one reconciliation.
    #[envconfig(from = "WP_SYNC_TIMEOUT_SECS", default = "30")]
    pub timeout_secs: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RequeueConfig {
    /// Periodic resync after a successful reconcile
    #[envconfig(from = "WP_REQUEUE_RESYNC_SECS", default = "300")]
    pub resync_secs: u64,
    /// First delay after a failed reconcile; doubles per consecutive failure
    #[envconfig(from = "WP_REQUEUE_BASE_SECS", default = "5")]
    pub base_secs: u64,
    #[envconfig(from = "WP_REQUEUE_MAX_SECS", default = "300")]
    pub max_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            default_image: DEFAULT_IMAGE.to_string(),
            field_manager: "wordpress-operator".into(),
            pod_name: None,
            sync: SyncConfig::default(),
            requeue: RequeueConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            resync_secs: 300,
            base_secs: 5,
            max_secs: 300,
        }
    }
}

impl OperatorConfig {
    pub fn watch_namespace(&self) -> Option<&str> {
        let ns = self.namespace.trim();
        (!ns.is_empty()).then_some(ns)
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(
                self.max_backoff_ms.max(self.initial_backoff_ms),
            ),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
