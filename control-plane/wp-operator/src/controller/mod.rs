pub mod backoff;
pub mod events;
pub mod status;

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    Client, Resource, ResourceExt,
    api::{Api, Patch, PatchParams},
    runtime::{
        Controller,
        controller::Action,
        events::{Recorder, Reporter},
        watcher::Config,
    },
};
use tokio::time::Duration;
use tracing::{error, info, instrument, warn};
use wp_syncer::{
    ErrorKind, KubeObjectClient, OwnerDescriptor, SyncContext, SyncEngine,
    SyncSummary,
};

use crate::config::OperatorConfig;
use crate::crd::wordpress::Wordpress;
use crate::sync::deployment_syncer;
use backoff::RequeueBackoff;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{kind}: {message}")]
    Sync {
        kind: ErrorKind,
        transient: bool,
        message: String,
    },
}

impl ReconcileErr {
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileErr::Internal(_) => true,
            ReconcileErr::Sync { transient, .. } => *transient,
        }
    }
}

pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub engine: SyncEngine<KubeObjectClient>,
    pub recorder: Recorder,
    pub backoff: RequeueBackoff,
}

impl ControllerContext {
    pub fn new(client: Client, cfg: OperatorConfig) -> Self {
        let objects = KubeObjectClient::new(client.clone())
            .with_field_manager(cfg.field_manager.clone());
        let engine = SyncEngine::new(objects, cfg.sync.retry_policy());
        let reporter = Reporter {
            controller: cfg.field_manager.clone(),
            instance: cfg.pod_name.clone(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        let backoff = RequeueBackoff::new(
            Duration::from_secs(cfg.requeue.base_secs),
            Duration::from_secs(cfg.requeue.max_secs),
        );
        Self {
            client,
            cfg,
            engine,
            recorder,
            backoff,
        }
    }
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let (wp_api, dep_api): (Api<Wordpress>, Api<Deployment>) =
        match cfg.watch_namespace() {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone())),
        };
    let ctx = Arc::new(ControllerContext::new(client, cfg));

    Controller::new(wp_api, Config::default())
        .owns(dep_api, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(object = %obj_ref, "reconciled: requeue={:?}", action)
                }
                Err(e) => warn!(error = %e, "reconcile error"),
            }
        })
        .await;

    info!("controller stopped");
    Ok(())
}

#[instrument(skip_all, fields(ns = ?obj.namespace(), name = %obj.name_any()))]
async fn reconcile(
    obj: Arc<Wordpress>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let key = format!("{ns}/{name}");

    let owner = OwnerDescriptor::from_resource(obj.as_ref()).ok_or_else(|| {
        ReconcileErr::Internal(format!("{key} has no name or uid"))
    })?;
    if owner.deleting {
        // garbage collection removes the children
        ctx.backoff.reset(&key);
        return Ok(Action::await_change());
    }

    let sync_ctx = SyncContext::new().with_timeout(ctx.cfg.sync.timeout());
    let mut summary = SyncSummary::new();
    let desired = deployment_syncer(&obj, owner, &ctx.cfg.default_image);
    summary.push(ctx.engine.sync(&sync_ctx, &desired).await);

    for result in summary.results().iter().filter(|r| r.should_report()) {
        events::emit_sync_event(&ctx.recorder, &obj, result).await;
    }

    let desired_status = status::from_summary(
        obj.meta().generation,
        &summary,
        Utc::now().to_rfc3339(),
    );
    if status::should_patch_status(obj.status.as_ref(), &desired_status) {
        let wp_api: Api<Wordpress> = Api::namespaced(ctx.client.clone(), &ns);
        wp_api
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(&status::status_patch(&desired_status)),
            )
            .await
            .map_err(into_internal)?;
    }

    if let Some(failed) = summary.last_error() {
        let kind = failed.error_kind().unwrap_or(ErrorKind::Network);
        return Err(ReconcileErr::Sync {
            kind,
            transient: summary.is_transient(),
            message: summary.message(),
        });
    }

    ctx.backoff.reset(&key);
    info!(message = %summary.message(), "reconcile: in sync");
    Ok(Action::requeue(Duration::from_secs(ctx.cfg.requeue.resync_secs)))
}

fn into_internal<E: std::fmt::Display>(e: E) -> ReconcileErr {
    ReconcileErr::Internal(e.to_string())
}

fn error_policy(
    obj: Arc<Wordpress>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    let key = format!(
        "{}/{}",
        obj.namespace().unwrap_or_else(|| "default".to_string()),
        obj.name_any()
    );
    let delay = ctx.backoff.next_delay(&key, err.is_transient());
    error!(object = %key, error = %err, ?delay, "reconcile failed; requeueing");
    Action::requeue(delay)
}
