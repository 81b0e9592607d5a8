use tracing::{debug, info, instrument, trace, warn};

use crate::client::ObjectClient;
use crate::context::SyncContext;
use crate::desired::DesiredSpec;
use crate::diff;
use crate::error::{ClientError, SyncError};
use crate::object::SyncObject;
use crate::owner::{controller_counts, ensure_controller_ref};
use crate::result::{Operation, SyncResult};
use crate::retry::RetryPolicy;

/// Where a single attempt ended.
enum Step {
    Done(Operation),
    Conflict(ClientError),
}

/// Converges one managed object per call toward its [`DesiredSpec`].
///
/// The engine keeps no state between calls; it can be cloned and shared
/// across workers freely.
#[derive(Clone)]
pub struct SyncEngine<C> {
    client: C,
    policy: RetryPolicy,
}

impl<C> SyncEngine<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[instrument(
        skip_all,
        fields(kind = %desired.kind(), ns = %desired.namespace, name = %desired.name)
    )]
    pub async fn sync<K, I>(
        &self,
        ctx: &SyncContext,
        desired: &DesiredSpec<K, I>,
    ) -> SyncResult
    where
        K: SyncObject,
        C: ObjectClient<K>,
        I: Sync,
    {
        let kind = desired.kind();
        let key = desired.key();

        if desired.owner.deleting {
            info!(
                owner = %desired.owner.name,
                "sync: owner is being deleted; skipping"
            );
            return SyncResult::ok(kind, key, Operation::Unchanged, 0);
        }

        let max = self.policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(attempt, max, "sync: attempt");
            match self.attempt(ctx, desired).await {
                Ok(Step::Done(op)) => {
                    return SyncResult::ok(kind, key, op, attempt);
                }
                Ok(Step::Conflict(cause)) => {
                    if attempt >= max {
                        warn!(
                            attempt,
                            error = %cause,
                            "sync: conflict retries exhausted"
                        );
                        return SyncResult::failed(
                            kind,
                            key,
                            SyncError::Conflict { attempts: attempt },
                            attempt,
                        );
                    }
                    let delay = self.policy.delay(attempt);
                    warn!(
                        attempt,
                        error = %cause,
                        delay_ms = delay.as_millis() as u64,
                        "sync: write conflict; retrying"
                    );
                    if let Err(e) = ctx.sleep(delay).await {
                        return SyncResult::failed(kind, key, e, attempt);
                    }
                }
                Err(e) => {
                    debug!(attempt, error = %e, "sync: attempt failed");
                    return SyncResult::failed(kind, key, e, attempt);
                }
            }
        }
    }

    /// Fetch, adopt, mutate, diff and persist once.
    async fn attempt<K, I>(
        &self,
        ctx: &SyncContext,
        desired: &DesiredSpec<K, I>,
    ) -> Result<Step, SyncError>
    where
        K: SyncObject,
        C: ObjectClient<K>,
        I: Sync,
    {
        let fetched = ctx
            .run(self.client.get(&desired.namespace, &desired.name))
            .await?
            .map_err(SyncError::Network)?;
        let exists = fetched.is_some();
        let mut obj = match fetched {
            Some(o) => o,
            None => {
                trace!("sync: object absent; starting from template");
                desired.blank()
            }
        };
        let before = obj.clone();

        if ensure_controller_ref(obj.meta_mut(), &desired.owner)? {
            debug!(
                owner = %desired.owner.name,
                "sync: controller reference stamped"
            );
        }

        desired.apply(&mut obj)?;
        check_invariants(desired, &obj)?;

        if exists && diff::semantically_equal(&before, &obj)? {
            trace!("sync: no semantic change; skipping write");
            return Ok(Step::Done(Operation::Unchanged));
        }
        if exists {
            debug!(
                changed = ?diff::changed_paths(&before, &obj),
                "sync: object differs"
            );
        }

        let written = if exists {
            ctx.run(self.client.update(&obj)).await?
        } else {
            ctx.run(self.client.create(&obj)).await?
        };
        match written {
            Ok(_) => {
                let op = if exists {
                    Operation::Updated
                } else {
                    Operation::Created
                };
                info!(operation = %op, "sync: persisted");
                Ok(Step::Done(op))
            }
            Err(e) if e.is_conflict() => Ok(Step::Conflict(e)),
            // Deleted between fetch and update; the next cycle recreates it.
            Err(e @ ClientError::NotFound(_)) if exists => Ok(Step::Conflict(e)),
            Err(e) => Err(SyncError::Network(e)),
        }
    }
}

/// Identity must survive the mutate function, and so must the single
/// controller reference to our owner.
fn check_invariants<K: SyncObject, I>(
    desired: &DesiredSpec<K, I>,
    obj: &K,
) -> Result<(), SyncError> {
    let meta = obj.meta();
    if meta.name.as_deref() != Some(desired.name.as_str())
        || meta.namespace.as_deref() != Some(desired.namespace.as_str())
    {
        return Err(SyncError::Validation(format!(
            "mutate function changed object identity to {:?}/{:?}",
            meta.namespace, meta.name
        )));
    }
    match controller_counts(meta, &desired.owner) {
        (1, 1) => Ok(()),
        (ours, total) => Err(SyncError::Validation(format!(
            "mutate function left {total} controller references ({ours} to {}/{})",
            desired.owner.kind, desired.owner.name
        ))),
    }
}
