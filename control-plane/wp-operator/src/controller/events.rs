use kube::Resource;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::debug;
use wp_syncer::{EventKind, SyncResult};

use crate::crd::wordpress::Wordpress;

pub const ACTION_SYNC: &str = "Sync";

pub fn sync_event(result: &SyncResult) -> Event {
    let ev = result.event();
    Event {
        type_: match ev.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        },
        reason: ev.reason,
        note: Some(ev.message),
        action: ACTION_SYNC.into(),
        secondary: None,
    }
}

/// Record the outcome on the owning Wordpress. Publishing is best-effort.
pub async fn emit_sync_event(
    recorder: &Recorder,
    owner: &Wordpress,
    result: &SyncResult,
) {
    if let Err(e) = recorder
        .publish(&sync_event(result), &owner.object_ref(&()))
        .await
    {
        debug!(error = %e, "events: publish failed");
    }
}
