use serde_json::{Value, json};
use wp_syncer::SyncSummary;

use crate::crd::wordpress::WordpressStatus;

pub fn from_summary(
    generation: Option<i64>,
    summary: &SyncSummary,
    now: String,
) -> WordpressStatus {
    WordpressStatus {
        observed_generation: generation,
        last_updated: Some(now),
        message: Some(summary.message()),
        last_error_kind: summary
            .last_error()
            .and_then(|r| r.error_kind())
            .map(|k| k.to_string()),
    }
}

/// Compare ignoring `last_updated`, so a steady state does not patch on
/// every resync.
pub fn should_patch_status(
    current: Option<&WordpressStatus>,
    desired: &WordpressStatus,
) -> bool {
    match current {
        None => true,
        Some(cur) => {
            let strip = |s: &WordpressStatus| WordpressStatus {
                last_updated: None,
                ..s.clone()
            };
            strip(cur) != strip(desired)
        }
    }
}

/// Merge patch body; a cleared error kind is sent as an explicit null.
pub fn status_patch(status: &WordpressStatus) -> Value {
    json!({
        "status": {
            "observedGeneration": status.observed_generation,
            "lastUpdated": status.last_updated,
            "message": status.message,
            "lastErrorKind": status.last_error_kind,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_syncer::{ObjectKey, Operation, SyncError, SyncResult};

    fn ok_summary() -> SyncSummary {
        let mut s = SyncSummary::new();
        s.push(SyncResult::ok(
            "Deployment".into(),
            ObjectKey::new("ns", "blog"),
            Operation::Updated,
            1,
        ));
        s
    }

    #[test]
    fn failure_kind_is_reported() {
        let mut s = ok_summary();
        s.push(SyncResult::failed(
            "Deployment".into(),
            ObjectKey::new("ns", "blog"),
            SyncError::Cancelled,
            1,
        ));
        let st = from_summary(Some(4), &s, "t0".into());
        assert_eq!(st.observed_generation, Some(4));
        assert_eq!(st.last_error_kind.as_deref(), Some("Cancelled"));
        assert_eq!(
            st.message.as_deref(),
            Some("Deployment ns/blog failed syncing: sync cancelled")
        );
    }

    #[test]
    fn timestamp_only_change_is_skipped() {
        let a = from_summary(Some(1), &ok_summary(), "t0".into());
        let b = from_summary(Some(1), &ok_summary(), "t1".into());
        assert!(!should_patch_status(Some(&a), &b));
        assert!(should_patch_status(None, &b));
        let c = from_summary(Some(2), &ok_summary(), "t1".into());
        assert!(should_patch_status(Some(&a), &c));
    }

    #[test]
    fn patch_clears_error_kind() {
        let st = from_summary(Some(1), &ok_summary(), "t0".into());
        let patch = status_patch(&st);
        assert_eq!(patch["status"]["lastErrorKind"], Value::Null);
        assert!(patch["status"].as_object().unwrap().contains_key("lastErrorKind"));
        assert_eq!(patch["status"]["observedGeneration"], json!(1));
    }
}
