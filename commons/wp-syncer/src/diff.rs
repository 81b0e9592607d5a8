use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SyncError;

/// Metadata fields maintained by the API server.
const SERVER_MANAGED_METADATA: &[&str] = &[
    "resourceVersion",
    "generation",
    "uid",
    "creationTimestamp",
    "managedFields",
    "selfLink",
];

/// Reduce an object to the fields a sync is allowed to change: server
/// bookkeeping and `status` are dropped, and null / empty values are treated
/// as absent (the API server does not distinguish them either).
pub fn normalize<K: Serialize>(obj: &K) -> serde_json::Result<Value> {
    let mut v = serde_json::to_value(obj)?;
    if let Value::Object(ref mut map) = v {
        map.remove("status");
        if let Some(Value::Object(meta)) = map.get_mut("metadata") {
            for f in SERVER_MANAGED_METADATA {
                meta.remove(*f);
            }
        }
    }
    prune(&mut v);
    Ok(v)
}

fn prune(v: &mut Value) {
    match v {
        Value::Object(map) => {
            for child in map.values_mut() {
                prune(child);
            }
            map.retain(|_, child| !is_empty(child));
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                prune(child);
            }
        }
        _ => {}
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// `true` when `a` and `b` differ only in fields a sync never writes. An
/// object that cannot be serialized is a validation failure, never "equal".
pub fn semantically_equal<K: Serialize>(a: &K, b: &K) -> Result<bool, SyncError> {
    let invalid = |e: serde_json::Error| {
        SyncError::Validation(format!("object cannot be serialized: {e}"))
    };
    Ok(normalize(a).map_err(invalid)? == normalize(b).map_err(invalid)?)
}

/// Top-level JSON paths that differ between `a` and `b`, for logging.
pub fn changed_paths<K: Serialize>(a: &K, b: &K) -> Vec<String> {
    let mut out = Vec::new();
    if let (Ok(a), Ok(b)) = (normalize(a), normalize(b)) {
        walk("", &a, &b, &mut out, 0);
    }
    out
}

fn walk(prefix: &str, a: &Value, b: &Value, out: &mut Vec<String>, depth: usize) {
    if a == b {
        return;
    }
    let empty = Map::new();
    match (a, b) {
        (Value::Object(_), _) | (_, Value::Object(_)) if depth < 2 => {
            let am = a.as_object().unwrap_or(&empty);
            let bm = b.as_object().unwrap_or(&empty);
            let mut keys: Vec<&String> = am.keys().chain(bm.keys()).collect();
            keys.sort();
            keys.dedup();
            for k in keys {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                walk(
                    &path,
                    am.get(k).unwrap_or(&Value::Null),
                    bm.get(k).unwrap_or(&Value::Null),
                    out,
                    depth + 1,
                );
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn dep(replicas: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("ns".into()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ignores_server_bookkeeping_and_status() {
        let a = dep(2);
        let mut b = dep(2);
        b.metadata.resource_version = Some("42".into());
        b.metadata.generation = Some(7);
        b.metadata.uid = Some("abc".into());
        b.status = Some(DeploymentStatus {
            ready_replicas: Some(2),
            ..Default::default()
        });
        assert!(semantically_equal(&a, &b).unwrap());
    }

    #[test]
    fn empty_maps_equal_absent() {
        let a = dep(2);
        let mut b = dep(2);
        b.metadata.labels = Some(BTreeMap::new());
        b.metadata.owner_references = Some(vec![]);
        assert!(semantically_equal(&a, &b).unwrap());
    }

    #[test]
    fn detects_spec_change_and_reports_path() {
        let a = dep(2);
        let b = dep(3);
        assert!(!semantically_equal(&a, &b).unwrap());
        assert_eq!(changed_paths(&a, &b), vec!["spec.replicas".to_string()]);
    }

    #[test]
    fn detects_label_change() {
        let a = dep(2);
        let mut b = dep(2);
        b.metadata.labels =
            Some(BTreeMap::from([("app".to_string(), "web".to_string())]));
        assert!(!semantically_equal(&a, &b).unwrap());
        assert_eq!(changed_paths(&a, &b), vec!["metadata.labels".to_string()]);
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no representation"))
        }
    }

    #[test]
    fn serialization_failure_is_not_equality() {
        let err = semantically_equal(&Unserializable, &Unserializable).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(changed_paths(&Unserializable, &Unserializable).is_empty());
    }
}
