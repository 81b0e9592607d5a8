use std::fmt;

use kube::{Resource, ResourceExt};
use serde::{Serialize, de::DeserializeOwned};

/// Capability set the engine needs from a managed kind: identity metadata
/// and settable owner references (via [`Resource`]), deep copy (via
/// [`Clone`]) and a serde form for semantic diffing.
///
/// Every statically typed kube resource gets this for free; there is no
/// runtime type dispatch anywhere in the engine.
pub trait SyncObject:
    Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }

    fn object_key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace().unwrap_or_default(),
            name: self.name_any(),
        }
    }
}

impl<K> SyncObject for K where
    K: Resource<DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use kube::api::ObjectMeta;

    #[test]
    fn key_and_kind_from_metadata() {
        let dep = Deployment {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("ns".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(dep.object_key(), ObjectKey::new("ns", "web"));
        assert_eq!(dep.object_key().to_string(), "ns/web");
        assert_eq!(Deployment::kind_name(), "Deployment");
    }
}
