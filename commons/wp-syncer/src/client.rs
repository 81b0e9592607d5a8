use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use tracing::trace;

use crate::error::ClientError;
use crate::object::SyncObject;

pub type ClientResult<T> = Result<T, ClientError>;

/// Fetch/create/update primitives for one managed kind.
///
/// `update` must be guarded by the `resourceVersion` carried in the object
/// and report a stale version as [`ClientError::Conflict`].
#[async_trait]
pub trait ObjectClient<K: SyncObject>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> ClientResult<Option<K>>;
    async fn create(&self, obj: &K) -> ClientResult<K>;
    async fn update(&self, obj: &K) -> ClientResult<K>;
}

/// [`ObjectClient`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeObjectClient {
    client: Client,
    field_manager: Option<String>,
}

impl KubeObjectClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: None,
        }
    }

    pub fn with_field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = Some(manager.into());
        self
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: self.field_manager.clone(),
        }
    }
}

#[async_trait]
impl<K> ObjectClient<K> for KubeObjectClient
where
    K: SyncObject + Resource<Scope = NamespaceResourceScope>,
{
    async fn get(&self, namespace: &str, name: &str) -> ClientResult<Option<K>> {
        trace!(%namespace, %name, kind = %K::kind_name(), "client: get");
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(classify)
    }

    async fn create(&self, obj: &K) -> ClientResult<K> {
        let ns = obj.namespace().unwrap_or_default();
        self.api::<K>(&ns)
            .create(&self.post_params(), obj)
            .await
            .map_err(classify)
    }

    async fn update(&self, obj: &K) -> ClientResult<K> {
        let ns = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        self.api::<K>(&ns)
            .replace(&name, &self.post_params(), obj)
            .await
            .map_err(classify)
    }
}

/// Map API failures onto the variants the engine branches on.
pub fn classify(e: kube::Error) -> ClientError {
    match e {
        kube::Error::Api(ae) if ae.code == 409 => {
            if ae.reason == "AlreadyExists" {
                ClientError::AlreadyExists(ae.message)
            } else {
                ClientError::Conflict(ae.message)
            }
        }
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound(ae.message),
        other => ClientError::Api(other),
    }
}
