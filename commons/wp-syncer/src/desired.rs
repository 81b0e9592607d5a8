use std::fmt;

use crate::error::MutateError;
use crate::object::{ObjectKey, SyncObject};
use crate::owner::OwnerDescriptor;

/// In-place edit of a managed object toward its desired shape.
///
/// A plain function pointer rather than a closure: everything the function
/// needs must arrive through the inputs value `I`. It must be deterministic
/// and idempotent, and fail only when the desired state is unsatisfiable.
pub type MutateFn<K, I> = fn(&I, &mut K) -> Result<(), MutateError>;

/// What one managed object should look like and who owns it.
pub struct DesiredSpec<K, I> {
    pub namespace: String,
    pub name: String,
    pub owner: OwnerDescriptor,
    /// Starting point when the object does not exist yet.
    pub template: K,
    pub inputs: I,
    pub mutate: MutateFn<K, I>,
}

impl<K: SyncObject + Default, I> DesiredSpec<K, I> {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        owner: OwnerDescriptor,
        inputs: I,
        mutate: MutateFn<K, I>,
    ) -> Self {
        Self::with_template(namespace, name, owner, K::default(), inputs, mutate)
    }
}

impl<K: SyncObject, I> DesiredSpec<K, I> {
    pub fn with_template(
        namespace: impl Into<String>,
        name: impl Into<String>,
        owner: OwnerDescriptor,
        template: K,
        inputs: I,
        mutate: MutateFn<K, I>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            owner,
            template,
            inputs,
            mutate,
        }
    }

    pub fn kind(&self) -> String {
        K::kind_name()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Fresh object carrying only the identity fields over the template.
    pub fn blank(&self) -> K {
        let mut obj = self.template.clone();
        let meta = obj.meta_mut();
        meta.name = Some(self.name.clone());
        meta.namespace = Some(self.namespace.clone());
        meta.resource_version = None;
        meta.uid = None;
        obj
    }

    pub fn apply(&self, obj: &mut K) -> Result<(), MutateError> {
        (self.mutate)(&self.inputs, obj)
    }
}

impl<K, I: fmt::Debug> fmt::Debug for DesiredSpec<K, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesiredSpec")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}
