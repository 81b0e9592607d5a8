use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::api::ObjectMeta;

use crate::error::SyncError;

/// Identity of the parent resource that controls a managed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerDescriptor {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    /// The owner carries a deletion timestamp; children are left to the GC.
    pub deleting: bool,
}

impl OwnerDescriptor {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
            deleting: false,
        }
    }

    /// Build a descriptor from a live resource. Returns `None` when the
    /// resource has not been persisted yet (no uid or name).
    pub fn from_resource<P>(parent: &P) -> Option<Self>
    where
        P: Resource<DynamicType = ()>,
    {
        let meta = parent.meta();
        Some(Self {
            api_version: P::api_version(&()).into_owned(),
            kind: P::kind(&()).into_owned(),
            name: meta.name.clone()?,
            uid: meta.uid.clone()?,
            deleting: meta.deletion_timestamp.is_some(),
        })
    }

    pub fn controller_ref(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn same_target(&self, r: &OwnerReference) -> bool {
        if !r.uid.is_empty() && !self.uid.is_empty() {
            return r.uid == self.uid;
        }
        r.kind == self.kind
            && r.name == self.name
            && api_group(&r.api_version) == api_group(&self.api_version)
    }
}

fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

fn is_controller(r: &OwnerReference) -> bool {
    r.controller.unwrap_or(false)
}

/// The controller reference currently set on `meta`, if any.
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| is_controller(r)))
}

/// Make `owner` the controller of `meta`.
///
/// Returns `Ok(true)` when the references were changed. An object already
/// controlled by a different parent is refused with
/// [`SyncError::AdoptionConflict`] and left untouched. Non-controller
/// references to other parents are kept as they are; a non-controller
/// reference to `owner` itself is upgraded in place.
pub fn ensure_controller_ref(
    meta: &mut ObjectMeta,
    owner: &OwnerDescriptor,
) -> Result<bool, SyncError> {
    if let Some(current) = controller_of(meta) {
        if owner.same_target(current) {
            return Ok(false);
        }
        return Err(SyncError::AdoptionConflict {
            owner_kind: current.kind.clone(),
            owner_name: current.name.clone(),
            owner_uid: current.uid.clone(),
        });
    }

    let desired = owner.controller_ref();
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| owner.same_target(r)) {
        Some(existing) => *existing = desired,
        None => refs.push(desired),
    }
    Ok(true)
}

/// Number of controller references on `meta` that point at `owner`, and the
/// total number of controller references.
pub(crate) fn controller_counts(
    meta: &ObjectMeta,
    owner: &OwnerDescriptor,
) -> (usize, usize) {
    let refs = meta.owner_references.as_deref().unwrap_or_default();
    let controllers = refs.iter().filter(|r| is_controller(r));
    let total = controllers.clone().count();
    let ours = controllers.filter(|r| owner.same_target(r)).count();
    (ours, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> OwnerDescriptor {
        OwnerDescriptor::new(
            "wordpress.presslabs.org/v1alpha1",
            "Wordpress",
            "blog",
            "uid-blog",
        )
    }

    fn reference(kind: &str, name: &str, uid: &str, controller: bool) -> OwnerReference {
        OwnerReference {
            api_version: "example.io/v1".into(),
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
            controller: Some(controller),
            block_owner_deletion: None,
        }
    }

    #[test]
    fn stamps_controller_ref_on_empty_meta() {
        let mut meta = ObjectMeta::default();
        assert!(ensure_controller_ref(&mut meta, &blog()).unwrap());
        let refs = meta.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uid, "uid-blog");
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].block_owner_deletion, Some(true));
    }

    #[test]
    fn existing_same_controller_is_noop() {
        let mut meta = ObjectMeta {
            owner_references: Some(vec![blog().controller_ref()]),
            ..Default::default()
        };
        assert!(!ensure_controller_ref(&mut meta, &blog()).unwrap());
        assert_eq!(meta.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn refuses_foreign_controller() {
        let foreign = reference("Wordpress", "other", "uid-other", true);
        let mut meta = ObjectMeta {
            owner_references: Some(vec![foreign.clone()]),
            ..Default::default()
        };
        let err = ensure_controller_ref(&mut meta, &blog()).unwrap_err();
        match err {
            SyncError::AdoptionConflict { owner_name, owner_uid, .. } => {
                assert_eq!(owner_name, "other");
                assert_eq!(owner_uid, "uid-other");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(meta.owner_references, Some(vec![foreign]));
    }

    #[test]
    fn keeps_unrelated_non_controller_refs() {
        let unrelated = reference("ConfigMap", "settings", "uid-cm", false);
        let mut meta = ObjectMeta {
            owner_references: Some(vec![unrelated.clone()]),
            ..Default::default()
        };
        assert!(ensure_controller_ref(&mut meta, &blog()).unwrap());
        let refs = meta.owner_references.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], unrelated);
        assert_eq!(refs[1], blog().controller_ref());
    }

    #[test]
    fn upgrades_matching_non_controller_ref() {
        let mut plain = blog().controller_ref();
        plain.controller = None;
        plain.block_owner_deletion = None;
        let mut meta = ObjectMeta {
            owner_references: Some(vec![plain]),
            ..Default::default()
        };
        assert!(ensure_controller_ref(&mut meta, &blog()).unwrap());
        assert_eq!(meta.owner_references.as_ref().unwrap().len(), 1);
        assert_eq!(controller_counts(&meta, &blog()), (1, 1));
    }

    #[test]
    fn descriptor_from_resource_requires_uid() {
        use k8s_openapi::api::apps::v1::Deployment;
        let mut dep = Deployment {
            metadata: ObjectMeta {
                name: Some("web".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(OwnerDescriptor::from_resource(&dep).is_none());
        dep.metadata.uid = Some("u1".into());
        let desc = OwnerDescriptor::from_resource(&dep).unwrap();
        assert_eq!(desc.api_version, "apps/v1");
        assert_eq!(desc.kind, "Deployment");
        assert!(!desc.deleting);
    }
}
