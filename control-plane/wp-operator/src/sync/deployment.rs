use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use wp_syncer::{DesiredSpec, MutateError, OwnerDescriptor, diff};

use crate::crd::wordpress::Wordpress;

/// Everything the web Deployment is derived from, computed up front from the
/// Wordpress spec.
#[derive(Debug, Clone, PartialEq)]
pub struct WebDeploymentInputs {
    pub labels: BTreeMap<String, String>,
    pub replicas: Option<i32>,
    pub template: PodTemplateSpec,
}

impl WebDeploymentInputs {
    pub fn from_wordpress(wp: &Wordpress, default_image: &str) -> Self {
        Self {
            labels: wp.web_pod_labels(),
            replicas: wp.spec.replicas,
            template: wp.web_pod_template_spec(default_image),
        }
    }
}

pub fn deployment_syncer(
    wp: &Wordpress,
    owner: OwnerDescriptor,
    default_image: &str,
) -> DesiredSpec<Deployment, WebDeploymentInputs> {
    DesiredSpec::new(
        wp.namespace().unwrap_or_else(|| "default".to_string()),
        wp.deployment_name(),
        owner,
        WebDeploymentInputs::from_wordpress(wp, default_image),
        mutate_web_deployment,
    )
}

pub fn mutate_web_deployment(
    inputs: &WebDeploymentInputs,
    out: &mut Deployment,
) -> Result<(), MutateError> {
    let has_containers = inputs
        .template
        .spec
        .as_ref()
        .is_some_and(|p| !p.containers.is_empty());
    if !has_containers {
        return Err(MutateError::invalid(
            "web pod template has no containers",
        ));
    }

    out.labels_mut().extend(inputs.labels.clone());

    let selector = LabelSelector {
        match_labels: Some(inputs.labels.clone()),
        ..Default::default()
    };
    let spec = out.spec.get_or_insert_with(Default::default);
    // selector is immutable once the Deployment exists
    let current = &spec.selector;
    let is_set =
        current.match_labels.is_some() || current.match_expressions.is_some();
    if is_set && *current != selector {
        return Err(MutateError::invalid(format!(
            "deployment selector {:?} differs from desired {:?} and cannot be changed",
            current.match_labels, selector.match_labels
        )));
    }
    spec.selector = selector;
    let unchanged = diff::semantically_equal(
        &without_server_defaults(&spec.template, &inputs.template),
        &inputs.template,
    )
    .map_err(|e| MutateError::invalid(e.to_string()))?;
    if !unchanged {
        spec.template = inputs.template.clone();
    }
    if let Some(replicas) = inputs.replicas {
        spec.replicas = Some(replicas);
    }
    Ok(())
}

/// `current` minus the values the API server fills into fields `desired`
/// leaves unset. Every other field still counts.
fn without_server_defaults(
    current: &PodTemplateSpec,
    desired: &PodTemplateSpec,
) -> PodTemplateSpec {
    let mut out = current.clone();
    if let (Some(pod), Some(want)) = (out.spec.as_mut(), desired.spec.as_ref()) {
        strip_pod_defaults(pod, want);
    }
    out
}

fn strip_pod_defaults(pod: &mut PodSpec, want: &PodSpec) {
    if want.restart_policy.is_none() {
        pod.restart_policy = None;
    }
    if want.dns_policy.is_none() {
        pod.dns_policy = None;
    }
    if want.scheduler_name.is_none() {
        pod.scheduler_name = None;
    }
    if want.termination_grace_period_seconds.is_none() {
        pod.termination_grace_period_seconds = None;
    }
    if want.security_context.is_none() {
        pod.security_context = None;
    }
    for (c, w) in pod.containers.iter_mut().zip(&want.containers) {
        if w.image_pull_policy.is_none() {
            c.image_pull_policy = None;
        }
        if w.termination_message_path.is_none() {
            c.termination_message_path = None;
        }
        if w.termination_message_policy.is_none() {
            c.termination_message_policy = None;
        }
        if w.resources.is_none() {
            c.resources = None;
        }
        let want_ports = w.ports.as_deref().unwrap_or_default();
        for (p, wp) in c.ports.iter_mut().flatten().zip(want_ports) {
            if wp.protocol.is_none() {
                p.protocol = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::wordpress::{DEFAULT_IMAGE, WordpressSpec};
    use k8s_openapi::api::apps::v1::DeploymentSpec;

    fn blog(replicas: Option<i32>) -> Wordpress {
        let mut wp = Wordpress::new(
            "blog",
            WordpressSpec {
                replicas,
                ..Default::default()
            },
        );
        wp.metadata.namespace = Some("ns".into());
        wp.metadata.uid = Some("uid-blog".into());
        wp
    }

    fn inputs(replicas: Option<i32>) -> WebDeploymentInputs {
        WebDeploymentInputs::from_wordpress(&blog(replicas), DEFAULT_IMAGE)
    }

    #[test]
    fn syncer_targets_deployment_named_after_wordpress() {
        let wp = blog(Some(2));
        let owner = OwnerDescriptor::from_resource(&wp).unwrap();
        let desired = deployment_syncer(&wp, owner, DEFAULT_IMAGE);
        assert_eq!(desired.name, "blog");
        assert_eq!(desired.namespace, "ns");
        assert_eq!(desired.kind(), "Deployment");
        assert_eq!(desired.owner.kind, "Wordpress");
        assert_eq!(desired.owner.api_version, "wordpress.presslabs.org/v1alpha1");
    }

    #[test]
    fn mutate_fills_empty_deployment() {
        let inputs = inputs(Some(3));
        let mut dep = Deployment::default();
        mutate_web_deployment(&inputs, &mut dep).unwrap();
        let spec = dep.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.selector.match_labels.as_ref(), Some(&inputs.labels));
        assert_eq!(spec.template, inputs.template);
        assert_eq!(dep.labels(), &inputs.labels);
    }

    #[test]
    fn mutate_is_idempotent() {
        let inputs = inputs(Some(3));
        let mut once = Deployment::default();
        mutate_web_deployment(&inputs, &mut once).unwrap();
        let mut twice = once.clone();
        mutate_web_deployment(&inputs, &mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn replicas_left_alone_when_unset() {
        let mut dep = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(7),
                ..Default::default()
            }),
            ..Default::default()
        };
        mutate_web_deployment(&inputs(None), &mut dep).unwrap();
        assert_eq!(dep.spec.unwrap().replicas, Some(7));
    }

    #[test]
    fn defaulted_template_fields_are_kept() {
        let inputs = inputs(Some(1));
        let mut dep = Deployment::default();
        mutate_web_deployment(&inputs, &mut dep).unwrap();
        let pod = dep.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.restart_policy = Some("Always".into());
        pod.containers[0].image_pull_policy = Some("IfNotPresent".into());
        let defaulted = dep.clone();

        mutate_web_deployment(&inputs, &mut dep).unwrap();
        assert_eq!(dep, defaulted);

        let mut rolled = inputs.clone();
        rolled.template.spec.as_mut().unwrap().containers[0].image =
            Some("registry.local/wp:6.5".into());
        mutate_web_deployment(&rolled, &mut dep).unwrap();
        assert_eq!(dep.spec.unwrap().template, rolled.template);
    }

    #[test]
    fn removed_env_and_annotations_are_dropped() {
        let mut wp = blog(Some(1));
        wp.spec.env = BTreeMap::from([("WP_DEBUG".to_string(), "1".to_string())]);
        wp.spec.pod_annotations = BTreeMap::from([("a".to_string(), "b".to_string())]);
        let mut dep = Deployment::default();
        mutate_web_deployment(
            &WebDeploymentInputs::from_wordpress(&wp, DEFAULT_IMAGE),
            &mut dep,
        )
        .unwrap();
        let pod = dep.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.containers[0].image_pull_policy = Some("IfNotPresent".into());

        wp.spec.env.clear();
        wp.spec.pod_annotations.clear();
        let cleared = WebDeploymentInputs::from_wordpress(&wp, DEFAULT_IMAGE);
        mutate_web_deployment(&cleared, &mut dep).unwrap();
        let template = &dep.spec.as_ref().unwrap().template;
        assert_eq!(template, &cleared.template);
        assert_eq!(template.spec.as_ref().unwrap().containers[0].env, None);
        assert_eq!(template.metadata.as_ref().unwrap().annotations, None);
    }

    #[test]
    fn foreign_template_fields_are_reverted() {
        let inputs = inputs(Some(1));
        let mut dep = Deployment::default();
        mutate_web_deployment(&inputs, &mut dep).unwrap();
        let pod = dep.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.node_name = Some("pinned".into());

        mutate_web_deployment(&inputs, &mut dep).unwrap();
        assert_eq!(dep.spec.unwrap().template, inputs.template);
    }

    #[test]
    fn foreign_labels_survive() {
        let mut dep = Deployment::default();
        dep.labels_mut().insert("team".into(), "blue".into());
        mutate_web_deployment(&inputs(None), &mut dep).unwrap();
        assert_eq!(dep.labels().get("team").map(String::as_str), Some("blue"));
    }

    #[test]
    fn changed_selector_is_rejected() {
        let mut dep = Deployment {
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        "app".to_string(),
                        "legacy".to_string(),
                    )])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = mutate_web_deployment(&inputs(Some(1)), &mut dep).unwrap_err();
        assert!(err.to_string().contains("cannot be changed"));
    }

    #[test]
    fn empty_template_is_rejected() {
        let mut inputs = inputs(Some(1));
        inputs.template.spec = None;
        let mut dep = Deployment::default();
        assert!(mutate_web_deployment(&inputs, &mut dep).is_err());
    }
}
