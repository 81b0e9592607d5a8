use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
};
use kube::api::ObjectMeta;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE: &str = "docker.io/bitpoke/wordpress-runtime";
pub const DEFAULT_TAG: &str = "latest";
pub const WEB_PORT: i32 = 8080;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "wordpress.presslabs.org",
    version = "v1alpha1",
    kind = "Wordpress",
    plural = "wordpresses",
    namespaced,
    status = "WordpressStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WordpressSpec {
    /// Number of web pods; the Deployment keeps its own value when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Runtime image repository (defaults to the operator's configured image)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Extra environment for the web container
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_annotations: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WordpressStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure kind of the most recent sync; cleared once a sync succeeds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_kind: Option<String>,
}

impl Wordpress {
    pub fn deployment_name(&self) -> String {
        self.name_any()
    }

    pub fn labels_for(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app.kubernetes.io/name".to_string(), "wordpress".to_string()),
            ("app.kubernetes.io/part-of".to_string(), "wordpress".to_string()),
            ("app.kubernetes.io/instance".to_string(), self.name_any()),
        ])
    }

    pub fn web_pod_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels_for();
        labels.insert("app.kubernetes.io/component".into(), "web".into());
        labels
    }

    pub fn image(&self, default_image: &str) -> String {
        let repo = self
            .spec
            .image
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(default_image);
        let tag = self
            .spec
            .tag
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TAG);
        format!("{repo}:{tag}")
    }

    pub fn web_pod_template_spec(&self, default_image: &str) -> PodTemplateSpec {
        let env: Vec<EnvVar> = self
            .spec
            .env
            .iter()
            .map(|(k, v)| EnvVar {
                name: k.clone(),
                value: Some(v.clone()),
                ..Default::default()
            })
            .collect();
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(self.web_pod_labels()),
                annotations: (!self.spec.pod_annotations.is_empty())
                    .then(|| self.spec.pod_annotations.clone()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "wordpress".into(),
                    image: Some(self.image(default_image)),
                    ports: Some(vec![ContainerPort {
                        name: Some("http".into()),
                        container_port: WEB_PORT,
                        ..Default::default()
                    }]),
                    env: (!env.is_empty()).then_some(env),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }
}
