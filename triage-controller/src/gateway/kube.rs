//! Kubernetes-backed orchestrator gateway
//!
//! Thin adapter over `kube`: builds the job and config-map objects the
//! executor asks for, lists and deletes by label selector, and runs the
//! self-subject permission pre-flight. All object shapes live here; nothing
//! above this file imports a Kubernetes type.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::{debug, info};
use triage_core::domain::RecipeSpec;
use triage_core::dto::JobPhase;

use crate::config::Config;
use crate::gateway::{
    job_labels, object_labels, recipe_command, AccessRule, JobSnapshot, OrchestratorError,
    OrchestratorGateway, Selector, APP_LABEL, DATA_FILE, DATA_MOUNT_PATH, RECIPE_SECRET,
};

/// Name of the volume projecting the data file into recipe pods.
const DATA_VOLUME: &str = "incident-data";

/// Environment variables wired into every recipe container from the
/// credentials secret.
const SECRET_ENV: &[(&str, &str)] = &[
    ("JIRA_URL", "jira-url"),
    ("JIRA_USER", "jira-user"),
    ("JIRA_TOKEN", "jira-token"),
];

pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    /// Infers the in-cluster configuration, falling back to the local
    /// kubeconfig (the resolution `kube` applies for both).
    pub async fn try_default() -> Result<Self, OrchestratorError> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl From<kube::Error> for OrchestratorError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) if response.code < 500 => {
                OrchestratorError::Rejected(response.message)
            }
            other => OrchestratorError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
impl OrchestratorGateway for KubeGateway {
    async fn create_config_map(
        &self,
        namespace: &str,
        uuid: &str,
        data: &serde_json::Value,
    ) -> Result<String, OrchestratorError> {
        let config_map = build_config_map(namespace, uuid, data)?;

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let created = api.create(&PostParams::default(), &config_map).await?;
        let name = created
            .metadata
            .name
            .ok_or(OrchestratorError::MissingObjectName)?;

        debug!("Created config map '{}' for incident '{}'", name, uuid);
        Ok(name)
    }

    async fn create_job(
        &self,
        namespace: &str,
        recipe_name: &str,
        spec: &RecipeSpec,
        uuid: &str,
        config_map: &str,
        config: &Config,
    ) -> Result<String, OrchestratorError> {
        let job = build_job(namespace, recipe_name, spec, uuid, config_map, config);

        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let created = api.create(&PostParams::default(), &job).await?;
        let name = created
            .metadata
            .name
            .ok_or(OrchestratorError::MissingObjectName)?;

        info!("Created job '{}' for recipe '{}'", name, recipe_name);
        Ok(name)
    }

    async fn read_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, OrchestratorError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let object = match api.get(name).await {
            Ok(object) => object,
            Err(kube::Error::Api(response)) if response.code == 404 => {
                return Err(OrchestratorError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(object.data.unwrap_or_default())
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<JobSnapshot>, OrchestratorError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector.to_string());
        let jobs = api.list(&params).await?;
        Ok(jobs.items.into_iter().map(snapshot_from).collect())
    }

    async fn delete_jobs(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<(), OrchestratorError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector.to_string());
        let _ = api
            .delete_collection(&DeleteParams::foreground(), &params)
            .await?;
        Ok(())
    }

    async fn delete_config_maps(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<(), OrchestratorError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector.to_string());
        let _ = api
            .delete_collection(&DeleteParams::foreground(), &params)
            .await?;
        Ok(())
    }

    async fn check_access(
        &self,
        namespace: &str,
        rules: &[AccessRule],
    ) -> Result<(), OrchestratorError> {
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let mut denied = Vec::new();

        for rule in rules {
            for verb in rule.verbs {
                let review = SelfSubjectAccessReview {
                    spec: SelfSubjectAccessReviewSpec {
                        resource_attributes: Some(ResourceAttributes {
                            namespace: Some(namespace.to_string()),
                            group: Some(rule.group.to_string()),
                            resource: Some(rule.resource.to_string()),
                            verb: Some((*verb).to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                };

                match api.create(&PostParams::default(), &review).await {
                    Ok(response)
                        if response
                            .status
                            .as_ref()
                            .map(|status| status.allowed)
                            .unwrap_or(false) => {}
                    Ok(_) => denied.push(format!(
                        "{}/{} verb '{}' in namespace '{}'",
                        rule.group, rule.resource, verb, namespace
                    )),
                    Err(err) => denied.push(format!(
                        "{}/{} verb '{}' in namespace '{}': {}",
                        rule.group, rule.resource, verb, namespace, err
                    )),
                }
            }
        }

        if denied.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::AccessDenied(denied.join(", ")))
        }
    }
}

fn build_config_map(
    namespace: &str,
    uuid: &str,
    data: &serde_json::Value,
) -> Result<ConfigMap, OrchestratorError> {
    let body = serde_json::to_string(data)?;
    Ok(ConfigMap {
        metadata: ObjectMeta {
            generate_name: Some(format!("{APP_LABEL}-data-")),
            namespace: Some(namespace.to_string()),
            labels: Some(object_labels(uuid)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(DATA_FILE.to_string(), body)])),
        ..Default::default()
    })
}

fn build_job(
    namespace: &str,
    recipe_name: &str,
    spec: &RecipeSpec,
    uuid: &str,
    config_map: &str,
    config: &Config,
) -> Job {
    let labels = job_labels(uuid, recipe_name);

    let env = SECRET_ENV
        .iter()
        .map(|(var, key)| EnvVar {
            name: (*var).to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(RECIPE_SECRET.to_string()),
                    key: (*key).to_string(),
                    optional: None,
                }),
                ..Default::default()
            }),
        })
        .collect();

    Job {
        metadata: ObjectMeta {
            generate_name: Some(format!("{recipe_name}-")),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            annotations: Some(BTreeMap::from([(
                "description".to_string(),
                spec.description.clone(),
            )])),
            ..Default::default()
        },
        spec: Some(JobSpec {
            // A recipe publishes at-most-once; retrying the pod would break
            // that contract.
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    volumes: Some(vec![Volume {
                        name: DATA_VOLUME.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: Some(config_map.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    containers: vec![Container {
                        name: "recipe".to_string(),
                        image: Some(spec.image.clone()),
                        command: Some(vec![
                            "/bin/sh".to_string(),
                            "-c".to_string(),
                            recipe_command(spec, config),
                        ]),
                        // subPath projection: only the data file lands at
                        // /app/data.json, the image's /app stays visible.
                        volume_mounts: Some(vec![VolumeMount {
                            name: DATA_VOLUME.to_string(),
                            mount_path: format!("{DATA_MOUNT_PATH}/{DATA_FILE}"),
                            sub_path: Some(DATA_FILE.to_string()),
                            ..Default::default()
                        }]),
                        env: Some(env),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn snapshot_from(job: Job) -> JobSnapshot {
    let status = job.status.unwrap_or_default();
    let phase = if status.active.unwrap_or(0) > 0 {
        JobPhase::Active
    } else if status.succeeded.unwrap_or(0) > 0 {
        JobPhase::Completed
    } else if status.failed.unwrap_or(0) > 0 {
        JobPhase::Failed
    } else {
        // No pods accounted for yet; the job exists, so present it as live.
        JobPhase::Active
    };

    JobSnapshot {
        name: job.metadata.name.unwrap_or_default(),
        created_at: job.metadata.creation_timestamp.map(|time| time.0),
        labels: job.metadata.labels.unwrap_or_default(),
        description: job
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get("description"))
            .cloned()
            .unwrap_or_default(),
        phase,
    }
}
