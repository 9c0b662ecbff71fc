//! Orchestrator access
//!
//! Everything the controllers do against the API server goes through the
//! [`ClusterClient`] capability set. [`KubeClient`] talks to a real cluster;
//! [`AdaptiveClient`] decorates any implementation with per-operation
//! circuit breakers.

pub mod adaptive;
pub mod breaker;
pub mod telemetry;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use crate::controller::{Error, Result};
use crate::crd::{AvailabilityPolicy, AvailabilityPolicyStatus};
use crate::policy::ObjectKey;

pub use adaptive::{AdaptiveClient, AdaptiveConfig};
pub use breaker::{BreakerSettings, BreakerState, CircuitBreaker};
pub use telemetry::{ClusterMetrics, Sample, SampleBuffer};

/// Field manager for every write
pub const FIELD_MANAGER: &str = "availability-operator";

/// Operation classes, one breaker each
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
    Patch,
    StatusPatch,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Get,
        Operation::List,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Patch,
        Operation::StatusPatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Patch => "patch",
            Operation::StatusPatch => "status-patch",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Operation::Get | Operation::List)
    }

    /// Timeout multiplier for operations with a longer latency tail
    pub fn timeout_bias(&self) -> f64 {
        match self {
            Operation::List => 1.5,
            op if op.is_write() => 1.2,
            _ => 1.0,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator capabilities used by the controllers
///
/// Reads return `Ok(None)` for missing objects. Writes surface API errors
/// as [`Error::KubeError`] so callers can classify them.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_workload(&self, key: &ObjectKey) -> Result<Option<Deployment>>;

    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Deployment>>;

    /// Merge the given annotations into the workload's metadata
    async fn patch_workload_annotations(
        &self,
        key: &ObjectKey,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn get_policy(&self, key: &ObjectKey) -> Result<Option<AvailabilityPolicy>>;

    async fn list_policies(
        &self,
        namespace: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<AvailabilityPolicy>>;

    async fn patch_policy_status(
        &self,
        key: &ObjectKey,
        status: &AvailabilityPolicyStatus,
    ) -> Result<()>;

    async fn set_policy_finalizers(&self, key: &ObjectKey, finalizers: &[String]) -> Result<()>;

    async fn get_pdb(&self, key: &ObjectKey) -> Result<Option<PodDisruptionBudget>>;

    async fn create_pdb(&self, pdb: &PodDisruptionBudget) -> Result<PodDisruptionBudget>;

    /// Replace an existing PDB; the object's resourceVersion guards the write
    async fn update_pdb(&self, pdb: &PodDisruptionBudget) -> Result<PodDisruptionBudget>;

    async fn delete_pdb(&self, key: &ObjectKey) -> Result<()>;

    async fn list_namespaces(&self, limit: Option<u32>) -> Result<Vec<String>>;
}

/// [`ClusterClient`] backed by the kube API client
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
        K: Clone + serde::de::DeserializeOwned + fmt::Debug,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

fn list_params(limit: Option<u32>) -> ListParams {
    match limit {
        Some(limit) => ListParams::default().limit(limit),
        None => ListParams::default(),
    }
}

fn pdb_key(pdb: &PodDisruptionBudget) -> Result<ObjectKey> {
    ObjectKey::of(pdb).ok_or(Error::MissingObjectKey(".metadata.namespace"))
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn get_workload(&self, key: &ObjectKey) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = self.namespaced(Some(&key.namespace));
        Ok(api.get_opt(&key.name).await?)
    }

    async fn list_workloads(
        &self,
        namespace: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Deployment>> {
        let api: Api<Deployment> = self.namespaced(namespace);
        Ok(api.list(&list_params(limit)).await?.items)
    }

    async fn patch_workload_annotations(
        &self,
        key: &ObjectKey,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Deployment> = self.namespaced(Some(&key.namespace));
        let patch = json!({
            "metadata": {
                "annotations": annotations
            }
        });
        api.patch(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn get_policy(&self, key: &ObjectKey) -> Result<Option<AvailabilityPolicy>> {
        let api: Api<AvailabilityPolicy> = self.namespaced(Some(&key.namespace));
        Ok(api.get_opt(&key.name).await?)
    }

    async fn list_policies(
        &self,
        namespace: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<AvailabilityPolicy>> {
        let api: Api<AvailabilityPolicy> = self.namespaced(namespace);
        Ok(api.list(&list_params(limit)).await?.items)
    }

    async fn patch_policy_status(
        &self,
        key: &ObjectKey,
        status: &AvailabilityPolicyStatus,
    ) -> Result<()> {
        let api: Api<AvailabilityPolicy> = self.namespaced(Some(&key.namespace));
        let patch = json!({ "status": status });
        api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn set_policy_finalizers(&self, key: &ObjectKey, finalizers: &[String]) -> Result<()> {
        let api: Api<AvailabilityPolicy> = self.namespaced(Some(&key.namespace));
        let finalizers = if finalizers.is_empty() {
            serde_json::Value::Null
        } else {
            json!(finalizers)
        };
        let patch = json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn get_pdb(&self, key: &ObjectKey) -> Result<Option<PodDisruptionBudget>> {
        let api: Api<PodDisruptionBudget> = self.namespaced(Some(&key.namespace));
        Ok(api.get_opt(&key.name).await?)
    }

    async fn create_pdb(&self, pdb: &PodDisruptionBudget) -> Result<PodDisruptionBudget> {
        let key = pdb_key(pdb)?;
        let api: Api<PodDisruptionBudget> = self.namespaced(Some(&key.namespace));
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        Ok(api.create(&params, pdb).await?)
    }

    async fn update_pdb(&self, pdb: &PodDisruptionBudget) -> Result<PodDisruptionBudget> {
        let key = pdb_key(pdb)?;
        let api: Api<PodDisruptionBudget> = self.namespaced(Some(&key.namespace));
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        Ok(api.replace(&pdb.name_any(), &params, pdb).await?)
    }

    async fn delete_pdb(&self, key: &ObjectKey) -> Result<()> {
        let api: Api<PodDisruptionBudget> = self.namespaced(Some(&key.namespace));
        api.delete(&key.name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_namespaces(&self, limit: Option<u32>) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api
            .list(&list_params(limit))
            .await?
            .items
            .into_iter()
            .map(|ns| ns.name_any())
            .collect())
    }
}
