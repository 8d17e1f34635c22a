use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ClusterError, ConfigError};
use crate::model::AmazonCloud;

/// Per-agent host lifecycle:
/// absent -> pending -> running -> stopped -> running (restart)
///                               \-> terminated (final)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct CloudInstance {
    pub id: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub state: InstanceState,
}

#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub ami: String,
    pub instance_type: String,
    pub key_name: String,
    pub security_group: String,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Available,
    Pending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct MachineImage {
    pub id: String,
    pub state: ImageState,
}

/// Seam over the cloud provider SDK. Mutating calls are idempotent at the
/// orchestration level: acting on a missing instance is not an error.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn key_pair_exists(&self, name: &str) -> Result<bool, ClusterError>;
    /// Returns the private key material of the freshly created pair.
    async fn create_key_pair(&self, name: &str) -> Result<String, ClusterError>;
    async fn delete_key_pair(&self, name: &str) -> Result<(), ClusterError>;
    async fn ensure_security_group(&self, name: &str) -> Result<(), ClusterError>;
    /// Zone names in the region with state `available`.
    async fn available_zones(&self) -> Result<Vec<String>, ClusterError>;
    /// Images owned by this account, by exact name.
    async fn find_self_owned_image(&self, name: &str)
        -> Result<Option<MachineImage>, ClusterError>;
    /// Snapshots the instance into an AMI; returns the new image id.
    async fn create_image(&self, name: &str, instance_id: &str) -> Result<String, ClusterError>;
    async fn run_instance(&self, spec: &InstanceSpec) -> Result<CloudInstance, ClusterError>;
    async fn describe_instance(&self, id: &str) -> Result<Option<CloudInstance>, ClusterError>;
    /// Both the system and instance reachability checks.
    async fn instance_checks_passed(&self, id: &str) -> Result<bool, ClusterError>;
    async fn start_instance(&self, id: &str) -> Result<(), ClusterError>;
    async fn stop_instance(&self, id: &str) -> Result<(), ClusterError>;
    async fn terminate_instance(&self, id: &str) -> Result<(), ClusterError>;
}

/// Produces a client bound to one cluster's credentials and region.
pub trait CloudClientFactory: Send + Sync {
    fn client_for(&self, cluster: &AmazonCloud) -> Result<Arc<dyn CloudClient>, ConfigError>;
}

/// Factory for deployments without a linked cloud adapter; Amazon clusters
/// become a configuration error instead of a panic.
pub struct NoCloud;

impl CloudClientFactory for NoCloud {
    fn client_for(&self, cluster: &AmazonCloud) -> Result<Arc<dyn CloudClient>, ConfigError> {
        Err(ConfigError::CloudUnavailable {
            cluster: cluster.name(),
        })
    }
}
