//! Cluster backends: where load agents live.
//!
//! Backends are a closed enumeration: the elastic Amazon backend
//! materialises EC2 hosts on demand, the static data-center backend drives
//! a fixed machine list. `Cluster` dispatches over the two.
mod amazon;
mod capacity;
mod cloud;
mod data_center;

pub use amazon::AmazonCluster;
pub use capacity::{
    default_max_threads_per_agent, required_agent_count, round_off_max_threads_per_agent,
    MAX_THREADS_PER_AGENT, MIN_THREADS_PER_AGENT,
};
pub use cloud::{
    CloudClient, CloudClientFactory, CloudInstance, ImageState, InstanceSpec, InstanceState,
    MachineImage, NoCloud,
};
pub use data_center::DataCenterCluster;

use std::path::PathBuf;

use crate::error::AppResult;
use crate::model::{AgentRole, ClusterKind, JmeterPlan, LoadAgent};
use crate::remote::HostSpec;

pub enum Cluster {
    Amazon(AmazonCluster),
    DataCenter(DataCenterCluster),
}

impl Cluster {
    pub fn kind(&self) -> ClusterKind {
        match self {
            Cluster::Amazon(_) => ClusterKind::AmazonCloud,
            Cluster::DataCenter(_) => ClusterKind::DataCenter,
        }
    }

    pub fn clusterable_id(&self) -> i64 {
        match self {
            Cluster::Amazon(cluster) => cluster.clusterable_id(),
            Cluster::DataCenter(cluster) => cluster.clusterable_id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Cluster::Amazon(cluster) => cluster.name(),
            Cluster::DataCenter(cluster) => cluster.name(),
        }
    }

    /// Reconciles backend prerequisites: key material, security group,
    /// availability zone and agent AMI for elastic clusters; machine
    /// reachability for static ones.
    pub async fn setup(&mut self) -> AppResult<()> {
        match self {
            Cluster::Amazon(cluster) => cluster.setup().await,
            Cluster::DataCenter(cluster) => cluster.setup().await,
        }
    }

    pub fn required_agent_count(&self, plan: &JmeterPlan) -> u32 {
        match self {
            Cluster::Amazon(cluster) => cluster.required_agent_count(plan),
            Cluster::DataCenter(cluster) => cluster.required_agent_count(plan),
        }
    }

    /// Materialises a new host and returns the unsaved agent row bound to
    /// the plan.
    pub async fn provision_agent(
        &self,
        plan: &JmeterPlan,
        role: AgentRole,
    ) -> AppResult<LoadAgent> {
        match self {
            Cluster::Amazon(cluster) => cluster.provision_agent(plan, role).await,
            Cluster::DataCenter(cluster) => cluster.provision_agent(plan, role).await,
        }
    }

    pub async fn start_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        match self {
            Cluster::Amazon(cluster) => cluster.start_agent(agent).await,
            Cluster::DataCenter(cluster) => cluster.start_agent(agent).await,
        }
    }

    pub async fn stop_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        match self {
            Cluster::Amazon(cluster) => cluster.stop_agent(agent).await,
            Cluster::DataCenter(cluster) => cluster.stop_agent(agent).await,
        }
    }

    pub async fn terminate_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        match self {
            Cluster::Amazon(cluster) => cluster.terminate_agent(agent).await,
            Cluster::DataCenter(cluster) => cluster.terminate_agent(agent).await,
        }
    }

    /// Backend hook fired before an agent row is deleted from the store.
    pub async fn before_destroy_load_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        self.terminate_agent(agent).await
    }

    /// Deletes auto-created key pairs and identity files.
    pub async fn cleanup(&self) -> AppResult<()> {
        match self {
            Cluster::Amazon(cluster) => cluster.cleanup().await,
            Cluster::DataCenter(cluster) => cluster.cleanup().await,
        }
    }

    pub fn host_spec(&self, agent: &LoadAgent) -> AppResult<HostSpec> {
        match self {
            Cluster::Amazon(cluster) => cluster.host_spec(agent),
            Cluster::DataCenter(cluster) => cluster.host_spec(agent),
        }
    }

    pub fn user_name(&self) -> String {
        match self {
            Cluster::Amazon(cluster) => cluster.user_name().to_owned(),
            Cluster::DataCenter(cluster) => cluster.user_name().to_owned(),
        }
    }

    pub fn identity_file(&self) -> PathBuf {
        match self {
            Cluster::Amazon(cluster) => cluster.identity_file(),
            Cluster::DataCenter(cluster) => cluster.identity_file(),
        }
    }
}
