use serde::{Deserialize, Serialize};

/// Closed enumeration of cluster backends. The discriminator is stored on
/// `clusters.cluster_type` and on `load_agents.clusterable_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    AmazonCloud,
    DataCenter,
}

impl ClusterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterKind::AmazonCloud => "amazon_cloud",
            ClusterKind::DataCenter => "data_center",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "amazon_cloud" => Some(ClusterKind::AmazonCloud),
            "data_center" => Some(ClusterKind::DataCenter),
            _ => None,
        }
    }
}

pub const DEFAULT_AWS_USER: &str = "ubuntu";
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone)]
pub struct AmazonCloud {
    pub id: i64,
    pub project_id: i64,
    pub access_key: String,
    pub secret_key: String,
    pub ssh_identity: String,
    pub region: String,
    pub zone: Option<String>,
    /// Built on demand when absent; pinned when the cluster uses a
    /// non-standard SSH port.
    pub agent_ami: Option<String>,
    pub active: bool,
    pub user_name: String,
    pub security_group: String,
    pub instance_type: String,
    pub max_threads_by_instance: Option<u32>,
    pub autogenerated_ssh_key: bool,
    pub ssh_port: u16,
}

impl AmazonCloud {
    /// Display handle used in diagnostics and setup failure aggregates.
    pub fn name(&self) -> String {
        format!("cluster-{}-{}", ClusterKind::AmazonCloud.as_str(), self.region)
    }
}

#[derive(Debug, Clone)]
pub struct DataCenter {
    pub id: i64,
    pub project_id: i64,
    pub user_name: String,
    pub ssh_identity: String,
    pub machines: Vec<String>,
    pub title: String,
    pub ssh_port: u16,
}
