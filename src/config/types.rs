use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{DEFAULT_AWS_USER, DEFAULT_SAMPLING_INTERVAL_SECS, DEFAULT_SSH_PORT};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub project_code: String,
    pub master_slave_mode: Option<bool>,
    pub max_threads_per_agent: Option<u32>,
    /// Comma list of breakup bucket edges in seconds.
    pub samples_breakup_interval: Option<String>,
    /// Bound on fan-out parallelism (default 50).
    pub worker_count: Option<usize>,
    pub jmeter: JmeterConfig,
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
    #[serde(default)]
    pub target_hosts: Vec<TargetHostConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JmeterConfig {
    /// Plain release version, `\d+.\d+[.\d+]`, at least 2.6.
    pub version: Option<String>,
    /// Alternative to `version`: a .tgz/.tar.gz bundle to install instead
    /// of the stock distribution.
    pub custom_installer_url: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Path to the .jmx file, relative to the project's `app/` directory.
    pub file: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub data_files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterConfig {
    AmazonCloud(AmazonCloudConfig),
    DataCenter(DataCenterConfig),
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AmazonCloudConfig {
    pub access_key: String,
    pub secret_key: String,
    pub ssh_identity: String,
    pub region: String,
    pub zone: Option<String>,
    pub agent_ami: Option<String>,
    pub user_name: Option<String>,
    pub security_group: Option<String>,
    pub instance_type: Option<String>,
    pub max_threads_by_instance: Option<u32>,
    pub ssh_port: Option<u16>,
    pub active: Option<bool>,
}

pub const DEFAULT_SECURITY_GROUP: &str = "Hailstorm";
pub const DEFAULT_INSTANCE_TYPE: &str = "m5.large";

impl AmazonCloudConfig {
    pub fn user_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(DEFAULT_AWS_USER)
    }

    pub fn security_group(&self) -> &str {
        self.security_group
            .as_deref()
            .unwrap_or(DEFAULT_SECURITY_GROUP)
    }

    pub fn instance_type(&self) -> &str {
        self.instance_type
            .as_deref()
            .unwrap_or(DEFAULT_INSTANCE_TYPE)
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh_port.unwrap_or(DEFAULT_SSH_PORT)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DataCenterConfig {
    pub user_name: String,
    pub ssh_identity: String,
    pub machines: Vec<String>,
    pub title: Option<String>,
    pub ssh_port: Option<u16>,
}

impl DataCenterConfig {
    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| "default".to_owned())
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh_port.unwrap_or(DEFAULT_SSH_PORT)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TargetHostConfig {
    pub host_name: String,
    pub role_name: String,
    /// Monitor backend; only `nmon` ships today.
    pub monitor_type: Option<String>,
    pub executable_path: Option<String>,
    pub ssh_identity: Option<String>,
    pub user_name: Option<String>,
    pub sampling_interval: Option<u32>,
    pub active: Option<bool>,
}

impl TargetHostConfig {
    pub fn monitor_type(&self) -> &str {
        self.monitor_type.as_deref().unwrap_or("nmon")
    }

    pub fn sampling_interval(&self) -> u32 {
        self.sampling_interval
            .unwrap_or(DEFAULT_SAMPLING_INTERVAL_SECS)
    }
}
