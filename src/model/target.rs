pub const DEFAULT_SAMPLING_INTERVAL_SECS: u32 = 10;

#[derive(Debug, Clone)]
pub struct TargetHost {
    pub id: i64,
    pub project_id: i64,
    pub host_name: String,
    pub role_name: String,
    /// Monitor backend discriminator (currently `nmon`).
    pub monitor_type: String,
    pub executable_path: Option<String>,
    pub executable_pid: Option<u32>,
    pub ssh_identity: Option<String>,
    pub user_name: Option<String>,
    pub sampling_interval: u32,
    pub active: bool,
}

impl TargetHost {
    pub fn monitoring(&self) -> bool {
        self.executable_pid.is_some()
    }
}
