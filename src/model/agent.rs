use super::ClusterKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Master,
    Slave,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Master => "master",
            AgentRole::Slave => "slave",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "master" => Some(AgentRole::Master),
            "slave" => Some(AgentRole::Slave),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadAgent {
    pub id: i64,
    pub clusterable_id: i64,
    pub clusterable_type: ClusterKind,
    pub jmeter_plan_id: i64,
    pub public_ip_address: Option<String>,
    pub private_ip_address: Option<String>,
    pub active: bool,
    pub role: AgentRole,
    pub jmeter_pid: Option<u32>,
    /// Backend handle: EC2 instance id for elastic agents, machine host
    /// name for static ones.
    pub identifier: Option<String>,
}

impl LoadAgent {
    pub fn is_master(&self) -> bool {
        self.role == AgentRole::Master
    }

    pub fn running_load(&self) -> bool {
        self.jmeter_pid.is_some()
    }

    /// File-system friendly handle for per-agent artifacts.
    pub fn slug(&self) -> String {
        let base = self
            .identifier
            .as_deref()
            .or(self.public_ip_address.as_deref())
            .unwrap_or("agent");
        let mut slug: String = base
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
            .collect();
        if slug.is_empty() {
            slug.push_str("agent");
        }
        slug
    }
}
