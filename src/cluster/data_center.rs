use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::{AppError, AppResult, ClusterError};
use crate::model::{AgentRole, ClusterKind, DataCenter, JmeterPlan, LoadAgent};
use crate::remote::{Executor, HostSpec};
use crate::store::Store;
use crate::workspace::Workspace;

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Static backend over a fixed machine list. Hosts are never created or
/// destroyed; agents map one-to-one onto machines.
pub struct DataCenterCluster {
    row: DataCenter,
    store: Store,
    executor: Executor,
    workspace: Workspace,
}

impl DataCenterCluster {
    pub fn new(row: DataCenter, store: Store, executor: Executor, workspace: Workspace) -> Self {
        DataCenterCluster {
            row,
            store,
            executor,
            workspace,
        }
    }

    pub fn clusterable_id(&self) -> i64 {
        self.row.id
    }

    pub fn name(&self) -> String {
        format!("cluster-{}-{}", ClusterKind::DataCenter.as_str(), self.row.title)
    }

    pub fn user_name(&self) -> &str {
        &self.row.user_name
    }

    /// An absolute `ssh_identity` is used as-is; otherwise the key is
    /// expected in the project workspace.
    pub fn identity_file(&self) -> PathBuf {
        let raw = PathBuf::from(&self.row.ssh_identity);
        if raw.is_absolute() {
            raw
        } else {
            self.workspace
                .identity_path(&format!("{}.pem", self.row.ssh_identity))
        }
    }

    fn machine_host_spec(&self, machine: &str) -> HostSpec {
        HostSpec::new(
            machine,
            &self.row.user_name,
            &self.identity_file(),
            self.row.ssh_port,
        )
    }

    /// Validates SSH reachability of every machine; failures are
    /// aggregated so one dead host doesn't hide the rest.
    pub async fn setup(&mut self) -> AppResult<()> {
        let mut failures = Vec::new();
        for machine in &self.row.machines {
            let host = self.machine_host_spec(machine);
            if let Err(err) = self
                .executor
                .ensure_connectivity(&host, REACHABILITY_TIMEOUT)
                .await
            {
                failures.push((machine.clone(), err.to_string()));
            }
        }
        if !failures.is_empty() {
            return Err(AppError::cluster(ClusterError::Setup { failures }));
        }
        info!(title = %self.row.title, machines = self.row.machines.len(), "data center reachable");
        Ok(())
    }

    /// Fixed fleet: every machine is an agent.
    pub fn required_agent_count(&self, _plan: &JmeterPlan) -> u32 {
        self.row.machines.len() as u32
    }

    /// Binds the next unassigned machine to the plan.
    pub async fn provision_agent(
        &self,
        plan: &JmeterPlan,
        role: AgentRole,
    ) -> AppResult<LoadAgent> {
        let agents = self
            .store
            .agents_for_cluster(self.row.id, ClusterKind::DataCenter)
            .await?;
        let taken: HashSet<&str> = agents
            .iter()
            .filter_map(|agent| agent.identifier.as_deref())
            .collect();
        let machine = self
            .row
            .machines
            .iter()
            .find(|machine| !taken.contains(machine.as_str()))
            .ok_or_else(|| {
                AppError::cluster(ClusterError::NoFreeMachine {
                    title: self.row.title.clone(),
                })
            })?;
        let host = self.machine_host_spec(machine);
        self.executor
            .ensure_connectivity(&host, REACHABILITY_TIMEOUT)
            .await?;
        Ok(LoadAgent {
            id: 0,
            clusterable_id: self.row.id,
            clusterable_type: ClusterKind::DataCenter,
            jmeter_plan_id: plan.id,
            public_ip_address: Some(machine.clone()),
            private_ip_address: None,
            active: true,
            role,
            jmeter_pid: None,
            identifier: Some(machine.clone()),
        })
    }

    pub async fn start_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        let machine = agent.identifier.clone().ok_or_else(|| {
            AppError::cluster(ClusterError::MissingHost {
                identifier: format!("agent-{}", agent.id),
            })
        })?;
        let host = self.machine_host_spec(&machine);
        self.executor
            .ensure_connectivity(&host, REACHABILITY_TIMEOUT)
            .await?;
        agent.public_ip_address = Some(machine);
        Ok(())
    }

    /// Machines stay up; stopping an agent only forgets its process state.
    pub async fn stop_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        agent.jmeter_pid = None;
        Ok(())
    }

    /// Terminate never touches data-center hosts.
    pub async fn terminate_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        agent.jmeter_pid = None;
        agent.public_ip_address = None;
        Ok(())
    }

    pub async fn cleanup(&self) -> AppResult<()> {
        Ok(())
    }

    pub fn host_spec(&self, agent: &LoadAgent) -> AppResult<HostSpec> {
        let machine = agent
            .public_ip_address
            .as_deref()
            .or(agent.identifier.as_deref())
            .ok_or_else(|| {
                AppError::cluster(ClusterError::MissingHost {
                    identifier: format!("agent-{}", agent.id),
                })
            })?;
        Ok(self.machine_host_spec(machine))
    }
}
