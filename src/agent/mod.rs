//! Load-agent management: reconciliation against the desired fleet size,
//! artifact deployment, and driving JMeter across the fleet.
mod jmeter;

pub use jmeter::{
    launch_command, parse_launch_pid, remote_results_path, remote_work_dir, JmxPlanSource,
    PlanInfo, PlanSource,
};

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::error::{AppError, AppResult, CycleError, RemoteError};
use crate::model::{AgentRole, JmeterPlan, LoadAgent, Project};
use crate::remote::{wait_for, Executor, HostSpec};
use crate::store::Store;

/// Local artifacts backing one plan deployment.
#[derive(Debug, Clone)]
pub struct PlanArtifacts {
    pub plan_file: PathBuf,
    pub data_files: Vec<PathBuf>,
}

/// How long a graceful stop may wait for JMeter to finish on its own.
const LOAD_COMPLETION_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);
const LOAD_POLL_INTERVAL: Duration = Duration::from_secs(10);
const PROCESS_EXIT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AgentManager {
    store: Store,
    executor: Executor,
}

impl AgentManager {
    pub fn new(store: Store, executor: Executor) -> Self {
        AgentManager { store, executor }
    }

    /// Reconciles the fleet for one (cluster, plan) to the backend's
    /// required count: re-enable disabled agents, provision the shortfall,
    /// disable the surplus, then enforce master uniqueness.
    pub async fn reconcile(
        &self,
        cluster: &Cluster,
        project: &Project,
        plan: &JmeterPlan,
    ) -> AppResult<Vec<LoadAgent>> {
        let desired = cluster.required_agent_count(plan);
        let mut agents = self
            .store
            .agents_for_plan(cluster.clusterable_id(), cluster.kind(), plan.id)
            .await?;
        let active_count = agents.iter().filter(|agent| agent.active).count() as u32;

        if active_count < desired {
            let mut shortfall = desired - active_count;
            // Disabled agents come back first; their hosts may still exist.
            for agent in agents.iter_mut().filter(|agent| !agent.active) {
                if shortfall == 0 {
                    break;
                }
                agent.active = true;
                self.store.update_agent(agent).await?;
                shortfall -= 1;
            }
            for _ in 0..shortfall {
                let role = self.next_role(project, &agents);
                let provisioned = cluster.provision_agent(plan, role).await?;
                let saved = self.store.insert_agent(&provisioned).await?;
                agents.push(saved);
            }
        } else if active_count > desired {
            for agent_id in agents_to_remove(&agents, desired as usize) {
                if let Some(agent) = agents
                    .iter_mut()
                    .find(|agent| agent.id == agent_id && agent.active)
                {
                    agent.active = false;
                    self.store.update_agent(agent).await?;
                }
            }
        }

        self.enforce_master_invariant(project, plan, &mut agents)
            .await?;
        info!(
            cluster = %cluster.name(),
            plan = %plan.test_plan_name,
            desired,
            "agents reconciled"
        );
        Ok(agents.into_iter().filter(|agent| agent.active).collect())
    }

    fn next_role(&self, project: &Project, agents: &[LoadAgent]) -> AgentRole {
        if !project.master_slave_mode {
            return AgentRole::Master;
        }
        let has_master = agents
            .iter()
            .any(|agent| agent.active && agent.is_master());
        if has_master {
            AgentRole::Slave
        } else {
            AgentRole::Master
        }
    }

    /// At most one active master per (cluster, plan) in master-slave mode;
    /// outside it, slaves must not exist at all.
    async fn enforce_master_invariant(
        &self,
        project: &Project,
        plan: &JmeterPlan,
        agents: &mut [LoadAgent],
    ) -> AppResult<()> {
        if !project.master_slave_mode {
            for agent in agents.iter_mut().filter(|agent| !agent.is_master()) {
                agent.role = AgentRole::Master;
                self.store.update_agent(agent).await?;
            }
            return Ok(());
        }
        let masters = agents
            .iter()
            .filter(|agent| agent.active && agent.is_master())
            .count();
        if masters > 1 {
            let clusterable_id = agents
                .first()
                .map(|agent| agent.clusterable_id)
                .unwrap_or_default();
            return Err(AppError::cycle(CycleError::MasterSlaveConflict {
                plan: plan.test_plan_name.clone(),
                clusterable_id,
            }));
        }
        if masters == 0 {
            if let Some(agent) = agents.iter_mut().find(|agent| agent.active) {
                agent.role = AgentRole::Master;
                self.store.update_agent(agent).await?;
            }
        }
        Ok(())
    }

    /// Stages the plan and its data files on every agent. Content hashes
    /// make re-deploys of unchanged artifacts free.
    pub async fn deploy(
        &self,
        cluster: &Cluster,
        project: &Project,
        plan: &JmeterPlan,
        artifacts: &PlanArtifacts,
        agents: &[LoadAgent],
    ) -> AppResult<()> {
        let work_dir = jmeter::remote_work_dir(&project.project_code);
        let mut tasks: JoinSet<AppResult<()>> = JoinSet::new();
        for agent in agents.iter().filter(|agent| agent.active) {
            let host = cluster.host_spec(agent)?;
            let executor = self.executor.clone();
            let work_dir = work_dir.clone();
            let plan_remote = jmeter::remote_plan_path(&project.project_code, plan);
            let artifacts = artifacts.clone();
            tasks.spawn(async move {
                executor
                    .exec_ok(&host, &format!("mkdir -p {work_dir}"))
                    .await?;
                executor
                    .upload_idempotent(&host, &artifacts.plan_file, &plan_remote)
                    .await?;
                for data_file in &artifacts.data_files {
                    let name = data_file
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    executor
                        .upload_idempotent(&host, data_file, &format!("{work_dir}/{name}"))
                        .await?;
                }
                Ok(())
            });
        }
        join_all(tasks).await
    }

    /// Removes previously staged artifacts so the next deploy uploads
    /// everything fresh.
    pub async fn clear_artifacts(
        &self,
        cluster: &Cluster,
        project: &Project,
        plan: &JmeterPlan,
        agents: &[LoadAgent],
    ) -> AppResult<()> {
        let plan_remote = jmeter::remote_plan_path(&project.project_code, plan);
        for agent in agents.iter().filter(|agent| agent.active) {
            let host = cluster.host_spec(agent)?;
            self.executor
                .exec(&host, &format!("rm -f {plan_remote}"))
                .await?;
        }
        Ok(())
    }

    /// Starts load generation: slaves first (they must be listening before
    /// the master connects over RMI), then masters. Pids are recorded as
    /// they come back.
    pub async fn start_load(
        &self,
        cluster: &Cluster,
        project: &Project,
        plan: &JmeterPlan,
        agents: &[LoadAgent],
    ) -> AppResult<()> {
        let actives: Vec<&LoadAgent> = agents.iter().filter(|agent| agent.active).collect();
        let slave_hosts: Vec<String> = actives
            .iter()
            .filter(|agent| !agent.is_master())
            .filter_map(|agent| {
                agent
                    .private_ip_address
                    .clone()
                    .or_else(|| agent.public_ip_address.clone())
            })
            .collect();

        for role in [AgentRole::Slave, AgentRole::Master] {
            let mut tasks: JoinSet<AppResult<(i64, u32)>> = JoinSet::new();
            for agent in actives.iter().filter(|agent| agent.role == role) {
                let host = cluster.host_spec(agent)?;
                let command =
                    jmeter::launch_command(&project.project_code, plan, agent, &slave_hosts);
                let executor = self.executor.clone();
                let agent_id = agent.id;
                tasks.spawn(async move {
                    let output = executor.exec_ok(&host, &command).await?;
                    let pid = jmeter::parse_launch_pid(&output.stdout, &host.host)?;
                    Ok((agent_id, pid))
                });
            }
            while let Some(joined) = tasks.join_next().await {
                let (agent_id, pid) = joined??;
                self.store.set_agent_pid(agent_id, Some(pid)).await?;
            }
        }
        info!(plan = %plan.test_plan_name, "load generation started");
        Ok(())
    }

    /// Stops load generation. With `wait`, masters are left to finish the
    /// plan; otherwise they are signalled (SIGKILL when `force`). Slaves
    /// are torn down after their master.
    pub async fn stop_load(
        &self,
        cluster: &Cluster,
        agents: &[LoadAgent],
        wait: bool,
        force: bool,
    ) -> AppResult<()> {
        for role in [AgentRole::Master, AgentRole::Slave] {
            let mut tasks: JoinSet<AppResult<i64>> = JoinSet::new();
            for agent in agents
                .iter()
                .filter(|agent| agent.role == role && agent.jmeter_pid.is_some())
            {
                let host = cluster.host_spec(agent)?;
                let executor = self.executor.clone();
                let agent_id = agent.id;
                let pid = agent.jmeter_pid.unwrap_or_default();
                // Only masters honour `wait`; slaves idle until killed.
                let wait_for_exit = wait && role == AgentRole::Master;
                tasks.spawn(async move {
                    stop_one(&executor, &host, pid, wait_for_exit, force).await?;
                    Ok(agent_id)
                });
            }
            while let Some(joined) = tasks.join_next().await {
                let agent_id = joined??;
                self.store.set_agent_pid(agent_id, None).await?;
            }
        }
        Ok(())
    }

    /// Pulls each master's results file into the cycle directory as
    /// `<agent-slug>.jtl`.
    pub async fn collect_results(
        &self,
        cluster: &Cluster,
        project: &Project,
        plan: &JmeterPlan,
        cycle_dir: &Path,
        agents: &[LoadAgent],
    ) -> AppResult<Vec<PathBuf>> {
        let mut tasks: JoinSet<AppResult<PathBuf>> = JoinSet::new();
        for agent in agents
            .iter()
            .filter(|agent| agent.active && agent.is_master())
        {
            let host = cluster.host_spec(agent)?;
            let executor = self.executor.clone();
            let remote = jmeter::remote_results_path(&project.project_code, plan);
            let local = cycle_dir.join(format!("{}.jtl", agent.slug()));
            tasks.spawn(async move {
                executor.download(&host, &remote, &local).await?;
                Ok(local)
            });
        }
        let mut collected = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(path) => collected.push(path),
                Err(err) => {
                    warn!("result collection failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        collected.sort();
        Ok(collected)
    }

    /// Is the recorded JMeter process still alive on the agent?
    pub async fn probe_agent(&self, cluster: &Cluster, agent: &LoadAgent) -> AppResult<bool> {
        let Some(pid) = agent.jmeter_pid else {
            return Ok(false);
        };
        let host = cluster.host_spec(agent)?;
        let output = self
            .executor
            .exec(&host, &format!("kill -0 {pid} 2>/dev/null"))
            .await?;
        Ok(output.success())
    }

    /// Releases every agent of the cluster: backend teardown hook first,
    /// then the row.
    pub async fn terminate_agents(&self, cluster: &Cluster) -> AppResult<()> {
        let mut agents = self
            .store
            .agents_for_cluster(cluster.clusterable_id(), cluster.kind())
            .await?;
        for agent in agents.iter_mut() {
            cluster.before_destroy_load_agent(agent).await?;
            self.store.delete_agent(agent.id).await?;
        }
        Ok(())
    }
}

/// Surplus beyond `keep` agents, lowest priority first: disabled agents,
/// then the newest. The caller decides whether to disable or destroy.
pub fn agents_to_remove(agents: &[LoadAgent], keep: usize) -> Vec<i64> {
    if agents.len() <= keep {
        return Vec::new();
    }
    let mut candidates: Vec<&LoadAgent> = agents.iter().collect();
    candidates.sort_by_key(|agent| (agent.active, std::cmp::Reverse(agent.id)));
    candidates
        .into_iter()
        .take(agents.len() - keep)
        .map(|agent| agent.id)
        .collect()
}

async fn stop_one(
    executor: &Executor,
    host: &HostSpec,
    pid: u32,
    wait_for_exit: bool,
    force: bool,
) -> AppResult<()> {
    let alive = |executor: Executor, host: HostSpec| async move {
        executor
            .exec(&host, &format!("kill -0 {pid} 2>/dev/null"))
            .await
            .map(|output| output.success())
            .unwrap_or(true)
    };

    if wait_for_exit {
        wait_for(
            "load generation to finish",
            LOAD_COMPLETION_TIMEOUT,
            LOAD_POLL_INTERVAL,
            || {
                let executor = executor.clone();
                let host = host.clone();
                async move {
                    if alive(executor, host).await {
                        None
                    } else {
                        Some(())
                    }
                }
            },
        )
        .await
        .map_err(AppError::remote)?;
        return Ok(());
    }

    let signal = if force { "-9" } else { "-15" };
    executor
        .exec(host, &format!("kill {signal} {pid} 2>/dev/null"))
        .await?;
    wait_for(
        "process exit",
        PROCESS_EXIT_TIMEOUT,
        Duration::from_secs(2),
        || {
            let executor = executor.clone();
            let host = host.clone();
            async move {
                if alive(executor, host).await {
                    None
                } else {
                    Some(())
                }
            }
        },
    )
    .await
    .map_err(|_| {
        AppError::remote(RemoteError::Timeout {
            label: format!("jmeter pid {pid} exit on {}", host.host),
            secs: PROCESS_EXIT_TIMEOUT.as_secs(),
        })
    })?;
    Ok(())
}

async fn join_all(mut tasks: JoinSet<AppResult<()>>) -> AppResult<()> {
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined? {
            warn!("agent task failed: {err}");
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClusterKind;

    fn agent(id: i64, active: bool) -> LoadAgent {
        LoadAgent {
            id,
            clusterable_id: 1,
            clusterable_type: ClusterKind::DataCenter,
            jmeter_plan_id: 1,
            public_ip_address: None,
            private_ip_address: None,
            active,
            role: AgentRole::Master,
            jmeter_pid: None,
            identifier: None,
        }
    }

    #[test]
    fn surplus_takes_newest_actives_when_all_are_active() {
        let agents = vec![agent(1, true), agent(2, true), agent(3, true)];
        assert_eq!(agents_to_remove(&agents, 1), vec![3, 2]);
    }

    #[test]
    fn surplus_takes_disabled_agents_before_active_ones() {
        let agents = vec![agent(1, true), agent(2, false), agent(3, true)];
        assert_eq!(agents_to_remove(&agents, 2), vec![2]);
        assert_eq!(agents_to_remove(&agents, 1), vec![2, 3]);
    }

    #[test]
    fn no_surplus_when_keeping_the_whole_fleet() {
        let agents = vec![agent(1, true)];
        assert!(agents_to_remove(&agents, 1).is_empty());
        assert!(agents_to_remove(&agents, 5).is_empty());
    }
}
