//! Server-side monitoring: per-target samplers whose time series become
//! `TargetStat` rows when a cycle stops.
mod nmon;

pub use nmon::Nmon;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, ConfigError};
use crate::model::{ExecutionCycle, Project, TargetHost, TargetStat};
use crate::remote::{Executor, HostSpec};
use crate::store::Store;
use crate::workspace::Workspace;

/// Sampled resource trends for one target host.
#[derive(Debug, Clone, Default)]
pub struct MonitorTrends {
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub swap: Vec<f64>,
}

impl MonitorTrends {
    fn average(series: &[f64]) -> f64 {
        if series.is_empty() {
            return 0.0;
        }
        series.iter().sum::<f64>() / series.len() as f64
    }

    pub fn into_target_stat(self, cycle_id: i64, target_id: i64) -> TargetStat {
        let swap_average = if self.swap.is_empty() {
            None
        } else {
            Some(Self::average(&self.swap))
        };
        TargetStat {
            id: 0,
            execution_cycle_id: cycle_id,
            target_host_id: target_id,
            average_cpu_usage: Self::average(&self.cpu),
            average_memory_usage: Self::average(&self.memory),
            average_swap_usage: swap_average,
            cpu_usage_trend: serde_json::to_vec(&self.cpu).ok(),
            memory_usage_trend: serde_json::to_vec(&self.memory).ok(),
            swap_usage_trend: serde_json::to_vec(&self.swap).ok(),
        }
    }
}

/// Monitor implementation seam; `nmon` is the only backend shipped.
#[async_trait]
pub trait MonitorBackend: Send + Sync {
    async fn install(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
    ) -> AppResult<()>;

    /// Starts the sampler at the target's interval; returns its pid.
    async fn start(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
    ) -> AppResult<u32>;

    async fn stop(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
    ) -> AppResult<()>;

    /// Downloads and parses the sampler output collected so far.
    async fn collect(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
        scratch_dir: &Path,
    ) -> AppResult<MonitorTrends>;
}

pub struct TargetMonitorManager {
    store: Store,
    executor: Executor,
    workspace: Workspace,
}

impl TargetMonitorManager {
    pub fn new(store: Store, executor: Executor, workspace: Workspace) -> Self {
        TargetMonitorManager {
            store,
            executor,
            workspace,
        }
    }

    fn backend_for(&self, target: &TargetHost) -> AppResult<Box<dyn MonitorBackend>> {
        match target.monitor_type.as_str() {
            "nmon" => Ok(Box::new(Nmon)),
            other => Err(AppError::config(ConfigError::UnknownMonitorType {
                monitor: other.to_owned(),
                host: target.host_name.clone(),
            })),
        }
    }

    fn host_spec(&self, target: &TargetHost) -> HostSpec {
        let identity = target
            .ssh_identity
            .as_deref()
            .map(|identity| {
                let raw = PathBuf::from(identity);
                if raw.is_absolute() {
                    raw
                } else {
                    self.workspace.identity_path(&format!("{identity}.pem"))
                }
            })
            .unwrap_or_else(|| self.workspace.identity_path("insecure.pem"));
        HostSpec::new(
            &target.host_name,
            target.user_name.as_deref().unwrap_or("root"),
            &identity,
            crate::model::DEFAULT_SSH_PORT,
        )
    }

    /// Installs the sampler on every active target.
    pub async fn install_all(&self, project: &Project) -> AppResult<()> {
        for target in self.store.active_targets(project.id).await? {
            let backend = self.backend_for(&target)?;
            let host = self.host_spec(&target);
            backend.install(&self.executor, &host, &target).await?;
        }
        Ok(())
    }

    pub async fn start_monitoring(&self, project: &Project) -> AppResult<()> {
        for target in self.store.active_targets(project.id).await? {
            if target.monitoring() {
                continue;
            }
            let backend = self.backend_for(&target)?;
            let host = self.host_spec(&target);
            let pid = backend.start(&self.executor, &host, &target).await?;
            self.store.set_target_pid(target.id, Some(pid)).await?;
            info!(host = %target.host_name, pid, "monitor started");
        }
        Ok(())
    }

    /// Stops every sampler. Summaries are only written when
    /// `create_target_stat` is set; an aborted run would bias them.
    /// Stop failures on one host never prevent stopping the rest.
    pub async fn stop_monitoring(
        &self,
        project: &Project,
        cycle: Option<&ExecutionCycle>,
        create_target_stat: bool,
    ) -> AppResult<()> {
        let mut first_error = None;
        for target in self.store.active_targets(project.id).await? {
            if !target.monitoring() {
                continue;
            }
            let result = self.stop_one(&target, cycle, create_target_stat).await;
            if let Err(err) = result {
                warn!(host = %target.host_name, "monitor stop failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stop_one(
        &self,
        target: &TargetHost,
        cycle: Option<&ExecutionCycle>,
        create_target_stat: bool,
    ) -> AppResult<()> {
        let backend = self.backend_for(target)?;
        let host = self.host_spec(target);
        backend.stop(&self.executor, &host, target).await?;
        self.store.set_target_pid(target.id, None).await?;
        if create_target_stat {
            if let Some(cycle) = cycle {
                let scratch = self.workspace.tmp_dir();
                let trends = backend
                    .collect(&self.executor, &host, target, &scratch)
                    .await?;
                let stat = trends.into_target_stat(cycle.id, target.id);
                self.store.insert_target_stat(&stat).await?;
            }
        }
        Ok(())
    }

    /// Stops any leftover samplers and forgets their pids.
    pub async fn terminate(&self, project: &Project) -> AppResult<()> {
        self.stop_monitoring(project, None, false).await
    }
}
