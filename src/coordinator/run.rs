use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::agent::PlanArtifacts;
use crate::cluster::Cluster;
use crate::error::{AppError, AppResult, CycleError};
use crate::model::{ClientStat, CycleStatus, ExecutionCycle, JmeterPlan, Project};
use crate::report::{aggregate_client, page_stats};

use super::Coordinator;

/// How long in-flight workers get to reach their next suspension point
/// after an interrupt.
const ABORT_GRACE: Duration = Duration::from_secs(30);

impl Coordinator {
    /// Opens a new execution cycle and generates load: implicit setup,
    /// monitors first, then per-(cluster, plan) reconciliation, deployment
    /// and JMeter launch. Any failure aborts the freshly opened cycle.
    pub async fn start(&self, redeploy: bool) -> AppResult<ExecutionCycle> {
        let _guard = self.lock_command().await;
        let project = self.project().await?;
        let cycles = self.cycles();
        let cycle = cycles.begin(&project, 0).await?;

        match self.start_inner(&cycle, redeploy).await {
            Ok(()) => Ok(self
                .store()
                .cycle_by_id(cycle.id)
                .await?
                .unwrap_or(cycle)),
            Err(err) => {
                warn!(cycle = cycle.id, "start failed, aborting cycle: {err}");
                let _ = cycles.transition(&cycle, CycleStatus::Aborted).await;
                Err(err)
            }
        }
    }

    async fn start_inner(&self, cycle: &ExecutionCycle, redeploy: bool) -> AppResult<()> {
        let project = self.setup_inner(false).await?;
        let plans = self.store().active_plans(project.id).await?;
        let clusters = self.load_clusters(&project).await?;
        let total_threads: u32 = plans
            .iter()
            .map(|plan| plan.latest_threads_count)
            .sum::<u32>()
            .saturating_mul(clusters.len() as u32);
        self.store()
            .set_cycle_threads(cycle.id, total_threads)
            .await?;
        self.generate_load(&project, &clusters, &plans, redeploy)
            .await
    }

    async fn generate_load(
        &self,
        project: &Project,
        clusters: &[Cluster],
        plans: &[JmeterPlan],
        redeploy: bool,
    ) -> AppResult<()> {
        // Monitors before load: a sampler that misses the ramp-up
        // invalidates the whole series.
        self.monitors().start_monitoring(project).await?;

        let mut interrupted = self.interrupted();
        let work = self.fan_out_load(project, clusters, plans, redeploy);
        tokio::pin!(work);
        tokio::select! {
            result = &mut work => result,
            _ = interrupted.recv() => {
                // Grace period for workers to reach a suspension point;
                // afterwards the in-flight futures are dropped.
                let _ = tokio::time::timeout(ABORT_GRACE, &mut work).await;
                Err(AppError::cycle(CycleError::Interrupted {
                    project: project.project_code.clone(),
                }))
            }
        }
    }

    async fn fan_out_load(
        &self,
        project: &Project,
        clusters: &[Cluster],
        plans: &[JmeterPlan],
        redeploy: bool,
    ) -> AppResult<()> {
        let manager = self.agents();
        let workers = self.worker_pool();
        let tasks = clusters.iter().flat_map(|cluster| {
            plans.iter().map(move |plan| (cluster, plan))
        });
        let futures = tasks.map(|(cluster, plan)| {
            let manager = &manager;
            let workers = Arc::clone(&workers);
            async move {
                let _permit = workers.acquire().await;
                let agents = manager.reconcile(cluster, project, plan).await?;
                let artifacts = self.artifacts_for(plan)?;
                if redeploy {
                    manager
                        .clear_artifacts(cluster, project, plan, &agents)
                        .await?;
                }
                manager
                    .deploy(cluster, project, plan, &artifacts, &agents)
                    .await?;
                manager.start_load(cluster, project, plan, &agents).await?;
                Ok::<(), AppError>(())
            }
        });
        let mut first_error = None;
        for result in join_all(futures).await {
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stops load generation and then, unconditionally, the monitors.
    /// A clean stop collects results and closes the cycle as `stopped`;
    /// a load-stop failure aborts the cycle and surfaces the error, with
    /// monitor summaries suppressed so a broken run never biases stats.
    pub async fn stop(&self, wait: bool, suspend: bool) -> AppResult<ExecutionCycle> {
        let _guard = self.lock_command().await;
        let project = self.project().await?;
        let cycles = self.cycles();
        let cycle = cycles.require_current(&project).await?;
        let clusters = self.load_clusters(&project).await?;
        let plans = self.store().active_plans(project.id).await?;

        let stop_result = self
            .stop_load_everywhere(&clusters, wait, false)
            .await;
        let monitor_result = self
            .monitors()
            .stop_monitoring(&project, Some(&cycle), stop_result.is_ok())
            .await;

        match stop_result.and(monitor_result) {
            Ok(()) => {
                self.collect_and_aggregate(&project, &cycle, &clusters, &plans)
                    .await?;
                if suspend {
                    self.suspend_agents(&clusters).await?;
                }
                cycles.transition(&cycle, CycleStatus::Stopped).await
            }
            Err(err) => {
                let _ = cycles.transition(&cycle, CycleStatus::Aborted).await;
                Err(err)
            }
        }
    }

    /// Hard stop: load generation is killed, monitors are stopped without
    /// writing stats, and the cycle lands in `aborted`.
    pub async fn abort(&self, suspend: bool) -> AppResult<ExecutionCycle> {
        self.interrupt();
        let _guard = self.lock_command().await;
        let project = self.project().await?;
        let cycles = self.cycles();
        let cycle = cycles.require_current(&project).await?;
        let clusters = self.load_clusters(&project).await?;

        if let Err(err) = self.stop_load_everywhere(&clusters, false, true).await {
            warn!(cycle = cycle.id, "force-stop reported: {err}");
        }
        if let Err(err) = self.monitors().stop_monitoring(&project, None, false).await {
            warn!(cycle = cycle.id, "monitor stop reported: {err}");
        }
        if suspend {
            self.suspend_agents(&clusters).await?;
        }
        cycles.transition(&cycle, CycleStatus::Aborted).await
    }

    /// Releases everything the project holds remotely: agents terminated
    /// (AMIs kept), monitors gone, serial version cleared, the current
    /// cycle marked `terminated`.
    pub async fn terminate(&self) -> AppResult<()> {
        let _guard = self.lock_command().await;
        let project = self.project().await?;
        let clusters = self.load_clusters(&project).await?;
        let manager = self.agents();

        for cluster in &clusters {
            manager.terminate_agents(cluster).await?;
            cluster.cleanup().await?;
        }
        self.monitors().terminate(&project).await?;
        self.store().set_serial_version(project.id, None).await?;

        if let Some(cycle) = self.cycles().current(&project).await? {
            self.cycles()
                .transition(&cycle, CycleStatus::Terminated)
                .await?;
        }
        info!(project = %project.project_code, "terminated");
        Ok(())
    }

    async fn stop_load_everywhere(
        &self,
        clusters: &[Cluster],
        wait: bool,
        force: bool,
    ) -> AppResult<()> {
        let manager = self.agents();
        let mut first_error = None;
        for cluster in clusters {
            let agents = self
                .store()
                .agents_for_cluster(cluster.clusterable_id(), cluster.kind())
                .await?;
            if let Err(err) = manager.stop_load(cluster, &agents, wait, force).await {
                warn!(cluster = %cluster.name(), "stop load failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Pulls every master's results into `tmp/SEQUENCE-<id>/` and writes
    /// the per-(plan, clusterable) statistics.
    async fn collect_and_aggregate(
        &self,
        project: &Project,
        cycle: &ExecutionCycle,
        clusters: &[Cluster],
        plans: &[JmeterPlan],
    ) -> AppResult<()> {
        let cycle_dir = self.workspace().create_cycle_dir(cycle.id)?;
        let manager = self.agents();
        let breakup = project.breakup_intervals();
        let mut total_threads = 0u32;

        for cluster in clusters {
            for plan in plans {
                let agents = self
                    .store()
                    .agents_for_plan(cluster.clusterable_id(), cluster.kind(), plan.id)
                    .await?;
                let files = manager
                    .collect_results(cluster, project, plan, &cycle_dir, &agents)
                    .await?;
                let mut samples = Vec::new();
                for file in &files {
                    samples.extend(self.sample_source().samples(file)?);
                }
                if samples.is_empty() {
                    continue;
                }
                let pages = page_stats(&samples, &breakup);
                let aggregate = aggregate_client(&pages, &samples);
                let client = ClientStat {
                    id: 0,
                    execution_cycle_id: cycle.id,
                    jmeter_plan_id: plan.id,
                    clusterable_id: cluster.clusterable_id(),
                    clusterable_type: cluster.kind(),
                    threads_count: plan.latest_threads_count,
                    aggregate_ninety_percentile: aggregate.aggregate_ninety_percentile,
                    aggregate_response_throughput: aggregate.aggregate_response_throughput,
                    last_sample_at: aggregate.last_sample_at,
                };
                self.store().insert_client_stat(&client, &pages).await?;
                total_threads = total_threads.saturating_add(client.threads_count);
            }
        }
        self.store().set_cycle_threads(cycle.id, total_threads).await?;
        Ok(())
    }

    /// `suspend`: after load stops, park the backing hosts and forget
    /// their released addresses.
    async fn suspend_agents(&self, clusters: &[Cluster]) -> AppResult<()> {
        for cluster in clusters {
            let mut agents = self
                .store()
                .agents_for_cluster(cluster.clusterable_id(), cluster.kind())
                .await?;
            for agent in agents.iter_mut().filter(|agent| agent.active) {
                cluster.stop_agent(agent).await?;
                self.store().update_agent(agent).await?;
            }
        }
        Ok(())
    }

    fn artifacts_for(&self, plan: &JmeterPlan) -> AppResult<PlanArtifacts> {
        let plan_file = self.workspace().app_dir().join(&plan.test_plan_name);
        let data_files = self
            .config()
            .plans
            .iter()
            .find(|candidate| {
                PathBuf::from(&candidate.file)
                    .file_name()
                    .map(|name| name.to_string_lossy() == plan.test_plan_name.as_str())
                    .unwrap_or(false)
            })
            .map(|candidate| {
                candidate
                    .data_files
                    .iter()
                    .map(|data_file| {
                        let direct = PathBuf::from(data_file);
                        if direct.is_file() {
                            direct
                        } else {
                            self.workspace().app_dir().join(
                                direct
                                    .file_name()
                                    .map(|name| name.to_os_string())
                                    .unwrap_or_default(),
                            )
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(PlanArtifacts {
            plan_file,
            data_files,
        })
    }
}
