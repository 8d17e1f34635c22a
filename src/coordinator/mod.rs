//! Top-level command façade.
//!
//! The coordinator owns the explicit context every command needs (store,
//! executor, workspace, collaborator seams, config snapshot) and serialises
//! commands through a per-project advisory lock. Fan-out across clusters
//! and agents is bounded by the configured worker count; abort is
//! cooperative via a broadcast signal.
mod purge;
mod results;
mod run;
mod setup;
mod status;

pub use purge::PurgeScope;
pub use results::{ImportSelectors, ResultsOp, ResultsOutcome};

use std::sync::Arc;

use futures_util::future::join_all;
use std::future::Future;
use tokio::sync::{broadcast, Mutex, Semaphore};

use crate::agent::{AgentManager, JmxPlanSource, PlanSource};
use crate::cluster::{
    AmazonCluster, CloudClientFactory, Cluster, DataCenterCluster, NoCloud,
};
use crate::config::{self, ConfigFile};
use crate::cycle::CycleController;
use crate::error::{AppError, AppResult, ClusterError};
use crate::model::Project;
use crate::monitor::TargetMonitorManager;
use crate::remote::Executor;
use crate::report::{JtlSource, ReportRenderer, SampleSource, TextRenderer};
use crate::store::Store;
use crate::workspace::Workspace;

pub const DEFAULT_WORKER_COUNT: usize = 50;

pub struct Coordinator {
    store: Store,
    executor: Executor,
    workspace: Workspace,
    config: ConfigFile,
    cloud_factory: Arc<dyn CloudClientFactory>,
    plan_source: Arc<dyn PlanSource>,
    sample_source: Arc<dyn SampleSource>,
    renderer: Arc<dyn ReportRenderer>,
    workers: Arc<Semaphore>,
    command_lock: Mutex<()>,
    interrupt: broadcast::Sender<()>,
}

impl Coordinator {
    pub fn new(
        config: ConfigFile,
        store: Store,
        executor: Executor,
        workspace: Workspace,
    ) -> Self {
        let worker_count = config.worker_count.unwrap_or(DEFAULT_WORKER_COUNT).max(1);
        let (interrupt, _) = broadcast::channel(1);
        Coordinator {
            store,
            executor,
            workspace,
            config,
            cloud_factory: Arc::new(NoCloud),
            plan_source: Arc::new(JmxPlanSource),
            sample_source: Arc::new(JtlSource),
            renderer: Arc::new(TextRenderer),
            workers: Arc::new(Semaphore::new(worker_count)),
            command_lock: Mutex::new(()),
            interrupt,
        }
    }

    pub fn with_cloud_factory(mut self, factory: Arc<dyn CloudClientFactory>) -> Self {
        self.cloud_factory = factory;
        self
    }

    pub fn with_plan_source(mut self, source: Arc<dyn PlanSource>) -> Self {
        self.plan_source = source;
        self
    }

    pub fn with_sample_source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.sample_source = source;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Signals every in-flight worker to wind down at its next suspension
    /// point. Does not take the command lock.
    pub fn interrupt(&self) {
        let _ = self.interrupt.send(());
    }

    pub(crate) fn interrupted(&self) -> broadcast::Receiver<()> {
        self.interrupt.subscribe()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub(crate) fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub(crate) fn plan_source(&self) -> &dyn PlanSource {
        self.plan_source.as_ref()
    }

    pub(crate) fn sample_source(&self) -> &dyn SampleSource {
        self.sample_source.as_ref()
    }

    pub(crate) fn renderer(&self) -> &dyn ReportRenderer {
        self.renderer.as_ref()
    }

    pub(crate) fn cycles(&self) -> CycleController {
        CycleController::new(self.store.clone())
    }

    pub(crate) fn agents(&self) -> AgentManager {
        AgentManager::new(self.store.clone(), self.executor.clone())
    }

    pub(crate) fn monitors(&self) -> TargetMonitorManager {
        TargetMonitorManager::new(
            self.store.clone(),
            self.executor.clone(),
            self.workspace.clone(),
        )
    }

    pub(crate) async fn lock_command(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.command_lock.lock().await
    }

    pub(crate) fn worker_pool(&self) -> Arc<Semaphore> {
        Arc::clone(&self.workers)
    }

    /// Loads (or creates) the project row and applies config-level
    /// settings.
    pub(crate) async fn project(&self) -> AppResult<Project> {
        let code = crate::model::slugify(&self.config.project_code);
        let mut project = self.store.find_or_create_project(&code).await?;
        let mut dirty = false;
        if let Some(max_threads) = self.config.max_threads_per_agent {
            if project.max_threads_per_agent != max_threads {
                project.max_threads_per_agent = max_threads;
                dirty = true;
            }
        }
        if let Some(master_slave) = self.config.master_slave_mode {
            if project.master_slave_mode != master_slave {
                project.master_slave_mode = master_slave;
                dirty = true;
            }
        }
        if let Some(breakup) = self.config.samples_breakup_interval.as_deref() {
            if project.samples_breakup_interval != breakup {
                project.samples_breakup_interval = breakup.to_owned();
                dirty = true;
            }
        }
        if dirty {
            self.store.update_project(&project).await?;
        }
        Ok(project)
    }

    /// Materialises in-memory backends for every cluster row of the
    /// project. Rows carry ids only; siblings are looked up through the
    /// store, never through owning references.
    pub(crate) async fn load_clusters(&self, project: &Project) -> AppResult<Vec<Cluster>> {
        let jmeter = config::resolve_jmeter(&self.config.jmeter).map_err(AppError::config)?;
        let mut clusters = Vec::new();
        for row in self.store.amazon_clouds(project.id).await? {
            let cloud = self
                .cloud_factory
                .client_for(&row)
                .map_err(AppError::config)?;
            clusters.push(Cluster::Amazon(AmazonCluster::new(
                row,
                project.clone(),
                jmeter.clone(),
                self.store.clone(),
                self.executor.clone(),
                cloud,
                self.workspace.clone(),
            )));
        }
        for row in self.store.data_centers(project.id).await? {
            clusters.push(Cluster::DataCenter(DataCenterCluster::new(
                row,
                self.store.clone(),
                self.executor.clone(),
                self.workspace.clone(),
            )));
        }
        Ok(clusters)
    }

    /// Runs one future per cluster concurrently (bounded by the worker
    /// pool) and aggregates failures into a setup-style error that names
    /// every failed cluster.
    pub(crate) async fn for_each_cluster<'a, F, Fut>(
        &self,
        clusters: &'a mut [Cluster],
        job: F,
    ) -> AppResult<()>
    where
        F: Fn(&'a mut Cluster) -> Fut,
        Fut: Future<Output = AppResult<()>> + 'a,
    {
        let workers = Arc::clone(&self.workers);
        let tasks = clusters.iter_mut().map(|cluster| {
            let name = cluster.name();
            let workers = Arc::clone(&workers);
            let work = job(cluster);
            async move {
                let _permit = workers.acquire().await;
                (name, work.await)
            }
        });
        let mut failures = Vec::new();
        for (name, result) in join_all(tasks).await {
            if let Err(err) = result {
                failures.push((name, err.to_string()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::cluster(ClusterError::Setup { failures }))
        }
    }
}
