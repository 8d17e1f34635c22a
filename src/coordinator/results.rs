use std::path::PathBuf;

use chrono::Utc;
use tracing::info;

use crate::error::{AppError, AppResult, CycleError, StoreError};
use crate::model::{ClientStat, ClusterKind, CycleStatus, ExecutionCycle};
use crate::report::{self, aggregate_client, page_stats, CycleReport, ReportData};

use super::Coordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsOp {
    Show,
    Exclude,
    Include,
    Export,
    Import,
    Report,
}

/// Where an imported result file should be attached.
#[derive(Debug, Clone, Default)]
pub struct ImportSelectors {
    pub file: Option<PathBuf>,
    pub plan_name: Option<String>,
    pub cluster_id: Option<i64>,
    pub cycle_id: Option<i64>,
}

#[derive(Debug)]
pub enum ResultsOutcome {
    Cycles(Vec<ExecutionCycle>),
    Bundle(PathBuf),
    Imported(ExecutionCycle),
    Report(PathBuf),
}

impl Coordinator {
    pub async fn results(
        &self,
        op: ResultsOp,
        cycle_ids: &[i64],
        import: ImportSelectors,
    ) -> AppResult<ResultsOutcome> {
        let _guard = self.lock_command().await;
        match op {
            ResultsOp::Show => Ok(ResultsOutcome::Cycles(self.list_cycles(cycle_ids).await?)),
            ResultsOp::Exclude => {
                self.move_cycles(cycle_ids, CycleStatus::Excluded).await?;
                Ok(ResultsOutcome::Cycles(self.list_cycles(cycle_ids).await?))
            }
            ResultsOp::Include => {
                self.move_cycles(cycle_ids, CycleStatus::Stopped).await?;
                Ok(ResultsOutcome::Cycles(self.list_cycles(cycle_ids).await?))
            }
            ResultsOp::Export => Ok(ResultsOutcome::Bundle(self.export(cycle_ids).await?)),
            ResultsOp::Import => Ok(ResultsOutcome::Imported(self.import(import).await?)),
            ResultsOp::Report => Ok(ResultsOutcome::Report(self.report(cycle_ids).await?)),
        }
    }

    /// Cycles of the project, optionally filtered by id.
    async fn list_cycles(&self, cycle_ids: &[i64]) -> AppResult<Vec<ExecutionCycle>> {
        let project = self.project().await?;
        let cycles = self.store().list_cycles(project.id).await?;
        Ok(cycles
            .into_iter()
            .filter(|cycle| cycle_ids.is_empty() || cycle_ids.contains(&cycle.id))
            .collect())
    }

    /// Explicitly named cycles must accept the transition; an unfiltered
    /// sweep just skips the ones it does not apply to.
    async fn move_cycles(&self, cycle_ids: &[i64], to: CycleStatus) -> AppResult<()> {
        let controller = self.cycles();
        for cycle in self.list_cycles(cycle_ids).await? {
            if cycle.status == to {
                continue;
            }
            if cycle_ids.is_empty() && !cycle.status.can_transition(to) {
                continue;
            }
            controller.transition(&cycle, to).await?;
        }
        Ok(())
    }

    /// Bundles the selected (default: all stopped/reported) cycles into a
    /// gzipped tar under `reports/`.
    async fn export(&self, cycle_ids: &[i64]) -> AppResult<PathBuf> {
        let exportable: Vec<i64> = self
            .list_cycles(cycle_ids)
            .await?
            .into_iter()
            .filter(|cycle| {
                matches!(cycle.status, CycleStatus::Stopped | CycleStatus::Reported)
            })
            .map(|cycle| cycle.id)
            .collect();
        let out_path = self.workspace().reports_dir().join(format!(
            "results-{}.tar.gz",
            Utc::now().format("%Y%m%d-%H%M%S")
        ));
        report::export_bundle(self.workspace(), &exportable, &out_path)
    }

    /// Attaches external result files to a cycle: the selected one, or a
    /// fresh cycle closed immediately as `stopped`. Stats are recomputed
    /// exactly as if the files had been collected live.
    async fn import(&self, selectors: ImportSelectors) -> AppResult<ExecutionCycle> {
        let project = self.project().await?;
        let file = selectors.file.clone().ok_or_else(|| {
            AppError::store(StoreError::NotFound {
                entity: "import file",
                key: "none given".to_owned(),
            })
        })?;

        let plan = match selectors.plan_name.as_deref() {
            Some(name) => self
                .store()
                .plan_by_name(project.id, name)
                .await?
                .ok_or_else(|| {
                    AppError::store(StoreError::NotFound {
                        entity: "jmeter plan",
                        key: name.to_owned(),
                    })
                })?,
            None => self
                .store()
                .active_plans(project.id)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AppError::store(StoreError::NotFound {
                        entity: "jmeter plan",
                        key: "any active".to_owned(),
                    })
                })?,
        };

        let (clusterable_id, clusterable_type) =
            self.import_clusterable(&project, selectors.cluster_id).await?;

        let cycle = match selectors.cycle_id {
            Some(cycle_id) => self
                .store()
                .cycle_by_id(cycle_id)
                .await?
                .filter(|cycle| cycle.project_id == project.id)
                .ok_or_else(|| {
                    AppError::store(StoreError::NotFound {
                        entity: "execution cycle",
                        key: cycle_id.to_string(),
                    })
                })?,
            None => {
                let opened = self.cycles().begin(&project, plan.latest_threads_count).await?;
                self.cycles()
                    .transition(&opened, CycleStatus::Stopped)
                    .await?
            }
        };

        let cycle_dir = self.workspace().create_cycle_dir(cycle.id)?;
        let files = report::import_bundle(&file, &cycle_dir)?;
        let mut samples = Vec::new();
        for imported in &files {
            samples.extend(self.sample_source().samples(imported)?);
        }
        let pages = page_stats(&samples, &project.breakup_intervals());
        let aggregate = aggregate_client(&pages, &samples);
        let client = ClientStat {
            id: 0,
            execution_cycle_id: cycle.id,
            jmeter_plan_id: plan.id,
            clusterable_id,
            clusterable_type,
            threads_count: aggregate.threads_count.max(plan.latest_threads_count),
            aggregate_ninety_percentile: aggregate.aggregate_ninety_percentile,
            aggregate_response_throughput: aggregate.aggregate_response_throughput,
            last_sample_at: aggregate.last_sample_at,
        };
        self.store().insert_client_stat(&client, &pages).await?;
        info!(cycle = cycle.id, files = files.len(), "results imported");
        Ok(cycle)
    }

    async fn import_clusterable(
        &self,
        project: &crate::model::Project,
        cluster_id: Option<i64>,
    ) -> AppResult<(i64, ClusterKind)> {
        let amazons = self.store().amazon_clouds(project.id).await?;
        let data_centers = self.store().data_centers(project.id).await?;
        if let Some(wanted) = cluster_id {
            if amazons.iter().any(|cluster| cluster.id == wanted) {
                return Ok((wanted, ClusterKind::AmazonCloud));
            }
            if data_centers.iter().any(|cluster| cluster.id == wanted) {
                return Ok((wanted, ClusterKind::DataCenter));
            }
            return Err(AppError::store(StoreError::NotFound {
                entity: "cluster",
                key: wanted.to_string(),
            }));
        }
        if let Some(cluster) = amazons.first() {
            return Ok((cluster.id, ClusterKind::AmazonCloud));
        }
        if let Some(cluster) = data_centers.first() {
            return Ok((cluster.id, ClusterKind::DataCenter));
        }
        Err(AppError::store(StoreError::NotFound {
            entity: "cluster",
            key: "any".to_owned(),
        }))
    }

    /// Renders the report over the selected `stopped`/`reported` cycles
    /// and flips every included `stopped` cycle to `reported`.
    async fn report(&self, cycle_ids: &[i64]) -> AppResult<PathBuf> {
        let project = self.project().await?;
        let included: Vec<ExecutionCycle> = self
            .list_cycles(cycle_ids)
            .await?
            .into_iter()
            .filter(|cycle| {
                matches!(cycle.status, CycleStatus::Stopped | CycleStatus::Reported)
            })
            .collect();
        if included.is_empty() {
            return Err(AppError::cycle(CycleError::NoCurrentCycle {
                project: project.project_code.clone(),
            }));
        }

        let mut cycles = Vec::new();
        for cycle in &included {
            let mut client_stats = Vec::new();
            for client in self.store().client_stats_for_cycle(cycle.id).await? {
                let pages = self.store().page_stats_for_client(client.id).await?;
                client_stats.push((client, pages));
            }
            let target_stats = self.store().target_stats_for_cycle(cycle.id).await?;
            cycles.push(CycleReport {
                cycle: cycle.clone(),
                client_stats,
                target_stats,
            });
        }
        let data = ReportData {
            project_code: project.project_code.clone(),
            cycles,
        };
        let document = self.renderer().render(&data)?;
        let out_path = self.workspace().reports_dir().join(format!(
            "report-{}.txt",
            Utc::now().format("%Y%m%d-%H%M%S")
        ));
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&out_path, document)?;

        let controller = self.cycles();
        for cycle in included
            .iter()
            .filter(|cycle| cycle.status == CycleStatus::Stopped)
        {
            controller.transition(cycle, CycleStatus::Reported).await?;
        }
        info!(report = %out_path.display(), "report written");
        Ok(out_path)
    }
}
