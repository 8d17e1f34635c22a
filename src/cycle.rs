//! Execution-cycle state machine over the persistent store.
//!
//! A cycle is one run from `start` to `stop`/`abort`/`terminate` and the
//! unit of reporting. At most one cycle per project is ever `started`.
use chrono::Utc;
use tracing::info;

use crate::error::{AppError, AppResult, CycleError};
use crate::model::{CycleStatus, ExecutionCycle, Project};
use crate::store::Store;

pub struct CycleController {
    store: Store,
}

impl CycleController {
    pub fn new(store: Store) -> Self {
        CycleController { store }
    }

    pub async fn current(&self, project: &Project) -> AppResult<Option<ExecutionCycle>> {
        self.store.current_cycle(project.id).await
    }

    pub async fn require_current(&self, project: &Project) -> AppResult<ExecutionCycle> {
        self.current(project).await?.ok_or_else(|| {
            AppError::cycle(CycleError::NoCurrentCycle {
                project: project.project_code.clone(),
            })
        })
    }

    /// Opens a new `started` cycle; refuses while one is already running.
    pub async fn begin(&self, project: &Project, threads_count: u32) -> AppResult<ExecutionCycle> {
        match self
            .store
            .try_create_cycle(project.id, Utc::now(), threads_count)
            .await?
        {
            Some(cycle) => {
                info!(project = %project.project_code, cycle = cycle.id, "execution cycle started");
                Ok(cycle)
            }
            None => {
                let existing = self.require_current(project).await?;
                Err(AppError::cycle(CycleError::CycleAlreadyStarted {
                    project: project.project_code.clone(),
                    cycle_id: existing.id,
                }))
            }
        }
    }

    /// Applies a validated transition, stamping `stopped_at` when the
    /// cycle leaves `started`.
    pub async fn transition(
        &self,
        cycle: &ExecutionCycle,
        to: CycleStatus,
    ) -> AppResult<ExecutionCycle> {
        if !cycle.status.can_transition(to) {
            return Err(AppError::cycle(CycleError::InvalidTransition {
                cycle_id: cycle.id,
                from: cycle.status,
                to,
            }));
        }
        let stopped_at = if cycle.status == CycleStatus::Started {
            Some(Utc::now())
        } else {
            None
        };
        self.store
            .update_cycle_status(cycle.id, to, stopped_at)
            .await?;
        info!(cycle = cycle.id, from = cycle.status.as_str(), to = to.as_str(), "cycle transition");
        let mut updated = cycle.clone();
        updated.status = to;
        updated.stopped_at = stopped_at.or(cycle.stopped_at);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn project_fixture(store: &Store) -> Project {
        store.find_or_create_project("shop").await.expect("project")
    }

    #[tokio::test]
    async fn begin_is_exclusive_per_project() {
        let store = Store::open_in_memory().await.expect("store");
        let project = project_fixture(&store).await;
        let controller = CycleController::new(store);

        let cycle = controller.begin(&project, 100).await.expect("first cycle");
        assert_eq!(cycle.status, CycleStatus::Started);

        let conflict = controller.begin(&project, 100).await.unwrap_err();
        assert!(matches!(
            conflict,
            AppError::Cycle(CycleError::CycleAlreadyStarted { cycle_id, .. })
                if cycle_id == cycle.id
        ));
    }

    #[tokio::test]
    async fn stop_then_report_is_the_happy_path() {
        let store = Store::open_in_memory().await.expect("store");
        let project = project_fixture(&store).await;
        let controller = CycleController::new(store.clone());

        let cycle = controller.begin(&project, 50).await.expect("cycle");
        let stopped = controller
            .transition(&cycle, CycleStatus::Stopped)
            .await
            .expect("stop");
        assert!(stopped.stopped_at.is_some());

        let reported = controller
            .transition(&stopped, CycleStatus::Reported)
            .await
            .expect("report");
        assert_eq!(reported.status, CycleStatus::Reported);

        // A fresh cycle may start once the previous one left `started`.
        controller.begin(&project, 50).await.expect("next cycle");
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let store = Store::open_in_memory().await.expect("store");
        let project = project_fixture(&store).await;
        let controller = CycleController::new(store);

        let cycle = controller.begin(&project, 10).await.expect("cycle");
        let aborted = controller
            .transition(&cycle, CycleStatus::Aborted)
            .await
            .expect("abort");
        let error = controller
            .transition(&aborted, CycleStatus::Reported)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            AppError::Cycle(CycleError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn exclude_include_round_trip() {
        let store = Store::open_in_memory().await.expect("store");
        let project = project_fixture(&store).await;
        let controller = CycleController::new(store);

        let cycle = controller.begin(&project, 10).await.expect("cycle");
        let stopped = controller
            .transition(&cycle, CycleStatus::Stopped)
            .await
            .expect("stop");
        let excluded = controller
            .transition(&stopped, CycleStatus::Excluded)
            .await
            .expect("exclude");
        let included = controller
            .transition(&excluded, CycleStatus::Stopped)
            .await
            .expect("include");
        assert_eq!(included.status, CycleStatus::Stopped);
    }
}
