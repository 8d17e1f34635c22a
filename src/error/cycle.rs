use thiserror::Error;

use crate::model::CycleStatus;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Project '{project}' already has a started execution cycle (id {cycle_id}).")]
    CycleAlreadyStarted { project: String, cycle_id: i64 },
    #[error("Project '{project}' has no current execution cycle.")]
    NoCurrentCycle { project: String },
    #[error("More than one active master agent for plan '{plan}' on cluster {clusterable_id}.")]
    MasterSlaveConflict { plan: String, clusterable_id: i64 },
    #[error("Cannot move execution cycle {cycle_id} from {from:?} to {to:?}.")]
    InvalidTransition {
        cycle_id: i64,
        from: CycleStatus,
        to: CycleStatus,
    },
    #[error("Run was interrupted for project '{project}'.")]
    Interrupted { project: String },
}
