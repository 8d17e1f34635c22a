//! Row types for the persistent store.
//!
//! These mirror the relational schema: a `Project` owns clusters, JMeter
//! plans, target hosts and execution cycles; cluster rows own load agents;
//! execution cycles own the collected statistics.
mod agent;
mod cluster;
mod cycle;
mod plan;
mod project;
mod stats;
mod target;

pub use agent::{AgentRole, LoadAgent};
pub use cluster::{AmazonCloud, ClusterKind, DataCenter, DEFAULT_AWS_USER, DEFAULT_SSH_PORT};
pub use cycle::{CycleStatus, ExecutionCycle};
pub use plan::JmeterPlan;
pub use project::{
    slugify, Project, DEFAULT_BREAKUP_INTERVALS, DEFAULT_MAX_THREADS_PER_AGENT,
};
pub use stats::{ClientStat, PageStat, TargetStat};
pub use target::{TargetHost, DEFAULT_SAMPLING_INTERVAL_SECS};
