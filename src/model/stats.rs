use chrono::{DateTime, Utc};

use super::ClusterKind;

/// Aggregate over every page exercised by one (cycle, plan, clusterable).
#[derive(Debug, Clone)]
pub struct ClientStat {
    pub id: i64,
    pub execution_cycle_id: i64,
    pub jmeter_plan_id: i64,
    pub clusterable_id: i64,
    pub clusterable_type: ClusterKind,
    pub threads_count: u32,
    pub aggregate_ninety_percentile: f64,
    pub aggregate_response_throughput: f64,
    pub last_sample_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageStat {
    pub id: i64,
    pub client_stat_id: i64,
    pub page_label: String,
    pub samples_count: u64,
    pub average_response_time: f64,
    pub median_response_time: f64,
    pub ninety_percentile_response_time: f64,
    pub minimum_response_time: u64,
    pub maximum_response_time: u64,
    pub percentage_errors: f64,
    pub response_throughput: f64,
    pub size_throughput: f64,
    pub standard_deviation: f64,
    pub samples_breakup_json: String,
}

#[derive(Debug, Clone)]
pub struct TargetStat {
    pub id: i64,
    pub execution_cycle_id: i64,
    pub target_host_id: i64,
    pub average_cpu_usage: f64,
    pub average_memory_usage: f64,
    pub average_swap_usage: Option<f64>,
    pub cpu_usage_trend: Option<Vec<u8>>,
    pub memory_usage_trend: Option<Vec<u8>>,
    pub swap_usage_trend: Option<Vec<u8>>,
}
