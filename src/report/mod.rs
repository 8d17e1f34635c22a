//! Result aggregation and reporting.
//!
//! Collected `.jtl` files are parsed into raw samples (behind the
//! `SampleSource` seam), aggregated into page and client statistics, and
//! composed into cross-cycle reports by a pluggable renderer.
mod aggregate;
mod export;
mod jtl;

pub use aggregate::{aggregate_client, page_stats, ClientAggregate};
pub use export::{export_bundle, import_bundle};
pub use jtl::{write_jtl, JtlSource};

use std::path::Path;

use crate::error::AppResult;
use crate::model::{ClientStat, ExecutionCycle, PageStat, TargetStat};

/// One load-test sample as produced by the generation runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub label: String,
    pub elapsed_ms: u64,
    pub success: bool,
    pub bytes: u64,
    pub threads: u32,
}

/// Result-file parser seam; the shipped implementation reads CSV JTL.
pub trait SampleSource: Send + Sync {
    fn samples(&self, path: &Path) -> AppResult<Vec<Sample>>;
}

/// Everything a renderer needs for one report.
#[derive(Debug)]
pub struct ReportData {
    pub project_code: String,
    pub cycles: Vec<CycleReport>,
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle: ExecutionCycle,
    pub client_stats: Vec<(ClientStat, Vec<PageStat>)>,
    pub target_stats: Vec<TargetStat>,
}

/// Report document seam; the real renderer is a collaborator. The
/// plain-text default tabulates per-cycle statistics.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &ReportData) -> AppResult<String>;
}

pub struct TextRenderer;

impl ReportRenderer for TextRenderer {
    fn render(&self, report: &ReportData) -> AppResult<String> {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "Load test report: {}", report.project_code);
        for entry in &report.cycles {
            let _ = writeln!(
                out,
                "\nCycle {} ({} threads, started {})",
                entry.cycle.id,
                entry.cycle.threads_count,
                entry.cycle.started_at.to_rfc3339()
            );
            for (client, pages) in &entry.client_stats {
                let _ = writeln!(
                    out,
                    "  client: plan {} on clusterable {} | p90 {:.1} ms | {:.2} req/s",
                    client.jmeter_plan_id,
                    client.clusterable_id,
                    client.aggregate_ninety_percentile,
                    client.aggregate_response_throughput
                );
                for page in pages {
                    let _ = writeln!(
                        out,
                        "    {:<32} n={:<7} avg={:.1} med={:.1} p90={:.1} err={:.2}%",
                        page.page_label,
                        page.samples_count,
                        page.average_response_time,
                        page.median_response_time,
                        page.ninety_percentile_response_time,
                        page.percentage_errors
                    );
                }
            }
            for target in &entry.target_stats {
                let _ = writeln!(
                    out,
                    "  target {}: cpu {:.1}% mem {:.1}%",
                    target.target_host_id, target.average_cpu_usage, target.average_memory_usage
                );
            }
        }
        Ok(out)
    }
}
