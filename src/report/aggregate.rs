use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use crate::model::PageStat;

use super::Sample;

/// Cross-page aggregate for one (cycle, plan, clusterable).
#[derive(Debug, Clone, Default)]
pub struct ClientAggregate {
    pub threads_count: u32,
    pub aggregate_ninety_percentile: f64,
    pub aggregate_response_throughput: f64,
    pub last_sample_at: Option<DateTime<Utc>>,
}

/// Groups samples by page label and computes the per-page statistics.
pub fn page_stats(samples: &[Sample], breakup_intervals: &[f64]) -> Vec<PageStat> {
    let mut by_label: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        by_label.entry(sample.label.as_str()).or_default().push(sample);
    }
    by_label
        .into_iter()
        .map(|(label, group)| page_stat(label, &group, breakup_intervals))
        .collect()
}

fn page_stat(label: &str, samples: &[&Sample], breakup_intervals: &[f64]) -> PageStat {
    let count = samples.len() as u64;
    let mut latencies: Vec<u64> = samples.iter().map(|sample| sample.elapsed_ms).collect();
    latencies.sort_unstable();

    let sum: u128 = latencies.iter().map(|latency| u128::from(*latency)).sum();
    let average = sum as f64 / count.max(1) as f64;
    let variance = latencies
        .iter()
        .map(|latency| {
            let diff = *latency as f64 - average;
            diff * diff
        })
        .sum::<f64>()
        / count.max(1) as f64;

    let errors = samples.iter().filter(|sample| !sample.success).count() as u64;
    let total_bytes: u64 = samples.iter().map(|sample| sample.bytes).sum();

    let first_ts = samples.iter().map(|sample| sample.timestamp_ms).min().unwrap_or(0);
    let last_ts = samples.iter().map(|sample| sample.timestamp_ms).max().unwrap_or(0);
    // Sub-second runs count as one second so throughput stays finite.
    let duration_secs = ((last_ts.saturating_sub(first_ts)) as f64 / 1000.0).max(1.0);

    PageStat {
        id: 0,
        client_stat_id: 0,
        page_label: label.to_owned(),
        samples_count: count,
        average_response_time: average,
        median_response_time: percentile(&latencies, 50) as f64,
        ninety_percentile_response_time: percentile(&latencies, 90) as f64,
        minimum_response_time: latencies.first().copied().unwrap_or(0),
        maximum_response_time: latencies.last().copied().unwrap_or(0),
        percentage_errors: errors as f64 * 100.0 / count.max(1) as f64,
        response_throughput: count as f64 / duration_secs,
        size_throughput: total_bytes as f64 / duration_secs / 1024.0,
        standard_deviation: variance.sqrt(),
        samples_breakup_json: breakup_json(&latencies, breakup_intervals),
    }
}

/// Nearest-rank percentile with half-up rounding on the index.
fn percentile(sorted: &[u64], percent: u64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let count = sorted.len().saturating_sub(1) as u64;
    let index = percent
        .saturating_mul(count)
        .saturating_add(50)
        .checked_div(100)
        .unwrap_or(0);
    let idx = usize::try_from(index).unwrap_or_else(|_| sorted.len().saturating_sub(1));
    *sorted.get(idx).unwrap_or(&0)
}

/// Response-time distribution over the configured bucket edges (seconds):
/// edges `[1, 3, 5]` produce `< 1`, `1 - 3`, `3 - 5` and `>= 5`.
fn breakup_json(sorted_latencies_ms: &[u64], intervals: &[f64]) -> String {
    if intervals.is_empty() {
        return "[]".to_owned();
    }
    let total = sorted_latencies_ms.len().max(1) as f64;
    let mut buckets: Vec<(String, u64)> = Vec::with_capacity(intervals.len() + 1);
    let mut lower = 0.0f64;
    for (index, upper) in intervals.iter().enumerate() {
        let range = if index == 0 {
            format!("< {upper}")
        } else {
            format!("{lower} - {upper}")
        };
        let count = sorted_latencies_ms
            .iter()
            .filter(|latency| {
                let secs = **latency as f64 / 1000.0;
                secs >= lower && secs < *upper
            })
            .count() as u64;
        buckets.push((range, count));
        lower = *upper;
    }
    let tail = sorted_latencies_ms
        .iter()
        .filter(|latency| **latency as f64 / 1000.0 >= lower)
        .count() as u64;
    buckets.push((format!(">= {lower}"), tail));

    let entries: Vec<serde_json::Value> = buckets
        .into_iter()
        .map(|(range, count)| {
            serde_json::json!({
                "range": range,
                "count": count,
                "percentage": count as f64 * 100.0 / total,
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

/// Rolls page stats and raw samples up into the client-level aggregate:
/// sample-weighted p90, summed throughput, the latest sample timestamp and
/// the peak concurrent thread count.
pub fn aggregate_client(pages: &[PageStat], samples: &[Sample]) -> ClientAggregate {
    let total_samples: u64 = pages.iter().map(|page| page.samples_count).sum();
    let weighted_p90 = if total_samples == 0 {
        0.0
    } else {
        pages
            .iter()
            .map(|page| page.ninety_percentile_response_time * page.samples_count as f64)
            .sum::<f64>()
            / total_samples as f64
    };
    let throughput: f64 = pages.iter().map(|page| page.response_throughput).sum();
    let last_ms = samples.iter().map(|sample| sample.timestamp_ms).max();
    let last_sample_at = last_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single());
    ClientAggregate {
        threads_count: samples.iter().map(|sample| sample.threads).max().unwrap_or(0),
        aggregate_ninety_percentile: weighted_p90,
        aggregate_response_throughput: throughput,
        last_sample_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: &str, ts: u64, elapsed: u64, success: bool, bytes: u64) -> Sample {
        Sample {
            timestamp_ms: ts,
            label: label.to_owned(),
            elapsed_ms: elapsed,
            success,
            bytes,
            threads: 25,
        }
    }

    #[test]
    fn page_stats_compute_the_full_statistic_row() {
        let base = 1_700_000_000_000u64;
        let samples: Vec<Sample> = (0..10)
            .map(|step| {
                sample(
                    "home",
                    base + step * 1000,
                    (step + 1) * 100,
                    step != 9,
                    1024,
                )
            })
            .collect();

        let pages = page_stats(&samples, &[1.0, 3.0, 5.0]);
        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert_eq!(page.page_label, "home");
        assert_eq!(page.samples_count, 10);
        assert!((page.average_response_time - 550.0).abs() < 1e-9);
        assert_eq!(page.minimum_response_time, 100);
        assert_eq!(page.maximum_response_time, 1000);
        assert!((page.percentage_errors - 10.0).abs() < 1e-9);
        // 10 samples over 9 seconds of wall clock.
        assert!((page.response_throughput - 10.0 / 9.0).abs() < 1e-6);
        assert!((page.size_throughput - 10.0 * 1024.0 / 9.0 / 1024.0).abs() < 1e-6);
        assert!(page.standard_deviation > 0.0);

        let breakup: serde_json::Value =
            serde_json::from_str(&page.samples_breakup_json).expect("breakup json");
        let buckets = breakup.as_array().expect("array");
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0]["range"], "< 1");
        // 100..=900ms fall under one second, the 1000ms sample lands in 1-3.
        assert_eq!(buckets[0]["count"], 9);
        assert_eq!(buckets[1]["count"], 1);
        assert_eq!(buckets[3]["range"], ">= 5");
    }

    #[test]
    fn median_and_p90_use_nearest_rank() {
        let samples: Vec<Sample> = (1..=100)
            .map(|step| sample("p", 0, step * 10, true, 0))
            .collect();
        let pages = page_stats(&samples, &[1.0]);
        assert!((pages[0].median_response_time - 500.0).abs() < 10.0 + 1e-9);
        assert!((pages[0].ninety_percentile_response_time - 900.0).abs() < 10.0 + 1e-9);
    }

    #[test]
    fn client_aggregate_weights_p90_by_sample_count() {
        let mut fast: Vec<Sample> = (0..90).map(|i| sample("fast", i, 100, true, 0)).collect();
        let slow: Vec<Sample> = (0..10).map(|i| sample("slow", i, 1000, true, 0)).collect();
        fast.extend(slow);

        let pages = page_stats(&fast, &[1.0]);
        let aggregate = aggregate_client(&pages, &fast);
        // 90 samples at ~100ms, 10 at ~1000ms.
        assert!((aggregate.aggregate_ninety_percentile - 190.0).abs() < 1e-9);
        assert_eq!(aggregate.threads_count, 25);
        assert!(aggregate.last_sample_at.is_some());
    }

    #[test]
    fn empty_sample_sets_produce_no_pages() {
        assert!(page_stats(&[], &[1.0]).is_empty());
    }
}
