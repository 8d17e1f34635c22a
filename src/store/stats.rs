use rusqlite::{params, Row};

use crate::error::AppResult;
use crate::model::{ClientStat, ClusterKind, PageStat, TargetStat};

use super::{format_timestamp, parse_timestamp, Store};

fn client_stat_from_row(row: &Row<'_>) -> rusqlite::Result<ClientStat> {
    let kind: String = row.get(4)?;
    let last_sample_at: Option<String> = row.get(8)?;
    Ok(ClientStat {
        id: row.get(0)?,
        execution_cycle_id: row.get(1)?,
        jmeter_plan_id: row.get(2)?,
        clusterable_id: row.get(3)?,
        clusterable_type: ClusterKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown clusterable type '{kind}'").into(),
            )
        })?,
        threads_count: row.get(5)?,
        aggregate_ninety_percentile: row.get(6)?,
        aggregate_response_throughput: row.get(7)?,
        last_sample_at: last_sample_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn page_stat_from_row(row: &Row<'_>) -> rusqlite::Result<PageStat> {
    Ok(PageStat {
        id: row.get(0)?,
        client_stat_id: row.get(1)?,
        page_label: row.get(2)?,
        samples_count: row.get::<_, i64>(3)? as u64,
        average_response_time: row.get(4)?,
        median_response_time: row.get(5)?,
        ninety_percentile_response_time: row.get(6)?,
        minimum_response_time: row.get::<_, i64>(7)? as u64,
        maximum_response_time: row.get::<_, i64>(8)? as u64,
        percentage_errors: row.get(9)?,
        response_throughput: row.get(10)?,
        size_throughput: row.get(11)?,
        standard_deviation: row.get(12)?,
        samples_breakup_json: row.get(13)?,
    })
}

impl Store {
    /// Writes the client aggregate and its page rows in one transaction.
    pub async fn insert_client_stat(
        &self,
        stat: &ClientStat,
        pages: &[PageStat],
    ) -> AppResult<i64> {
        let stat = stat.clone();
        let pages = pages.to_vec();
        self.call("insert client stat", move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO client_stats \
                 (execution_cycle_id, jmeter_plan_id, clusterable_id, clusterable_type, \
                  threads_count, aggregate_ninety_percentile, aggregate_response_throughput, \
                  last_sample_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    stat.execution_cycle_id,
                    stat.jmeter_plan_id,
                    stat.clusterable_id,
                    stat.clusterable_type.as_str(),
                    stat.threads_count,
                    stat.aggregate_ninety_percentile,
                    stat.aggregate_response_throughput,
                    stat.last_sample_at.map(format_timestamp)
                ],
            )?;
            let client_stat_id = tx.last_insert_rowid();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO page_stats \
                     (client_stat_id, page_label, samples_count, average_response_time, \
                      median_response_time, ninety_percentile_response_time, \
                      minimum_response_time, maximum_response_time, percentage_errors, \
                      response_throughput, size_throughput, standard_deviation, \
                      samples_breakup_json) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?;
                for page in pages {
                    stmt.execute(params![
                        client_stat_id,
                        page.page_label,
                        page.samples_count as i64,
                        page.average_response_time,
                        page.median_response_time,
                        page.ninety_percentile_response_time,
                        page.minimum_response_time as i64,
                        page.maximum_response_time as i64,
                        page.percentage_errors,
                        page.response_throughput,
                        page.size_throughput,
                        page.standard_deviation,
                        page.samples_breakup_json
                    ])?;
                }
            }
            tx.commit()?;
            Ok(client_stat_id)
        })
        .await
    }

    pub async fn insert_target_stat(&self, stat: &TargetStat) -> AppResult<i64> {
        let stat = stat.clone();
        self.call("insert target stat", move |conn| {
            conn.execute(
                "INSERT INTO target_stats \
                 (execution_cycle_id, target_host_id, average_cpu_usage, average_memory_usage, \
                  average_swap_usage, cpu_usage_trend, memory_usage_trend, swap_usage_trend) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    stat.execution_cycle_id,
                    stat.target_host_id,
                    stat.average_cpu_usage,
                    stat.average_memory_usage,
                    stat.average_swap_usage,
                    stat.cpu_usage_trend,
                    stat.memory_usage_trend,
                    stat.swap_usage_trend
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn client_stats_for_cycle(&self, cycle_id: i64) -> AppResult<Vec<ClientStat>> {
        self.call("list client stats", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, execution_cycle_id, jmeter_plan_id, clusterable_id, \
                 clusterable_type, threads_count, aggregate_ninety_percentile, \
                 aggregate_response_throughput, last_sample_at \
                 FROM client_stats WHERE execution_cycle_id = ?1 ORDER BY id",
            )?;
            let stats = stmt
                .query_map(params![cycle_id], client_stat_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(stats)
        })
        .await
    }

    pub async fn page_stats_for_client(&self, client_stat_id: i64) -> AppResult<Vec<PageStat>> {
        self.call("list page stats", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, client_stat_id, page_label, samples_count, average_response_time, \
                 median_response_time, ninety_percentile_response_time, minimum_response_time, \
                 maximum_response_time, percentage_errors, response_throughput, size_throughput, \
                 standard_deviation, samples_breakup_json \
                 FROM page_stats WHERE client_stat_id = ?1 ORDER BY page_label",
            )?;
            let stats = stmt
                .query_map(params![client_stat_id], page_stat_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(stats)
        })
        .await
    }

    pub async fn target_stats_for_cycle(&self, cycle_id: i64) -> AppResult<Vec<TargetStat>> {
        self.call("list target stats", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, execution_cycle_id, target_host_id, average_cpu_usage, \
                 average_memory_usage, average_swap_usage, cpu_usage_trend, \
                 memory_usage_trend, swap_usage_trend \
                 FROM target_stats WHERE execution_cycle_id = ?1 ORDER BY id",
            )?;
            let stats = stmt
                .query_map(params![cycle_id], |row| {
                    Ok(TargetStat {
                        id: row.get(0)?,
                        execution_cycle_id: row.get(1)?,
                        target_host_id: row.get(2)?,
                        average_cpu_usage: row.get(3)?,
                        average_memory_usage: row.get(4)?,
                        average_swap_usage: row.get(5)?,
                        cpu_usage_trend: row.get(6)?,
                        memory_usage_trend: row.get(7)?,
                        swap_usage_trend: row.get(8)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(stats)
        })
        .await
    }
}
