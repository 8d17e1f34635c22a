use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::AppResult;
use crate::model::{CycleStatus, ExecutionCycle};

use super::{format_timestamp, parse_timestamp, Store};

fn cycle_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionCycle> {
    let status: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let stopped_at: Option<String> = row.get(4)?;
    Ok(ExecutionCycle {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status: CycleStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown cycle status '{status}'").into(),
            )
        })?,
        started_at: parse_timestamp(&started_at)?,
        stopped_at: stopped_at.as_deref().map(parse_timestamp).transpose()?,
        threads_count: row.get(5)?,
    })
}

const CYCLE_COLUMNS: &str = "id, project_id, status, started_at, stopped_at, threads_count";

impl Store {
    /// The unique `started` cycle, if any.
    pub async fn current_cycle(&self, project_id: i64) -> AppResult<Option<ExecutionCycle>> {
        self.call("find current cycle", move |conn| {
            let cycle = conn
                .query_row(
                    &format!(
                        "SELECT {CYCLE_COLUMNS} FROM execution_cycles \
                         WHERE project_id = ?1 AND status = 'started' \
                         ORDER BY started_at DESC LIMIT 1"
                    ),
                    params![project_id],
                    cycle_from_row,
                )
                .optional()?;
            Ok(cycle)
        })
        .await
    }

    /// Inserts a `started` cycle; returns `None` when one already exists.
    /// Creation and the uniqueness check share one transaction, which is
    /// what keeps invariant "at most one started cycle" true under fan-out.
    pub async fn try_create_cycle(
        &self,
        project_id: i64,
        started_at: DateTime<Utc>,
        threads_count: u32,
    ) -> AppResult<Option<ExecutionCycle>> {
        self.call("create execution cycle", move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM execution_cycles \
                     WHERE project_id = ?1 AND status = 'started'",
                    params![project_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                tx.commit()?;
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO execution_cycles (project_id, status, started_at, threads_count) \
                 VALUES (?1, 'started', ?2, ?3)",
                params![project_id, format_timestamp(started_at), threads_count],
            )?;
            let id = tx.last_insert_rowid();
            let cycle = tx.query_row(
                &format!("SELECT {CYCLE_COLUMNS} FROM execution_cycles WHERE id = ?1"),
                params![id],
                cycle_from_row,
            )?;
            tx.commit()?;
            Ok(Some(cycle))
        })
        .await
    }

    pub async fn update_cycle_status(
        &self,
        cycle_id: i64,
        status: CycleStatus,
        stopped_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        self.call("update cycle status", move |conn| {
            conn.execute(
                "UPDATE execution_cycles SET status = ?1, \
                 stopped_at = COALESCE(?2, stopped_at) WHERE id = ?3",
                params![
                    status.as_str(),
                    stopped_at.map(format_timestamp),
                    cycle_id
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_cycle_threads(&self, cycle_id: i64, threads_count: u32) -> AppResult<()> {
        self.call("set cycle threads", move |conn| {
            conn.execute(
                "UPDATE execution_cycles SET threads_count = ?1 WHERE id = ?2",
                params![threads_count, cycle_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn cycle_by_id(&self, cycle_id: i64) -> AppResult<Option<ExecutionCycle>> {
        self.call("find cycle by id", move |conn| {
            let cycle = conn
                .query_row(
                    &format!("SELECT {CYCLE_COLUMNS} FROM execution_cycles WHERE id = ?1"),
                    params![cycle_id],
                    cycle_from_row,
                )
                .optional()?;
            Ok(cycle)
        })
        .await
    }

    pub async fn list_cycles(&self, project_id: i64) -> AppResult<Vec<ExecutionCycle>> {
        self.call("list cycles", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CYCLE_COLUMNS} FROM execution_cycles \
                 WHERE project_id = ?1 ORDER BY started_at"
            ))?;
            let cycles = stmt
                .query_map(params![project_id], cycle_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(cycles)
        })
        .await
    }

    /// Destroys every cycle of the project; stats cascade.
    pub async fn delete_cycles(&self, project_id: i64) -> AppResult<()> {
        self.call("delete cycles", move |conn| {
            conn.execute(
                "DELETE FROM execution_cycles WHERE project_id = ?1",
                params![project_id],
            )?;
            Ok(())
        })
        .await
    }
}
