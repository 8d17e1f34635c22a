use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Row};

use crate::error::AppResult;
use crate::model::JmeterPlan;

use super::Store;

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<JmeterPlan> {
    let properties: String = row.get(5)?;
    Ok(JmeterPlan {
        id: row.get(0)?,
        project_id: row.get(1)?,
        test_plan_name: row.get(2)?,
        content_hash: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        properties: JmeterPlan::properties_from_json(&properties),
        latest_threads_count: row.get(6)?,
    })
}

const PLAN_COLUMNS: &str = "id, project_id, test_plan_name, content_hash, active, properties, \
                            latest_threads_count";

impl Store {
    /// Inserts the plan or refreshes hash, properties and thread count on
    /// the existing row; either way the plan ends up active.
    pub async fn upsert_plan(
        &self,
        project_id: i64,
        test_plan_name: &str,
        content_hash: &str,
        properties: &BTreeMap<String, String>,
        threads_count: u32,
    ) -> AppResult<JmeterPlan> {
        let name = test_plan_name.to_owned();
        let hash = content_hash.to_owned();
        let properties_json =
            serde_json::to_string(properties).unwrap_or_else(|_| "{}".to_owned());
        self.call("upsert jmeter plan", move |conn| {
            conn.execute(
                "INSERT INTO jmeter_plans \
                 (project_id, test_plan_name, content_hash, active, properties, latest_threads_count) \
                 VALUES (?1, ?2, ?3, 1, ?4, ?5) \
                 ON CONFLICT (project_id, test_plan_name) DO UPDATE SET \
                 content_hash = excluded.content_hash, active = 1, \
                 properties = excluded.properties, \
                 latest_threads_count = excluded.latest_threads_count",
                params![project_id, name, hash, properties_json, threads_count],
            )?;
            let plan = conn.query_row(
                &format!(
                    "SELECT {PLAN_COLUMNS} FROM jmeter_plans \
                     WHERE project_id = ?1 AND test_plan_name = ?2"
                ),
                params![project_id, name],
                plan_from_row,
            )?;
            Ok(plan)
        })
        .await
    }

    /// Plans dropped from the configuration stay on disk for historical
    /// cycles but stop participating in new ones.
    pub async fn deactivate_missing_plans(
        &self,
        project_id: i64,
        keep_names: Vec<String>,
    ) -> AppResult<()> {
        self.call("deactivate missing plans", move |conn| {
            let placeholders = std::iter::repeat("?")
                .take(keep_names.len())
                .collect::<Vec<_>>()
                .join(", ");
            let sql = if keep_names.is_empty() {
                "UPDATE jmeter_plans SET active = 0 WHERE project_id = ?1".to_owned()
            } else {
                format!(
                    "UPDATE jmeter_plans SET active = 0 \
                     WHERE project_id = ?1 AND test_plan_name NOT IN ({placeholders})"
                )
            };
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(project_id)];
            for name in keep_names {
                values.push(Box::new(name));
            }
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|value| value.as_ref()).collect();
            conn.execute(&sql, refs.as_slice())?;
            Ok(())
        })
        .await
    }

    pub async fn active_plans(&self, project_id: i64) -> AppResult<Vec<JmeterPlan>> {
        self.call("list active plans", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PLAN_COLUMNS} FROM jmeter_plans \
                 WHERE project_id = ?1 AND active = 1 ORDER BY test_plan_name"
            ))?;
            let plans = stmt
                .query_map(params![project_id], plan_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(plans)
        })
        .await
    }

    pub async fn plan_by_name(
        &self,
        project_id: i64,
        test_plan_name: &str,
    ) -> AppResult<Option<JmeterPlan>> {
        let name = test_plan_name.to_owned();
        self.call("find plan by name", move |conn| {
            let plan = conn
                .query_row(
                    &format!(
                        "SELECT {PLAN_COLUMNS} FROM jmeter_plans \
                         WHERE project_id = ?1 AND test_plan_name = ?2"
                    ),
                    params![project_id, name],
                    plan_from_row,
                )
                .optional()?;
            Ok(plan)
        })
        .await
    }

    pub async fn plan_by_id(&self, plan_id: i64) -> AppResult<Option<JmeterPlan>> {
        self.call("find plan by id", move |conn| {
            let plan = conn
                .query_row(
                    &format!("SELECT {PLAN_COLUMNS} FROM jmeter_plans WHERE id = ?1"),
                    params![plan_id],
                    plan_from_row,
                )
                .optional()?;
            Ok(plan)
        })
        .await
    }
}
