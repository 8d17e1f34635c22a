use rusqlite::{params, Row};

use crate::error::AppResult;
use crate::model::TargetHost;

use super::Store;

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<TargetHost> {
    Ok(TargetHost {
        id: row.get(0)?,
        project_id: row.get(1)?,
        host_name: row.get(2)?,
        role_name: row.get(3)?,
        monitor_type: row.get(4)?,
        executable_path: row.get(5)?,
        executable_pid: row.get(6)?,
        ssh_identity: row.get(7)?,
        user_name: row.get(8)?,
        sampling_interval: row.get(9)?,
        active: row.get::<_, i64>(10)? != 0,
    })
}

const TARGET_COLUMNS: &str = "id, project_id, host_name, role_name, type, executable_path, \
                              executable_pid, ssh_identity, user_name, sampling_interval, active";

impl Store {
    pub async fn upsert_target_host(&self, target: &TargetHost) -> AppResult<TargetHost> {
        let target = target.clone();
        self.call("upsert target host", move |conn| {
            conn.execute(
                "INSERT INTO target_hosts \
                 (project_id, host_name, role_name, type, executable_path, ssh_identity, \
                  user_name, sampling_interval, active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT (project_id, host_name, role_name) DO UPDATE SET \
                 type = excluded.type, executable_path = excluded.executable_path, \
                 ssh_identity = excluded.ssh_identity, user_name = excluded.user_name, \
                 sampling_interval = excluded.sampling_interval, active = excluded.active",
                params![
                    target.project_id,
                    target.host_name,
                    target.role_name,
                    target.monitor_type,
                    target.executable_path,
                    target.ssh_identity,
                    target.user_name,
                    target.sampling_interval,
                    target.active as i64
                ],
            )?;
            let saved = conn.query_row(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM target_hosts \
                     WHERE project_id = ?1 AND host_name = ?2 AND role_name = ?3"
                ),
                params![target.project_id, target.host_name, target.role_name],
                target_from_row,
            )?;
            Ok(saved)
        })
        .await
    }

    pub async fn deactivate_missing_targets(
        &self,
        project_id: i64,
        keep_hosts: Vec<(String, String)>,
    ) -> AppResult<()> {
        self.call("deactivate missing targets", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TARGET_COLUMNS} FROM target_hosts WHERE project_id = ?1"
            ))?;
            let targets = stmt
                .query_map(params![project_id], target_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);
            for target in targets {
                let keep = keep_hosts
                    .iter()
                    .any(|(host, role)| *host == target.host_name && *role == target.role_name);
                if !keep {
                    conn.execute(
                        "UPDATE target_hosts SET active = 0 WHERE id = ?1",
                        params![target.id],
                    )?;
                }
            }
            Ok(())
        })
        .await
    }

    pub async fn active_targets(&self, project_id: i64) -> AppResult<Vec<TargetHost>> {
        self.call("list active targets", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TARGET_COLUMNS} FROM target_hosts \
                 WHERE project_id = ?1 AND active = 1 ORDER BY host_name"
            ))?;
            let targets = stmt
                .query_map(params![project_id], target_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(targets)
        })
        .await
    }

    pub async fn set_target_pid(
        &self,
        target_id: i64,
        executable_pid: Option<u32>,
    ) -> AppResult<()> {
        self.call("set target pid", move |conn| {
            conn.execute(
                "UPDATE target_hosts SET executable_pid = ?1 WHERE id = ?2",
                params![executable_pid, target_id],
            )?;
            Ok(())
        })
        .await
    }
}
