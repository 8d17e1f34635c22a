use rusqlite::{params, OptionalExtension, Row};

use crate::error::AppResult;
use crate::model::Project;

use super::Store;

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        project_code: row.get(1)?,
        max_threads_per_agent: row.get(2)?,
        master_slave_mode: row.get::<_, i64>(3)? != 0,
        samples_breakup_interval: row.get(4)?,
        serial_version: row.get(5)?,
    })
}

const PROJECT_COLUMNS: &str = "id, project_code, max_threads_per_agent, master_slave_mode, \
                               samples_breakup_interval, serial_version";

impl Store {
    pub async fn find_project(&self, code: &str) -> AppResult<Option<Project>> {
        let code = code.to_owned();
        self.call("find project", move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_code = ?1"),
                    params![code],
                    project_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
    }

    pub async fn find_or_create_project(&self, code: &str) -> AppResult<Project> {
        let code = code.to_owned();
        self.call("find or create project", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO projects (project_code) VALUES (?1)",
                params![code],
            )?;
            let project = conn.query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_code = ?1"),
                params![code],
                project_from_row,
            )?;
            Ok(project)
        })
        .await
    }

    pub async fn update_project(&self, project: &Project) -> AppResult<()> {
        let project = project.clone();
        self.call("update project", move |conn| {
            conn.execute(
                "UPDATE projects SET max_threads_per_agent = ?1, master_slave_mode = ?2, \
                 samples_breakup_interval = ?3, serial_version = ?4 WHERE id = ?5",
                params![
                    project.max_threads_per_agent,
                    project.master_slave_mode as i64,
                    project.samples_breakup_interval,
                    project.serial_version,
                    project.id
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// `None` forces rediscovery on the next setup.
    pub async fn set_serial_version(
        &self,
        project_id: i64,
        serial_version: Option<String>,
    ) -> AppResult<()> {
        self.call("set serial version", move |conn| {
            conn.execute(
                "UPDATE projects SET serial_version = ?1 WHERE id = ?2",
                params![serial_version, project_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Cascades through every project-scoped table.
    pub async fn delete_project(&self, project_id: i64) -> AppResult<()> {
        self.call("delete project", move |conn| {
            conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
            Ok(())
        })
        .await
    }
}
