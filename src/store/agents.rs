use rusqlite::{params, Row};

use crate::error::AppResult;
use crate::model::{AgentRole, ClusterKind, LoadAgent};

use super::Store;

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<LoadAgent> {
    let kind: String = row.get(2)?;
    let role: String = row.get(7)?;
    Ok(LoadAgent {
        id: row.get(0)?,
        clusterable_id: row.get(1)?,
        clusterable_type: ClusterKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown clusterable type '{kind}'").into(),
            )
        })?,
        jmeter_plan_id: row.get(3)?,
        public_ip_address: row.get(4)?,
        private_ip_address: row.get(5)?,
        active: row.get::<_, i64>(6)? != 0,
        role: AgentRole::parse(&role).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("unknown agent role '{role}'").into(),
            )
        })?,
        jmeter_pid: row.get(8)?,
        identifier: row.get(9)?,
    })
}

const AGENT_COLUMNS: &str = "id, clusterable_id, clusterable_type, jmeter_plan_id, \
                             public_ip_address, private_ip_address, active, type, jmeter_pid, \
                             identifier";

impl Store {
    pub async fn insert_agent(&self, agent: &LoadAgent) -> AppResult<LoadAgent> {
        let mut agent = agent.clone();
        self.call("insert load agent", move |conn| {
            conn.execute(
                "INSERT INTO load_agents \
                 (clusterable_id, clusterable_type, jmeter_plan_id, public_ip_address, \
                  private_ip_address, active, type, jmeter_pid, identifier) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    agent.clusterable_id,
                    agent.clusterable_type.as_str(),
                    agent.jmeter_plan_id,
                    agent.public_ip_address,
                    agent.private_ip_address,
                    agent.active as i64,
                    agent.role.as_str(),
                    agent.jmeter_pid,
                    agent.identifier
                ],
            )?;
            agent.id = conn.last_insert_rowid();
            Ok(agent)
        })
        .await
    }

    pub async fn update_agent(&self, agent: &LoadAgent) -> AppResult<()> {
        let agent = agent.clone();
        self.call("update load agent", move |conn| {
            conn.execute(
                "UPDATE load_agents SET public_ip_address = ?1, private_ip_address = ?2, \
                 active = ?3, type = ?4, jmeter_pid = ?5, identifier = ?6 WHERE id = ?7",
                params![
                    agent.public_ip_address,
                    agent.private_ip_address,
                    agent.active as i64,
                    agent.role.as_str(),
                    agent.jmeter_pid,
                    agent.identifier,
                    agent.id
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_agent_pid(&self, agent_id: i64, jmeter_pid: Option<u32>) -> AppResult<()> {
        self.call("set agent pid", move |conn| {
            conn.execute(
                "UPDATE load_agents SET jmeter_pid = ?1 WHERE id = ?2",
                params![jmeter_pid, agent_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete_agent(&self, agent_id: i64) -> AppResult<()> {
        self.call("delete load agent", move |conn| {
            conn.execute("DELETE FROM load_agents WHERE id = ?1", params![agent_id])?;
            Ok(())
        })
        .await
    }

    /// Agents bound to one (cluster, plan) pair, the reconciliation unit.
    pub async fn agents_for_plan(
        &self,
        clusterable_id: i64,
        clusterable_type: ClusterKind,
        jmeter_plan_id: i64,
    ) -> AppResult<Vec<LoadAgent>> {
        self.call("list agents for plan", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM load_agents \
                 WHERE clusterable_id = ?1 AND clusterable_type = ?2 AND jmeter_plan_id = ?3 \
                 ORDER BY id"
            ))?;
            let agents = stmt
                .query_map(
                    params![clusterable_id, clusterable_type.as_str(), jmeter_plan_id],
                    agent_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(agents)
        })
        .await
    }

    pub async fn agents_for_cluster(
        &self,
        clusterable_id: i64,
        clusterable_type: ClusterKind,
    ) -> AppResult<Vec<LoadAgent>> {
        self.call("list agents for cluster", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM load_agents \
                 WHERE clusterable_id = ?1 AND clusterable_type = ?2 ORDER BY id"
            ))?;
            let agents = stmt
                .query_map(
                    params![clusterable_id, clusterable_type.as_str()],
                    agent_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(agents)
        })
        .await
    }

    /// Flips every agent of the project inactive. Paired with nulling the
    /// project's serial version: no configured fingerprint, no active
    /// fleet.
    pub async fn deactivate_agents_for_project(&self, project_id: i64) -> AppResult<()> {
        self.call("deactivate project agents", move |conn| {
            conn.execute(
                "UPDATE load_agents SET active = 0 WHERE \
                 (clusterable_type = 'amazon_cloud' AND clusterable_id IN \
                    (SELECT id FROM amazon_clouds WHERE project_id = ?1)) \
                 OR (clusterable_type = 'data_center' AND clusterable_id IN \
                    (SELECT id FROM data_centers WHERE project_id = ?1))",
                params![project_id],
            )?;
            Ok(())
        })
        .await
    }

    /// Every agent owned by the project, resolved through both cluster
    /// tables.
    pub async fn agents_for_project(&self, project_id: i64) -> AppResult<Vec<LoadAgent>> {
        self.call("list agents for project", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM load_agents WHERE \
                 (clusterable_type = 'amazon_cloud' AND clusterable_id IN \
                    (SELECT id FROM amazon_clouds WHERE project_id = ?1)) \
                 OR (clusterable_type = 'data_center' AND clusterable_id IN \
                    (SELECT id FROM data_centers WHERE project_id = ?1)) \
                 ORDER BY id"
            ))?;
            let agents = stmt
                .query_map(params![project_id], agent_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(agents)
        })
        .await
    }
}
