use rusqlite::{params, OptionalExtension, Row};

use crate::error::AppResult;
use crate::model::{AmazonCloud, ClusterKind, DataCenter};

use super::Store;

fn amazon_from_row(row: &Row<'_>) -> rusqlite::Result<AmazonCloud> {
    Ok(AmazonCloud {
        id: row.get(0)?,
        project_id: row.get(1)?,
        access_key: row.get(2)?,
        secret_key: row.get(3)?,
        ssh_identity: row.get(4)?,
        region: row.get(5)?,
        zone: row.get(6)?,
        agent_ami: row.get(7)?,
        active: row.get::<_, i64>(8)? != 0,
        user_name: row.get(9)?,
        security_group: row.get(10)?,
        instance_type: row.get(11)?,
        max_threads_by_instance: row.get(12)?,
        autogenerated_ssh_key: row.get::<_, i64>(13)? != 0,
        ssh_port: row.get::<_, u16>(14)?,
    })
}

const AMAZON_COLUMNS: &str = "id, project_id, access_key, secret_key, ssh_identity, region, \
                              zone, agent_ami, active, user_name, security_group, instance_type, \
                              max_threads_by_instance, autogenerated_ssh_key, ssh_port";

fn data_center_from_row(row: &Row<'_>) -> rusqlite::Result<DataCenter> {
    let machines: String = row.get(4)?;
    Ok(DataCenter {
        id: row.get(0)?,
        project_id: row.get(1)?,
        user_name: row.get(2)?,
        ssh_identity: row.get(3)?,
        machines: machines
            .split(',')
            .filter(|machine| !machine.is_empty())
            .map(str::to_owned)
            .collect(),
        title: row.get(5)?,
        ssh_port: row.get::<_, u16>(6)?,
    })
}

const DATA_CENTER_COLUMNS: &str =
    "id, project_id, user_name, ssh_identity, machines, title, ssh_port";

impl Store {
    /// Keyed on (project, region): re-running setup updates credentials in
    /// place instead of growing duplicate cluster rows.
    pub async fn upsert_amazon_cloud(&self, cluster: &AmazonCloud) -> AppResult<AmazonCloud> {
        let cluster = cluster.clone();
        self.call("upsert amazon cloud", move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM amazon_clouds WHERE project_id = ?1 AND region = ?2",
                    params![cluster.project_id, cluster.region],
                    |row| row.get(0),
                )
                .optional()?;
            let id = match existing {
                Some(id) => {
                    // Resolved state (zone, agent AMI, autogenerated key)
                    // survives config re-application unless the config
                    // supplies its own value.
                    conn.execute(
                        "UPDATE amazon_clouds SET access_key = ?1, secret_key = ?2, \
                         ssh_identity = ?3, zone = COALESCE(?4, zone), \
                         agent_ami = COALESCE(?5, agent_ami), active = ?6, \
                         user_name = ?7, security_group = ?8, instance_type = ?9, \
                         max_threads_by_instance = ?10, ssh_port = ?11 WHERE id = ?12",
                        params![
                            cluster.access_key,
                            cluster.secret_key,
                            cluster.ssh_identity,
                            cluster.zone,
                            cluster.agent_ami,
                            cluster.active as i64,
                            cluster.user_name,
                            cluster.security_group,
                            cluster.instance_type,
                            cluster.max_threads_by_instance,
                            cluster.ssh_port,
                            id
                        ],
                    )?;
                    id
                }
                None => {
                    conn.execute(
                        "INSERT INTO amazon_clouds \
                         (project_id, access_key, secret_key, ssh_identity, region, zone, \
                          agent_ami, active, user_name, security_group, instance_type, \
                          max_threads_by_instance, autogenerated_ssh_key, ssh_port) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                        params![
                            cluster.project_id,
                            cluster.access_key,
                            cluster.secret_key,
                            cluster.ssh_identity,
                            cluster.region,
                            cluster.zone,
                            cluster.agent_ami,
                            cluster.active as i64,
                            cluster.user_name,
                            cluster.security_group,
                            cluster.instance_type,
                            cluster.max_threads_by_instance,
                            cluster.autogenerated_ssh_key as i64,
                            cluster.ssh_port
                        ],
                    )?;
                    let id = conn.last_insert_rowid();
                    conn.execute(
                        "INSERT INTO clusters (project_id, cluster_type, clusterable_id) \
                         VALUES (?1, ?2, ?3)",
                        params![
                            cluster.project_id,
                            ClusterKind::AmazonCloud.as_str(),
                            id
                        ],
                    )?;
                    id
                }
            };
            let saved = conn.query_row(
                &format!("SELECT {AMAZON_COLUMNS} FROM amazon_clouds WHERE id = ?1"),
                params![id],
                amazon_from_row,
            )?;
            Ok(saved)
        })
        .await
    }

    pub async fn upsert_data_center(&self, cluster: &DataCenter) -> AppResult<DataCenter> {
        let cluster = cluster.clone();
        self.call("upsert data center", move |conn| {
            let machines = cluster.machines.join(",");
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM data_centers WHERE project_id = ?1 AND title = ?2",
                    params![cluster.project_id, cluster.title],
                    |row| row.get(0),
                )
                .optional()?;
            let id = match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE data_centers SET user_name = ?1, ssh_identity = ?2, \
                         machines = ?3, ssh_port = ?4 WHERE id = ?5",
                        params![
                            cluster.user_name,
                            cluster.ssh_identity,
                            machines,
                            cluster.ssh_port,
                            id
                        ],
                    )?;
                    id
                }
                None => {
                    conn.execute(
                        "INSERT INTO data_centers \
                         (project_id, user_name, ssh_identity, machines, title, ssh_port) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            cluster.project_id,
                            cluster.user_name,
                            cluster.ssh_identity,
                            machines,
                            cluster.title,
                            cluster.ssh_port
                        ],
                    )?;
                    let id = conn.last_insert_rowid();
                    conn.execute(
                        "INSERT INTO clusters (project_id, cluster_type, clusterable_id) \
                         VALUES (?1, ?2, ?3)",
                        params![cluster.project_id, ClusterKind::DataCenter.as_str(), id],
                    )?;
                    id
                }
            };
            let saved = conn.query_row(
                &format!("SELECT {DATA_CENTER_COLUMNS} FROM data_centers WHERE id = ?1"),
                params![id],
                data_center_from_row,
            )?;
            Ok(saved)
        })
        .await
    }

    pub async fn amazon_clouds(&self, project_id: i64) -> AppResult<Vec<AmazonCloud>> {
        self.call("list amazon clouds", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AMAZON_COLUMNS} FROM amazon_clouds \
                 WHERE project_id = ?1 ORDER BY region"
            ))?;
            let clusters = stmt
                .query_map(params![project_id], amazon_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(clusters)
        })
        .await
    }

    pub async fn data_centers(&self, project_id: i64) -> AppResult<Vec<DataCenter>> {
        self.call("list data centers", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DATA_CENTER_COLUMNS} FROM data_centers \
                 WHERE project_id = ?1 ORDER BY title"
            ))?;
            let clusters = stmt
                .query_map(params![project_id], data_center_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(clusters)
        })
        .await
    }

    /// Adopt-and-save: the discovered AMI id is persisted in the same call
    /// so concurrent readers never observe a half-applied resolution.
    pub async fn set_agent_ami(&self, cluster_id: i64, agent_ami: String) -> AppResult<()> {
        self.call("set agent ami", move |conn| {
            conn.execute(
                "UPDATE amazon_clouds SET agent_ami = ?1 WHERE id = ?2",
                params![agent_ami, cluster_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_autogenerated_ssh_key(
        &self,
        cluster_id: i64,
        autogenerated: bool,
    ) -> AppResult<()> {
        self.call("set autogenerated ssh key", move |conn| {
            conn.execute(
                "UPDATE amazon_clouds SET autogenerated_ssh_key = ?1 WHERE id = ?2",
                params![autogenerated as i64, cluster_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_zone(&self, cluster_id: i64, zone: String) -> AppResult<()> {
        self.call("set availability zone", move |conn| {
            conn.execute(
                "UPDATE amazon_clouds SET zone = ?1 WHERE id = ?2",
                params![zone, cluster_id],
            )?;
            Ok(())
        })
        .await
    }
}
