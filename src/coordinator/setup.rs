use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{self, ClusterConfig};
use crate::error::{AppError, AppResult, ConfigError};
use crate::model::{AmazonCloud, DataCenter, Project, TargetHost};
use crate::remote::file_sha256;

use super::Coordinator;

impl Coordinator {
    /// Reconciles the project with its configuration: plans, clusters and
    /// monitored targets. Re-runs remote work only when the configuration
    /// fingerprint changed (or `force`); any failure nulls the serial
    /// version so the next run rediscovers everything.
    pub async fn setup(&self, force: bool) -> AppResult<()> {
        let _guard = self.lock_command().await;
        self.setup_inner(force).await.map(|_| ())
    }

    pub(crate) async fn setup_inner(&self, force: bool) -> AppResult<Project> {
        config::validate(self.config()).map_err(AppError::config)?;
        self.workspace().create()?;
        let mut project = self.project().await?;

        let plan_hashes = self.load_plans(&project).await?;
        let fingerprint = config::fingerprint(self.config(), &plan_hashes);
        if !force && project.serial_version.as_deref() == Some(fingerprint.as_str()) {
            info!(project = %project.project_code, "configuration unchanged, setup skipped");
            return Ok(project);
        }

        match self.apply_remote_setup(&project).await {
            Ok(()) => {
                self.store()
                    .set_serial_version(project.id, Some(fingerprint.clone()))
                    .await?;
                project.serial_version = Some(fingerprint);
                info!(project = %project.project_code, "setup complete");
                Ok(project)
            }
            Err(err) => {
                warn!(project = %project.project_code, "setup failed, forcing rediscovery: {err}");
                self.store().set_serial_version(project.id, None).await?;
                self.store()
                    .deactivate_agents_for_project(project.id)
                    .await?;
                Err(err)
            }
        }
    }

    /// Registers every configured plan: stage the file into the project
    /// workspace, hash it, extract the thread count, and upsert the row.
    /// Plans gone from the configuration become inactive but stay for
    /// historical cycles.
    async fn load_plans(&self, project: &Project) -> AppResult<Vec<String>> {
        let mut plan_hashes = Vec::new();
        let mut keep_names = Vec::new();
        for plan_config in &self.config().plans {
            let local = self.stage_plan_file(&plan_config.file)?;
            let hash = file_sha256(&local)?;
            let info = self.plan_source().inspect(&local)?;
            let mut properties = self.config().jmeter.properties.clone();
            properties.extend(plan_config.properties.clone());

            let name = plan_file_name(&plan_config.file)?;
            self.store()
                .upsert_plan(project.id, &name, &hash, &properties, info.threads_count)
                .await?;
            keep_names.push(name);
            plan_hashes.push(hash);
        }
        self.store()
            .deactivate_missing_plans(project.id, keep_names)
            .await?;
        Ok(plan_hashes)
    }

    /// Plan files live in the workspace `app/` directory; a path outside
    /// it is copied in on first sight.
    fn stage_plan_file(&self, file: &str) -> AppResult<PathBuf> {
        let staged = self.workspace().app_dir().join(
            PathBuf::from(file)
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_default(),
        );
        if staged.is_file() {
            let source = PathBuf::from(file);
            if source.is_file() && file_sha256(&source)? != file_sha256(&staged)? {
                std::fs::copy(&source, &staged)?;
            }
            return Ok(staged);
        }
        let source = PathBuf::from(file);
        if source.is_file() {
            std::fs::copy(&source, &staged)?;
            return Ok(staged);
        }
        Err(AppError::config(ConfigError::Read {
            path: file.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "plan file not found"),
        }))
    }

    async fn apply_remote_setup(&self, project: &Project) -> AppResult<()> {
        self.apply_cluster_rows(project).await?;
        let mut clusters = self.load_clusters(project).await?;
        self.for_each_cluster(&mut clusters, |cluster| cluster.setup())
            .await?;
        self.apply_targets(project).await?;
        Ok(())
    }

    async fn apply_cluster_rows(&self, project: &Project) -> AppResult<()> {
        for cluster_config in &self.config().clusters {
            match cluster_config {
                ClusterConfig::AmazonCloud(aws) => {
                    let row = AmazonCloud {
                        id: 0,
                        project_id: project.id,
                        access_key: aws.access_key.clone(),
                        secret_key: aws.secret_key.clone(),
                        ssh_identity: aws.ssh_identity.clone(),
                        region: aws.region.clone(),
                        zone: aws.zone.clone(),
                        agent_ami: aws.agent_ami.clone(),
                        active: aws.active.unwrap_or(true),
                        user_name: aws.user_name().to_owned(),
                        security_group: aws.security_group().to_owned(),
                        instance_type: aws.instance_type().to_owned(),
                        max_threads_by_instance: aws.max_threads_by_instance,
                        autogenerated_ssh_key: false,
                        ssh_port: aws.ssh_port(),
                    };
                    self.store().upsert_amazon_cloud(&row).await?;
                }
                ClusterConfig::DataCenter(dc) => {
                    let row = DataCenter {
                        id: 0,
                        project_id: project.id,
                        user_name: dc.user_name.clone(),
                        ssh_identity: dc.ssh_identity.clone(),
                        machines: dc.machines.clone(),
                        title: dc.title(),
                        ssh_port: dc.ssh_port(),
                    };
                    self.store().upsert_data_center(&row).await?;
                }
            }
        }
        Ok(())
    }

    async fn apply_targets(&self, project: &Project) -> AppResult<()> {
        let mut keep = Vec::new();
        for target_config in &self.config().target_hosts {
            let target = TargetHost {
                id: 0,
                project_id: project.id,
                host_name: target_config.host_name.clone(),
                role_name: target_config.role_name.clone(),
                monitor_type: target_config.monitor_type().to_owned(),
                executable_path: target_config.executable_path.clone(),
                executable_pid: None,
                ssh_identity: target_config.ssh_identity.clone(),
                user_name: target_config.user_name.clone(),
                sampling_interval: target_config.sampling_interval(),
                active: target_config.active.unwrap_or(true),
            };
            self.store().upsert_target_host(&target).await?;
            keep.push((target.host_name, target.role_name));
        }
        self.store()
            .deactivate_missing_targets(project.id, keep)
            .await?;
        self.monitors().install_all(project).await?;
        Ok(())
    }
}

fn plan_file_name(file: &str) -> AppResult<String> {
    PathBuf::from(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            AppError::config(ConfigError::Read {
                path: file.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad plan path"),
            })
        })
}
