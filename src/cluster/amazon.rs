use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::JmeterInstall;
use crate::error::{AppError, AppResult, ClusterError};
use crate::model::{AgentRole, AmazonCloud, ClusterKind, JmeterPlan, LoadAgent, Project};
use crate::remote::{wait_for, Executor, HostSpec};
use crate::store::Store;
use crate::workspace::Workspace;

use super::capacity::{default_max_threads_per_agent, required_agent_count};
use super::cloud::{CloudClient, CloudInstance, ImageState, InstanceSpec, InstanceState};

/// Stock Ubuntu images used to build agent AMIs, per region.
fn base_ami_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("us-east-1", "ami-0e2512bd9da751ea8"),
        ("us-east-2", "ami-0ea3c35c5c3284d82"),
        ("us-west-1", "ami-0d382e80be7ffdae5"),
        ("us-west-2", "ami-0a634ae95e11c6f91"),
        ("eu-west-1", "ami-0932440befd74cdba"),
        ("eu-central-1", "ami-0c960b947cbb2dd16"),
        ("ap-southeast-1", "ami-0e5182fad1edfaa68"),
        ("ap-northeast-1", "ami-0b828c1c5ac3f13ee"),
        ("sa-east-1", "ami-08ae71fd7f1449df1"),
    ])
}

const INSTANCE_READY_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const INSTANCE_POLL_INTERVAL: Duration = Duration::from_secs(15);
const SSH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Elastic backend: agent hosts are EC2 instances created from a
/// project-specific AMI.
pub struct AmazonCluster {
    row: AmazonCloud,
    project: Project,
    jmeter: JmeterInstall,
    store: Store,
    executor: Executor,
    cloud: Arc<dyn CloudClient>,
    workspace: Workspace,
}

impl AmazonCluster {
    pub fn new(
        row: AmazonCloud,
        project: Project,
        jmeter: JmeterInstall,
        store: Store,
        executor: Executor,
        cloud: Arc<dyn CloudClient>,
        workspace: Workspace,
    ) -> Self {
        AmazonCluster {
            row,
            project,
            jmeter,
            store,
            executor,
            cloud,
            workspace,
        }
    }

    pub fn clusterable_id(&self) -> i64 {
        self.row.id
    }

    pub fn name(&self) -> String {
        self.row.name()
    }

    pub fn user_name(&self) -> &str {
        &self.row.user_name
    }

    pub fn identity_file(&self) -> PathBuf {
        self.workspace
            .identity_path(&format!("{}.pem", self.row.ssh_identity))
    }

    fn key_name(&self) -> &str {
        &self.row.ssh_identity
    }

    /// AMI name for this project's agent image. Custom installers get a
    /// project-scoped name so different bundles never collide.
    fn ami_name(&self) -> String {
        if self.jmeter.custom_installer_url.is_some() {
            format!(
                "hailstorm/{}/jmeter-{}",
                self.project.project_code, self.jmeter.version
            )
        } else {
            format!("hailstorm/jmeter-{}", self.jmeter.version)
        }
    }

    pub fn required_agent_count(&self, plan: &JmeterPlan) -> u32 {
        let max_threads = self
            .row
            .max_threads_by_instance
            .unwrap_or_else(|| default_max_threads_per_agent(&self.row.instance_type));
        required_agent_count(plan.latest_threads_count, max_threads)
    }

    pub async fn setup(&mut self) -> AppResult<()> {
        self.cloud
            .ensure_security_group(&self.row.security_group)
            .await
            .map_err(AppError::cluster)?;
        self.ensure_identity_file().await?;
        self.ensure_zone().await?;
        if self.row.agent_ami.is_none() {
            let ami = match self.check_for_existing_ami().await? {
                Some(ami) => ami,
                None => self.create_agent_ami().await?,
            };
            self.store.set_agent_ami(self.row.id, ami.clone()).await?;
            self.row.agent_ami = Some(ami);
        }
        Ok(())
    }

    /// Accepts a pre-staged identity file; otherwise creates the key pair
    /// and persists the private key with owner-only permissions. An
    /// existing remote pair without a local file is unrecoverable.
    async fn ensure_identity_file(&mut self) -> AppResult<()> {
        let path = self.identity_file();
        if path.is_file() {
            return Ok(());
        }
        let exists = self
            .cloud
            .key_pair_exists(self.key_name())
            .await
            .map_err(AppError::cluster)?;
        if exists {
            return Err(AppError::cluster(ClusterError::IdentityFileConflict {
                path: path.display().to_string(),
                key_name: self.key_name().to_owned(),
            }));
        }
        let key_material = self
            .cloud
            .create_key_pair(self.key_name())
            .await
            .map_err(AppError::cluster)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, key_material)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        self.store.set_autogenerated_ssh_key(self.row.id, true).await?;
        self.row.autogenerated_ssh_key = true;
        info!(key = self.key_name(), "created key pair and identity file");
        Ok(())
    }

    /// Master-slave RMI traffic needs every agent in one zone; pick the
    /// first available one (sorted, so the choice is deterministic).
    async fn ensure_zone(&mut self) -> AppResult<()> {
        if !self.project.master_slave_mode || self.row.zone.is_some() {
            return Ok(());
        }
        let mut zones = self
            .cloud
            .available_zones()
            .await
            .map_err(AppError::cluster)?;
        zones.sort();
        let zone = zones.into_iter().next().ok_or_else(|| {
            AppError::cluster(ClusterError::NoAvailabilityZone {
                region: self.row.region.clone(),
            })
        })?;
        self.store.set_zone(self.row.id, zone.clone()).await?;
        self.row.zone = Some(zone);
        Ok(())
    }

    async fn check_for_existing_ami(&self) -> AppResult<Option<String>> {
        let image = self
            .cloud
            .find_self_owned_image(&self.ami_name())
            .await
            .map_err(AppError::cluster)?;
        Ok(match image {
            Some(image) if image.state == ImageState::Available => {
                info!(ami = %image.id, "adopting existing agent AMI");
                Some(image.id)
            }
            _ => None,
        })
    }

    /// Builds the agent AMI: boot a stock image, install Java and JMeter,
    /// snapshot, and terminate the builder on every exit path.
    async fn create_agent_ami(&self) -> AppResult<String> {
        let base_ami = *base_ami_map().get(self.row.region.as_str()).ok_or_else(|| {
            AppError::cluster(ClusterError::UnknownRegion {
                region: self.row.region.clone(),
            })
        })?;
        info!(base_ami, region = %self.row.region, "building agent AMI");
        let builder = self
            .run_instance(base_ami)
            .await
            .map_err(|err| ami_build_error("launch builder instance", err))?;
        let builder_id = builder.id.clone();

        let built = self.provision_and_snapshot(&builder).await;

        // Guaranteed release: the builder never outlives the build attempt.
        if let Err(err) = self.cloud.terminate_instance(&builder_id).await {
            warn!(instance = %builder_id, "failed to terminate builder instance: {err}");
        }
        built
    }

    async fn provision_and_snapshot(&self, builder: &CloudInstance) -> AppResult<String> {
        let ready = self
            .wait_instance_ready(&builder.id)
            .await
            .map_err(|err| ami_build_error("wait for builder instance", err))?;
        let host = self.instance_host_spec(&ready)?;
        self.executor
            .ensure_connectivity(&host, SSH_PROBE_TIMEOUT)
            .await
            .map_err(|err| ami_build_error("reach builder instance", err))?;

        self.install_jmeter(&host)
            .await
            .map_err(|err| ami_build_error("provision builder instance", err))?;

        let image_id = self
            .cloud
            .create_image(&self.ami_name(), &builder.id)
            .await
            .map_err(AppError::cluster)
            .map_err(|err| ami_build_error("snapshot builder instance", err))?;

        wait_for(
            "agent AMI available",
            INSTANCE_READY_TIMEOUT,
            INSTANCE_POLL_INTERVAL,
            || async {
                match self.cloud.find_self_owned_image(&self.ami_name()).await {
                    Ok(Some(image)) if image.state == ImageState::Available => Some(image.id),
                    // Pending or a transient describe failure: keep polling.
                    _ => None,
                }
            },
        )
        .await
        .map_err(AppError::remote)?;

        info!(ami = %image_id, "agent AMI built");
        Ok(image_id)
    }

    async fn install_jmeter(&self, host: &HostSpec) -> AppResult<()> {
        let url = self.jmeter.custom_installer_url.clone().unwrap_or_else(|| {
            format!(
                "https://archive.apache.org/dist/jmeter/binaries/apache-jmeter-{}.tgz",
                self.jmeter.version
            )
        });
        let commands = [
            "sudo apt-get update -y".to_owned(),
            "sudo apt-get install -y openjdk-11-jre-headless".to_owned(),
            format!("wget -q '{url}' -O /tmp/jmeter.tgz"),
            "tar -xzf /tmp/jmeter.tgz -C $HOME".to_owned(),
            format!(
                "ln -sfn $HOME/*jmeter-{}* $HOME/jmeter",
                self.jmeter.version
            ),
        ];
        for command in commands {
            self.executor.exec_ok(host, &command).await?;
        }
        Ok(())
    }

    async fn run_instance(&self, ami: &str) -> AppResult<CloudInstance> {
        let spec = InstanceSpec {
            ami: ami.to_owned(),
            instance_type: self.row.instance_type.clone(),
            key_name: self.key_name().to_owned(),
            security_group: self.row.security_group.clone(),
            zone: self.row.zone.clone(),
        };
        self.cloud
            .run_instance(&spec)
            .await
            .map_err(AppError::cluster)
    }

    /// Polls until the instance runs with both reachability checks green
    /// and a public IP assigned. Transient describe failures keep polling.
    async fn wait_instance_ready(&self, instance_id: &str) -> AppResult<CloudInstance> {
        let id = instance_id.to_owned();
        wait_for(
            "instance ready",
            INSTANCE_READY_TIMEOUT,
            INSTANCE_POLL_INTERVAL,
            || {
                let id = id.clone();
                async move {
                    let described = match self.cloud.describe_instance(&id).await {
                        Ok(described) => described,
                        Err(err) => {
                            warn!(instance = %id, "describe failed, will retry: {err}");
                            return None;
                        }
                    };
                    let instance = described?;
                    if instance.state != InstanceState::Running
                        || instance.public_ip.is_none()
                    {
                        return None;
                    }
                    match self.cloud.instance_checks_passed(&id).await {
                        Ok(true) => Some(instance),
                        _ => None,
                    }
                }
            },
        )
        .await
        .map_err(AppError::remote)
    }

    fn instance_host_spec(&self, instance: &CloudInstance) -> AppResult<HostSpec> {
        let ip = instance.public_ip.as_deref().ok_or_else(|| {
            AppError::cluster(ClusterError::MissingHost {
                identifier: instance.id.clone(),
            })
        })?;
        Ok(HostSpec::new(
            ip,
            &self.row.user_name,
            &self.identity_file(),
            self.row.ssh_port,
        ))
    }

    /// Boots an agent host from the resolved AMI and waits until SSH
    /// answers.
    async fn launch_ready_instance(&self) -> AppResult<CloudInstance> {
        let ami = self.row.agent_ami.clone().ok_or_else(|| {
            AppError::cluster(ClusterError::Cloud {
                context: "provision agent",
                message: "agent AMI is not resolved; run setup first".to_owned(),
            })
        })?;
        let instance = self.run_instance(&ami).await?;
        let ready = self.wait_instance_ready(&instance.id).await?;
        let host = self.instance_host_spec(&ready)?;
        self.executor
            .ensure_connectivity(&host, SSH_PROBE_TIMEOUT)
            .await?;
        Ok(ready)
    }

    /// Launches a fresh agent host and returns the unsaved agent row.
    pub async fn provision_agent(
        &self,
        plan: &JmeterPlan,
        role: AgentRole,
    ) -> AppResult<LoadAgent> {
        let ready = self.launch_ready_instance().await?;
        Ok(LoadAgent {
            id: 0,
            clusterable_id: self.row.id,
            clusterable_type: ClusterKind::AmazonCloud,
            jmeter_plan_id: plan.id,
            public_ip_address: ready.public_ip.clone(),
            private_ip_address: ready.private_ip.clone(),
            active: true,
            role,
            jmeter_pid: None,
            identifier: Some(ready.id),
        })
    }

    /// Idempotent: running agents are left alone, stopped ones restarted,
    /// vanished ones replaced.
    pub async fn start_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        let existing = match agent.identifier.as_deref() {
            Some(id) => self
                .cloud
                .describe_instance(id)
                .await
                .map_err(AppError::cluster)?,
            None => None,
        };
        match existing {
            Some(instance) if instance.state == InstanceState::Running => {
                agent.public_ip_address = instance.public_ip;
                agent.private_ip_address = instance.private_ip;
            }
            Some(instance)
                if matches!(
                    instance.state,
                    InstanceState::Stopped | InstanceState::Stopping
                ) =>
            {
                self.cloud
                    .start_instance(&instance.id)
                    .await
                    .map_err(AppError::cluster)?;
                let ready = self.wait_instance_ready(&instance.id).await?;
                agent.public_ip_address = ready.public_ip;
                agent.private_ip_address = ready.private_ip;
            }
            Some(instance) if instance.state == InstanceState::Pending => {
                let ready = self.wait_instance_ready(&instance.id).await?;
                agent.public_ip_address = ready.public_ip;
                agent.private_ip_address = ready.private_ip;
            }
            _ => {
                // Terminated out-of-band or never created: replace the host.
                let fresh = self.launch_ready_instance().await?;
                agent.identifier = Some(fresh.id);
                agent.public_ip_address = fresh.public_ip;
                agent.private_ip_address = fresh.private_ip;
            }
        }
        Ok(())
    }

    /// Stops the backing host and drops the public IP, which is released
    /// by the provider on stop.
    pub async fn stop_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        let Some(id) = agent.identifier.clone() else {
            return Ok(());
        };
        let described = self
            .cloud
            .describe_instance(&id)
            .await
            .map_err(AppError::cluster)?;
        if let Some(instance) = described {
            if instance.state == InstanceState::Running {
                self.cloud
                    .stop_instance(&instance.id)
                    .await
                    .map_err(AppError::cluster)?;
                wait_for(
                    "instance stopped",
                    INSTANCE_READY_TIMEOUT,
                    INSTANCE_POLL_INTERVAL,
                    || {
                        let id = instance.id.clone();
                        async move {
                            match self.cloud.describe_instance(&id).await {
                                Ok(Some(current))
                                    if current.state == InstanceState::Stopped =>
                                {
                                    Some(())
                                }
                                Ok(None) => Some(()),
                                _ => None,
                            }
                        }
                    },
                )
                .await
                .map_err(AppError::remote)?;
            }
        }
        agent.public_ip_address = None;
        agent.jmeter_pid = None;
        Ok(())
    }

    /// Terminates the backing host; missing hosts are silently ignored.
    pub async fn terminate_agent(&self, agent: &mut LoadAgent) -> AppResult<()> {
        if let Some(id) = agent.identifier.as_deref() {
            self.cloud
                .terminate_instance(id)
                .await
                .map_err(AppError::cluster)?;
        }
        agent.public_ip_address = None;
        agent.private_ip_address = None;
        agent.jmeter_pid = None;
        Ok(())
    }

    /// Removes auto-created key material. AMIs are kept: rebuilding them
    /// costs fifteen minutes, storing them costs cents.
    pub async fn cleanup(&self) -> AppResult<()> {
        if !self.row.autogenerated_ssh_key {
            return Ok(());
        }
        self.cloud
            .delete_key_pair(self.key_name())
            .await
            .map_err(AppError::cluster)?;
        let path = self.identity_file();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.store
            .set_autogenerated_ssh_key(self.row.id, false)
            .await?;
        Ok(())
    }

    pub fn host_spec(&self, agent: &LoadAgent) -> AppResult<HostSpec> {
        let ip = agent
            .public_ip_address
            .as_deref()
            .ok_or_else(|| {
                AppError::cluster(ClusterError::MissingHost {
                    identifier: agent
                        .identifier
                        .clone()
                        .unwrap_or_else(|| format!("agent-{}", agent.id)),
                })
            })?;
        Ok(HostSpec::new(
            ip,
            &self.row.user_name,
            &self.identity_file(),
            self.row.ssh_port,
        ))
    }
}

fn ami_build_error(stage: &str, err: AppError) -> AppError {
    AppError::cluster(ClusterError::AmiBuild {
        message: format!("{stage}: {err}"),
    })
}
