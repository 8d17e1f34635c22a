//! Shared fixtures: an in-memory cloud, a scripted shell, and a harness
//! wiring both into a coordinator over an in-memory store.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hailstorm::cluster::{
    CloudClient, CloudClientFactory, CloudInstance, ImageState, InstanceSpec, InstanceState,
    MachineImage,
};
use hailstorm::config::{AmazonCloudConfig, ClusterConfig, ConfigFile, JmeterConfig, PlanConfig,
    TargetHostConfig};
use hailstorm::coordinator::Coordinator;
use hailstorm::error::{ClusterError, ConfigError, RemoteError};
use hailstorm::model::AmazonCloud;
use hailstorm::remote::{ExecOutput, Executor, HostSpec, LineSink, RemoteShell, RetryPolicy};
use hailstorm::store::Store;
use hailstorm::workspace::Workspace;

pub const JTL_CONTENT: &str = "timeStamp,elapsed,label,success,bytes,allThreads\n\
1700000000000,100,home,true,1000,150\n\
1700000001000,200,home,true,1000,150\n\
1700000002000,300,home,false,500,150\n\
1700000003000,150,cart,true,800,150\n";

const NMON_CONTENT: &str = "\
CPU_ALL,CPU Total,User%,Sys%,Wait%,Idle%
CPU_ALL,T0001,20.0,10.0,0.5,69.5
MEM,Memory MB,memtotal,hightotal,lowtotal,swaptotal,memfree,swapfree
MEM,T0001,8000,0,0,2000,4000,2000
";

/// In-memory EC2: instances spring up `running`, images register
/// instantly, and every mutating call is counted.
#[derive(Default)]
pub struct FakeCloud {
    calls: AtomicU32,
    next_id: AtomicU32,
    instances: Mutex<HashMap<String, CloudInstance>>,
    images: Mutex<HashMap<String, MachineImage>>,
    key_pairs: Mutex<HashSet<String>>,
    pub fail_create_image: AtomicBool,
    pub terminated: Mutex<Vec<String>>,
}

impl FakeCloud {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn key_pair_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.tick();
        Ok(self.key_pairs.lock().unwrap().contains(name))
    }

    async fn create_key_pair(&self, name: &str) -> Result<String, ClusterError> {
        self.tick();
        self.key_pairs.lock().unwrap().insert(name.to_owned());
        Ok(format!("-----FAKE KEY {name}-----"))
    }

    async fn delete_key_pair(&self, name: &str) -> Result<(), ClusterError> {
        self.tick();
        self.key_pairs.lock().unwrap().remove(name);
        Ok(())
    }

    async fn ensure_security_group(&self, _name: &str) -> Result<(), ClusterError> {
        self.tick();
        Ok(())
    }

    async fn available_zones(&self) -> Result<Vec<String>, ClusterError> {
        self.tick();
        Ok(vec!["us-east-1b".to_owned(), "us-east-1a".to_owned()])
    }

    async fn find_self_owned_image(
        &self,
        name: &str,
    ) -> Result<Option<MachineImage>, ClusterError> {
        self.tick();
        Ok(self.images.lock().unwrap().get(name).cloned())
    }

    async fn create_image(&self, name: &str, _instance_id: &str) -> Result<String, ClusterError> {
        self.tick();
        if self.fail_create_image.load(Ordering::SeqCst) {
            return Err(ClusterError::Cloud {
                context: "create image",
                message: "InternalError: snapshot failed".to_owned(),
            });
        }
        let id = format!("ami-{:08x}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.images.lock().unwrap().insert(
            name.to_owned(),
            MachineImage {
                id: id.clone(),
                state: ImageState::Available,
            },
        );
        Ok(id)
    }

    async fn run_instance(&self, _spec: &InstanceSpec) -> Result<CloudInstance, ClusterError> {
        self.tick();
        let serial = self.next_id.fetch_add(1, Ordering::SeqCst);
        let instance = CloudInstance {
            id: format!("i-{serial:08x}"),
            public_ip: Some(format!("52.0.0.{}", serial % 250 + 1)),
            private_ip: Some(format!("10.0.0.{}", serial % 250 + 1)),
            state: InstanceState::Running,
        };
        self.instances
            .lock()
            .unwrap()
            .insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn describe_instance(&self, id: &str) -> Result<Option<CloudInstance>, ClusterError> {
        Ok(self.instances.lock().unwrap().get(id).cloned())
    }

    async fn instance_checks_passed(&self, _id: &str) -> Result<bool, ClusterError> {
        Ok(true)
    }

    async fn start_instance(&self, id: &str) -> Result<(), ClusterError> {
        self.tick();
        if let Some(instance) = self.instances.lock().unwrap().get_mut(id) {
            instance.state = InstanceState::Running;
        }
        Ok(())
    }

    async fn stop_instance(&self, id: &str) -> Result<(), ClusterError> {
        self.tick();
        if let Some(instance) = self.instances.lock().unwrap().get_mut(id) {
            instance.state = InstanceState::Stopped;
            instance.public_ip = None;
        }
        Ok(())
    }

    async fn terminate_instance(&self, id: &str) -> Result<(), ClusterError> {
        self.tick();
        self.terminated.lock().unwrap().push(id.to_owned());
        if let Some(instance) = self.instances.lock().unwrap().get_mut(id) {
            instance.state = InstanceState::Terminated;
        }
        Ok(())
    }
}

pub struct FakeCloudFactory {
    pub cloud: Arc<FakeCloud>,
}

impl CloudClientFactory for FakeCloudFactory {
    fn client_for(&self, _cluster: &AmazonCloud) -> Result<Arc<dyn CloudClient>, ConfigError> {
        Ok(Arc::clone(&self.cloud) as Arc<dyn CloudClient>)
    }
}

/// Scripted SSH: tracks launched pids, answers liveness probes, serves
/// canned result files on download.
#[derive(Default)]
pub struct FakeShell {
    next_pid: AtomicU32,
    processes: Mutex<HashSet<u32>>,
    pub exec_log: Mutex<Vec<(String, String)>>,
    pub uploads: Mutex<Vec<(String, String)>>,
    pub fail_kill: AtomicBool,
}

impl FakeShell {
    pub fn new() -> Self {
        FakeShell {
            next_pid: AtomicU32::new(4000),
            ..FakeShell::default()
        }
    }

    pub fn executed(&self, needle: &str) -> bool {
        self.exec_log
            .lock()
            .unwrap()
            .iter()
            .any(|(_, command)| command.contains(needle))
    }

    fn spawn_process(&self) -> u32 {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.processes.lock().unwrap().insert(pid);
        pid
    }

    fn pid_in(command: &str, prefix: &str) -> Option<u32> {
        let rest = &command[command.find(prefix)? + prefix.len()..];
        rest.split_whitespace().next()?.parse().ok()
    }
}

fn ok(stdout: impl Into<String>) -> ExecOutput {
    ExecOutput {
        stdout: stdout.into(),
        stderr: String::new(),
        exit_code: 0,
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn exec(
        &self,
        host: &HostSpec,
        command: &str,
        _on_line: Option<LineSink>,
    ) -> Result<ExecOutput, RemoteError> {
        self.exec_log
            .lock()
            .unwrap()
            .push((host.host.clone(), command.to_owned()));

        if command.contains("kill -15 ") || command.contains("kill -9 ") {
            if self.fail_kill.load(Ordering::SeqCst) {
                return Err(RemoteError::CommandFailed {
                    host: host.host.clone(),
                    status: 1,
                    stderr: "kill: operation not permitted".to_owned(),
                });
            }
            if let Some(pid) = Self::pid_in(command, "kill -15 ")
                .or_else(|| Self::pid_in(command, "kill -9 "))
            {
                self.processes.lock().unwrap().remove(&pid);
            }
            return Ok(ok(""));
        }
        if command.contains("kill -USR2 ") {
            if let Some(pid) = Self::pid_in(command, "kill -USR2 ") {
                self.processes.lock().unwrap().remove(&pid);
            }
            return Ok(ok(""));
        }
        if command.contains("kill -0 ") {
            let alive = Self::pid_in(command, "kill -0 ")
                .map(|pid| self.processes.lock().unwrap().contains(&pid))
                .unwrap_or(false);
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: if alive { 0 } else { 1 },
            });
        }
        if command.contains("& echo $!") || command.contains("-F /tmp/hailstorm") {
            let pid = self.spawn_process();
            return Ok(ok(format!("{pid}\n")));
        }
        if command.starts_with("sha256sum ") {
            // Never matches, so uploads always run.
            return Ok(ok(""));
        }
        Ok(ok(""))
    }

    async fn upload(
        &self,
        host: &HostSpec,
        _local: &Path,
        remote: &str,
    ) -> Result<(), RemoteError> {
        self.uploads
            .lock()
            .unwrap()
            .push((host.host.clone(), remote.to_owned()));
        Ok(())
    }

    async fn download(
        &self,
        _host: &HostSpec,
        remote: &str,
        local: &Path,
    ) -> Result<(), RemoteError> {
        let content = if remote.ends_with(".jtl") {
            JTL_CONTENT
        } else {
            NMON_CONTENT
        };
        std::fs::write(local, content).map_err(|err| RemoteError::Io {
            context: "fake download",
            source: err,
        })?;
        Ok(())
    }

    async fn probe(&self, _host: &HostSpec, _timeout: Duration) -> Result<(), RemoteError> {
        Ok(())
    }
}

pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub store: Store,
    pub shell: Arc<FakeShell>,
    pub cloud: Arc<FakeCloud>,
    pub coordinator: Coordinator,
}

/// One AWS cluster (100 threads per instance), one plan asking for
/// `threads` virtual users, optional monitored target.
pub async fn aws_harness(threads: u32, with_target: bool) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join("site.jmx");
    std::fs::write(
        &plan_path,
        format!("<stringProp name=\"ThreadGroup.num_threads\">{threads}</stringProp>"),
    )
    .expect("write plan");

    let config = ConfigFile {
        project_code: "hailstorm site".to_owned(),
        master_slave_mode: Some(true),
        jmeter: JmeterConfig {
            version: Some("5.6.3".to_owned()),
            ..JmeterConfig::default()
        },
        plans: vec![PlanConfig {
            file: plan_path.display().to_string(),
            ..PlanConfig::default()
        }],
        clusters: vec![ClusterConfig::AmazonCloud(AmazonCloudConfig {
            access_key: "A".to_owned(),
            secret_key: "s".to_owned(),
            ssh_identity: "hailstorm".to_owned(),
            region: "us-east-1".to_owned(),
            instance_type: Some("t3a.large".to_owned()),
            max_threads_by_instance: Some(100),
            ..AmazonCloudConfig::default()
        })],
        target_hosts: if with_target {
            vec![TargetHostConfig {
                host_name: "db.internal".to_owned(),
                role_name: "database".to_owned(),
                ..TargetHostConfig::default()
            }]
        } else {
            Vec::new()
        },
        ..ConfigFile::default()
    };

    let store = Store::open_in_memory().await.expect("store");
    let shell = Arc::new(FakeShell::new());
    let cloud = Arc::new(FakeCloud::default());
    let executor = Executor::new(
        Arc::clone(&shell) as Arc<dyn RemoteShell>,
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    );
    let workspace = Workspace::new(&dir.path().join("workspace"), "hailstorm_site");
    let coordinator = Coordinator::new(config, store.clone(), executor, workspace)
        .with_cloud_factory(Arc::new(FakeCloudFactory {
            cloud: Arc::clone(&cloud),
        }));

    Harness {
        _dir: dir,
        store,
        shell,
        cloud,
        coordinator,
    }
}
