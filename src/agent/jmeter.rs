use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AppError, AppResult, RemoteError};
use crate::model::{AgentRole, JmeterPlan, LoadAgent};

/// What the orchestrator needs to know about a plan file. The real .jmx
/// parser is a collaborator behind this seam.
#[derive(Debug, Clone, Default)]
pub struct PlanInfo {
    pub threads_count: u32,
    pub properties: BTreeMap<String, String>,
    pub data_files: Vec<String>,
}

pub trait PlanSource: Send + Sync {
    fn inspect(&self, plan_file: &Path) -> AppResult<PlanInfo>;
}

/// Minimal .jmx scan: sums the `num_threads` of every thread group. Good
/// enough for capacity planning; property extraction stays in the config.
pub struct JmxPlanSource;

const THREADS_MARKER: &str = "ThreadGroup.num_threads\">";

impl PlanSource for JmxPlanSource {
    fn inspect(&self, plan_file: &Path) -> AppResult<PlanInfo> {
        let content = std::fs::read_to_string(plan_file)?;
        let mut threads_count = 0u32;
        for (index, _) in content.match_indices(THREADS_MARKER) {
            let rest = &content[index + THREADS_MARKER.len()..];
            if let Some(end) = rest.find('<') {
                if let Ok(threads) = rest[..end].trim().parse::<u32>() {
                    threads_count = threads_count.saturating_add(threads);
                }
            }
        }
        Ok(PlanInfo {
            threads_count,
            ..PlanInfo::default()
        })
    }
}

/// Remote working directory for a project's artifacts on an agent.
pub fn remote_work_dir(project_code: &str) -> String {
    format!("$HOME/hailstorm/{project_code}")
}

pub fn remote_plan_path(project_code: &str, plan: &JmeterPlan) -> String {
    format!("{}/{}", remote_work_dir(project_code), plan.test_plan_name)
}

pub fn remote_results_path(project_code: &str, plan: &JmeterPlan) -> String {
    format!(
        "{}/results-{}.jtl",
        remote_work_dir(project_code),
        plan.id.max(0)
    )
}

fn remote_log_path(project_code: &str, plan: &JmeterPlan) -> String {
    format!("{}/jmeter-{}.log", remote_work_dir(project_code), plan.id.max(0))
}

fn property_flags(properties: &BTreeMap<String, String>) -> String {
    properties
        .iter()
        .map(|(key, value)| format!(" -J{key}='{value}'"))
        .collect()
}

/// Command launching JMeter for one agent. Masters run the plan (pointing
/// at their slaves in master-slave mode); slaves run `jmeter-server` and
/// wait for RMI commands. The trailing `echo $!` hands back the pid.
pub fn launch_command(
    project_code: &str,
    plan: &JmeterPlan,
    agent: &LoadAgent,
    slave_hosts: &[String],
) -> String {
    let work_dir = remote_work_dir(project_code);
    match agent.role {
        AgentRole::Master => {
            let mut command = format!(
                "nohup $HOME/jmeter/bin/jmeter -n -t {} -l {}",
                remote_plan_path(project_code, plan),
                remote_results_path(project_code, plan),
            );
            if !slave_hosts.is_empty() {
                command.push_str(&format!(" -R {} -X", slave_hosts.join(",")));
            }
            command.push_str(&property_flags(&plan.properties));
            command.push_str(&format!(
                " > {} 2>&1 & echo $!",
                remote_log_path(project_code, plan)
            ));
            command
        }
        AgentRole::Slave => format!(
            "nohup $HOME/jmeter/bin/jmeter-server -Djava.rmi.server.hostname={}{} \
             > {work_dir}/jmeter-server.log 2>&1 & echo $!",
            agent
                .private_ip_address
                .as_deref()
                .or(agent.public_ip_address.as_deref())
                .unwrap_or("127.0.0.1"),
            property_flags(&plan.properties),
        ),
    }
}

pub fn parse_launch_pid(stdout: &str, host: &str) -> AppResult<u32> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().parse::<u32>().ok())
        .ok_or_else(|| {
            AppError::remote(RemoteError::CommandFailed {
                host: host.to_owned(),
                status: 0,
                stderr: format!("no pid in launch output: {stdout:?}"),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClusterKind;

    fn plan() -> JmeterPlan {
        JmeterPlan {
            id: 4,
            project_id: 1,
            test_plan_name: "checkout.jmx".to_owned(),
            content_hash: "cafe".to_owned(),
            active: true,
            properties: BTreeMap::from([("rampup".to_owned(), "30".to_owned())]),
            latest_threads_count: 150,
        }
    }

    fn agent(role: AgentRole) -> LoadAgent {
        LoadAgent {
            id: 9,
            clusterable_id: 2,
            clusterable_type: ClusterKind::DataCenter,
            jmeter_plan_id: 4,
            public_ip_address: Some("172.16.0.9".to_owned()),
            private_ip_address: Some("10.0.0.9".to_owned()),
            active: true,
            role,
            jmeter_pid: None,
            identifier: Some("172.16.0.9".to_owned()),
        }
    }

    #[test]
    fn master_command_names_plan_results_and_properties() {
        let command = launch_command("shop", &plan(), &agent(AgentRole::Master), &[]);
        assert!(command.contains("-t $HOME/hailstorm/shop/checkout.jmx"));
        assert!(command.contains("-l $HOME/hailstorm/shop/results-4.jtl"));
        assert!(command.contains("-Jrampup='30'"));
        assert!(command.ends_with("echo $!"));
        assert!(!command.contains(" -R "));
    }

    #[test]
    fn master_command_wires_slaves_over_rmi() {
        let slaves = vec!["10.0.0.7".to_owned(), "10.0.0.8".to_owned()];
        let command = launch_command("shop", &plan(), &agent(AgentRole::Master), &slaves);
        assert!(command.contains("-R 10.0.0.7,10.0.0.8 -X"));
    }

    #[test]
    fn slave_command_starts_the_rmi_server() {
        let command = launch_command("shop", &plan(), &agent(AgentRole::Slave), &[]);
        assert!(command.contains("jmeter-server"));
        assert!(command.contains("-Djava.rmi.server.hostname=10.0.0.9"));
    }

    #[test]
    fn launch_pid_comes_from_the_last_numeric_line() {
        assert_eq!(parse_launch_pid("warning: foo\n4711\n", "h").unwrap(), 4711);
        assert!(parse_launch_pid("no pid here\n", "h").is_err());
    }

    #[test]
    fn jmx_scan_sums_thread_groups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.jmx");
        std::fs::write(
            &path,
            r#"<stringProp name="ThreadGroup.num_threads">100</stringProp>
               <stringProp name="ThreadGroup.num_threads">50</stringProp>"#,
        )
        .expect("write");
        let info = JmxPlanSource.inspect(&path).expect("inspect");
        assert_eq!(info.threads_count, 150);
    }
}
