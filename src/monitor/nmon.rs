use std::path::Path;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::model::TargetHost;
use crate::remote::{Executor, HostSpec};

use super::{MonitorBackend, MonitorTrends};

/// Drives an `nmon` process on the target: spreadsheet output mode, one
/// snapshot per sampling interval.
pub struct Nmon;

// Generous snapshot budget; the process is killed at stop, not by -c.
const SNAPSHOT_BUDGET: u32 = 360_000;

fn output_path(target: &TargetHost) -> String {
    format!("/tmp/hailstorm-{}.nmon", target.role_name)
}

fn executable(target: &TargetHost) -> &str {
    target.executable_path.as_deref().unwrap_or("nmon")
}

#[async_trait]
impl MonitorBackend for Nmon {
    async fn install(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
    ) -> AppResult<()> {
        let exe = executable(target);
        executor
            .exec_ok(
                host,
                &format!("command -v {exe} >/dev/null || sudo apt-get install -y nmon"),
            )
            .await?;
        Ok(())
    }

    async fn start(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
    ) -> AppResult<u32> {
        let out = output_path(target);
        executor.exec(host, &format!("rm -f {out}")).await?;
        let command = format!(
            "{} -F {out} -s {} -c {} -p",
            executable(target),
            target.sampling_interval.max(1),
            SNAPSHOT_BUDGET,
        );
        // nmon -p daemonises and prints the daemon pid.
        let output = executor.exec_ok(host, &command).await?;
        crate::agent::parse_launch_pid(&output.stdout, &host.host)
    }

    async fn stop(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
    ) -> AppResult<()> {
        if let Some(pid) = target.executable_pid {
            // USR2 asks nmon to flush and exit; fall back to TERM.
            executor
                .exec(
                    host,
                    &format!("kill -USR2 {pid} 2>/dev/null || kill {pid} 2>/dev/null || true"),
                )
                .await?;
        }
        Ok(())
    }

    async fn collect(
        &self,
        executor: &Executor,
        host: &HostSpec,
        target: &TargetHost,
        scratch_dir: &Path,
    ) -> AppResult<MonitorTrends> {
        let local = scratch_dir.join(format!("{}-{}.nmon", target.host_name, target.role_name));
        executor
            .download(host, &output_path(target), &local)
            .await?;
        let content = std::fs::read_to_string(&local)?;
        Ok(parse_nmon(&content))
    }
}

// nmon spreadsheet rows:
//   CPU_ALL,T0001,<user>,<sys>,<wait>,<idle>,...
//   MEM,T0001,<memtotal>,...,<memfree at index 6>,...,swaptotal/swapfree
fn parse_nmon(content: &str) -> MonitorTrends {
    let mut trends = MonitorTrends::default();
    for line in content.lines() {
        let fields: Vec<&str> = line.split(',').collect();
        match fields.first().copied() {
            Some("CPU_ALL") if fields.len() > 3 && fields[1].starts_with('T') => {
                let user: f64 = fields[2].parse().unwrap_or(0.0);
                let sys: f64 = fields[3].parse().unwrap_or(0.0);
                trends.cpu.push(user + sys);
            }
            Some("MEM") if fields.len() > 7 && fields[1].starts_with('T') => {
                let total: f64 = fields[2].parse().unwrap_or(0.0);
                let free: f64 = fields[6].parse().unwrap_or(0.0);
                if total > 0.0 {
                    trends.memory.push((total - free) / total * 100.0);
                }
                let swap_total: f64 = fields[5].parse().unwrap_or(0.0);
                let swap_free: f64 = fields[7].parse().unwrap_or(0.0);
                if swap_total > 0.0 {
                    trends.swap.push((swap_total - swap_free) / swap_total * 100.0);
                }
            }
            _ => {}
        }
    }
    trends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpu_and_memory_rows() {
        let content = "\
AAA,progname,nmon
CPU_ALL,CPU Total,User%,Sys%,Wait%,Idle%
CPU_ALL,T0001,20.0,10.0,0.5,69.5
CPU_ALL,T0002,40.0,20.0,0.5,39.5
MEM,Memory MB,memtotal,hightotal,lowtotal,swaptotal,memfree,swapfree
MEM,T0001,8000,0,0,2000,4000,2000
MEM,T0002,8000,0,0,2000,2000,1000
";
        let trends = parse_nmon(content);
        assert_eq!(trends.cpu, vec![30.0, 60.0]);
        assert_eq!(trends.memory, vec![50.0, 75.0]);
        assert_eq!(trends.swap, vec![0.0, 50.0]);
    }

    #[test]
    fn header_rows_are_ignored() {
        let trends = parse_nmon("CPU_ALL,CPU Total,User%,Sys%\nMEM,Memory MB,a,b,c,d,e,f\n");
        assert!(trends.cpu.is_empty());
        assert!(trends.memory.is_empty());
    }

    #[test]
    fn averages_feed_the_target_stat() {
        let trends = MonitorTrends {
            cpu: vec![30.0, 60.0],
            memory: vec![50.0, 75.0],
            swap: vec![],
        };
        let stat = trends.into_target_stat(7, 3);
        assert_eq!(stat.execution_cycle_id, 7);
        assert_eq!(stat.target_host_id, 3);
        assert!((stat.average_cpu_usage - 45.0).abs() < 1e-9);
        assert!((stat.average_memory_usage - 62.5).abs() < 1e-9);
        assert!(stat.average_swap_usage.is_none());
    }
}
