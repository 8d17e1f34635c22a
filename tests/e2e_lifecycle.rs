mod support;

use hailstorm::error::{AppError, CycleError};
use hailstorm::model::{AgentRole, ClusterKind, CycleStatus, LoadAgent};

use support::aws_harness;

#[tokio::test]
async fn start_provisions_the_fleet_and_stop_collects_results() {
    let harness = aws_harness(150, false).await;

    let cycle = harness.coordinator.start(false).await.expect("start");
    assert_eq!(cycle.status, CycleStatus::Started);
    assert_eq!(cycle.threads_count, 150);

    let project = harness
        .store
        .find_project("hailstorm_site")
        .await
        .expect("query")
        .expect("project");
    assert!(project.serial_version.is_some());

    let clusters = harness.store.amazon_clouds(project.id).await.expect("clusters");
    assert_eq!(clusters.len(), 1);
    assert!(clusters[0].agent_ami.is_some());
    assert_eq!(clusters[0].zone.as_deref(), Some("us-east-1a"));

    let plan = harness
        .store
        .active_plans(project.id)
        .await
        .expect("plans")
        .remove(0);
    assert_eq!(plan.latest_threads_count, 150);

    // ceil(150 / 100) agents, exactly one of them the master.
    let agents = harness
        .store
        .agents_for_plan(clusters[0].id, ClusterKind::AmazonCloud, plan.id)
        .await
        .expect("agents");
    assert_eq!(agents.len(), 2);
    assert!(agents.iter().all(|agent| agent.active));
    assert!(agents.iter().all(|agent| agent.jmeter_pid.is_some()));
    assert_eq!(
        agents.iter().filter(|agent| agent.is_master()).count(),
        1
    );

    let running = harness.coordinator.status().await.expect("status");
    assert_eq!(running.len(), 1);
    assert!(running[0].is_master());

    // The plan was staged on both agents.
    let uploads = harness.shell.uploads.lock().unwrap().clone();
    assert_eq!(
        uploads
            .iter()
            .filter(|(_, remote)| remote.ends_with("site.jmx"))
            .count(),
        2
    );

    let stopped = harness.coordinator.stop(false, false).await.expect("stop");
    assert_eq!(stopped.status, CycleStatus::Stopped);

    let client_stats = harness
        .store
        .client_stats_for_cycle(cycle.id)
        .await
        .expect("client stats");
    assert_eq!(client_stats.len(), 1);
    assert_eq!(client_stats[0].threads_count, 150);
    assert!(client_stats[0].aggregate_response_throughput > 0.0);

    let pages = harness
        .store
        .page_stats_for_client(client_stats[0].id)
        .await
        .expect("page stats");
    let labels: Vec<&str> = pages.iter().map(|page| page.page_label.as_str()).collect();
    assert_eq!(labels, vec!["cart", "home"]);
    assert_eq!(pages[1].samples_count, 3);
    assert!(pages[1].percentage_errors > 0.0);

    // Load is gone, so is the status listing.
    assert!(harness.coordinator.status().await.expect("status").is_empty());
}

#[tokio::test]
async fn two_masters_for_one_plan_abort_the_cycle() {
    let harness = aws_harness(150, false).await;
    harness.coordinator.setup(false).await.expect("setup");

    let project = harness
        .store
        .find_project("hailstorm_site")
        .await
        .expect("query")
        .expect("project");
    let cluster = harness.store.amazon_clouds(project.id).await.expect("clusters")[0].clone();
    let plan = harness
        .store
        .active_plans(project.id)
        .await
        .expect("plans")
        .remove(0);

    for serial in 0..2 {
        let agent = LoadAgent {
            id: 0,
            clusterable_id: cluster.id,
            clusterable_type: ClusterKind::AmazonCloud,
            jmeter_plan_id: plan.id,
            public_ip_address: Some(format!("52.0.0.20{serial}")),
            private_ip_address: Some(format!("10.0.0.20{serial}")),
            active: true,
            role: AgentRole::Master,
            jmeter_pid: None,
            identifier: Some(format!("i-feed00{serial}")),
        };
        harness.store.insert_agent(&agent).await.expect("insert agent");
    }

    let error = harness.coordinator.start(false).await.unwrap_err();
    assert!(matches!(
        error,
        AppError::Cycle(CycleError::MasterSlaveConflict { .. })
    ));

    let cycles = harness.store.list_cycles(project.id).await.expect("cycles");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].status, CycleStatus::Aborted);
}

#[tokio::test]
async fn failed_load_stop_still_stops_monitors_and_aborts() {
    let harness = aws_harness(150, true).await;
    let cycle = harness.coordinator.start(false).await.expect("start");

    // The sampler is live on the target.
    assert!(harness.shell.executed("-F /tmp/hailstorm"));

    harness
        .shell
        .fail_kill
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let error = harness.coordinator.stop(false, false).await.unwrap_err();
    assert!(error.to_string().contains("not permitted"), "{error}");

    let project = harness
        .store
        .find_project("hailstorm_site")
        .await
        .expect("query")
        .expect("project");
    let cycles = harness.store.list_cycles(project.id).await.expect("cycles");
    assert_eq!(cycles[0].status, CycleStatus::Aborted);

    // Monitors were wound down anyway, but no stats were written: a run
    // that died mid-stop would bias them.
    assert!(harness.shell.executed("kill -USR2"));
    assert!(harness
        .store
        .target_stats_for_cycle(cycle.id)
        .await
        .expect("target stats")
        .is_empty());
}

#[tokio::test]
async fn terminate_releases_agents_and_clears_the_fingerprint() {
    let harness = aws_harness(150, false).await;
    harness.coordinator.start(false).await.expect("start");

    harness.coordinator.terminate().await.expect("terminate");

    let project = harness
        .store
        .find_project("hailstorm_site")
        .await
        .expect("query")
        .expect("project");
    assert!(project.serial_version.is_none());
    assert!(harness
        .store
        .agents_for_project(project.id)
        .await
        .expect("agents")
        .is_empty());

    let cycles = harness.store.list_cycles(project.id).await.expect("cycles");
    assert_eq!(cycles[0].status, CycleStatus::Terminated);

    // Both load agents went through the cloud teardown path.
    assert!(harness.cloud.terminated.lock().unwrap().len() >= 2);
}
