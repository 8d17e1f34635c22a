mod support;

use hailstorm::coordinator::{ImportSelectors, PurgeScope, ResultsOp, ResultsOutcome};
use hailstorm::model::{CycleStatus, PageStat};

use support::aws_harness;

async fn run_one_cycle(harness: &support::Harness) -> i64 {
    let cycle = harness.coordinator.start(false).await.expect("start");
    harness.coordinator.stop(false, false).await.expect("stop");
    cycle.id
}

fn assert_pages_match(left: &[PageStat], right: &[PageStat]) {
    assert_eq!(left.len(), right.len());
    for (a, b) in left.iter().zip(right) {
        assert_eq!(a.page_label, b.page_label);
        assert_eq!(a.samples_count, b.samples_count);
        assert!((a.average_response_time - b.average_response_time).abs() < 1e-6);
        assert!((a.median_response_time - b.median_response_time).abs() < 1e-6);
        assert!(
            (a.ninety_percentile_response_time - b.ninety_percentile_response_time).abs() < 1e-6
        );
        assert_eq!(a.minimum_response_time, b.minimum_response_time);
        assert_eq!(a.maximum_response_time, b.maximum_response_time);
        assert!((a.percentage_errors - b.percentage_errors).abs() < 1e-6);
        assert!((a.response_throughput - b.response_throughput).abs() < 1e-6);
        assert!((a.size_throughput - b.size_throughput).abs() < 1e-6);
        assert!((a.standard_deviation - b.standard_deviation).abs() < 1e-6);
        assert_eq!(a.samples_breakup_json, b.samples_breakup_json);
    }
}

#[tokio::test]
async fn export_then_import_reproduces_the_page_stats() {
    let harness = aws_harness(150, false).await;
    let first_cycle = run_one_cycle(&harness).await;

    let outcome = harness
        .coordinator
        .results(ResultsOp::Export, &[first_cycle], ImportSelectors::default())
        .await
        .expect("export");
    let ResultsOutcome::Bundle(bundle) = outcome else {
        panic!("expected a bundle");
    };
    assert!(bundle.is_file());

    let outcome = harness
        .coordinator
        .results(
            ResultsOp::Import,
            &[],
            ImportSelectors {
                file: Some(bundle),
                plan_name: Some("site.jmx".to_owned()),
                ..ImportSelectors::default()
            },
        )
        .await
        .expect("import");
    let ResultsOutcome::Imported(imported_cycle) = outcome else {
        panic!("expected an imported cycle");
    };
    assert_ne!(imported_cycle.id, first_cycle);
    assert_eq!(imported_cycle.status, CycleStatus::Stopped);

    let original_client = harness
        .store
        .client_stats_for_cycle(first_cycle)
        .await
        .expect("original client stats")
        .remove(0);
    let imported_client = harness
        .store
        .client_stats_for_cycle(imported_cycle.id)
        .await
        .expect("imported client stats")
        .remove(0);
    assert!(
        (original_client.aggregate_ninety_percentile
            - imported_client.aggregate_ninety_percentile)
            .abs()
            < 1e-6
    );

    let original_pages = harness
        .store
        .page_stats_for_client(original_client.id)
        .await
        .expect("original pages");
    let imported_pages = harness
        .store
        .page_stats_for_client(imported_client.id)
        .await
        .expect("imported pages");
    assert_pages_match(&original_pages, &imported_pages);
}

#[tokio::test]
async fn report_flips_stopped_cycles_to_reported() {
    let harness = aws_harness(150, false).await;
    let cycle_id = run_one_cycle(&harness).await;

    let outcome = harness
        .coordinator
        .results(ResultsOp::Report, &[], ImportSelectors::default())
        .await
        .expect("report");
    let ResultsOutcome::Report(path) = outcome else {
        panic!("expected a report path");
    };
    let document = std::fs::read_to_string(&path).expect("read report");
    assert!(document.contains("hailstorm_site"));
    assert!(document.contains("home"));

    let cycle = harness
        .store
        .cycle_by_id(cycle_id)
        .await
        .expect("query")
        .expect("cycle");
    assert_eq!(cycle.status, CycleStatus::Reported);
}

#[tokio::test]
async fn exclude_and_include_move_cycles_in_and_out_of_reports() {
    let harness = aws_harness(150, false).await;
    let cycle_id = run_one_cycle(&harness).await;

    harness
        .coordinator
        .results(ResultsOp::Exclude, &[cycle_id], ImportSelectors::default())
        .await
        .expect("exclude");
    let cycle = harness
        .store
        .cycle_by_id(cycle_id)
        .await
        .expect("query")
        .expect("cycle");
    assert_eq!(cycle.status, CycleStatus::Excluded);

    harness
        .coordinator
        .results(ResultsOp::Include, &[cycle_id], ImportSelectors::default())
        .await
        .expect("include");
    let cycle = harness
        .store
        .cycle_by_id(cycle_id)
        .await
        .expect("query")
        .expect("cycle");
    assert_eq!(cycle.status, CycleStatus::Stopped);
}

#[tokio::test]
async fn purge_tests_destroys_cycles_but_keeps_the_project() {
    let harness = aws_harness(150, false).await;
    run_one_cycle(&harness).await;

    harness
        .coordinator
        .purge(PurgeScope::Tests)
        .await
        .expect("purge");

    let project = harness
        .store
        .find_project("hailstorm_site")
        .await
        .expect("query")
        .expect("project");
    assert!(harness
        .store
        .list_cycles(project.id)
        .await
        .expect("cycles")
        .is_empty());

    // A fresh cycle can run over the same fleet afterwards.
    let next = harness.coordinator.start(false).await.expect("restart");
    assert_eq!(next.status, CycleStatus::Started);
}
