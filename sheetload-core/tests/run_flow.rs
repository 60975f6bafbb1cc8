use std::sync::Arc;
use std::time::Duration;

use sheetload_core::{
    DEFAULT_SUMMARY_PATH, Interrupt, RunOptions, ScenarioOverrides, Stage, Summary,
    resolve_scenario, run, write_summary_artifact,
};
use sheetload_testserver::{PATH_ME, PATH_VALIDATE, TestServer, TestServerConfig};

fn options(base_url: &str, stages: Vec<Stage>) -> RunOptions {
    let scenario = resolve_scenario(
        Some("smoke"),
        ScenarioOverrides {
            stages: Some(stages),
            thresholds: Vec::new(),
        },
    )
    .unwrap_or_else(|e| panic!("resolve: {e}"));

    let mut opts = RunOptions::new(base_url, scenario);
    opts.think_time = Duration::from_millis(10);
    opts.request_timeout = Some(Duration::from_secs(5));
    opts
}

fn short_ramp() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_millis(500), 2),
        Stage::new(Duration::from_secs(1), 2),
    ]
}

async fn run_against(
    config: TestServerConfig,
    opts_for: impl FnOnce(&str) -> RunOptions,
) -> (TestServer, Summary) {
    let server = TestServer::start_with(config)
        .await
        .unwrap_or_else(|e| panic!("start test server: {e}"));
    let summary = run(opts_for(server.base_url()), Arc::new(Interrupt::default()), None)
        .await
        .unwrap_or_else(|e| panic!("run: {e}"));
    (server, summary)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn healthy_run_passes_smoke_thresholds() {
    let (server, summary) =
        run_against(TestServerConfig::default(), |url| options(url, short_ramp())).await;

    assert!(summary.setup.healthy);
    assert!(summary.setup.authenticated);
    assert!(summary.http.requests_total > 0);
    assert_eq!(summary.http.failed_requests_total, 0);
    assert_eq!(summary.checks.failed, 0);
    assert!(summary.iterations.total > 0);
    assert_eq!(summary.observed_peak_vus, 2);
    assert!(!summary.interrupted);
    assert!(summary.passed, "thresholds: {:?}", summary.thresholds);
    assert_eq!(summary.thresholds.len(), 4);

    let groups: Vec<&str> = summary.checks.by_check.iter().map(|c| c.group.as_str()).collect();
    for group in ["account", "instruments", "sheets"] {
        assert!(groups.contains(&group), "missing checks for {group}");
    }

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn signup_token_is_carried_unchanged_on_every_authenticated_request() {
    let (server, summary) =
        run_against(TestServerConfig::default(), |url| options(url, short_ramp())).await;

    let stats = server.stats();
    assert!(summary.setup.authenticated);
    assert_eq!(stats.signups(), 1);
    assert_eq!(stats.bearer_tokens().len(), 1);

    let protected = stats.hits(PATH_VALIDATE) + stats.hits(PATH_ME);
    assert!(protected > 0);
    assert!(stats.authorized() >= protected);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_token_skips_the_account_group() {
    let config = TestServerConfig {
        signup_open: false,
        ..TestServerConfig::default()
    };
    let (server, summary) = run_against(config, |url| options(url, short_ramp())).await;

    assert!(summary.setup.healthy);
    assert!(!summary.setup.authenticated);
    assert!(summary.http.requests_total > 0);
    assert_eq!(server.stats().hits(PATH_VALIDATE), 0);
    assert!(server.stats().bearer_tokens().is_empty());
    assert!(summary.checks.by_check.iter().all(|c| c.group != "account"));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unhealthy_service_gets_no_load() {
    let config = TestServerConfig {
        healthy: false,
        ..TestServerConfig::default()
    };
    let (server, summary) = run_against(config, |url| options(url, short_ramp())).await;

    assert!(!summary.setup.healthy);
    assert_eq!(summary.http.requests_total, 0);
    assert_eq!(summary.api_requests.total, 0);
    assert!(summary.iterations.total > 0);
    assert_eq!(server.stats().requests_total(), 1);
    assert!(!summary.passed);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unhealthy_run_without_think_time_still_finishes() {
    let server = TestServer::start_with(TestServerConfig {
        healthy: false,
        ..TestServerConfig::default()
    })
    .await
    .unwrap_or_else(|e| panic!("start test server: {e}"));

    let mut opts = options(
        server.base_url(),
        vec![
            Stage::new(Duration::from_millis(300), 4),
            Stage::new(Duration::from_millis(300), 0),
        ],
    );
    opts.think_time = Duration::ZERO;

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        run(opts, Arc::new(Interrupt::default()), None),
    )
    .await
    .unwrap_or_else(|_| panic!("run did not finish"))
    .unwrap_or_else(|e| panic!("run: {e}"));

    assert!(!summary.setup.healthy);
    assert!(!summary.interrupted);
    assert_eq!(summary.http.requests_total, 0);
    assert!(summary.iterations.total > 0);
    assert_eq!(server.stats().requests_total(), 1);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_endpoint_does_not_stop_later_groups() {
    let config = TestServerConfig {
        failing_paths: vec!["/api/sheets".to_string()],
        ..TestServerConfig::default()
    };
    let (server, summary) = run_against(config, |url| options(url, short_ramp())).await;

    assert!(summary.http.failed_requests_total > 0);
    assert!(summary.checks.failed > 0);
    let sheets_fails: u64 = summary
        .checks
        .by_check
        .iter()
        .filter(|c| c.group == "sheets")
        .map(|c| c.fails)
        .sum();
    assert!(sheets_fails > 0);
    assert!(
        summary
            .checks
            .by_check
            .iter()
            .filter(|c| c.group == "instruments" || c.group == "account")
            .all(|c| c.fails == 0 && c.passes > 0)
    );
    assert!(server.stats().hits("/api/instruments/1") > 0);
    assert!(server.stats().hits(PATH_ME) > 0);
    assert!(!summary.passed);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupt_ends_a_long_run_early() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("start test server: {e}"));
    let interrupt = Arc::new(Interrupt::default());

    let trigger = {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            interrupt.trigger();
        })
    };

    let opts = options(server.base_url(), vec![Stage::new(Duration::from_secs(3600), 1)]);
    let summary = tokio::time::timeout(Duration::from_secs(10), run(opts, interrupt, None))
        .await
        .unwrap_or_else(|_| panic!("run did not stop after interrupt"))
        .unwrap_or_else(|e| panic!("run: {e}"));
    trigger.await.unwrap_or_else(|e| panic!("join: {e}"));

    assert!(summary.interrupted);
    assert!(summary.elapsed_secs < 10.0);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn artifact_carries_highlights_and_summary() {
    let (server, summary) =
        run_against(TestServerConfig::default(), |url| options(url, short_ramp())).await;
    server.shutdown().await;

    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let path = write_summary_artifact(dir.path(), DEFAULT_SUMMARY_PATH, &summary)
        .unwrap_or_else(|e| panic!("write artifact: {e}"));
    assert_eq!(path, dir.path().join("results").join("summary.json"));

    let raw = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read: {e}"));
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap_or_else(|e| panic!("{e}"));
    assert!(json["api_requests_per_second"].as_f64().is_some_and(|v| v > 0.0));
    assert_eq!(json["failed_requests"].as_f64(), Some(0.0));
    assert!(json["request_duration_p95"].as_f64().is_some());
    assert_eq!(json["summary"]["scenario"], "smoke");
    assert_eq!(json["summary"]["passed"], true);

    assert!(write_summary_artifact(dir.path(), "../escape.json", &summary).is_err());
}
