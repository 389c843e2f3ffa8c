// src/tests/lifecycle_shutdown.rs
use std::time::Duration;

use prometheus::Registry;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::cache::token_cache::TokenCache;
use crate::config::types::TokenMode;
use crate::daemon::error::DaemonError;
use crate::daemon::lifecycle::{report_loop, tokend, ShutdownPlan};
use crate::daemon::report::MetricsReporter;
use crate::server::server::KeepAlive;
use crate::tests::common::{build_reqwest_client, daemon_config, MockIssuer, ACCESS_ONLY, BOTH_KINDS};

#[tokio::test]
async fn shutdown_stops_server_and_signals_completion() {
    let issuer = MockIssuer::new();
    let mut config = daemon_config("domA:role.roleA", BOTH_KINDS, None);
    config.shutdown_delay = Duration::from_millis(100);
    config.shutdown_timeout = Duration::from_secs(2);

    let shutdown = CancellationToken::new();
    let handle = tokend(&config, issuer.clone(), Registry::new(), shutdown.clone())
        .await
        .unwrap()
        .expect("daemon enabled");
    let addr = handle.local_addr;
    // initial cycle ran before serving
    assert_eq!(issuer.call_count(), 2);

    let client = build_reqwest_client();
    let resp = client
        .post(format!("http://{}/accesstoken", addr))
        .json(&json!({"domain": "domA", "role": "roleA"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    drop(client);

    shutdown.cancel();
    timeout(Duration::from_secs(3), handle.wait())
        .await
        .expect("daemon completes within delay + timeout");

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn disabled_without_address_or_token_kind() {
    let mut config = daemon_config("domA:role.roleA", ACCESS_ONLY, None);
    config.server.addr = String::new();
    let handle = tokend(&config, MockIssuer::new(), Registry::new(), CancellationToken::new()).await.unwrap();
    assert!(handle.is_none());

    let config = daemon_config("domA:role.roleA", TokenMode::default(), None);
    let issuer = MockIssuer::new();
    let handle = tokend(&config, issuer.clone(), Registry::new(), CancellationToken::new()).await.unwrap();
    assert!(handle.is_none());
    assert_eq!(issuer.call_count(), 0);
}

#[tokio::test]
async fn init_mode_fetches_once_without_serving() {
    let mut config = daemon_config("domA:role.roleA,domB:role.roleB", ACCESS_ONLY, None);
    config.init = true;
    let issuer = MockIssuer::new();

    let handle = tokend(&config, issuer.clone(), Registry::new(), CancellationToken::new()).await.unwrap();
    assert!(handle.is_none());
    assert_eq!(issuer.call_count(), 2);
}

#[tokio::test]
async fn shutdown_during_initial_fetch_skips_serving() {
    let config = daemon_config("domA:role.roleA", ACCESS_ONLY, None);
    let issuer = MockIssuer::new();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let handle = tokend(&config, issuer.clone(), Registry::new(), shutdown).await.unwrap();
    assert!(handle.is_none());
    // the initial cycle still ran to completion
    assert_eq!(issuer.call_count(), 1);
}

#[tokio::test]
async fn malformed_targets_fail_startup() {
    let config = daemon_config("domA", ACCESS_ONLY, None);
    let result = tokend(&config, MockIssuer::new(), Registry::new(), CancellationToken::new()).await;
    assert!(matches!(result, Err(DaemonError::Config(_))));
}

#[tokio::test]
async fn shutdown_plan_reports_timeout_for_hung_server() {
    let keep_alive = KeepAlive::default();
    let server_stop = CancellationToken::new();
    let plan = ShutdownPlan {
        delay: Duration::ZERO,
        timeout: Duration::from_millis(50),
        keep_alive: keep_alive.clone(),
        server_stop: server_stop.clone(),
        server_done: tokio::spawn(std::future::pending::<()>()),
    };

    let err = plan.execute().await.unwrap_err();
    assert!(matches!(err, DaemonError::ShutdownTimeout(t) if t == Duration::from_millis(50)));
    assert!(!keep_alive.is_enabled());
    assert!(server_stop.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn refresh_runs_once_per_interval() {
    let issuer = MockIssuer::new();
    let config = daemon_config("domA:role.roleA", ACCESS_ONLY, None);
    let handle = tokend(&config, issuer.clone(), Registry::new(), CancellationToken::new())
        .await
        .unwrap()
        .expect("daemon enabled");

    // initial cycle plus ticks at 60s and 120s
    tokio::time::sleep(Duration::from_secs(125)).await;
    assert_eq!(issuer.call_count(), 3);
    drop(handle);
}

#[tokio::test(start_paused = true)]
async fn slow_cycles_do_not_pile_up() {
    let issuer = MockIssuer::new();
    issuer.set_delay(Duration::from_secs(25));
    let mut config = daemon_config("domA:role.roleA", ACCESS_ONLY, None);
    config.refresh = Duration::from_secs(10);
    let handle = tokend(&config, issuer.clone(), Registry::new(), CancellationToken::new())
        .await
        .unwrap()
        .expect("daemon enabled");

    // each cycle outlives the interval; ten intervals pass but cycles never overlap
    tokio::time::sleep(Duration::from_secs(100)).await;
    let calls = issuer.call_count();
    assert!((4..=6).contains(&calls), "calls = {calls}");
    drop(handle);
}

#[tokio::test]
async fn report_loop_stops_on_shutdown() {
    let reporter = MetricsReporter::new(TokenCache::new(), TokenCache::new());
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(report_loop(reporter, Duration::from_millis(10), shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();
    timeout(Duration::from_secs(1), task).await.expect("report loop exits").unwrap();
}
