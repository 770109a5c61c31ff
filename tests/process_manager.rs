//! Process lifecycle tests.
//!
//! These use plain Unix tools as stand-ins for the analysis process:
//! `cat` with a piped stdin stays alive until its stdin closes, `sleep`
//! ignores stdin entirely, and `true` exits immediately.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leanshare::{AnalysisCommand, ProcessManager};

fn command(program: &str, args: &[&str], dir: &Path) -> AnalysisCommand {
    AnalysisCommand {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        cwd: dir.to_path_buf(),
    }
}

/// Poll until the process reports dead, bounded.
async fn wait_for_exit(process: &leanshare::SessionProcess) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while process.is_alive().await {
        assert!(Instant::now() < deadline, "process did not exit in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn spawn_is_idempotent_for_a_live_session() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        ProcessManager::new(command("cat", &[], dir.path())).with_grace(Duration::from_millis(100));

    let first = manager.spawn("alice").await.unwrap();
    let second = manager.spawn("alice").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.pid(), second.pid());
    assert_eq!(manager.session_count().await, 1);

    manager.kill_all().await;
}

#[tokio::test]
async fn distinct_sessions_get_distinct_processes() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        ProcessManager::new(command("cat", &[], dir.path())).with_grace(Duration::from_millis(100));

    let a = manager.spawn("alice").await.unwrap();
    let b = manager.spawn("bob").await.unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(a.pid(), b.pid());
    assert_eq!(manager.session_count().await, 2);

    manager.kill_all().await;
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn dead_process_is_replaced_on_next_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ProcessManager::new(command("true", &[], dir.path()))
        .with_grace(Duration::from_millis(100));

    let first = manager.spawn("alice").await.unwrap();
    wait_for_exit(&first).await;

    let second = manager.spawn("alice").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(manager.session_count().await, 1);

    manager.kill_all().await;
}

#[tokio::test]
async fn stdio_can_only_be_claimed_once() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        ProcessManager::new(command("cat", &[], dir.path())).with_grace(Duration::from_millis(100));

    let process = manager.spawn("alice").await.unwrap();
    assert!(process.claim_stdio().is_some());
    assert!(process.claim_stdio().is_none());

    manager.kill_all().await;
}

#[tokio::test]
async fn stubborn_process_is_force_killed_within_the_grace_bound() {
    let dir = tempfile::tempdir().unwrap();
    // `sleep` never reads stdin, so closing it is ignored and the force
    // phase must fire once the grace period elapses.
    let manager = ProcessManager::new(command("sleep", &["600"], dir.path()))
        .with_grace(Duration::from_millis(200));

    let _process = manager.spawn("alice").await.unwrap();
    let start = Instant::now();
    manager.kill("alice").await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(3), "kill took {elapsed:?}");
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn unbridged_kill_exits_before_the_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    // No bridge ever claims the stdio triple; kill itself must close stdin
    // so `cat` exits well before the grace period runs out.
    let manager =
        ProcessManager::new(command("cat", &[], dir.path())).with_grace(Duration::from_secs(5));

    let _process = manager.spawn("alice").await.unwrap();
    let start = Instant::now();
    manager.kill("alice").await;
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(2), "kill took {elapsed:?}");
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn kill_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        ProcessManager::new(command("cat", &[], dir.path())).with_grace(Duration::from_millis(100));

    manager.kill("never-spawned").await;

    let process = manager.spawn("alice").await.unwrap();
    manager.kill("alice").await;
    wait_for_exit(&process).await;
    manager.kill("alice").await; // second kill is a no-op
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn spawn_failure_surfaces_the_cause() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ProcessManager::new(command("definitely-not-a-real-binary", &[], dir.path()));

    let err = manager.spawn("alice").await.unwrap_err();
    assert!(matches!(err, leanshare::ServerError::Spawn { .. }));
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn teardown_then_respawn_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let manager =
        ProcessManager::new(command("cat", &[], dir.path())).with_grace(Duration::from_millis(100));

    let first = manager.spawn("alice").await.unwrap();
    let first_pid = first.pid();
    manager.kill("alice").await;

    let second = manager.spawn("alice").await.unwrap();
    assert_ne!(first_pid, second.pid());
    assert!(second.claim_stdio().is_some());

    manager.kill_all().await;
}
