use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use resilience::{
    Error, ErrorKind, FailureKind, HealthReporter, HealthStatus, RecoveryConfig, RecoveryCoordinator,
    RecoveryResult, TuningState, MAX_RECOVERY_ATTEMPTS,
};

const MODEL_BYTES: &str = "GGUF test model payload";

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/models/tiny.gguf", get(|| async { MODEL_BYTES }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// A port nothing listens on
async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn coordinator(addr: SocketAddr, model_path: PathBuf) -> Arc<RecoveryCoordinator> {
    let config = RecoveryConfig {
        resource_url: format!("http://{}/models/tiny.gguf", addr),
        resource_path: model_path,
        download_timeout: Duration::from_secs(5),
        probe_url: format!("http://{}/", addr),
        probe_timeout: Duration::from_secs(2),
        backoff_unit: Duration::from_millis(1),
        history_capacity: 100,
    };
    Arc::new(RecoveryCoordinator::new(config, Arc::new(TuningState::new(2, 4))).unwrap())
}

fn error_kind_for(kind: FailureKind) -> ErrorKind {
    match kind {
        FailureKind::ResourceMissing => ErrorKind::NotFound,
        FailureKind::Connectivity => ErrorKind::Communication,
        FailureKind::Timeout => ErrorKind::Timeout,
        FailureKind::ExecutionFault => ErrorKind::Execution,
        FailureKind::Unknown => ErrorKind::External,
    }
}

#[tokio::test]
async fn test_every_kind_recovers_from_a_single_failure() {
    let addr = spawn_server().await;

    for kind in FailureKind::ALL {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(addr, dir.path().join("nested/dir/tiny.gguf"));
        let calls = AtomicU32::new(0);

        let result = coordinator
            .protect("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::new(error_kind_for(kind), "first call fails"))
                } else {
                    Ok(kind)
                }
            })
            .await;

        assert_eq!(result, RecoveryResult::Success(kind), "kind {}", kind);
        assert_eq!(coordinator.attempts_used(), 1, "kind {}", kind);
        assert_eq!(coordinator.history()[0].kind, kind);
    }
}

#[tokio::test]
async fn test_missing_model_is_downloaded_then_loaded() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("models/tiny.gguf");
    let coordinator = coordinator(addr, model_path.clone());

    let result = coordinator
        .protect("generate", || {
            let model_path = model_path.clone();
            async move {
                if !model_path.exists() {
                    return Err(Error::new(ErrorKind::NotFound, "model file missing"));
                }
                Ok(tokio::fs::read_to_string(&model_path).await?)
            }
        })
        .await;

    assert_eq!(result, RecoveryResult::Success(MODEL_BYTES.to_string()));
    assert!(!dir.path().join("models/tiny.gguf.part").exists());
}

#[tokio::test]
async fn test_failed_download_does_not_consume_budget() {
    let addr = closed_port().await;
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("tiny.gguf");
    let coordinator = coordinator(addr, model_path.clone());
    let calls = AtomicU32::new(0);

    let result = coordinator
        .protect("generate", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(Error::new(ErrorKind::NotFound, "model file missing"))
        })
        .await;

    let failsafe = result.into_result().unwrap_err();
    assert_eq!(failsafe.status, "error");
    assert_eq!(failsafe.kind, FailureKind::ResourceMissing);
    assert_eq!(failsafe.attempts, 0);
    assert_eq!(coordinator.attempts_used(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!model_path.exists());
}

#[tokio::test]
async fn test_failed_probe_returns_failsafe() {
    let addr = closed_port().await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(addr, dir.path().join("tiny.gguf"));

    let result = coordinator
        .protect("search", || async {
            Err::<(), _>(Error::new(ErrorKind::Communication, "connection refused"))
        })
        .await;

    assert!(matches!(result, RecoveryResult::Failsafe(_)));
    assert_eq!(coordinator.attempts_used(), 0);
    assert_eq!(HealthReporter::new(coordinator.clone()).snapshot().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_budget_never_exceeds_maximum() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(addr, dir.path().join("tiny.gguf"));

    let mut previous = 0;
    for _ in 0..10 {
        let _ = coordinator
            .protect("search", || async { Err::<(), _>(Error::new(ErrorKind::Timeout, "slow")) })
            .await;
        let used = coordinator.attempts_used();
        assert!(used >= previous);
        assert!(used <= MAX_RECOVERY_ATTEMPTS);
        previous = used;
    }

    assert_eq!(previous, MAX_RECOVERY_ATTEMPTS);
    // exactly one +2 adjustment per successful timeout recovery
    assert_eq!(coordinator.tuning().search_timeout_secs(), 2 + 2 * MAX_RECOVERY_ATTEMPTS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_race_for_last_slot() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(addr, dir.path().join("tiny.gguf"));

    // spend two of the three slots
    for _ in 0..2 {
        let calls = AtomicU32::new(0);
        let result = coordinator
            .protect("warmup", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::new(ErrorKind::Timeout, "slow"))
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(matches!(result, RecoveryResult::Success(_)));
    }
    assert_eq!(coordinator.attempts_used(), 2);

    let spawn_flaky = |kind: ErrorKind| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let calls = AtomicU32::new(0);
            coordinator
                .protect("racer", || async {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::new(kind, "first call fails"))
                    } else {
                        Ok(())
                    }
                })
                .await
        })
    };

    let (first, second) = tokio::join!(spawn_flaky(ErrorKind::Timeout), spawn_flaky(ErrorKind::Execution));
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(outcomes.iter().filter(|r| matches!(r, RecoveryResult::Success(_))).count(), 1);
    assert_eq!(outcomes.iter().filter(|r| matches!(r, RecoveryResult::Failsafe(_))).count(), 1);
    assert_eq!(coordinator.attempts_used(), MAX_RECOVERY_ATTEMPTS);
}

// Answers every request with headers and a few body bytes, then goes quiet
async fn spawn_stalling_server() -> SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\nGGUF")
                    .await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_stalled_download_releases_recovery_gate() {
    let addr = spawn_stalling_server().await;
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("tiny.gguf");
    let config = RecoveryConfig {
        resource_url: format!("http://{}/models/tiny.gguf", addr),
        resource_path: model_path.clone(),
        download_timeout: Duration::from_millis(500),
        backoff_unit: Duration::from_millis(1),
        ..Default::default()
    };
    let coordinator = Arc::new(RecoveryCoordinator::new(config, Arc::new(TuningState::new(2, 4))).unwrap());

    let download = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .protect("generate", || async {
                    Err::<String, _>(Error::new(ErrorKind::NotFound, "model file missing"))
                })
                .await
        }
    });

    // let the download take the gate first
    tokio::time::sleep(Duration::from_millis(100)).await;

    let calls = AtomicU32::new(0);
    let search = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.protect("search", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::new(ErrorKind::Timeout, "search timed out"))
            } else {
                Ok("results")
            }
        }),
    )
    .await
    .expect("timeout recovery waited on the stalled download");
    assert_eq!(search, RecoveryResult::Success("results"));

    let failsafe = download.await.unwrap().into_result().unwrap_err();
    assert_eq!(failsafe.kind, FailureKind::ResourceMissing);
    assert!(!model_path.exists());
    assert!(!dir.path().join("tiny.gguf.part").exists());
    // only the timeout recovery was charged
    assert_eq!(coordinator.attempts_used(), 1);
    assert_eq!(coordinator.tuning().search_timeout_secs(), 4);
}
