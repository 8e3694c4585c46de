//! Artifact lifecycle integration tests: store, sweep, deferred deletion and
//! retrieval working together on a real temp directory.
//!
//! Deferred timers run on real (short) tokio sleeps; TTL arithmetic uses a
//! manual clock so no test waits for minutes.

use chrono::Utc;
use edgequake_docforge::clock::ManualTimeSource;
use edgequake_docforge::{
    ArmState, ArtifactId, ArtifactStore, BlobRemover, ContentKind, DeferredDeletionScheduler,
    DocForgeError, FsBlobRemover, RetrievalGateway, SweepReport, SweepScheduler, TimeSource,
};
use futures::StreamExt;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWrite;
use tracing_subscriber::EnvFilter;

const TTL: Duration = Duration::from_secs(30 * 60);
const INTERVAL: Duration = Duration::from_secs(5 * 60);

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    clock: Arc<ManualTimeSource>,
    store: Arc<ArtifactStore>,
    deferred: Arc<DeferredDeletionScheduler>,
    sweeper: SweepScheduler,
    gateway: RetrievalGateway,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn harness(grace: Duration, transfer_timeout: Duration) -> Harness {
    harness_with_remover(grace, transfer_timeout, Arc::new(FsBlobRemover)).await
}

async fn harness_with_remover(
    grace: Duration,
    transfer_timeout: Duration,
    remover: Arc<dyn BlobRemover>,
) -> Harness {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualTimeSource::new(Utc::now()));
    let store = Arc::new(
        ArtifactStore::open_with_remover(
            dir.path(),
            clock.clone() as Arc<dyn TimeSource>,
            remover,
        )
        .await
        .unwrap(),
    );
    let deferred = Arc::new(DeferredDeletionScheduler::new(Arc::clone(&store)));
    let sweeper = SweepScheduler::new(Arc::clone(&store), TTL, INTERVAL)
        .with_deferred(Arc::clone(&deferred));
    let gateway = RetrievalGateway::new(
        Arc::clone(&store),
        Arc::clone(&deferred),
        grace,
        transfer_timeout,
    );
    Harness {
        _dir: dir,
        clock,
        store,
        deferred,
        sweeper,
        gateway,
    }
}

async fn wait_for_fired(deferred: &DeferredDeletionScheduler, n: usize) {
    for _ in 0..300 {
        if deferred.fired_count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deferred deletion did not fire");
}

fn pdf_body(len: usize) -> Vec<u8> {
    let mut body = b"%PDF-1.7\n".to_vec();
    body.extend((0..len).map(|i| (i % 251) as u8));
    body
}

/// Unlinks like the filesystem except for denied artifact ids.
#[derive(Default)]
struct DenyingRemover {
    denied: Mutex<HashSet<String>>,
}

impl DenyingRemover {
    fn deny(&self, id: &ArtifactId) {
        self.denied.lock().unwrap().insert(id.as_str().to_string());
    }
}

impl BlobRemover for DenyingRemover {
    fn remove(&self, path: &Path) -> io::Result<()> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.denied.lock().unwrap().contains(name) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only blob",
            ));
        }
        std::fs::remove_file(path)
    }
}

/// Log lines written while it is installed as the thread's subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer whose peer has gone away.
struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "client went away",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Writer that never accepts a byte.
struct Stalled;

impl AsyncWrite for Stalled {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn created_artifact_resolves_unchanged_within_ttl() {
    let h = harness(INTERVAL, Duration::from_secs(5)).await;
    let artifact = h.store.create(ContentKind::Pdf, pdf_body(32)).await.unwrap();

    h.clock.set(artifact.created_at + chrono::Duration::minutes(29));
    assert_eq!(h.sweeper.run_pass().await.deleted, 0);

    let resolved = h
        .store
        .resolve(artifact.id.as_str())
        .await
        .unwrap()
        .expect("artifact should still exist");
    assert_eq!(resolved.id, artifact.id);
    assert_eq!(resolved.size_bytes, artifact.size_bytes);

    let listed = h.store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].age, Duration::from_secs(29 * 60));
}

#[tokio::test]
async fn traversal_and_hidden_ids_never_resolve() {
    let h = harness(INTERVAL, Duration::from_secs(5)).await;
    h.store.create(ContentKind::Pdf, pdf_body(8)).await.unwrap();

    for id in ["../etc/passwd", "..", ".hidden", "a/b.pdf", "", "x\0.pdf"] {
        assert!(
            h.store.resolve(id).await.unwrap().is_none(),
            "{id:?} must not resolve"
        );
        assert!(h.gateway.get(id).await.unwrap().is_none());
    }
}

// ── Sweep ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_deletes_only_expired_artifacts() {
    let h = harness(INTERVAL, Duration::from_secs(5)).await;
    h.store.create(ContentKind::Pdf, pdf_body(8)).await.unwrap();
    let young = h.store.create(ContentKind::Png, vec![1, 2, 3]).await.unwrap();

    h.clock.set(young.created_at + chrono::Duration::minutes(10));
    let report = h.sweeper.run_pass().await;
    assert_eq!(report.deleted, 0);

    h.clock.set(young.created_at + chrono::Duration::minutes(30));
    let report = h.sweeper.run_pass().await;
    assert_eq!(report.scanned, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(report.failed, 0);
    assert!(h.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_boundary_is_exactly_the_ttl() {
    let h = harness(INTERVAL, Duration::from_secs(5)).await;
    let a = h.store.create(ContentKind::Pdf, pdf_body(8)).await.unwrap();
    let b = h.store.create(ContentKind::Png, vec![1, 2, 3]).await.unwrap();
    let newest = a.created_at.max(b.created_at);
    let oldest = a.created_at.min(b.created_at);

    h.clock.set(oldest + chrono::Duration::seconds(TTL.as_secs() as i64 - 1));
    assert_eq!(
        h.sweeper.run_pass().await,
        SweepReport {
            scanned: 2,
            deleted: 0,
            failed: 0
        }
    );

    h.clock.set(newest + chrono::Duration::seconds(TTL.as_secs() as i64 + 1));
    assert_eq!(
        h.sweeper.run_pass().await,
        SweepReport {
            scanned: 2,
            deleted: 2,
            failed: 0
        }
    );
}

#[tokio::test]
async fn failed_delete_is_logged_and_sweep_continues() {
    let remover = Arc::new(DenyingRemover::default());
    let h = harness_with_remover(
        INTERVAL,
        Duration::from_secs(5),
        remover.clone() as Arc<dyn BlobRemover>,
    )
    .await;
    let first = h.store.create(ContentKind::Pdf, pdf_body(8)).await.unwrap();
    let stuck = h.store.create(ContentKind::Png, vec![1, 2, 3]).await.unwrap();
    let last = h.store.create(ContentKind::Webp, vec![4, 5, 6]).await.unwrap();
    remover.deny(&stuck.id);

    let logs = CapturedLogs::default();
    let guard = logs.install();
    h.clock.set(last.created_at + chrono::Duration::minutes(31));
    let report = h.sweeper.run_pass().await;
    drop(guard);

    assert_eq!(
        report,
        SweepReport {
            scanned: 3,
            deleted: 2,
            failed: 1
        }
    );
    assert!(h.store.resolve(first.id.as_str()).await.unwrap().is_none());
    assert!(h.store.resolve(last.id.as_str()).await.unwrap().is_none());
    assert!(h.store.resolve(stuck.id.as_str()).await.unwrap().is_some());

    let logged = logs.contents();
    assert!(logged.contains("WARN"), "logs: {logged}");
    assert!(
        logged.contains(&format!("Sweep could not delete {}", stuck.id)),
        "logs: {logged}"
    );
}

#[tokio::test]
async fn sweep_and_deferred_deletion_race_harmlessly() {
    let h = harness(Duration::ZERO, Duration::from_secs(5)).await;
    let artifact = h.store.create(ContentKind::Pdf, pdf_body(64)).await.unwrap();

    let mut sink = Vec::new();
    h.gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .send_to(&mut sink)
        .await
        .unwrap();

    h.clock.set(artifact.created_at + chrono::Duration::minutes(45));
    let report = h.sweeper.run_pass().await;
    wait_for_fired(&h.deferred, 1).await;

    assert_eq!(report.failed, 0);
    assert!(report.deleted <= 1);
    assert!(h.store.resolve(artifact.id.as_str()).await.unwrap().is_none());
    assert_eq!(h.deferred.fired_count(), 1);
}

// ── Retrieval + deferred deletion ────────────────────────────────────────────

#[tokio::test]
async fn failed_deferred_delete_still_fires_and_keeps_artifact() {
    let remover = Arc::new(DenyingRemover::default());
    let h = harness_with_remover(
        Duration::ZERO,
        Duration::from_secs(5),
        remover.clone() as Arc<dyn BlobRemover>,
    )
    .await;
    let artifact = h.store.create(ContentKind::Pdf, pdf_body(64)).await.unwrap();
    remover.deny(&artifact.id);

    let mut sink = Vec::new();
    h.gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .send_to(&mut sink)
        .await
        .unwrap();

    wait_for_fired(&h.deferred, 1).await;
    assert_eq!(h.deferred.state(&artifact.id), ArmState::Fired);
    assert!(h.gateway.get(artifact.id.as_str()).await.unwrap().is_some());
}

#[tokio::test]
async fn downloaded_artifact_survives_grace_then_disappears() {
    let grace = Duration::from_millis(150);
    let h = harness(grace, Duration::from_secs(5)).await;
    let body = pdf_body(200_000);
    let artifact = h.store.create(ContentKind::Pdf, body.clone()).await.unwrap();

    let mut first = Vec::new();
    let n = h
        .gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .send_to(&mut first)
        .await
        .unwrap();
    assert_eq!(n as usize, body.len());
    assert_eq!(first, body);
    assert_eq!(h.deferred.state(&artifact.id), ArmState::Armed);

    // Still retrievable during the grace period.
    let mut second = Vec::new();
    h.gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .expect("retrievable during grace")
        .send_to(&mut second)
        .await
        .unwrap();
    assert_eq!(second, body);

    wait_for_fired(&h.deferred, 1).await;
    assert!(h.gateway.get(artifact.id.as_str()).await.unwrap().is_none());
    assert_eq!(h.deferred.fired_count(), 1);
}

#[tokio::test]
async fn send_to_writes_exact_bytes_then_arms() {
    let h = harness(Duration::from_secs(3600), Duration::from_secs(5)).await;
    let body = pdf_body(4096);
    let artifact = h.store.create(ContentKind::Pdf, body.clone()).await.unwrap();

    let mut client = tokio_test::io::Builder::new().write(&body).build();
    h.gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .send_to(&mut client)
        .await
        .unwrap();

    assert_eq!(h.deferred.state(&artifact.id), ArmState::Armed);
}

#[tokio::test]
async fn concurrent_downloads_arm_one_timer() {
    let h = harness(Duration::from_millis(300), Duration::from_secs(5)).await;
    let artifact = h.store.create(ContentKind::Pdf, pdf_body(10_000)).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let download = h.gateway.get(artifact.id.as_str()).await.unwrap().unwrap();
        tasks.push(tokio::spawn(async move {
            let mut sink = Vec::new();
            download.send_to(&mut sink).await.map(|_| sink.len())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), artifact.size_bytes as usize);
    }

    assert_eq!(h.deferred.pending(), 1);
    wait_for_fired(&h.deferred, 1).await;
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(h.deferred.fired_count(), 1);
}

#[tokio::test]
async fn failed_transfer_arms_nothing() {
    let h = harness(Duration::ZERO, Duration::from_secs(5)).await;
    let artifact = h.store.create(ContentKind::Pdf, pdf_body(1024)).await.unwrap();

    let err = h
        .gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .send_to(&mut BrokenPipe)
        .await
        .unwrap_err();

    assert!(matches!(err, DocForgeError::TransferFailed { .. }));
    assert_eq!(h.deferred.state(&artifact.id), ArmState::Unarmed);
    assert!(h.store.resolve(artifact.id.as_str()).await.unwrap().is_some());
}

#[tokio::test]
async fn stalled_transfer_times_out_and_arms_nothing() {
    let h = harness(Duration::ZERO, Duration::from_millis(50)).await;
    let artifact = h.store.create(ContentKind::Pdf, pdf_body(1024)).await.unwrap();

    let err = h
        .gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .send_to(&mut Stalled)
        .await
        .unwrap_err();

    assert!(matches!(err, DocForgeError::TransferTimeout { .. }));
    assert_eq!(h.deferred.state(&artifact.id), ArmState::Unarmed);
}

#[tokio::test]
async fn stream_arms_only_at_end() {
    let h = harness(Duration::from_secs(3600), Duration::from_secs(5)).await;
    let body = pdf_body(200_000);
    let artifact = h.store.create(ContentKind::Pdf, body.clone()).await.unwrap();

    let mut stream = h
        .gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .into_stream();

    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        assert_eq!(h.deferred.state(&artifact.id), ArmState::Unarmed);
        received.extend(chunk.unwrap());
    }

    assert_eq!(received, body);
    assert_eq!(h.deferred.state(&artifact.id), ArmState::Armed);
}

#[tokio::test]
async fn aborted_stream_arms_nothing() {
    let h = harness(Duration::ZERO, Duration::from_secs(5)).await;
    let artifact = h.store.create(ContentKind::Pdf, pdf_body(200_000)).await.unwrap();

    let mut stream = h
        .gateway
        .get(artifact.id.as_str())
        .await
        .unwrap()
        .unwrap()
        .into_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert!(!first.is_empty());
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.deferred.state(&artifact.id), ArmState::Unarmed);
    assert!(h.store.resolve(artifact.id.as_str()).await.unwrap().is_some());
}

#[tokio::test]
async fn open_download_survives_concurrent_delete() {
    let h = harness(Duration::ZERO, Duration::from_secs(5)).await;
    let body = pdf_body(100_000);
    let artifact = h.store.create(ContentKind::Pdf, body.clone()).await.unwrap();

    let download = h.gateway.get(artifact.id.as_str()).await.unwrap().unwrap();
    assert!(h.store.delete(&artifact.id).await.unwrap());

    let mut sink = Vec::new();
    download.send_to(&mut sink).await.unwrap();
    assert_eq!(sink, body);

    // The timer fires against a blob that is already gone.
    wait_for_fired(&h.deferred, 1).await;
    assert!(h.gateway.get(artifact.id.as_str()).await.unwrap().is_none());
}
