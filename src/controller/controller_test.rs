//! Unit tests for the controller pump: retry-on-error re-queueing and the
//! crash guard around the pop loop.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use super::*;
use crate::meta_namespace_key_fn;
use crate::test_utils::FakeListerWatcher;
use crate::test_utils::TestResource;
use crate::DeltaFifo;
use crate::Error;

async fn wait_until<F>(
    what: &str,
    cond: F,
) where
    F: Fn() -> bool,
{
    timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn config_with_process(
    lw: Arc<FakeListerWatcher<TestResource>>,
    process: ProcessFunc<TestResource>,
    retry_on_error: bool,
) -> Config<TestResource> {
    Config {
        queue: Arc::new(DeltaFifo::new(meta_namespace_key_fn())),
        lister_watcher: lw,
        process,
        full_resync_period: Duration::ZERO,
        should_resync: None,
        retry_on_error,
        watch_error_handler: None,
        watch_list_page_size: None,
    }
}

#[tokio::test]
async fn test_retry_on_error_reprocesses_deltas() {
    let lw = Arc::new(FakeListerWatcher::new(
        vec![TestResource::new("a").with_version("1")],
        "rv1",
    ));
    let attempts = Arc::new(AtomicUsize::new(0));
    let process: ProcessFunc<TestResource> = {
        let attempts = attempts.clone();
        Arc::new(move |_deltas| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::ListWatch("transient".to_string()));
            }
            Ok(())
        })
    };

    let controller = Arc::new(Controller::new(config_with_process(lw, process, true)));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    wait_until("failed deltas to be reprocessed", || {
        attempts.load(Ordering::SeqCst) >= 2
    })
    .await;
    assert!(controller.has_synced());

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(3), handle)
        .await
        .expect("controller did not stop")
        .expect("controller task panicked");
}

#[tokio::test]
async fn test_without_retry_failed_deltas_are_dropped() {
    let lw = Arc::new(FakeListerWatcher::new(
        vec![TestResource::new("a").with_version("1")],
        "rv1",
    ));
    let attempts = Arc::new(AtomicUsize::new(0));
    let process: ProcessFunc<TestResource> = {
        let attempts = attempts.clone();
        Arc::new(move |_deltas| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::ListWatch("always failing".to_string()))
        })
    };

    let controller = Arc::new(Controller::new(config_with_process(lw, process, false)));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    wait_until("the first processing attempt", || {
        attempts.load(Ordering::SeqCst) >= 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Without retry the key is gone after one failed attempt.
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(3), handle)
        .await
        .expect("controller did not stop")
        .expect("controller task panicked");
}

#[tokio::test]
async fn test_processor_panic_is_contained() {
    let lw = Arc::new(FakeListerWatcher::new(
        vec![TestResource::new("a").with_version("1")],
        "rv1",
    ));
    let attempts = Arc::new(AtomicUsize::new(0));
    let process: ProcessFunc<TestResource> = {
        let attempts = attempts.clone();
        Arc::new(move |_deltas| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("processor exploded");
            }
            Ok(())
        })
    };

    let controller = Arc::new(Controller::new(config_with_process(lw.clone(), process, false)));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    wait_until("the panicking attempt", || attempts.load(Ordering::SeqCst) >= 1).await;
    wait_until("watch to open", || lw.watch_calls() >= 1).await;

    // The pop loop restarts (after the 1s floor) and keeps processing.
    lw.send(crate::WatchEvent::Added(TestResource::new("b").with_version("2")));
    wait_until("processing to resume after the panic", || {
        attempts.load(Ordering::SeqCst) >= 2
    })
    .await;

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(3), handle)
        .await
        .expect("controller did not stop")
        .expect("controller run propagated the processor panic");
}

#[tokio::test]
async fn test_last_sync_resource_version_tracks_reflector() {
    let lw = Arc::new(FakeListerWatcher::new(
        vec![TestResource::new("a").with_version("1")],
        "rv1",
    ));
    let process: ProcessFunc<TestResource> = Arc::new(|_| Ok(()));
    let controller = Arc::new(Controller::new(config_with_process(lw.clone(), process, false)));
    assert_eq!(controller.last_sync_resource_version(), "");

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    wait_until("initial sync", || controller.has_synced()).await;
    assert_eq!(controller.last_sync_resource_version(), "rv1");

    wait_until("watch to open", || lw.watch_calls() >= 1).await;
    lw.send(crate::WatchEvent::Bookmark("rv7".to_string()));
    wait_until("bookmark to land", || {
        controller.last_sync_resource_version() == "rv7"
    })
    .await;

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(3), handle)
        .await
        .expect("controller did not stop")
        .expect("controller task panicked");
}
