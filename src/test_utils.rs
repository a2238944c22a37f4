//! Shared fakes for exercising the cache-and-dispatch pipeline without a
//! real control plane.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::set_metrics_provider;
use crate::DeltaObject;
use crate::Error;
use crate::ListOptions;
use crate::ListResult;
use crate::ListerWatcher;
use crate::MetricsProvider;
use crate::Object;
use crate::QueueMetrics;
use crate::ResourceEventHandler;
use crate::ResourceMeta;
use crate::Result;
use crate::WatchEvent;
use crate::WatchOptions;
use crate::WatchStream;

/// Minimal resource with the metadata the default key function needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResource {
    pub namespace: Option<String>,
    pub name: String,
    pub resource_version: String,
    pub labels: HashMap<String, String>,
}

impl TestResource {
    pub fn new(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
            resource_version: String::new(),
            labels: HashMap::new(),
        }
    }

    pub fn namespaced(
        namespace: &str,
        name: &str,
    ) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            ..Self::new(name)
        }
    }

    pub fn with_version(
        mut self,
        resource_version: &str,
    ) -> Self {
        self.resource_version = resource_version.to_string();
        self
    }

    pub fn with_label(
        mut self,
        key: &str,
        value: &str,
    ) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

impl ResourceMeta for TestResource {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn resource_version(&self) -> &str {
        &self.resource_version
    }
}

struct FakeSource<T> {
    items: Vec<T>,
    resource_version: String,
    watchers: Vec<mpsc::UnboundedSender<Result<WatchEvent<T>>>>,
    list_calls: usize,
    watch_calls: usize,
}

/// Scripted [`ListerWatcher`]: serves a settable snapshot (paged when the
/// caller asks for a limit) and broadcasts pushed events to every open
/// watch.
pub struct FakeListerWatcher<T> {
    state: Mutex<FakeSource<T>>,
}

impl<T: Object> FakeListerWatcher<T> {
    pub fn new(
        items: Vec<T>,
        resource_version: &str,
    ) -> Self {
        Self {
            state: Mutex::new(FakeSource {
                items,
                resource_version: resource_version.to_string(),
                watchers: Vec::new(),
                list_calls: 0,
                watch_calls: 0,
            }),
        }
    }

    /// Replace the snapshot the next list will serve.
    pub fn set_snapshot(
        &self,
        items: Vec<T>,
        resource_version: &str,
    ) {
        let mut state = self.state.lock();
        state.items = items;
        state.resource_version = resource_version.to_string();
    }

    /// Push an event to every open watch stream.
    pub fn send(
        &self,
        event: WatchEvent<T>,
    ) {
        let mut state = self.state.lock();
        state.watchers.retain(|tx| tx.send(Ok(event.clone())).is_ok());
    }

    /// Fail every open watch stream with a transport error.
    pub fn fail_watch(
        &self,
        message: &str,
    ) {
        let mut state = self.state.lock();
        for tx in state.watchers.drain(..) {
            let _ = tx.send(Err(Error::ListWatch(message.to_string())));
        }
    }

    /// End every open watch stream without an error.
    pub fn end_watch(&self) {
        self.state.lock().watchers.clear();
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn watch_calls(&self) -> usize {
        self.state.lock().watch_calls
    }
}

#[async_trait]
impl<T: Object> ListerWatcher<T> for FakeListerWatcher<T> {
    async fn list(
        &self,
        options: ListOptions,
    ) -> Result<ListResult<T>> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        let resource_version = state.resource_version.clone();
        let Some(limit) = options.limit else {
            return Ok(ListResult {
                items: state.items.clone(),
                resource_version,
                continue_token: None,
            });
        };
        let start: usize = options
            .continue_token
            .as_deref()
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let end = (start + limit as usize).min(state.items.len());
        Ok(ListResult {
            items: state.items[start..end].to_vec(),
            resource_version,
            continue_token: (end < state.items.len()).then(|| end.to_string()),
        })
    }

    async fn watch(
        &self,
        _options: WatchOptions,
    ) -> Result<WatchStream<T>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.watch_calls += 1;
        state.watchers.push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// What a [`RecordingHandler`] saw.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerEvent<T> {
    Added(T),
    Updated { old: T, new: T },
    Deleted(DeltaObject<T>),
}

/// Event handler that records every notification in order.
pub struct RecordingHandler<T> {
    events: Mutex<Vec<HandlerEvent<T>>>,
}

impl<T> RecordingHandler<T> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Default for RecordingHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> RecordingHandler<T> {
    pub fn events(&self) -> Vec<HandlerEvent<T>> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<HandlerEvent<T>> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl<T: Object> ResourceEventHandler<T> for RecordingHandler<T> {
    fn on_add(
        &self,
        obj: &T,
    ) {
        self.events.lock().push(HandlerEvent::Added(obj.clone()));
    }

    fn on_update(
        &self,
        old: &T,
        new: &T,
    ) {
        self.events.lock().push(HandlerEvent::Updated {
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn on_delete(
        &self,
        obj: &DeltaObject<T>,
    ) {
        self.events.lock().push(HandlerEvent::Deleted(obj.clone()));
    }
}

/// Counting [`QueueMetrics`] sink.
#[derive(Default)]
pub struct CountingMetrics {
    pub adds: AtomicUsize,
    pub gets: AtomicUsize,
    pub dones: AtomicUsize,
    pub retries: AtomicUsize,
    pub unfinished_reports: AtomicUsize,
}

impl QueueMetrics for CountingMetrics {
    fn add(&self) {
        self.adds.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) {
        self.gets.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        self.dones.fetch_add(1, Ordering::SeqCst);
    }

    fn retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn update_unfinished_work(
        &self,
        _unfinished: Duration,
        _longest_running: Duration,
    ) {
        self.unfinished_reports.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider handing out one [`CountingMetrics`] per queue name.
#[derive(Default)]
pub struct CountingMetricsProvider {
    sinks: Mutex<HashMap<String, Arc<CountingMetrics>>>,
}

impl CountingMetricsProvider {
    /// The sink that was (or will be) handed to the queue named `name`.
    pub fn sink(
        &self,
        name: &str,
    ) -> Arc<CountingMetrics> {
        self.sinks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

impl MetricsProvider for CountingMetricsProvider {
    fn queue_metrics(
        &self,
        name: &str,
    ) -> Arc<dyn QueueMetrics> {
        self.sink(name)
    }
}

/// Install (once per process) and return the shared counting provider. The
/// global provider slot is write-once, so every test goes through this
/// accessor instead of installing its own.
pub fn counting_metrics_provider() -> Arc<CountingMetricsProvider> {
    static PROVIDER: OnceCell<Arc<CountingMetricsProvider>> = OnceCell::new();
    let provider = PROVIDER
        .get_or_init(|| Arc::new(CountingMetricsProvider::default()))
        .clone();
    set_metrics_provider(provider.clone());
    provider
}
