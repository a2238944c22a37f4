use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::DeltaFifo;
use crate::Error;
use crate::Object;
use crate::ResourceMeta;
use crate::Result;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Asks the reflector whether a periodic resync should proceed. Shared
/// informers use this to honor the shortest handler resync period.
pub type ShouldResyncFunc = Arc<dyn Fn() -> bool + Send + Sync>;

/// Invoked whenever the list/watch connection drops with an error, before
/// the reflector backs off and relists.
pub type WatchErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Options for a paged snapshot request.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Requested page size; `None` lets the source pick.
    pub limit: Option<u32>,
    /// Opaque continuation token from the previous page.
    pub continue_token: Option<String>,
}

/// One page of a snapshot.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    /// Version stamp the snapshot is consistent at.
    pub resource_version: String,
    /// Present when more pages remain.
    pub continue_token: Option<String>,
}

/// Options for opening a watch stream.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Resume watching from this version, typically the one the preceding
    /// list returned.
    pub resource_version: Option<String>,
}

/// An incremental event from the watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    /// Progress marker carrying only a resource version.
    Bookmark(String),
}

/// Stream of incremental events produced by [`ListerWatcher::watch`].
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>>>;

/// Produces full snapshots and incremental event streams for one resource
/// kind. Implementations own the transport; the core never dials sockets.
#[async_trait]
pub trait ListerWatcher<T>: Send + Sync {
    async fn list(
        &self,
        options: ListOptions,
    ) -> Result<ListResult<T>>;

    async fn watch(
        &self,
        options: WatchOptions,
    ) -> Result<WatchStream<T>>;
}

pub(crate) struct ReflectorOptions<T> {
    pub lister_watcher: Arc<dyn ListerWatcher<T>>,
    pub queue: Arc<DeltaFifo<T>>,
    pub resync_period: Duration,
    pub should_resync: Option<ShouldResyncFunc>,
    pub watch_error_handler: Option<WatchErrorHandler>,
    pub page_size: Option<u32>,
}

/// Pumps a [`ListerWatcher`] into a [`DeltaFifo`]: paged initial list, then
/// the watch stream, with capped exponential backoff and a full relist after
/// every dropped connection, plus a jittered periodic resync.
pub struct Reflector<T> {
    lister_watcher: Arc<dyn ListerWatcher<T>>,
    queue: Arc<DeltaFifo<T>>,
    resync_period: Duration,
    should_resync: Option<ShouldResyncFunc>,
    watch_error_handler: Option<WatchErrorHandler>,
    page_size: Option<u32>,
    last_sync_resource_version: RwLock<String>,
}

impl<T> Reflector<T>
where
    T: Object + ResourceMeta,
{
    pub(crate) fn new(options: ReflectorOptions<T>) -> Self {
        Self {
            lister_watcher: options.lister_watcher,
            queue: options.queue,
            resync_period: options.resync_period,
            should_resync: options.should_resync,
            watch_error_handler: options.watch_error_handler,
            page_size: options.page_size,
            last_sync_resource_version: RwLock::new(String::new()),
        }
    }

    /// The resource version of the most recent sync, or empty before the
    /// first list completes.
    pub fn last_sync_resource_version(&self) -> String {
        self.last_sync_resource_version.read().clone()
    }

    /// Run until the shutdown signal fires. Every dropped connection is
    /// reported to the watch error handler and repaired with a backed-off
    /// full relist.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<()>,
    ) {
        info!(
            resync_period_ms = self.resync_period.as_millis() as u64,
            "reflector starting"
        );
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.list_and_watch(&mut shutdown, &mut backoff).await {
                Ok(()) => {
                    debug!("reflector stopping: shutdown signal");
                    return;
                }
                Err(err) => {
                    if let Some(handler) = &self.watch_error_handler {
                        handler(&err);
                    }
                    warn!(
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "list/watch dropped; backing off before relist"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn list_and_watch(
        &self,
        shutdown: &mut watch::Receiver<()>,
        backoff: &mut Duration,
    ) -> Result<()> {
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut resource_version = String::new();
        let mut pages = 0usize;
        loop {
            let page = self
                .lister_watcher
                .list(ListOptions {
                    limit: self.page_size,
                    continue_token: continue_token.clone(),
                })
                .await?;
            resource_version = page.resource_version;
            items.extend(page.items);
            continue_token = page.continue_token;
            pages += 1;
            if continue_token.is_none() {
                break;
            }
        }
        debug!(count = items.len(), pages, %resource_version, "snapshot listed");
        self.queue.replace(items, &resource_version)?;
        *self.last_sync_resource_version.write() = resource_version.clone();
        *backoff = INITIAL_BACKOFF;

        let mut stream = self
            .lister_watcher
            .watch(WatchOptions {
                resource_version: Some(resource_version),
            })
            .await?;

        let resync_enabled = !self.resync_period.is_zero();
        let resync_timer = tokio::time::sleep(jittered(self.resync_period));
        tokio::pin!(resync_timer);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                _ = resync_timer.as_mut(), if resync_enabled => {
                    if self.should_resync.as_ref().map_or(true, |f| f()) {
                        trace!("periodic resync");
                        self.queue.resync()?;
                    }
                    resync_timer
                        .as_mut()
                        .reset(Instant::now() + jittered(self.resync_period));
                }
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => self.handle_event(event)?,
                        Some(Err(err)) => return Err(err),
                        None => return Err(Error::WatchClosed),
                    }
                }
            }
        }
    }

    fn handle_event(
        &self,
        event: WatchEvent<T>,
    ) -> Result<()> {
        match event {
            WatchEvent::Added(obj) => {
                self.note_resource_version(&obj);
                self.queue.add(obj)
            }
            WatchEvent::Modified(obj) => {
                self.note_resource_version(&obj);
                self.queue.update(obj)
            }
            WatchEvent::Deleted(obj) => {
                self.note_resource_version(&obj);
                self.queue.delete(obj)
            }
            WatchEvent::Bookmark(resource_version) => {
                *self.last_sync_resource_version.write() = resource_version;
                Ok(())
            }
        }
    }

    fn note_resource_version(
        &self,
        obj: &T,
    ) {
        let version = obj.resource_version();
        if !version.is_empty() {
            *self.last_sync_resource_version.write() = version.to_string();
        }
    }
}

/// ±10% jitter so many reflectors never resync in lockstep.
fn jittered(period: Duration) -> Duration {
    if period.is_zero() {
        return period;
    }
    let factor = rand::thread_rng().gen_range(0.9..1.1);
    period.mul_f64(factor)
}
