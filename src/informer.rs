//! Informer façade: the standard wiring of cache, delta FIFO, and
//! controller with event fan-out to a user handler.
//!
//! Use the returned [`Cache`] for get/list only - writing to it directly
//! would make the event notifications lie.

use std::sync::Arc;
use std::time::Duration;

use crate::meta_namespace_key_fn;
use crate::Cache;
use crate::Config;
use crate::Controller;
use crate::DeltaFifo;
use crate::DeltaFifoOptions;
use crate::DeltaKind;
use crate::Indexers;
use crate::KnownObjects;
use crate::ListerWatcher;
use crate::Object;
use crate::ProcessFunc;
use crate::ResourceEventHandler;
use crate::ResourceMeta;

/// A [`Cache`] and a [`Controller`] populating it, with event notifications
/// delivered to `handler`.
///
/// A non-zero `resync_period` re-lists that often - handlers get `on_update`
/// calls even when nothing changed, which is useful for periodically
/// re-evaluating invariants.
pub fn new_informer<T, H>(
    lister_watcher: Arc<dyn ListerWatcher<T>>,
    resync_period: Duration,
    handler: H,
) -> (Arc<Cache<T>>, Controller<T>)
where
    T: Object + ResourceMeta,
    H: ResourceEventHandler<T> + 'static,
{
    let cache = Arc::new(Cache::new(meta_namespace_key_fn()));
    let controller = informer_controller(lister_watcher, resync_period, handler, cache.clone());
    (cache, controller)
}

/// [`new_informer`] with secondary indices on the cache.
pub fn new_indexer_informer<T, H>(
    lister_watcher: Arc<dyn ListerWatcher<T>>,
    resync_period: Duration,
    handler: H,
    indexers: Indexers<T>,
) -> (Arc<Cache<T>>, Controller<T>)
where
    T: Object + ResourceMeta,
    H: ResourceEventHandler<T> + 'static,
{
    let cache = Arc::new(Cache::with_indexers(meta_namespace_key_fn(), indexers));
    let controller = informer_controller(lister_watcher, resync_period, handler, cache.clone());
    (cache, controller)
}

fn informer_controller<T, H>(
    lister_watcher: Arc<dyn ListerWatcher<T>>,
    resync_period: Duration,
    handler: H,
    cache: Arc<Cache<T>>,
) -> Controller<T>
where
    T: Object + ResourceMeta,
    H: ResourceEventHandler<T> + 'static,
{
    // The cache doubles as the FIFO's known-objects view, so relists and
    // resyncs synthesize the correct set of update/delete deltas.
    let queue = Arc::new(DeltaFifo::with_options(DeltaFifoOptions {
        key_fn: cache.key_fn(),
        known_objects: Some(cache.clone() as Arc<dyn KnownObjects<T>>),
        emit_replaced: true,
    }));

    let process: ProcessFunc<T> = {
        let cache = cache.clone();
        let key_fn = cache.key_fn();
        Arc::new(move |deltas| {
            // Oldest to newest, so the cache converges through every
            // intermediate state.
            for delta in deltas.iter() {
                match delta.kind {
                    DeltaKind::Sync
                    | DeltaKind::Replaced
                    | DeltaKind::Added
                    | DeltaKind::Updated => {
                        let Some(new) = delta.object.object() else {
                            continue;
                        };
                        match cache.get(new)? {
                            Some(old) => {
                                cache.update(new.clone())?;
                                handler.on_update(&old, new);
                            }
                            None => {
                                cache.add(new.clone())?;
                                handler.on_add(new);
                            }
                        }
                    }
                    DeltaKind::Deleted => {
                        let key = delta.object.key(&key_fn)?;
                        cache.delete_by_key(&key);
                        handler.on_delete(&delta.object);
                    }
                }
            }
            Ok(())
        })
    };

    Controller::new(Config {
        queue,
        lister_watcher,
        process,
        full_resync_period: resync_period,
        should_resync: None,
        retry_on_error: false,
        watch_error_handler: None,
        watch_list_page_size: None,
    })
}
