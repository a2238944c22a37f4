//! Event notification for informer consumers.
//!
//! Handlers are informational only - they cannot return errors, and they
//! must not modify the objects they are handed.

use std::sync::Arc;

use crate::DeltaObject;
use crate::Object;

/// Receives notifications for events that happen to a resource.
///
/// `on_update` also fires on relists and resyncs, even when nothing changed;
/// several changes may have been combined, so it cannot be used to observe
/// every single transition. `on_delete` gets the final state if it is known,
/// otherwise a [`DeletedFinalStateUnknown`](crate::DeletedFinalStateUnknown)
/// payload - that happens when the watch missed the delete and the removal
/// was only noticed on a relist.
pub trait ResourceEventHandler<T>: Send + Sync {
    fn on_add(
        &self,
        obj: &T,
    );

    fn on_update(
        &self,
        old: &T,
        new: &T,
    );

    fn on_delete(
        &self,
        obj: &DeltaObject<T>,
    );
}

impl<T, H> ResourceEventHandler<T> for Arc<H>
where
    H: ResourceEventHandler<T> + ?Sized,
{
    fn on_add(
        &self,
        obj: &T,
    ) {
        (**self).on_add(obj)
    }

    fn on_update(
        &self,
        old: &T,
        new: &T,
    ) {
        (**self).on_update(old, new)
    }

    fn on_delete(
        &self,
        obj: &DeltaObject<T>,
    ) {
        (**self).on_delete(obj)
    }
}

/// Closure adapter: specify as many or as few notification functions as you
/// want while still implementing [`ResourceEventHandler`].
pub struct ResourceEventHandlerFuncs<T> {
    pub add_fn: Option<Box<dyn Fn(&T) + Send + Sync>>,
    pub update_fn: Option<Box<dyn Fn(&T, &T) + Send + Sync>>,
    pub delete_fn: Option<Box<dyn Fn(&DeltaObject<T>) + Send + Sync>>,
}

impl<T> Default for ResourceEventHandlerFuncs<T> {
    fn default() -> Self {
        Self {
            add_fn: None,
            update_fn: None,
            delete_fn: None,
        }
    }
}

impl<T: Object> ResourceEventHandler<T> for ResourceEventHandlerFuncs<T> {
    fn on_add(
        &self,
        obj: &T,
    ) {
        if let Some(f) = &self.add_fn {
            f(obj)
        }
    }

    fn on_update(
        &self,
        old: &T,
        new: &T,
    ) {
        if let Some(f) = &self.update_fn {
            f(old, new)
        }
    }

    fn on_delete(
        &self,
        obj: &DeltaObject<T>,
    ) {
        if let Some(f) = &self.delete_fn {
            f(obj)
        }
    }
}

/// Predicate deciding which objects a [`FilteringResourceEventHandler`]
/// forwards.
pub type FilterFunc<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Applies a filter to all incoming events, invoking the appropriate nested
/// handler method. An object that starts passing the filter after an update
/// is delivered as an add; one that stops passing is delivered as a delete.
/// This is the sole place where add/delete implied by a filter transition is
/// defined.
pub struct FilteringResourceEventHandler<T, H> {
    pub filter: FilterFunc<T>,
    pub handler: H,
}

impl<T, H> FilteringResourceEventHandler<T, H>
where
    H: ResourceEventHandler<T>,
{
    pub fn new(
        filter: FilterFunc<T>,
        handler: H,
    ) -> Self {
        Self { filter, handler }
    }
}

impl<T, H> ResourceEventHandler<T> for FilteringResourceEventHandler<T, H>
where
    T: Object,
    H: ResourceEventHandler<T>,
{
    fn on_add(
        &self,
        obj: &T,
    ) {
        if !(self.filter)(obj) {
            return;
        }
        self.handler.on_add(obj)
    }

    fn on_update(
        &self,
        old: &T,
        new: &T,
    ) {
        let newer = (self.filter)(new);
        let older = (self.filter)(old);
        match (newer, older) {
            (true, true) => self.handler.on_update(old, new),
            (true, false) => self.handler.on_add(new),
            (false, true) => self.handler.on_delete(&DeltaObject::Object(old.clone())),
            (false, false) => {}
        }
    }

    fn on_delete(
        &self,
        obj: &DeltaObject<T>,
    ) {
        // Tombstones with a last-known object are filtered on that object;
        // key-only tombstones pass through.
        if let Some(last_known) = obj.object() {
            if !(self.filter)(last_known) {
                return;
            }
        }
        self.handler.on_delete(obj)
    }
}
