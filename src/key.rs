//! Object model: the marker bound for cached values, the typed-object
//! accessor, and the key functions that name objects in stores and queues.

use std::fmt::Debug;
use std::sync::Arc;

use crate::KeyError;

/// Marker bound for values stored, indexed, and queued by this crate.
///
/// Objects are opaque: the only introspection the core performs goes through
/// a [`KeyFunc`]. Stored objects are immutable by contract; stores hand out
/// clones, so payloads are typically `Arc`-backed or otherwise cheap to
/// clone.
pub trait Object: Clone + Debug + Send + Sync + 'static {}

impl<T> Object for T where T: Clone + Debug + Send + Sync + 'static {}

/// Typed-object accessor consumed by the default key function.
pub trait ResourceMeta {
    /// Grouping namespace, if the resource kind is namespaced.
    fn namespace(&self) -> Option<&str>;

    /// Name, unique within the namespace.
    fn name(&self) -> &str;

    /// Version stamp assigned by the authoritative store.
    fn resource_version(&self) -> &str;
}

/// Extracts a string key from an object. Implementations must be pure and
/// deterministic: equal objects yield equal keys.
pub type KeyFunc<T> = Arc<dyn Fn(&T) -> std::result::Result<String, KeyError> + Send + Sync>;

/// Default key derivation: `"{namespace}/{name}"`, or just `"{name}"` when
/// the namespace is empty.
pub fn meta_namespace_key<T>(obj: &T) -> std::result::Result<String, KeyError>
where
    T: ResourceMeta + Debug,
{
    if obj.name().is_empty() {
        return Err(KeyError::failed(obj, "object has no name"));
    }
    Ok(match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, obj.name()),
        _ => obj.name().to_string(),
    })
}

/// [`meta_namespace_key`] packaged as a shareable [`KeyFunc`].
pub fn meta_namespace_key_fn<T>() -> KeyFunc<T>
where
    T: ResourceMeta + Debug + 'static,
{
    Arc::new(|obj| meta_namespace_key(obj))
}

/// Inverse of [`meta_namespace_key`]: splits a packed key back into
/// `(namespace, name)`. Exactly one `/` is allowed.
pub fn split_meta_namespace_key(key: &str) -> std::result::Result<(Option<&str>, &str), KeyError> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [name] => Ok((None, name)),
        [namespace, name] => Ok((Some(namespace), name)),
        _ => Err(KeyError::BadFormat {
            key: key.to_string(),
        }),
    }
}
