use std::fmt;
use std::slice;

use crate::KeyError;
use crate::KeyFunc;

/// The change a [`Delta`] records for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    /// First observation of a key.
    Added,
    /// Subsequent observation while the key remains present.
    Updated,
    /// Removal - observed from the source, or inferred from a relist.
    Deleted,
    /// Emitted once per key during a full snapshot replay when the FIFO was
    /// built with `emit_replaced`.
    Replaced,
    /// Periodic re-emission of a key whose state has not otherwise changed.
    Sync,
}

impl fmt::Display for DeltaKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            DeltaKind::Added => "Added",
            DeltaKind::Updated => "Updated",
            DeltaKind::Deleted => "Deleted",
            DeltaKind::Replaced => "Replaced",
            DeltaKind::Sync => "Sync",
        };
        f.write_str(s)
    }
}

/// Marker conveying that a deletion was inferred from a relist rather than
/// observed: the key vanished from a full snapshot, so the final state of the
/// object is unknown. `object` is the best-known state, possibly absent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedFinalStateUnknown<T> {
    pub key: String,
    pub object: Option<T>,
}

/// The value carried by a [`Delta`]: either the object itself, or - only
/// inside `Deleted` deltas synthesized by a relist - a
/// [`DeletedFinalStateUnknown`] envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaObject<T> {
    Object(T),
    FinalStateUnknown(DeletedFinalStateUnknown<T>),
}

impl<T> DeltaObject<T> {
    /// The carried object, or the envelope's best-known state.
    pub fn object(&self) -> Option<&T> {
        match self {
            DeltaObject::Object(obj) => Some(obj),
            DeltaObject::FinalStateUnknown(d) => d.object.as_ref(),
        }
    }

    /// Consume the payload, yielding the carried or best-known object.
    pub fn into_object(self) -> Option<T> {
        match self {
            DeltaObject::Object(obj) => Some(obj),
            DeltaObject::FinalStateUnknown(d) => d.object,
        }
    }

    /// Derive the store key for this payload. Tombstones already carry their
    /// key; everything else goes through the key function.
    pub fn key(
        &self,
        key_fn: &KeyFunc<T>,
    ) -> std::result::Result<String, KeyError> {
        match self {
            DeltaObject::Object(obj) => key_fn(obj),
            DeltaObject::FinalStateUnknown(d) => Ok(d.key.clone()),
        }
    }
}

/// A single change record for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta<T> {
    pub kind: DeltaKind,
    pub object: DeltaObject<T>,
}

impl<T> Delta<T> {
    pub fn new(
        kind: DeltaKind,
        object: T,
    ) -> Self {
        Self {
            kind,
            object: DeltaObject::Object(object),
        }
    }
}

/// The ordered history of observations for one key since the last pop.
/// Oldest first. Never empty once queued.
#[derive(Debug, Clone, PartialEq)]
pub struct Deltas<T>(pub(crate) Vec<Delta<T>>);

impl<T> Deltas<T> {
    pub fn newest(&self) -> Option<&Delta<T>> {
        self.0.last()
    }

    pub fn oldest(&self) -> Option<&Delta<T>> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Delta<T>> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Delta<T>> {
        self.0
    }
}

impl<T> From<Vec<Delta<T>>> for Deltas<T> {
    fn from(deltas: Vec<Delta<T>>) -> Self {
        Deltas(deltas)
    }
}

impl<T> std::ops::Deref for Deltas<T> {
    type Target = [Delta<T>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> IntoIterator for Deltas<T> {
    type Item = Delta<T>;
    type IntoIter = std::vec::IntoIter<Delta<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Deltas<T> {
    type Item = &'a Delta<T>;
    type IntoIter = slice::Iter<'a, Delta<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
