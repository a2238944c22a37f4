//! Unit tests for the filtering event handler.
//!
//! The filter-transition rules: an object that starts passing after an
//! update is an add, one that stops passing is a delete, and objects that
//! never pass are dropped.

use std::sync::Arc;

use crate::test_utils::HandlerEvent;
use crate::test_utils::RecordingHandler;
use crate::test_utils::TestResource;
use crate::DeletedFinalStateUnknown;
use crate::DeltaObject;
use crate::FilterFunc;
use crate::FilteringResourceEventHandler;
use crate::ResourceEventHandler;

fn label_filter(value: &'static str) -> FilterFunc<TestResource> {
    Arc::new(move |obj: &TestResource| {
        obj.labels.get("label").map(String::as_str) == Some(value)
    })
}

fn filtering() -> (
    FilteringResourceEventHandler<TestResource, Arc<RecordingHandler<TestResource>>>,
    Arc<RecordingHandler<TestResource>>,
) {
    let recorder = Arc::new(RecordingHandler::new());
    let handler = FilteringResourceEventHandler::new(label_filter("foo"), recorder.clone());
    (handler, recorder)
}

fn labeled(value: &str) -> TestResource {
    TestResource::new("a").with_label("label", value)
}

#[test]
fn test_add_is_filtered() {
    let (handler, recorder) = filtering();
    handler.on_add(&labeled("bar"));
    assert!(recorder.is_empty());

    handler.on_add(&labeled("foo"));
    assert_eq!(recorder.events(), vec![HandlerEvent::Added(labeled("foo"))]);
}

/// Scenario S6: an update from a non-matching to a matching object is
/// delivered as an add.
#[test]
fn test_update_into_filter_becomes_add() {
    let (handler, recorder) = filtering();
    handler.on_update(&labeled("bar"), &labeled("foo"));
    assert_eq!(recorder.events(), vec![HandlerEvent::Added(labeled("foo"))]);
}

/// Scenario S6 (reverse): an update from matching to non-matching is
/// delivered as a delete carrying the old object.
#[test]
fn test_update_out_of_filter_becomes_delete() {
    let (handler, recorder) = filtering();
    handler.on_update(&labeled("foo"), &labeled("bar"));
    assert_eq!(
        recorder.events(),
        vec![HandlerEvent::Deleted(DeltaObject::Object(labeled("foo")))]
    );
}

#[test]
fn test_update_within_filter_stays_update() {
    let (handler, recorder) = filtering();
    let old = labeled("foo");
    let new = labeled("foo").with_version("2");
    handler.on_update(&old, &new);
    assert_eq!(
        recorder.events(),
        vec![HandlerEvent::Updated {
            old,
            new
        }]
    );
}

#[test]
fn test_update_outside_filter_is_dropped() {
    let (handler, recorder) = filtering();
    handler.on_update(&labeled("bar"), &labeled("baz"));
    assert!(recorder.is_empty());
}

#[test]
fn test_delete_is_filtered_on_last_known_state() {
    let (handler, recorder) = filtering();
    handler.on_delete(&DeltaObject::Object(labeled("bar")));
    assert!(recorder.is_empty());

    handler.on_delete(&DeltaObject::Object(labeled("foo")));
    assert_eq!(recorder.len(), 1);
}

#[test]
fn test_tombstone_with_object_is_filtered_on_it() {
    let (handler, recorder) = filtering();
    let tombstone = DeltaObject::FinalStateUnknown(DeletedFinalStateUnknown {
        key: "a".to_string(),
        object: Some(labeled("bar")),
    });
    handler.on_delete(&tombstone);
    assert!(recorder.is_empty());
}

#[test]
fn test_key_only_tombstone_passes_through() {
    let (handler, recorder) = filtering();
    let tombstone: DeltaObject<TestResource> =
        DeltaObject::FinalStateUnknown(DeletedFinalStateUnknown {
            key: "a".to_string(),
            object: None,
        });
    handler.on_delete(&tombstone);
    assert_eq!(recorder.len(), 1);
}

#[test]
fn test_funcs_adapter_calls_what_is_set() {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    let adds = Arc::new(AtomicUsize::new(0));
    let handler = {
        let adds = adds.clone();
        crate::ResourceEventHandlerFuncs::<TestResource> {
            add_fn: Some(Box::new(move |_| {
                adds.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        }
    };
    handler.on_add(&labeled("foo"));
    handler.on_update(&labeled("foo"), &labeled("foo"));
    handler.on_delete(&DeltaObject::Object(labeled("foo")));
    assert_eq!(adds.load(Ordering::SeqCst), 1);
}
