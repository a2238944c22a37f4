use std::sync::Arc;

use super::*;
use crate::meta_namespace_key_fn;
use crate::test_utils::TestResource;
use crate::Error;
use crate::IndexFunc;
use crate::KeyError;

fn cache() -> Cache<TestResource> {
    Cache::new(meta_namespace_key_fn())
}

#[test]
fn test_keyed_roundtrip() {
    let cache = cache();
    cache.add(TestResource::namespaced("ns", "a").with_version("1")).unwrap();

    let got = cache.get(&TestResource::namespaced("ns", "a")).unwrap().unwrap();
    assert_eq!(got.resource_version, "1");
    assert_eq!(cache.get_by_key("ns/a").unwrap().resource_version, "1");
    assert_eq!(cache.list_keys(), vec!["ns/a".to_string()]);

    cache.update(TestResource::namespaced("ns", "a").with_version("2")).unwrap();
    assert_eq!(cache.get_by_key("ns/a").unwrap().resource_version, "2");
    assert_eq!(cache.len(), 1);

    cache.delete(&TestResource::namespaced("ns", "a")).unwrap();
    assert!(cache.is_empty());
}

#[test]
fn test_delete_by_key() {
    let cache = cache();
    cache.add(TestResource::new("a")).unwrap();
    cache.delete_by_key("a");
    assert!(cache.get_by_key("a").is_none());
}

#[test]
fn test_key_failure_surfaces() {
    let cache = cache();
    let nameless = TestResource::new("");
    match cache.add(nameless.clone()) {
        Err(Error::Key(KeyError::Failed { .. })) => {}
        other => panic!("expected key error, got {other:?}"),
    }
    // A bad item aborts the whole replace.
    assert!(cache.replace(vec![TestResource::new("ok"), nameless], "rv").is_err());
    assert!(cache.is_empty());
}

#[test]
fn test_replace_swaps_contents() {
    let cache = cache();
    cache.add(TestResource::new("old")).unwrap();
    cache
        .replace(
            vec![TestResource::new("a"), TestResource::namespaced("ns", "b")],
            "rv",
        )
        .unwrap();

    let mut keys = cache.list_keys();
    keys.sort();
    assert_eq!(keys, vec!["a", "ns/b"]);
    assert_eq!(cache.list().len(), 2);
}

#[test]
fn test_known_objects_view() {
    let cache = Arc::new(cache());
    cache.add(TestResource::new("a").with_version("1")).unwrap();

    let known: Arc<dyn KnownObjects<TestResource>> = cache.clone();
    assert_eq!(known.list_keys(), vec!["a".to_string()]);
    assert_eq!(known.get_by_key("a").unwrap().resource_version, "1");
    assert!(known.get_by_key("b").is_none());
}

#[test]
fn test_indexed_cache() {
    let mut indexers = Indexers::new();
    let by_tier: IndexFunc<TestResource> = Arc::new(|obj: &TestResource| {
        obj.labels.get("tier").cloned().into_iter().collect()
    });
    indexers.insert("tier".to_string(), by_tier);
    let cache = Cache::with_indexers(meta_namespace_key_fn(), indexers);

    cache.add(TestResource::new("a").with_label("tier", "web")).unwrap();
    cache.add(TestResource::new("b").with_label("tier", "db")).unwrap();

    assert_eq!(cache.index_keys("tier", "web").unwrap(), vec!["a"]);
    assert_eq!(cache.by_index("tier", "db").unwrap()[0].name, "b");
    let mut values = cache.list_index_func_values("tier");
    values.sort();
    assert_eq!(values, vec!["db", "web"]);
}
