use crate::test_utils::TestResource;
use crate::meta_namespace_key;
use crate::meta_namespace_key_fn;
use crate::split_meta_namespace_key;
use crate::KeyError;

#[test]
fn test_namespaced_key_format() {
    let obj = TestResource::namespaced("ns", "a");
    assert_eq!(meta_namespace_key(&obj).unwrap(), "ns/a");
}

#[test]
fn test_cluster_scoped_key_format() {
    assert_eq!(meta_namespace_key(&TestResource::new("a")).unwrap(), "a");

    let empty_ns = TestResource {
        namespace: Some(String::new()),
        ..TestResource::new("a")
    };
    assert_eq!(meta_namespace_key(&empty_ns).unwrap(), "a");
}

#[test]
fn test_nameless_object_is_rejected() {
    let err = meta_namespace_key(&TestResource::new("")).unwrap_err();
    assert!(matches!(err, KeyError::Failed { .. }));
}

#[test]
fn test_split_inverts_key_fn() {
    let key_fn = meta_namespace_key_fn::<TestResource>();

    let key = key_fn(&TestResource::namespaced("ns", "a")).unwrap();
    assert_eq!(split_meta_namespace_key(&key).unwrap(), (Some("ns"), "a"));

    let key = key_fn(&TestResource::new("a")).unwrap();
    assert_eq!(split_meta_namespace_key(&key).unwrap(), (None, "a"));
}

#[test]
fn test_split_rejects_extra_separators() {
    let err = split_meta_namespace_key("a/b/c").unwrap_err();
    match err {
        KeyError::BadFormat { key } => assert_eq!(key, "a/b/c"),
        other => panic!("expected bad format, got {other:?}"),
    }
}
