use super::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream;

fn counted<T: Send + 'static>(
    counter: &Arc<AtomicUsize>,
    items: Vec<T>,
) -> impl FnOnce() -> futures::stream::Iter<std::vec::IntoIter<T>> {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        stream::iter(items)
    }
}

// =========================================================================
// MemoCache
// =========================================================================

#[tokio::test]
async fn hit_does_not_resubscribe() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let mut first = cache.get_or_subscribe("job-1", counted(&subscriptions, vec![1, 2, 3])).unwrap();
    let _second = cache.get_or_subscribe("job-1", counted(&subscriptions, vec![9])).unwrap();

    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    let mut last = None;
    while let Some(item) = first.next().await {
        last = Some(item);
    }
    assert_eq!(last, Some(3));
}

#[tokio::test]
async fn attached_observer_sees_every_item() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let mut first = cache.get_or_subscribe("k", || stream::iter(vec![1, 2, 3])).unwrap();
    let mut second = cache.get_or_subscribe("k", || stream::iter(vec![9])).unwrap();

    let mut seen = Vec::new();
    while let Some(item) = first.next().await {
        seen.push(item);
    }
    let mut seen_by_second = Vec::new();
    while let Some(item) = second.next().await {
        seen_by_second.push(item);
    }

    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(seen_by_second, vec![1, 2, 3]);
}

#[tokio::test]
async fn late_observer_gets_latest_then_live_items() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
    let source = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|v| (v, rx)) });
    let mut early = cache.get_or_subscribe("k", move || source).unwrap();

    tx.send(1).unwrap();
    tx.send(2).unwrap();
    assert_eq!(early.next().await, Some(1));
    assert_eq!(early.next().await, Some(2));

    let mut late = cache.get_or_subscribe("k", || stream::iter(vec![0])).unwrap();
    tx.send(3).unwrap();
    drop(tx);

    assert_eq!(late.next().await, Some(2));
    assert_eq!(late.next().await, Some(3));
    assert_eq!(late.next().await, None);
    assert_eq!(early.next().await, Some(3));
    assert_eq!(early.next().await, None);
}

#[tokio::test]
async fn late_subscriber_replays_latest() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let mut early = cache.get_or_subscribe("k", counted(&subscriptions, vec![1, 2])).unwrap();
    while early.next().await.is_some() {}

    let mut late = cache.get_or_subscribe("k", counted(&subscriptions, vec![7])).unwrap();
    assert_eq!(late.latest(), Some(2));
    assert_eq!(late.next().await, Some(2));
    assert_eq!(late.next().await, None);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn evict_forces_fresh_subscription() {
    let cache: MemoCache<String, u32> = MemoCache::new();
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let mut handle = cache.get_or_subscribe("k".to_string(), counted(&subscriptions, vec![1])).unwrap();
    assert_eq!(handle.next().await, Some(1));

    assert!(cache.evict(&"k".to_string()));
    assert!(!cache.evict(&"k".to_string()));
    assert!(!cache.contains(&"k".to_string()));

    let mut fresh = cache.get_or_subscribe("k".to_string(), counted(&subscriptions, vec![2])).unwrap();
    assert_eq!(fresh.next().await, Some(2));
    assert_eq!(subscriptions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn evict_ends_pending_observers() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let mut handle = cache.get_or_subscribe("k", || stream::pending::<u32>()).unwrap();

    cache.evict(&"k");

    assert_eq!(handle.next().await, None);
}

#[tokio::test]
async fn clear_removes_everything() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let _a = cache.get_or_subscribe("a", || stream::iter(vec![1])).unwrap();
    let _b = cache.get_or_subscribe("b", || stream::iter(vec![2])).unwrap();
    assert_eq!(cache.len(), 2);

    cache.clear();

    assert!(cache.is_empty());
}

#[tokio::test]
async fn clones_share_entries() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let other = cache.clone();
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let _a = cache.get_or_subscribe("k", counted(&subscriptions, vec![1])).unwrap();
    let _b = other.get_or_subscribe("k", counted(&subscriptions, vec![1])).unwrap();

    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn errors_are_cached_until_evicted() {
    let cache: MemoCache<&str, Result<u32, String>> = MemoCache::new();
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let mut handle = cache.get_or_subscribe("k", counted(&subscriptions, vec![Err("boom".to_string())])).unwrap();
    assert_eq!(handle.next().await, Some(Err("boom".to_string())));

    let again = cache.get_or_subscribe("k", counted(&subscriptions, vec![Ok(1)])).unwrap();
    assert_eq!(again.latest(), Some(Err("boom".to_string())));
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn into_stream_yields_until_source_ends() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
    let source = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|v| (v, rx)) });
    let handle = cache.get_or_subscribe("k", move || source).unwrap();
    let mut items = Box::pin(handle.into_stream());

    tx.send(10).unwrap();
    assert_eq!(items.next().await, Some(10));
    tx.send(20).unwrap();
    assert_eq!(items.next().await, Some(20));
    drop(tx);
    assert_eq!(items.next().await, None);
}

#[tokio::test]
async fn latest_is_none_before_first_item() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let handle = cache.get_or_subscribe("k", || stream::pending::<u32>()).unwrap();
    assert_eq!(handle.latest(), None);
}

// =========================================================================
// memoize
// =========================================================================

#[derive(Serialize)]
struct Query {
    tenant: &'static str,
    page: u32,
}

#[tokio::test]
async fn memoized_fn_shares_equal_arguments() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let list = memoize(MemoCache::new(), move |query: Query| {
        counter.fetch_add(1, Ordering::SeqCst);
        stream::iter(vec![format!("{}:{}", query.tenant, query.page)])
    });

    let mut a = list.call(Query { tenant: "acme", page: 1 }).unwrap();
    let mut b = list.call(Query { tenant: "acme", page: 1 }).unwrap();
    let mut c = list.call(Query { tenant: "acme", page: 2 }).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(a.next().await.as_deref(), Some("acme:1"));
    assert_eq!(b.next().await.as_deref(), Some("acme:1"));
    assert_eq!(c.next().await.as_deref(), Some("acme:2"));
}

#[test]
fn default_key_is_json() {
    let list = memoize(MemoCache::<String, u32>::new(), |_: Query| stream::iter(vec![1_u32]));
    let key = list.key_for(&Query { tenant: "acme", page: 3 }).unwrap();
    assert_eq!(key, r#"{"tenant":"acme","page":3}"#);
}

#[tokio::test]
async fn custom_key_function_wins() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let list = memoize(MemoCache::new(), move |query: Query| {
        counter.fetch_add(1, Ordering::SeqCst);
        stream::iter(vec![query.page])
    })
    .with_key(|query: &Query| query.tenant.to_string());

    let _a = list.call(Query { tenant: "acme", page: 1 }).unwrap();
    let _b = list.call(Query { tenant: "acme", page: 2 }).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(list.cache().contains(&"acme".to_string()));
}

#[test]
fn unserializable_arguments_are_rejected() {
    let list = memoize(MemoCache::<String, u32>::new(), |_: BTreeMap<Vec<u8>, u8>| stream::iter(vec![1_u32]));
    let mut args = BTreeMap::new();
    args.insert(vec![1_u8], 1_u8);

    let err = list.key_for(&args).unwrap_err();

    assert!(matches!(err, MemoError::KeySerialization(_)));
    assert_eq!(err.error_code(), "E_MEMO_KEY");
}

#[test]
fn miss_outside_runtime_is_an_error() {
    let cache: MemoCache<&str, u32> = MemoCache::new();
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let err = cache.get_or_subscribe("k", counted(&subscriptions, vec![1])).err().unwrap();

    assert_eq!(err, MemoError::NoRuntime);
    assert_eq!(err.error_code(), "E_MEMO_RUNTIME");
    assert_eq!(subscriptions.load(Ordering::SeqCst), 0);
    assert!(cache.is_empty());
}

#[test]
fn memoized_call_outside_runtime_is_an_error() {
    let list = memoize(MemoCache::<String, u32>::new(), |_: Query| stream::iter(vec![1_u32]));
    let err = list.call(Query { tenant: "acme", page: 1 }).err().unwrap();
    assert_eq!(err, MemoError::NoRuntime);
}
