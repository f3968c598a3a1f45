use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future;
use stitchload::{schedule::ManualFlush, BatchFunction, LoadError, Loader, LoaderOptions};

#[derive(Debug, PartialEq, Eq, Clone)]
struct DummyData(String);

#[derive(Debug, thiserror::Error)]
#[error("backend unavailable")]
struct Unavailable;

#[derive(Default)]
struct DummyContext {
    map: HashMap<i64, String>,
    calls: Mutex<Vec<Vec<i64>>>,
}

impl DummyContext {
    fn with_entries(entries: &[(i64, &str)]) -> Arc<Self> {
        Arc::new(Self {
            map: entries.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, keys: &[i64]) {
        self.calls.lock().unwrap().push(keys.to_vec());
    }

    fn calls(&self) -> Vec<Vec<i64>> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, keys: &[i64]) -> Vec<Option<DummyData>> {
        keys.iter().map(|k| self.map.get(k).cloned().map(DummyData)).collect()
    }
}

struct DummyDataLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for DummyDataLoader {
    type Context = Arc<DummyContext>;
    type Error = Unavailable;

    async fn load(
        keys: &[i64],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Option<DummyData>>, Unavailable> {
        context.record(keys);
        Ok(context.lookup(keys))
    }
}

/// Always answers with three values more than requested, like a fixed-size mock list.
struct PaddedLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for PaddedLoader {
    type Context = Arc<DummyContext>;
    type Error = Unavailable;

    async fn load(
        keys: &[i64],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Option<DummyData>>, Unavailable> {
        context.record(keys);
        let mut values = context.lookup(keys);
        values.extend(std::iter::repeat(Some(DummyData("padding".to_owned()))).take(3));
        Ok(values)
    }
}

/// Only ever answers the first key.
struct ShortLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for ShortLoader {
    type Context = Arc<DummyContext>;
    type Error = Unavailable;

    async fn load(
        keys: &[i64],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Option<DummyData>>, Unavailable> {
        context.record(keys);
        Ok(context.lookup(&keys[..1]))
    }
}

/// Fails any batch containing a negative key.
struct FlakyLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for FlakyLoader {
    type Context = Arc<DummyContext>;
    type Error = Unavailable;

    async fn load(
        keys: &[i64],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Option<DummyData>>, Unavailable> {
        context.record(keys);
        if keys.iter().any(|k| *k < 0) {
            return Err(Unavailable);
        }
        Ok(context.lookup(keys))
    }
}

fn data(s: &str) -> Option<DummyData> {
    Some(DummyData(s.to_owned()))
}

#[tokio::test]
async fn basic_load() {
    let context = DummyContext::with_entries(&[(42, "Foo")]);

    let loader = Loader::new(DummyDataLoader {}, context);
    assert_eq!(loader.load(42).await.unwrap(), data("Foo"));
}

#[tokio::test]
async fn repeated_load() {
    let context = DummyContext::with_entries(&[(42, "Foo")]);

    let loader = Loader::new(DummyDataLoader {}, Arc::clone(&context));
    assert_eq!(loader.load(42).await.unwrap(), data("Foo"));
    assert_eq!(loader.load(42).await.unwrap(), data("Foo"));
    assert_eq!(context.calls(), vec![vec![42]]);
}

#[tokio::test]
async fn basic_load_many() {
    let context = DummyContext::with_entries(&[
        (42, "one fish"),
        (12, "two fish"),
        (5, "red fish"),
        (8, "blue fish"),
    ]);

    let loader = Loader::new(DummyDataLoader {}, context);
    let values = loader.load_many(vec![5, 12, 8]).await;
    assert_eq!(
        values.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
        vec![data("red fish"), data("two fish"), data("blue fish")]
    );
}

#[tokio::test]
async fn load_async() {
    let context = DummyContext::with_entries(&[
        (42, "one fish"),
        (12, "two fish"),
        (5, "red fish"),
        (8, "blue fish"),
    ]);

    let loader = Loader::new(DummyDataLoader {}, Arc::clone(&context));

    let (one, many, missing, other) = future::join4(
        loader.load(5),
        loader.load_many(vec![5, 42]),
        loader.load(99),
        loader.load(12),
    )
    .await;

    assert_eq!(one.unwrap(), data("red fish"));
    assert_eq!(
        many.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
        vec![data("red fish"), data("one fish")]
    );
    assert_eq!(missing.unwrap(), None);
    assert_eq!(other.unwrap(), data("two fish"));
    assert_eq!(context.calls(), vec![vec![5, 42, 99, 12]]);
}

#[tokio::test]
async fn concurrent_loads_share_one_dispatch_in_registration_order() {
    let context = DummyContext::with_entries(&[(1, "a"), (2, "b"), (3, "c")]);
    let loader = Loader::new(DummyDataLoader {}, Arc::clone(&context));

    let values = future::join_all([3, 1, 2].map(|k| loader.load(k))).await;

    assert_eq!(
        values.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
        vec![data("c"), data("a"), data("b")]
    );
    assert_eq!(context.calls(), vec![vec![3, 1, 2]]);
}

#[tokio::test]
async fn oversized_response_is_truncated() {
    let context = DummyContext::with_entries(&[(1, "a"), (2, "b")]);
    let loader = Loader::new(PaddedLoader {}, Arc::clone(&context));

    let (a, b) = future::join(loader.load(1), loader.load(2)).await;

    assert_eq!(a.unwrap(), data("a"));
    assert_eq!(b.unwrap(), data("b"));
    assert_eq!(context.calls(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn undersized_response_fails_whole_batch() {
    let context = DummyContext::with_entries(&[(1, "a"), (2, "b"), (3, "c")]);
    let loader = Loader::new(ShortLoader {}, context);

    let results = future::join_all([1, 2, 3].map(|k| loader.load(k))).await;

    assert_eq!(results.len(), 3);
    for result in results {
        assert!(matches!(
            result,
            Err(LoadError::CardinalityMismatch { expected: 3, actual: 1 })
        ));
    }
}

#[tokio::test]
async fn identical_keys_are_dispatched_once() {
    let context = DummyContext::with_entries(&[(42, "Foo")]);
    let loader = Loader::new(DummyDataLoader {}, Arc::clone(&context));

    let (a, b) = future::join(loader.load(42), loader.load(42)).await;

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(context.calls(), vec![vec![42]]);
}

#[tokio::test]
async fn failed_window_leaves_earlier_window_intact() {
    let context = DummyContext::with_entries(&[(1, "a"), (2, "b")]);
    let loader = Loader::new(FlakyLoader {}, Arc::clone(&context));

    let (a, b) = future::join(loader.load(1), loader.load(2)).await;
    assert_eq!(a.unwrap(), data("a"));
    assert_eq!(b.unwrap(), data("b"));

    let (c, d) = future::join(loader.load(-1), loader.load(3)).await;
    assert!(matches!(c, Err(LoadError::Dispatch(_))));
    assert!(matches!(d, Err(LoadError::Dispatch(_))));

    // Still served from the cache, no new dispatch.
    assert_eq!(loader.load(1).await.unwrap(), data("a"));
    assert_eq!(context.calls(), vec![vec![1, 2], vec![-1, 3]]);

    // Failures are not cached.
    assert_eq!(loader.load(3).await.unwrap(), None);
    assert_eq!(context.calls().last(), Some(&vec![3]));
}

#[tokio::test]
async fn primed_and_cleared_keys() {
    let context = DummyContext::with_entries(&[(1, "a"), (2, "b")]);
    let loader = Loader::new(DummyDataLoader {}, Arc::clone(&context));

    loader.prime(1, data("primed"));
    loader.prime_many(vec![(2, data("also primed"))]);
    assert_eq!(loader.load(1).await.unwrap(), data("primed"));
    assert_eq!(loader.load(2).await.unwrap(), data("also primed"));
    assert!(context.calls().is_empty());

    loader.clear(1);
    assert_eq!(loader.load(1).await.unwrap(), data("a"));
    assert_eq!(context.calls(), vec![vec![1]]);

    loader.clear_all();
    assert_eq!(loader.load_many(vec![1, 2]).await.len(), 2);
    assert_eq!(context.calls(), vec![vec![1], vec![1, 2]]);

    loader.clear_many(vec![1, 2]);
    assert_eq!(loader.load(2).await.unwrap(), data("b"));
    assert_eq!(context.calls().last(), Some(&vec![2]));
}

#[tokio::test]
async fn max_batch_size_splits_dispatches() {
    let context = DummyContext::with_entries(&[(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")]);
    let loader = Loader::with_options(
        DummyDataLoader {},
        Arc::clone(&context),
        LoaderOptions::default().with_max_batch_size(2),
    );

    let values = future::join_all([1, 2, 3, 4, 5].map(|k| loader.load(k))).await;

    assert!(values.iter().all(Result::is_ok));
    let mut calls = context.calls();
    calls.sort();
    assert_eq!(calls, vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test]
async fn disabled_cache_dispatches_again() {
    let context = DummyContext::with_entries(&[(7, "seven")]);
    let loader = Loader::with_options(
        DummyDataLoader {},
        Arc::clone(&context),
        LoaderOptions::default().with_cache(false),
    );

    let (a, b) = future::join(loader.load(7), loader.load(7)).await;
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(loader.load(7).await.unwrap(), data("seven"));
    assert_eq!(context.calls(), vec![vec![7], vec![7]]);
}

#[tokio::test]
async fn manual_flush_closes_the_window() {
    let context = DummyContext::with_entries(&[(1, "a"), (2, "b")]);
    let flush = ManualFlush::new();
    let loader = Loader::with_options(
        DummyDataLoader {},
        Arc::clone(&context),
        LoaderOptions::default().with_schedule(flush.clone()),
    );

    let ((a, b), ()) = tokio::join!(future::join(loader.load(1), loader.load(2)), async {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(context.calls().is_empty());
        flush.flush();
    });

    assert_eq!(a.unwrap(), data("a"));
    assert_eq!(b.unwrap(), data("b"));
    assert_eq!(context.calls(), vec![vec![1, 2]]);
}
