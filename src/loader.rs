use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::ops::Drop;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchFunction,
    cache::NoopCache,
    error::LoadError,
    loader_op::{LoadRequest, LoadResult, LoaderOp},
    loader_worker::LoaderWorker,
    schedule::{FlushSchedule, Immediate},
};

/// Tuning knobs for a [`Loader`].
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Memoize loaded values for the lifetime of the loader. When disabled, keys are still
    /// deduplicated within one batch window.
    pub cache: bool,
    /// Upper bound on keys per `BatchFunction` call. Larger windows are split.
    pub max_batch_size: Option<NonZeroUsize>,
    /// Decides when a batch window closes.
    pub schedule: Arc<dyn FlushSchedule>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { cache: true, max_batch_size: None, schedule: Arc::new(Immediate) }
    }
}

impl LoaderOptions {
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = NonZeroUsize::new(max_batch_size);
        self
    }

    pub fn with_schedule<S: FlushSchedule + 'static>(mut self, schedule: S) -> Self {
        self.schedule = Arc::new(schedule);
        self
    }
}

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users can call [`Loader::load`] and [`Loader::load_many`] to fetch values from the underlying resource or
/// cache. The cache can be cleared with calls to [`Loader::clear`], [`Loader::clear_many`] and
/// [`Loader::clear_all`], and values can be added to the cache out-of-band through the use of
/// [`Loader::prime`] and [`Loader::prime_many`].
///
/// The `Loader` struct acts as an intermediary between the async domain in which `load` calls are
/// invoked and the pseudo-single-threaded domain of the `LoaderWorker`. Callers can invoke the
/// `Loader` from multiple parallel tasks, and the loader will enqueue the requested operations on
/// the request queue for processing by its `LoaderWorker`. The worker processes the requests
/// sequentially and provides results via response oneshot channels back to the Loader.
///
/// A loader is meant to live for one request (one query execution). Dropping it stops the worker.
pub struct Loader<K, V>
where
    K: 'static + Send,
    V: 'static + Send,
{
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V>>,
    load_task_handle: tokio::task::JoinHandle<()>,
}

impl<K, V> Drop for Loader<K, V>
where
    K: 'static + Send,
    V: 'static + Send,
{
    fn drop(&mut self) {
        self.load_task_handle.abort();
    }
}

impl<K, V> Loader<K, V>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
{
    /// Creates a new Loader for the provided BatchFunction and Context type, using default
    /// [`LoaderOptions`].
    ///
    /// Note: the batch function is passed in as a marker for type inference.
    pub fn new<F, ContextT>(f: F, context: ContextT) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        Self::with_options(f, context, LoaderOptions::default())
    }

    /// Creates a new Loader. Must be called from within a tokio runtime.
    pub fn with_options<F, ContextT>(_: F, context: ContextT, options: LoaderOptions) -> Self
    where
        ContextT: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::trace_span!("LoaderWorker", kv = std::any::type_name::<(K, V)>());
        let LoaderOptions { cache, max_batch_size, schedule } = options;
        let load_task_handle = if cache {
            tokio::task::spawn(
                LoaderWorker::<K, V, F, HashMap<K, V>, ContextT>::new(
                    HashMap::new(),
                    rx,
                    context,
                    max_batch_size,
                    schedule,
                )
                .start()
                .instrument(span),
            )
        } else {
            tokio::task::spawn(
                LoaderWorker::<K, V, F, NoopCache<K, V>, ContextT>::new(
                    NoopCache::default(),
                    rx,
                    context,
                    max_batch_size,
                    schedule,
                )
                .start()
                .instrument(span),
            )
        };
        Self { request_tx: tx, load_task_handle }
    }

    /// Loads a value from the underlying resource.
    ///
    /// If the value is already in the loader cache, it is returned as soon as it is processed.
    /// Otherwise, the requested key is enqueued for batch loading in the current batch window.
    pub async fn load(&self, key: K) -> LoadResult<V> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(LoaderOp::Load(LoadRequest::One(key, response_tx)))
            .map_err(|_| LoadError::WorkerGone)?;
        response_rx.await.map_err(|_| LoadError::WorkerGone)?
    }

    /// Loads many values at once. Results are returned in key order.
    ///
    /// If all the values are already present in the loader cache, they are returned as soon as the
    /// request is processed by the worker. Otherwise, the missing keys are enqueued for batch
    /// loading in the current batch window.
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<LoadResult<V>> {
        let len = keys.len();
        let (response_tx, response_rx) = oneshot::channel();
        if self.request_tx.send(LoaderOp::Load(LoadRequest::Many(keys, response_tx))).is_err() {
            return vec![Err(LoadError::WorkerGone); len];
        }
        response_rx.await.unwrap_or_else(|_| vec![Err(LoadError::WorkerGone); len])
    }

    /// Adds a value to the cache.
    pub fn prime(&self, key: K, value: V) {
        self.send(LoaderOp::Prime(key, value));
    }

    /// Adds many values to the cache at once.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) {
        self.send(LoaderOp::PrimeMany(key_vals));
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub fn clear(&self, key: K) {
        self.send(LoaderOp::Clear(key));
    }

    /// Removes multiple values from the cache at once.
    ///
    /// These keys will be reloaded when requested.
    pub fn clear_many(&self, keys: Vec<K>) {
        self.send(LoaderOp::ClearMany(keys));
    }

    /// Empties the cache.
    pub fn clear_all(&self) {
        self.send(LoaderOp::ClearAll);
    }

    fn send(&self, op: LoaderOp<K, V>) {
        if let Err(e) = self.request_tx.send(op) {
            tracing::warn!(op = ?e.0, "loader worker is gone, dropping op");
        }
    }
}
