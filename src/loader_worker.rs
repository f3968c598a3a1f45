use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::slice;
use std::sync::Arc;

use futures::future::{self, FutureExt};
use tokio::sync::mpsc;

#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;
use crate::{
    batch_function::{align_results, BatchFunction},
    cache::Cache,
    error::LoadError,
    loader_op::{LoadRequest, LoadResult, LoaderOp},
    schedule::FlushSchedule,
};

/// A load request waiting on the current batch window, along with the values that were already
/// cached when it arrived.
struct PendingLoad<K, V> {
    request: LoadRequest<K, V>,
    cached: Vec<Option<V>>,
}

/// A `LoaderWorker` is the "single-thread" worker task that actually does the loading work.
///
/// Once started, it runs in a loop until the parent Loader aborts it's `JoinHandle` or drops the
/// request queue tx channel.
///
/// The worker can be in one of three states during its lifetime:
///
/// 1. Waiting for requests
/// 2. Collecting requests until its `FlushSchedule` closes the batch window.
/// 3. Executing its load batch function.
///
/// One cycle through this loop is a "batch window".
///
/// In state (1), the worker awaits any messages on the request queue channel, idling until work arrives.
///
/// In state (2), the worker pulls requests from the queue without waiting. Prime and Clear
/// requests are resolved immediately against the cache. For Load requests, the worker checks if
/// the request can be resolved immediately from the cache. If so, it immediately sends the value
/// on the load request's response channel, otherwise it stages the missing keys in the order they
/// were first requested, skipping keys already staged in this window. Once some request is
/// pending, the worker awaits the schedule and then drains whatever arrived in the meantime.
///
/// In state (3), the loader invokes its `BatchFunction` with the staged keys, split into chunks
/// when a max batch size is set. Values are aligned to their keys, inserted into the cache and
/// sent to every pending request. A chunk that fails rejects all of its keys with the same error;
/// failures are never cached.
pub struct LoaderWorker<K, V, F, CacheT, ContextT>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    CacheT: Cache,
    ContextT: Send + Sync + 'static,
{
    cache: CacheT,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
    keys_to_load: Vec<K>,
    staged: HashSet<K>,
    pending_requests: Vec<PendingLoad<K, V>>,
    context: ContextT,
    max_batch_size: Option<NonZeroUsize>,
    schedule: Arc<dyn FlushSchedule>,
    phantom_batch_function: PhantomData<F>,
    #[cfg(feature = "stats")]
    stats: WorkerStats,
}

impl<K, V, F, CacheT, ContextT> LoaderWorker<K, V, F, CacheT, ContextT>
where
    K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
    V: 'static + Send + Sync + Debug + Clone,
    F: 'static + BatchFunction<K, V, Context = ContextT> + Send,
    CacheT: Cache<K = K, V = V>,
    ContextT: Send + Sync + 'static,
{
    pub fn new(
        cache: CacheT,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V>>,
        context: ContextT,
        max_batch_size: Option<NonZeroUsize>,
        schedule: Arc<dyn FlushSchedule>,
    ) -> Self {
        Self {
            cache,
            request_rx,
            keys_to_load: Vec::new(),
            staged: HashSet::new(),
            pending_requests: Vec::new(),
            context,
            max_batch_size,
            schedule,
            phantom_batch_function: PhantomData,
            #[cfg(feature = "stats")]
            stats: WorkerStats::new(std::any::type_name::<(K, V)>()),
        }
    }

    pub async fn start(mut self) {
        loop {
            // Async await until we receive the first op.
            match self.request_rx.recv().await {
                None => {
                    tracing::info!("Tx channel closed. Terminating LoaderWorker.");
                    return;
                }
                Some(op) => self.mux_op(op),
            }
            self.drain_queue();
            if !self.pending_requests.is_empty() {
                self.schedule.window_closed().await;
                // Pick up whatever was enqueued while the window was open.
                self.drain_queue();
                self.execute_load().await;
            }
        }
    }

    fn drain_queue(&mut self) {
        while let Some(Some(op)) = self.request_rx.recv().now_or_never() {
            self.mux_op(op);
        }
    }

    #[tracing::instrument(skip(self))]
    fn mux_op(&mut self, op: LoaderOp<K, V>) {
        match op {
            LoaderOp::Load(request) => {
                let cached =
                    request.keys().iter().map(|k| self.cache.get(k).cloned()).collect::<Vec<_>>();
                let mut misses = 0;
                for (key, _) in request.keys().iter().zip(&cached).filter(|(_, v)| v.is_none()) {
                    misses += 1;
                    if self.staged.insert(key.clone()) {
                        self.keys_to_load.push(key.clone());
                    }
                }
                tracing::debug!(requested_keys = ?request.keys(), keys_to_load = ?self.keys_to_load);
                #[cfg(feature = "stats")]
                {
                    self.stats.record_load_request(request.keys().len() as u32);
                    self.stats.record_cache_hits((request.keys().len() - misses) as u32);
                }
                if misses == 0 {
                    request.send_response(cached.into_iter().flatten().map(Ok));
                } else {
                    self.pending_requests.push(PendingLoad { request, cached });
                }
            }
            LoaderOp::Prime(key, value) => self.cache.insert(key, value),
            LoaderOp::PrimeMany(key_vals) => self.cache.insert_many(key_vals),
            LoaderOp::Clear(key) => self.cache.remove(slice::from_ref(&key)),
            LoaderOp::ClearMany(keys) => self.cache.remove(&keys),
            LoaderOp::ClearAll => self.cache.flush(),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn execute_load(&mut self) {
        let keys = std::mem::take(&mut self.keys_to_load);
        self.staged.clear();
        let chunk_size = self.max_batch_size.map_or(keys.len(), NonZeroUsize::get).max(1);

        let context = &self.context;
        let outcomes =
            future::join_all(keys.chunks(chunk_size).map(|chunk| Self::dispatch(chunk, context)))
                .await;

        let mut loaded: HashMap<K, LoadResult<V>> = HashMap::with_capacity(keys.len());
        for (chunk, outcome) in keys.chunks(chunk_size).zip(outcomes) {
            #[cfg(feature = "stats")]
            self.stats.record_dispatch(chunk.len() as u32);
            match outcome {
                Ok(values) => {
                    tracing::debug!(?values);
                    #[cfg(feature = "stats")]
                    self.stats.record_dispatch_completed(values.len() as u32);
                    for (key, value) in chunk.iter().zip(values) {
                        self.cache.insert(key.clone(), value.clone());
                        loaded.insert(key.clone(), Ok(value));
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, keys = ?chunk, "batch dispatch failed");
                    #[cfg(feature = "stats")]
                    self.stats.record_dispatch_failed();
                    for key in chunk {
                        loaded.insert(key.clone(), Err(error.clone()));
                    }
                }
            }
        }

        for PendingLoad { request, cached } in self.pending_requests.drain(..) {
            let values = request
                .keys()
                .iter()
                .zip(cached)
                .map(|(key, cached)| match cached {
                    Some(value) => Ok(value),
                    None => loaded.get(key).cloned().unwrap_or(Err(LoadError::WorkerGone)),
                })
                .collect::<Vec<_>>();
            request.send_response(values);
        }
    }

    async fn dispatch(keys: &[K], context: &ContextT) -> LoadResult<Vec<V>> {
        tracing::debug!(?keys, "dispatching batch");
        let values = F::load(keys, context).await.map_err(LoadError::dispatch)?;
        align_results(keys.len(), values)
    }
}
