#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Human readable name used to identify this worker stats when it is reported.
    tag: &'static str,
    /// Number of `LoaderOp::Load` that were received by the worker.
    load_requests: u32,
    /// The total number of keys that were requested for loading (not necessarily unique).
    items_requested: u32,
    /// The number of keys that were immediately found in the loader cache.
    cache_hits: u32,
    /// Number of times the worker invoked its `BatchFunction`.
    dispatches: u32,
    /// The average number of unique keys sent in a single dispatch.
    average_batch_size: f32,
    /// The max number of unique keys sent in a single dispatch.
    max_batch_size: u32,
    /// The min number of unique keys sent in a single dispatch.
    min_batch_size: u32,
    /// The total number of values that were actually loaded.
    items_loaded: u32,
    /// Dispatches whose keys were all rejected.
    failed_dispatches: u32,
}

impl WorkerStats {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, min_batch_size: u32::MAX, ..Default::default() }
    }

    pub fn record_load_request(&mut self, items_requested: u32) {
        self.load_requests += 1;
        self.items_requested += items_requested;
    }

    pub fn record_cache_hits(&mut self, hits: u32) {
        self.cache_hits += hits;
    }

    pub fn record_dispatch(&mut self, batch_size: u32) {
        let new_total = self.dispatches + 1;
        self.average_batch_size = (((self.average_batch_size as f64 * self.dispatches as f64)
            + batch_size as f64)
            / new_total as f64) as f32;
        self.dispatches = new_total;
        self.max_batch_size = self.max_batch_size.max(batch_size);
        self.min_batch_size = self.min_batch_size.min(batch_size);
    }

    pub fn record_dispatch_completed(&mut self, loaded_item_count: u32) {
        self.items_loaded += loaded_item_count;
    }

    pub fn record_dispatch_failed(&mut self) {
        self.failed_dispatches += 1;
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(tag = self.tag, worker_stats = ?self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_sizes() {
        let mut stats = WorkerStats::new("test");
        stats.record_dispatch(2);
        stats.record_dispatch(4);
        stats.record_dispatch_failed();
        assert_eq!(stats.dispatches, 2);
        assert_eq!(stats.min_batch_size, 2);
        assert_eq!(stats.max_batch_size, 4);
        assert_eq!(stats.average_batch_size, 3.0);
        assert_eq!(stats.failed_dispatches, 1);
    }
}
