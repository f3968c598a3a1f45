//! Hooks that decide when a batch window closes.
//!
//! The worker collects keys until its [`FlushSchedule`] says the window is closed, then issues
//! one dispatch for everything staged so far. Batching is therefore only as good as the schedule:
//! closing too early degenerates to one dispatch per key.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

#[async_trait]
pub trait FlushSchedule: Debug + Send + Sync {
    /// Resolves once the current batch window may be dispatched.
    async fn window_closed(&self);
}

/// Closes the window as soon as the request queue has been drained.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

#[async_trait]
impl FlushSchedule for Immediate {
    async fn window_closed(&self) {}
}

/// Yields to the runtime a number of times before closing the window, giving sibling tasks a
/// chance to enqueue their keys.
#[derive(Debug, Clone, Copy)]
pub struct YieldTicks(pub usize);

impl Default for YieldTicks {
    fn default() -> Self {
        YieldTicks(1)
    }
}

#[async_trait]
impl FlushSchedule for YieldTicks {
    async fn window_closed(&self) {
        for _ in 0..self.0 {
            tokio::task::yield_now().await;
        }
    }
}

/// Closes the window only when [`ManualFlush::flush`] is called.
///
/// A flush issued while no window is open is remembered and closes the next one.
#[derive(Debug, Clone, Default)]
pub struct ManualFlush {
    notify: Arc<Notify>,
}

impl ManualFlush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl FlushSchedule for ManualFlush {
    async fn window_closed(&self) {
        self.notify.notified().await;
    }
}
