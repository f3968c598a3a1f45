use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::{
    relationship::{UserKey, UsersByIds},
    subschema::SubSchema,
};
use crate::{schedule::YieldTicks, Loader, LoaderOptions};

/// Per-execution state handed to relationship resolvers.
///
/// Build one for every top-level query and drop it once the query resolves: its loaders cache
/// for exactly that long.
pub struct ExecutionContext {
    user_schema: Arc<SubSchema>,
    options: LoaderOptions,
    users: OnceLock<Loader<UserKey, Value>>,
}

impl ExecutionContext {
    /// Loaders yield once to the runtime before dispatching, so loads issued from other worker
    /// threads of a multi-threaded runtime can join the window. Use [`ManualFlush`] through
    /// [`ExecutionContext::with_options`] where windows must be exact.
    ///
    /// [`ManualFlush`]: crate::schedule::ManualFlush
    pub fn new(user_schema: Arc<SubSchema>) -> Self {
        Self::with_options(user_schema, LoaderOptions::default().with_schedule(YieldTicks::default()))
    }

    pub fn with_options(user_schema: Arc<SubSchema>, options: LoaderOptions) -> Self {
        Self { user_schema, options, users: OnceLock::new() }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// The user loader, created on first use.
    pub fn users(&self) -> &Loader<UserKey, Value> {
        self.users.get_or_init(|| {
            tracing::debug!(schema = self.user_schema.name(), "creating user loader");
            Loader::with_options(UsersByIds, Arc::clone(&self.user_schema), self.options.clone())
        })
    }
}
