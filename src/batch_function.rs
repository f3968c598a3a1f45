use std::cmp::Ordering;

use async_trait::async_trait;

use crate::error::LoadError;

/// A `BatchFunction` defines the method through which some `Loader` may fetch
/// batched data from some resource. The `BatchFunction` receives a slice of keys
/// that have been requested during the `Loader`'s most recent batch window, and some user
/// defined context struct.
///
/// Like the reference facebook dataloader implementation, the returned values must be
/// positionally aligned with `keys`: the value at index `i` answers `keys[i]`. A response that
/// is longer than `keys` is truncated (with a warning). A shorter response fails every key of
/// the batch with [`LoadError::CardinalityMismatch`].
///
/// Returning `Err` rejects every key of the batch with [`LoadError::Dispatch`].
///
/// Multiple `BatchFunctions` (and therefore loaders) can share the same context (likely through an
/// `Arc`).
#[async_trait]
pub trait BatchFunction<K, V> {
    type Context;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn load(keys: &[K], context: &Self::Context) -> Result<Vec<V>, Self::Error>;
}

/// Checks that a batch response has exactly one value per key.
///
/// Oversized responses are tolerated for collaborators that return fixed-size lists (mock data
/// generators do), but never silently.
pub(crate) fn align_results<V>(expected: usize, mut values: Vec<V>) -> Result<Vec<V>, LoadError> {
    let actual = values.len();
    match actual.cmp(&expected) {
        Ordering::Equal => Ok(values),
        Ordering::Greater => {
            tracing::warn!(expected, actual, "batch response longer than requested keys, truncating");
            values.truncate(expected);
            Ok(values)
        }
        Ordering::Less => Err(LoadError::CardinalityMismatch { expected, actual }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_response_is_untouched() {
        assert_eq!(align_results(3, vec![1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn oversized_response_keeps_leading_values() {
        assert_eq!(align_results(2, vec!["a", "b", "c", "d", "e"]).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn undersized_response_is_rejected() {
        let err = align_results(3, vec![1]).unwrap_err();
        assert!(matches!(err, LoadError::CardinalityMismatch { expected: 3, actual: 1 }));
    }
}
