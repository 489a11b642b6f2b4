//! Range-addressable read interface over a hierarchical array store.

use crate::error::StoreError;
use crate::types::ArrayMeta;
use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;

/// Read-only access to named, chunked arrays.
///
/// Arrays are addressed by a `/`-separated path relative to the store root
/// and read as flat, row-major element ranges. A 2D array of shape
/// `[rows, cols]` exposes row `r` as elements `r * cols .. (r + 1) * cols`.
///
/// # Implementations
///
/// - **Production**: `ZarrDirStore` - Zarr v2 directory hierarchy via `tokio::fs`
/// - **Testing**: `MemoryStore` - arrays held in memory
///
/// Every read is a suspension point; callers may issue several reads
/// concurrently and await them independently.
#[async_trait]
pub trait ChunkedArrayStore: Send + Sync + 'static {
    /// Returns shape, element type and attributes of the array at `path`.
    async fn array_meta(&self, path: &str) -> Result<ArrayMeta, StoreError>;

    /// Reads `elements` of an integer array.
    ///
    /// # Returns
    /// * `Ok(values)` - exactly `elements.end - elements.start` values
    /// * `Err(StoreError::TypeMismatch)` - the array stores floats
    /// * `Err(StoreError::OutOfBounds)` - the range exceeds the array
    async fn read_ints(&self, path: &str, elements: Range<u64>) -> Result<Vec<i64>, StoreError>;

    /// Reads `elements` of a numeric array as `f32`.
    ///
    /// Integer arrays are widened/narrowed to `f32`, so quantized point
    /// data can be read through the same call.
    async fn read_floats(&self, path: &str, elements: Range<u64>) -> Result<Vec<f32>, StoreError>;

    /// Human-readable location of the store (for logging).
    fn location(&self) -> String;
}

#[async_trait]
impl<S> ChunkedArrayStore for Arc<S>
where
    S: ChunkedArrayStore + ?Sized,
{
    async fn array_meta(&self, path: &str) -> Result<ArrayMeta, StoreError> {
        (**self).array_meta(path).await
    }

    async fn read_ints(&self, path: &str, elements: Range<u64>) -> Result<Vec<i64>, StoreError> {
        (**self).read_ints(path, elements).await
    }

    async fn read_floats(&self, path: &str, elements: Range<u64>) -> Result<Vec<f32>, StoreError> {
        (**self).read_floats(path, elements).await
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

/// Joins a group path and an array name (`"tracks_to_points"`, `"indptr"`).
pub fn join_path(group: &str, name: &str) -> String {
    let group = group.trim_end_matches('/');
    if group.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", group, name)
    }
}
