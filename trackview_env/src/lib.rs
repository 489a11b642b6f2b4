//! TrackView Store Abstraction Layer
//!
//! This crate provides the read-only array interface that the TrackView
//! engines consume, so the same graph and lineage code runs against a
//! **Production** store (a Zarr v2 directory on disk) and against in-memory
//! or fault-injecting stores in tests and simulation.
//!
//! # Core Concept: Range Reads
//!
//! Every dataset is a hierarchy of named, chunked arrays. The core never
//! loads an array whole unless it is small (`indptr`); it issues flat
//! element-range reads and awaits them:
//! - Metadata (`array_meta()`): shape, dtype, attributes
//! - Integer slices (`read_ints()`): CSR `indptr` / `indices` / id payloads
//! - Float slices (`read_floats()`): coordinates
//!
//! # Example
//!
//! ```ignore
//! use trackview_env::{ChunkedArrayStore, ZarrDirStore};
//!
//! async fn first_row<S: ChunkedArrayStore>(store: &S) -> Result<Vec<f32>, StoreError> {
//!     let meta = store.array_meta("points").await?;
//!     store.read_floats("points", 0..meta.row_len()).await
//! }
//! ```

mod codec;
mod error;
mod memory;
mod store;
mod types;
mod zarr_impl;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{join_path, ChunkedArrayStore};
pub use types::{ArrayMeta, DType, Endian};
pub use zarr_impl::ZarrDirStore;
