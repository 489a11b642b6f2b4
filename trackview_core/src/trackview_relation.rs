//! The "RELATION" Engine - CSR row access over a chunked array store
//!
//! A relation of `R` rows is stored as three sibling arrays in one group:
//! - `indptr`: `R + 1` non-decreasing row boundaries, `indptr[0] = 0`
//! - `indices`: column ids, row `i` at `indices[indptr[i]..indptr[i + 1]]`
//! - `data` (optional): payload aligned 1:1 with `indices`
//!
//! `indptr` is small next to the rest of the dataset, so it is fetched whole
//! on first access and served from memory afterwards. Every row lookup then
//! costs one `indices` read (plus one concurrent `data` read).

use crate::error::TrackError;
use futures_util::future::try_join;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use trackview_env::{join_path, ChunkedArrayStore};

// ============================================================================
// PAYLOAD
// ============================================================================

/// Element kind of a relation's `data` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Float rows (e.g. xyz coordinates, `width` values per entry)
    Float,
    /// One integer per entry (e.g. parent track id)
    Int,
}

/// Resolved payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PayloadLayout {
    kind: PayloadKind,
    /// Values per entry (trailing dimensions of `data`)
    width: u64,
    /// Total elements in `data`
    len: u64,
}

/// Payload values for a run of entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `values.len() == columns.len() * width`
    Float { values: Vec<f32>, width: usize },
    /// `values.len() == columns.len()`
    Int(Vec<i64>),
}

impl Payload {
    /// Number of entries the payload covers.
    pub fn entries(&self) -> usize {
        match self {
            Payload::Float { values, width } => values.len() / (*width).max(1),
            Payload::Int(values) => values.len(),
        }
    }
}

/// Columns (and payload, when the relation has one) of one or more rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSlice {
    pub columns: Vec<u64>,
    pub payload: Option<Payload>,
}

impl RowSlice {
    /// Returns true if the slice holds no entries.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ============================================================================
// INDPTR CACHE
// ============================================================================

/// Write-once, single-flight cache of a relation's row boundaries.
///
/// The first caller runs the load; callers arriving while it is pending
/// wait on the same load instead of issuing their own. A failed load
/// leaves the slot empty so the next caller retries it.
#[derive(Debug, Default)]
pub struct IndptrCache {
    slot: OnceCell<Vec<u64>>,
}

impl IndptrCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the boundaries have been loaded.
    pub fn is_loaded(&self) -> bool {
        self.slot.initialized()
    }

    /// Resolved boundaries, if loaded.
    pub fn get(&self) -> Option<&[u64]> {
        self.slot.get().map(Vec::as_slice)
    }

    /// Returns the cached boundaries, running `load` if nothing is cached or pending.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<&[u64], TrackError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u64>, TrackError>>,
    {
        self.slot.get_or_try_init(load).await.map(Vec::as_slice)
    }
}

// ============================================================================
// SPARSE RELATION
// ============================================================================

/// One CSR-encoded relation read lazily from a store.
pub struct SparseRelation<S: ChunkedArrayStore> {
    store: Arc<S>,
    group: String,
    indptr_path: String,
    indices_path: String,
    data_path: String,
    rows: u64,
    nnz: u64,
    payload: Option<PayloadLayout>,
    indptr: IndptrCache,
}

impl<S: ChunkedArrayStore> SparseRelation<S> {
    /// Opens the relation stored under `group`.
    ///
    /// Reads array metadata only; `indptr` itself is fetched on the first row
    /// lookup. With `payload = Some(kind)` the group must contain `data`.
    pub async fn open(store: Arc<S>, group: &str, payload: Option<PayloadKind>) -> Result<Self, TrackError> {
        let indptr_path = join_path(group, "indptr");
        let indices_path = join_path(group, "indices");
        let data_path = join_path(group, "data");

        let indptr_meta = store.array_meta(&indptr_path).await?;
        if indptr_meta.is_empty() {
            return Err(TrackError::inconsistent(group, "indptr is empty"));
        }
        let rows = indptr_meta.len() - 1;
        let nnz = store.array_meta(&indices_path).await?.len();

        let payload = match payload {
            Some(kind) => {
                let meta = store.array_meta(&data_path).await?;
                Some(PayloadLayout {
                    kind,
                    width: meta.row_len().max(1),
                    len: meta.len(),
                })
            }
            None => None,
        };

        debug!("opened relation {} rows={} nnz={} payload={:?}", group, rows, nnz, payload.map(|p| p.kind));

        Ok(Self {
            store,
            group: group.to_string(),
            indptr_path,
            indices_path,
            data_path,
            rows,
            nnz,
            payload,
            indptr: IndptrCache::new(),
        })
    }

    /// Group path of the relation.
    pub fn name(&self) -> &str {
        &self.group
    }

    /// Number of rows `R`.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Number of stored entries (length of `indices`).
    pub fn nnz(&self) -> u64 {
        self.nnz
    }

    /// Returns true if the relation carries a `data` payload.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Returns true once `indptr` is resident in memory.
    pub fn indptr_loaded(&self) -> bool {
        self.indptr.is_loaded()
    }

    /// Entry range `indptr[row]..indptr[row + 1]` of one row.
    pub async fn row_bounds(&self, row: u64) -> Result<Range<u64>, TrackError> {
        self.check_row(row)?;
        let indptr = self.indptr().await?;
        Ok(indptr[row as usize]..indptr[row as usize + 1])
    }

    /// Columns and payload of row `row`.
    ///
    /// # Returns
    /// * `Ok(slice)` - possibly empty when `indptr[row] == indptr[row + 1]`
    /// * `Err(TrackError::OutOfRange)` - `row >= R`
    /// * `Err(TrackError::InconsistentRelation)` - payload and indices disagree
    pub async fn get_row(&self, row: u64) -> Result<RowSlice, TrackError> {
        self.check_row(row)?;
        self.get_row_range(row, row + 1).await
    }

    /// Columns and payload of rows `start..end` in one read per array.
    pub async fn get_row_range(&self, start: u64, end: u64) -> Result<RowSlice, TrackError> {
        if end > self.rows || start > end {
            return Err(TrackError::OutOfRange {
                what: "row",
                index: end.max(start),
                len: self.rows,
            });
        }
        let indptr = self.indptr().await?;
        let entries = indptr[start as usize]..indptr[end as usize];
        self.read_entries(entries).await
    }

    fn check_row(&self, row: u64) -> Result<(), TrackError> {
        if row >= self.rows {
            return Err(TrackError::OutOfRange {
                what: "row",
                index: row,
                len: self.rows,
            });
        }
        Ok(())
    }

    async fn indptr(&self) -> Result<&[u64], TrackError> {
        self.indptr
            .get_or_load(|| async {
                debug!("fetching indptr for {} ({} rows)", self.group, self.rows);
                let raw = self.store.read_ints(&self.indptr_path, 0..self.rows + 1).await?;
                validate_indptr(&self.group, &raw, self.nnz)
            })
            .await
    }

    async fn read_entries(&self, entries: Range<u64>) -> Result<RowSlice, TrackError> {
        let count = (entries.end - entries.start) as usize;
        let Some(layout) = self.payload else {
            if count == 0 {
                return Ok(RowSlice::default());
            }
            let raw = self.store.read_ints(&self.indices_path, entries).await?;
            return Ok(RowSlice {
                columns: self.to_columns(raw, count)?,
                payload: None,
            });
        };

        let data_range = entries.start * layout.width..entries.end * layout.width;
        if data_range.end > layout.len {
            return Err(TrackError::inconsistent(
                &self.group,
                format!(
                    "data holds {} values, entries {:?} need {}",
                    layout.len, entries, data_range.end
                ),
            ));
        }
        if count == 0 {
            return Ok(RowSlice {
                columns: Vec::new(),
                payload: Some(empty_payload(layout)),
            });
        }

        let indices = self.store.read_ints(&self.indices_path, entries.clone());
        let (raw, payload) = match layout.kind {
            PayloadKind::Float => {
                let (raw, values) = try_join(indices, self.store.read_floats(&self.data_path, data_range)).await?;
                let width = layout.width as usize;
                (raw, Payload::Float { values, width })
            }
            PayloadKind::Int => {
                let (raw, values) = try_join(indices, self.store.read_ints(&self.data_path, data_range)).await?;
                (raw, Payload::Int(values))
            }
        };

        let columns = self.to_columns(raw, count)?;
        let expected = count * layout.width as usize;
        let actual = match &payload {
            Payload::Float { values, .. } => values.len(),
            Payload::Int(values) => values.len(),
        };
        if actual != expected {
            return Err(TrackError::inconsistent(
                &self.group,
                format!("payload has {} values for {} indices (width {})", actual, count, layout.width),
            ));
        }
        Ok(RowSlice {
            columns,
            payload: Some(payload),
        })
    }

    fn to_columns(&self, raw: Vec<i64>, expected: usize) -> Result<Vec<u64>, TrackError> {
        if raw.len() != expected {
            return Err(TrackError::inconsistent(
                &self.group,
                format!("read {} indices, expected {}", raw.len(), expected),
            ));
        }
        raw.into_iter()
            .map(|v| u64::try_from(v).map_err(|_| TrackError::inconsistent(&self.group, format!("negative column id {}", v))))
            .collect()
    }
}

fn empty_payload(layout: PayloadLayout) -> Payload {
    match layout.kind {
        PayloadKind::Float => Payload::Float {
            values: Vec::new(),
            width: layout.width as usize,
        },
        PayloadKind::Int => Payload::Int(Vec::new()),
    }
}

/// Checks the CSR boundary invariants and converts to unsigned offsets.
fn validate_indptr(group: &str, raw: &[i64], nnz: u64) -> Result<Vec<u64>, TrackError> {
    if raw.first() != Some(&0) {
        return Err(TrackError::inconsistent(group, format!("indptr starts at {:?}, expected 0", raw.first())));
    }
    let mut indptr = Vec::with_capacity(raw.len());
    let mut prev = 0i64;
    for (i, &v) in raw.iter().enumerate() {
        if v < prev {
            return Err(TrackError::inconsistent(
                group,
                format!("indptr decreases at row {} ({} < {})", i, v, prev),
            ));
        }
        indptr.push(v as u64);
        prev = v;
    }
    if prev as u64 != nnz {
        return Err(TrackError::inconsistent(
            group,
            format!("indptr ends at {}, indices holds {}", prev, nnz),
        ));
    }
    Ok(indptr)
}

// ============================================================================
// TESTS
// ============================================================================
