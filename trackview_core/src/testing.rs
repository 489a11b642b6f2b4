//! Test doubles shared by the engine unit tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Mutex;
use trackview_env::{ArrayMeta, ChunkedArrayStore, MemoryStore, StoreError};

/// Store wrapper that counts reads per path and fails reads on demand.
pub(crate) struct CountingStore {
    inner: MemoryStore,
    reads: Mutex<HashMap<String, usize>>,
    failures: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            reads: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Number of data reads (not metadata lookups) issued against `path`.
    pub fn reads(&self, path: &str) -> usize {
        self.reads.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Makes the next `count` reads of `path` fail with a transient error.
    pub fn fail_next(&self, path: &str, count: usize) {
        self.failures.lock().unwrap().insert(path.to_string(), count);
    }

    fn record(&self, path: &str) -> Result<(), StoreError> {
        *self.reads.lock().unwrap().entry(path.to_string()).or_default() += 1;
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::transient(format!("injected failure reading {}", path)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkedArrayStore for CountingStore {
    async fn array_meta(&self, path: &str) -> Result<ArrayMeta, StoreError> {
        self.inner.array_meta(path).await
    }

    async fn read_ints(&self, path: &str, elements: Range<u64>) -> Result<Vec<i64>, StoreError> {
        self.record(path)?;
        tokio::task::yield_now().await;
        self.inner.read_ints(path, elements).await
    }

    async fn read_floats(&self, path: &str, elements: Range<u64>) -> Result<Vec<f32>, StoreError> {
        self.record(path)?;
        tokio::task::yield_now().await;
        self.inner.read_floats(path, elements).await
    }

    fn location(&self) -> String {
        format!("counting+{}", self.inner.location())
    }
}

/// Coordinates of point `id` in the sample dataset.
pub(crate) fn sample_xyz(id: u64) -> [f32; 3] {
    let base = id as f32 * 10.0;
    [base, base + 1.0, base + 2.0]
}

/// Three timepoints with three slots each (stride 3, no scale attributes).
///
/// ```text
/// t0: ids 0 1 _      track 1: 0 -> 3, divides into track 2 (6) and track 3 (7)
/// t1: ids 3 4 _      track 4: 1 -> 4 -> 8
/// t2: ids 6 7 8      track 0 is empty
/// ```
///
/// `tracks_to_tracks` holds ancestors and descendants (not siblings), with
/// the parent of the column track as payload.
pub(crate) fn sample_store() -> MemoryStore {
    let mut store = MemoryStore::new("sample");

    let filled: [&[u64]; 3] = [&[0, 1], &[3, 4], &[6, 7, 8]];
    let mut points = Vec::new();
    for ids in filled {
        let mut row = vec![-9999.0f32; 9];
        for (slot, &id) in ids.iter().enumerate() {
            row[slot * 3..slot * 3 + 3].copy_from_slice(&sample_xyz(id));
        }
        points.extend(row);
    }
    store.insert_floats("points", vec![3, 9], points).unwrap();
    store.set_attr("points", "values_per_point", json!(3)).unwrap();

    store
        .insert_ints("points_to_tracks/indptr", vec![10], vec![0, 1, 2, 2, 3, 4, 4, 5, 6, 7])
        .unwrap();
    store
        .insert_ints("points_to_tracks/indices", vec![7], vec![1, 4, 1, 4, 2, 3, 4])
        .unwrap();

    let track_points: [u64; 7] = [0, 3, 6, 7, 1, 4, 8];
    store
        .insert_ints("tracks_to_points/indptr", vec![6], vec![0, 0, 2, 3, 4, 7])
        .unwrap();
    store
        .insert_ints(
            "tracks_to_points/indices",
            vec![7],
            track_points.iter().map(|&p| p as i64).collect(),
        )
        .unwrap();
    store
        .insert_floats(
            "tracks_to_points/data",
            vec![7, 3],
            track_points.iter().flat_map(|&p| sample_xyz(p)).collect(),
        )
        .unwrap();

    store
        .insert_ints("tracks_to_tracks/indptr", vec![6], vec![0, 0, 2, 3, 4, 4])
        .unwrap();
    store
        .insert_ints("tracks_to_tracks/indices", vec![4], vec![2, 3, 1, 1])
        .unwrap();
    store
        .insert_ints("tracks_to_tracks/data", vec![4], vec![1, 1, 0, 0])
        .unwrap();

    store
}
