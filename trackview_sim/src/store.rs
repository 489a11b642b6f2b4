//! Instrumented store implementing ChunkedArrayStore for deterministic testing.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use trackview_env::{ArrayMeta, ChunkedArrayStore, MemoryStore, StoreError};

/// Store wrapper that counts, delays and fails reads.
///
/// This implements `ChunkedArrayStore` over a [`MemoryStore`] with:
/// - Per-path read counters (metadata lookups are not counted)
/// - Optional latency per read
/// - Seeded random faults plus scripted "fail the next N reads of path"
///
/// Faults are always `StoreError::Transient`, so every injected failure is
/// one the viewer is expected to recover from.
pub struct SimStore {
    inner: MemoryStore,

    /// Data reads per path
    reads: Mutex<BTreeMap<String, u64>>,

    /// Scripted failures remaining per path
    scripted: Mutex<BTreeMap<String, u64>>,

    /// Probability that a data read fails
    fault_rate: f64,

    /// Deterministic RNG for fault injection
    rng: Mutex<ChaCha8Rng>,

    /// Delay applied to every data read
    latency: Duration,

    /// Total injected failures
    injected: Mutex<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimStore {
    /// Creates a fault-free, zero-latency store.
    pub fn new(inner: MemoryStore, seed: u64) -> Self {
        Self {
            inner,
            reads: Mutex::new(BTreeMap::new()),
            scripted: Mutex::new(BTreeMap::new()),
            fault_rate: 0.0,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            latency: Duration::ZERO,
            injected: Mutex::new(0),
        }
    }

    /// Creates an Arc-wrapped store for sharing.
    pub fn shared(inner: MemoryStore, seed: u64) -> Arc<Self> {
        Arc::new(Self::new(inner, seed))
    }

    /// Sets the probability that any data read fails.
    pub fn with_fault_rate(mut self, rate: f64) -> Self {
        self.fault_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the delay of every data read.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes the next `count` data reads of `path` fail.
    pub fn fail_next(&self, path: &str, count: u64) {
        lock(&self.scripted).insert(path.to_string(), count);
    }

    /// Data reads issued against `path`.
    pub fn reads(&self, path: &str) -> u64 {
        lock(&self.reads).get(path).copied().unwrap_or(0)
    }

    /// Data reads over all paths.
    pub fn total_reads(&self) -> u64 {
        lock(&self.reads).values().sum()
    }

    /// Snapshot of the per-path counters.
    pub fn read_counts(&self) -> BTreeMap<String, u64> {
        lock(&self.reads).clone()
    }

    pub fn injected_failures(&self) -> u64 {
        *lock(&self.injected)
    }

    pub fn reset_counters(&self) {
        lock(&self.reads).clear();
        *lock(&self.injected) = 0;
    }

    /// Counts the read and decides whether it fails.
    fn record(&self, path: &str) -> Result<(), StoreError> {
        *lock(&self.reads).entry(path.to_string()).or_default() += 1;

        let scripted = {
            let mut scripted = lock(&self.scripted);
            match scripted.get_mut(path) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        let random = self.fault_rate > 0.0 && lock(&self.rng).gen_bool(self.fault_rate);
        if scripted || random {
            *lock(&self.injected) += 1;
            debug!("injecting failure reading {}", path);
            return Err(StoreError::transient(format!("injected failure reading {}", path)));
        }
        Ok(())
    }

    async fn delay(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ChunkedArrayStore for SimStore {
    async fn array_meta(&self, path: &str) -> Result<ArrayMeta, StoreError> {
        self.inner.array_meta(path).await
    }

    async fn read_ints(&self, path: &str, elements: Range<u64>) -> Result<Vec<i64>, StoreError> {
        self.record(path)?;
        self.delay().await;
        self.inner.read_ints(path, elements).await
    }

    async fn read_floats(&self, path: &str, elements: Range<u64>) -> Result<Vec<f32>, StoreError> {
        self.record(path)?;
        self.delay().await;
        self.inner.read_floats(path, elements).await
    }

    fn location(&self) -> String {
        format!("sim+{}", self.inner.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new("t");
        store.insert_ints("a", vec![4], vec![1, 2, 3, 4]).unwrap();
        store
    }

    #[tokio::test]
    async fn test_counts_data_reads_only() {
        let sim = SimStore::new(store(), 1);
        sim.array_meta("a").await.unwrap();
        assert_eq!(sim.reads("a"), 0);
        assert_eq!(sim.read_ints("a", 1..3).await.unwrap(), vec![2, 3]);
        assert_eq!(sim.reads("a"), 1);
        assert_eq!(sim.total_reads(), 1);
        sim.reset_counters();
        assert_eq!(sim.total_reads(), 0);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let sim = SimStore::new(store(), 1);
        sim.fail_next("a", 2);
        for _ in 0..2 {
            let err = sim.read_ints("a", 0..1).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert!(sim.read_ints("a", 0..1).await.is_ok());
        assert_eq!(sim.injected_failures(), 2);
        assert_eq!(sim.reads("a"), 3);
    }

    #[tokio::test]
    async fn test_random_faults_are_seeded() {
        async fn pattern(seed: u64) -> Vec<bool> {
            let sim = SimStore::new(store(), seed).with_fault_rate(0.5);
            let mut out = Vec::new();
            for _ in 0..32 {
                out.push(sim.read_ints("a", 0..1).await.is_ok());
            }
            out
        }
        let first = pattern(9).await;
        assert_eq!(first, pattern(9).await);
        assert!(first.contains(&true) && first.contains(&false));
    }

    #[tokio::test]
    async fn test_always_failing_store() {
        let sim = SimStore::new(store(), 3).with_fault_rate(1.0);
        assert!(sim.read_ints("a", 0..1).await.is_err());
        assert_eq!(sim.location(), "sim+memory://t");
    }
}
