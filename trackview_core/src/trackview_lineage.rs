//! The "LINEAGE" Engine - deduplicated lineage materialization
//!
//! Starting from selected point ids, resolves owning tracks, expands them
//! through the `tracks_to_tracks` relation and fetches the points of every
//! reachable track that the session has not loaded yet.
//!
//! A traversal runs in two steps:
//! 1. **Fetch** (async, read-only on the caches): seeds -> roots -> lineage
//!    sets -> segment reads, concurrent within each stage.
//! 2. **Commit** (sync): successful segments are marked added, roots whose
//!    whole lineage is now present are marked fetched, and seed points whose
//!    roots are all fetched are marked fetched.
//!
//! Nothing is committed for a failed read, so a retry picks it up again.

use crate::config::LineageExpansion;
use crate::error::TrackError;
use crate::stale::{FetchOutcome, RequestTicket};
use crate::trackview_graph::{TrackGraph, TrackSegment};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use trackview_env::ChunkedArrayStore;

// ============================================================================
// CACHES
// ============================================================================

/// Session-scoped record of what has already been fetched.
///
/// Append-only until [`FetchCaches::clear`] (the "clear selection" event).
#[derive(Debug, Clone, Default)]
pub struct FetchCaches {
    fetched_points: HashSet<u64>,
    fetched_roots: HashSet<u64>,
    added_tracks: HashSet<u64>,
}

impl FetchCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_point_fetched(&self, point_id: u64) -> bool {
        self.fetched_points.contains(&point_id)
    }

    pub fn is_root_fetched(&self, track_id: u64) -> bool {
        self.fetched_roots.contains(&track_id)
    }

    pub fn is_track_added(&self, track_id: u64) -> bool {
        self.added_tracks.contains(&track_id)
    }

    pub fn fetched_point_count(&self) -> usize {
        self.fetched_points.len()
    }

    pub fn added_track_count(&self) -> usize {
        self.added_tracks.len()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.fetched_points.clear();
        self.fetched_roots.clear();
        self.added_tracks.clear();
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// What a failed read was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchSubject {
    /// Owning tracks of a seed point
    Point(u64),
    /// Lineage row of a track
    Lineage(u64),
    /// Points of a track segment
    Segment(u64),
}

/// One read that failed during a traversal.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub subject: FetchSubject,
    pub error: TrackError,
}

/// Outcome of one traversal.
#[derive(Debug, Clone, Default)]
pub struct LineageReport {
    /// Newly fetched segments, ordered by track id
    pub segments: Vec<TrackSegment>,

    /// Reads that failed; their subjects were not committed
    pub failures: Vec<FetchFailure>,

    /// Seed points skipped because they were already fetched
    pub skipped_points: usize,
}

impl LineageReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn track_ids(&self) -> Vec<u64> {
        self.segments.iter().map(|s| s.track_id).collect()
    }
}

/// Everything read by the fetch step, not yet committed.
#[derive(Debug, Default)]
struct LineageBatch {
    /// Seed point -> owning track ids (resolved seeds only)
    owners: BTreeMap<u64, Vec<u64>>,
    /// Root track -> lineage set including the root (complete expansions only)
    lineages: BTreeMap<u64, BTreeSet<u64>>,
    /// Root track -> tracks reached before an expansion read failed
    partial: BTreeMap<u64, BTreeSet<u64>>,
    segments: Vec<TrackSegment>,
    failures: Vec<FetchFailure>,
    skipped_points: usize,
}

// ============================================================================
// FETCHER
// ============================================================================

/// Materializes lineages of selected points without refetching segments.
pub struct LineageFetcher<S: ChunkedArrayStore> {
    graph: Arc<TrackGraph<S>>,
    expansion: LineageExpansion,
}

impl<S: ChunkedArrayStore> LineageFetcher<S> {
    pub fn new(graph: Arc<TrackGraph<S>>, expansion: LineageExpansion) -> Self {
        Self { graph, expansion }
    }

    pub fn graph(&self) -> &Arc<TrackGraph<S>> {
        &self.graph
    }

    pub fn expansion(&self) -> LineageExpansion {
        self.expansion
    }

    /// Fetches every not-yet-added segment reachable from `seeds` and commits it to `caches`.
    ///
    /// # Returns
    /// * `Ok(report)` - segments plus per-read failures (siblings of a failed read still complete)
    /// * `Err(TrackError::OutOfRange)` - a seed is not a valid point id
    pub async fn traverse(&self, seeds: &[u64], caches: &mut FetchCaches) -> Result<LineageReport, TrackError> {
        let batch = self.fetch(seeds, caches).await?;
        Ok(commit(batch, caches))
    }

    /// Like [`traverse`](Self::traverse), but commits nothing if `ticket` went stale meanwhile.
    pub async fn traverse_tracked(
        &self,
        seeds: &[u64],
        caches: &mut FetchCaches,
        ticket: &RequestTicket,
    ) -> Result<FetchOutcome<LineageReport>, TrackError> {
        let batch = self.fetch(seeds, caches).await?;
        if ticket.is_stale() {
            debug!("discarding stale lineage fetch {} ({} segments)", ticket.id(), batch.segments.len());
            return Ok(FetchOutcome::Discarded);
        }
        Ok(FetchOutcome::Current(commit(batch, caches)))
    }

    async fn fetch(&self, seeds: &[u64], caches: &FetchCaches) -> Result<LineageBatch, TrackError> {
        let mut batch = LineageBatch::default();

        // 1. seeds -> owning tracks
        let mut pending: Vec<u64> = Vec::new();
        for &point in seeds {
            if caches.is_point_fetched(point) || pending.contains(&point) {
                batch.skipped_points += 1;
            } else {
                pending.push(point);
            }
        }
        let owners = join_all(pending.iter().map(|&p| self.graph.track_ids_for_point(p))).await;
        for (point, result) in pending.into_iter().zip(owners) {
            match result {
                Ok(tracks) => {
                    batch.owners.insert(point, tracks);
                }
                Err(e @ TrackError::OutOfRange { .. }) => return Err(e),
                Err(error) => batch.failures.push(FetchFailure {
                    subject: FetchSubject::Point(point),
                    error,
                }),
            }
        }

        // 2. roots -> lineage sets
        let roots: BTreeSet<u64> = batch
            .owners
            .values()
            .flatten()
            .copied()
            .filter(|&t| !caches.is_root_fetched(t))
            .collect();
        match self.expansion {
            LineageExpansion::StoredClosure => self.expand_stored(&roots, &mut batch).await,
            LineageExpansion::BreadthFirst => self.expand_breadth_first(&roots, &mut batch).await,
        }

        // 3. segments
        let wanted: BTreeSet<u64> = batch
            .lineages
            .values()
            .chain(batch.partial.values())
            .flatten()
            .copied()
            .filter(|&t| !caches.is_track_added(t))
            .collect();
        debug!(
            "lineage fetch: {} seeds, {} roots, {} new segments",
            batch.owners.len(),
            roots.len(),
            wanted.len()
        );
        let results = join_all(wanted.iter().map(|&t| self.graph.points_for_track(t))).await;
        for (track, result) in wanted.into_iter().zip(results) {
            match result {
                Ok(segment) => batch.segments.push(segment),
                Err(error) => {
                    warn!("failed to fetch points for track {}: {}", track, error);
                    batch.failures.push(FetchFailure {
                        subject: FetchSubject::Segment(track),
                        error,
                    });
                }
            }
        }
        Ok(batch)
    }

    /// One lookup per root; each row is taken to hold the whole lineage.
    async fn expand_stored(&self, roots: &BTreeSet<u64>, batch: &mut LineageBatch) {
        let rows = join_all(roots.iter().map(|&t| self.graph.lineage_for_track(t))).await;
        for (&root, result) in roots.iter().zip(rows) {
            match result {
                Ok(row) => {
                    let mut set: BTreeSet<u64> = row.neighbors.into_iter().collect();
                    set.insert(root);
                    batch.lineages.insert(root, set);
                }
                Err(error) => batch.failures.push(FetchFailure {
                    subject: FetchSubject::Lineage(root),
                    error,
                }),
            }
        }
    }

    /// Breadth-first closure over the relation, treated as undirected.
    ///
    /// A track's neighbors are the columns of its own row plus every track
    /// whose row lists it (the graph's referrer index). Terminates on cyclic
    /// and self-referential rows. Rows read for one root are reused for later
    /// roots of the same traversal.
    async fn expand_breadth_first(&self, roots: &BTreeSet<u64>, batch: &mut LineageBatch) {
        if roots.is_empty() {
            return;
        }
        let referrers = match self.graph.lineage_referrers().await {
            Ok(referrers) => Some(referrers),
            Err(error) => {
                warn!("failed to index lineage referrers: {}", error);
                batch.failures.extend(roots.iter().map(|&root| FetchFailure {
                    subject: FetchSubject::Lineage(root),
                    error: error.clone(),
                }));
                None
            }
        };

        let mut rows: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        let mut failed: BTreeSet<u64> = BTreeSet::new();

        for &root in roots {
            let mut visited: BTreeSet<u64> = BTreeSet::from([root]);
            let mut frontier: Vec<u64> = vec![root];
            let mut complete = referrers.is_some();

            while !frontier.is_empty() {
                let unread: Vec<u64> = frontier
                    .iter()
                    .copied()
                    .filter(|t| !rows.contains_key(t) && !failed.contains(t))
                    .collect();
                let results = join_all(unread.iter().map(|&t| self.graph.lineage_for_track(t))).await;
                for (track, result) in unread.into_iter().zip(results) {
                    match result {
                        Ok(row) => {
                            rows.insert(track, row.neighbors);
                        }
                        Err(error) => {
                            failed.insert(track);
                            batch.failures.push(FetchFailure {
                                subject: FetchSubject::Lineage(track),
                                error,
                            });
                        }
                    }
                }

                let mut next = Vec::new();
                for track in frontier {
                    let Some(neighbors) = rows.get(&track) else {
                        complete = false;
                        continue;
                    };
                    let referring = referrers.and_then(|r| r.get(&track)).map(Vec::as_slice).unwrap_or_default();
                    for &neighbor in neighbors.iter().chain(referring) {
                        if visited.insert(neighbor) {
                            next.push(neighbor);
                        }
                    }
                }
                frontier = next;
            }

            if complete {
                batch.lineages.insert(root, visited);
            } else {
                batch.partial.insert(root, visited);
            }
        }
    }
}

/// Applies a fetched batch to the caches.
fn commit(batch: LineageBatch, caches: &mut FetchCaches) -> LineageReport {
    let mut segments = Vec::with_capacity(batch.segments.len());
    for segment in batch.segments {
        if caches.added_tracks.insert(segment.track_id) {
            segments.push(segment);
        } else {
            warn!("track {} already added, ignoring duplicate", segment.track_id);
        }
    }
    for (&root, tracks) in &batch.lineages {
        if tracks.iter().all(|t| caches.added_tracks.contains(t)) {
            caches.fetched_roots.insert(root);
        }
    }
    for (&point, tracks) in &batch.owners {
        if tracks.iter().all(|t| caches.fetched_roots.contains(t)) {
            caches.fetched_points.insert(point);
        }
    }
    segments.sort_by_key(|s| s.track_id);

    if !batch.failures.is_empty() {
        warn!("lineage fetch finished with {} failed reads", batch.failures.len());
    }
    LineageReport {
        segments,
        failures: batch.failures,
        skipped_points: batch.skipped_points,
    }
}

// ============================================================================
// TESTS
// ============================================================================
