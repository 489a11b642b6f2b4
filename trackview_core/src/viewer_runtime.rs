//! Viewer Runtime - Orchestrates the track graph, lineage fetcher and selection budget.
//!
//! This module is the calling layer between interactive input (timepoint
//! changes, committed selections) and the engines that read the dataset.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ViewerSession                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │            Store: ChunkedArrayStore                   │   │
//! │  │  • array_meta() → shapes and scale attributes        │   │
//! │  │  • read_ints() / read_floats() → CSR + point rows    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                               │
//! │  ┌─────────────┐ ┌─────────────────┐ ┌──────────────────┐   │
//! │  │ TrackGraph  │ │ LineageFetcher  │ │ RequestTrackers  │   │
//! │  │ (points,    │ │ (+ FetchCaches, │ │ (timepoint,      │   │
//! │  │  relations) │ │  loaded tracks) │ │  lineage)        │   │
//! │  └─────────────┘ └─────────────────┘ └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackview_core::{TrackGraphConfig, ViewerConfig, ViewerSession};
//! use trackview_env::ZarrDirStore;
//!
//! let store = ZarrDirStore::shared("/data/tracks.zarr");
//! let mut session = ViewerSession::open(store, TrackGraphConfig::default(), ViewerConfig::default()).await?;
//!
//! let points = session.load_timepoint(session.timepoint()).await?;
//! let plan = session.plan_selection(&[0, 4, 7])?;
//! if !plan.exceeds_budget {
//!     session.fetch_lineage(&plan.point_ids).await?;
//! }
//! ```

use crate::config::{TrackGraphConfig, ViewerConfig};
use crate::error::TrackError;
use crate::stale::{FetchOutcome, RequestTracker};
use crate::trackview_graph::{TimepointPoints, TrackGraph, TrackSegment};
use crate::trackview_lineage::{FetchCaches, LineageFetcher, LineageReport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use trackview_env::ChunkedArrayStore;

/// Global point ids of a prospective selection and how many are new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPlan {
    /// Ascending, duplicate-free
    pub point_ids: Vec<u64>,

    /// Ids whose lineage has not been fetched yet
    pub new_count: usize,

    /// `new_count` is above `max_num_selected_cells`
    pub exceeds_budget: bool,
}

/// One interactive viewing session over one dataset.
pub struct ViewerSession<S: ChunkedArrayStore> {
    /// Configuration
    config: ViewerConfig,

    /// Dataset currently shown
    graph: Arc<TrackGraph<S>>,

    /// Lineage engine over `graph`
    fetcher: LineageFetcher<S>,

    /// What the lineage engine has already fetched
    caches: FetchCaches,

    /// Displayed timepoint, always below `num_times` (or 0)
    timepoint: u64,

    timepoint_requests: RequestTracker,
    lineage_requests: RequestTracker,

    /// Track segments shown, by track id
    segments: BTreeMap<u64, TrackSegment>,
}

impl<S: ChunkedArrayStore> ViewerSession<S> {
    /// Opens the dataset in `store` and starts a session on it.
    pub async fn open(store: Arc<S>, graph_config: TrackGraphConfig, config: ViewerConfig) -> Result<Self, TrackError> {
        config.validate()?;
        let graph = TrackGraph::open(store, graph_config).await?;
        Ok(Self::new(Arc::new(graph), config))
    }

    /// Creates a session over an already opened graph.
    pub fn new(graph: Arc<TrackGraph<S>>, config: ViewerConfig) -> Self {
        let fetcher = LineageFetcher::new(Arc::clone(&graph), config.lineage_expansion);
        Self {
            config,
            graph,
            fetcher,
            caches: FetchCaches::new(),
            timepoint: 0,
            timepoint_requests: RequestTracker::new(),
            lineage_requests: RequestTracker::new(),
            segments: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<TrackGraph<S>> {
        &self.graph
    }

    pub fn caches(&self) -> &FetchCaches {
        &self.caches
    }

    pub fn timepoint(&self) -> u64 {
        self.timepoint
    }

    /// Handle that invalidates in-flight lineage fetches.
    pub fn lineage_requests(&self) -> RequestTracker {
        self.lineage_requests.clone()
    }

    /// Handle that invalidates in-flight timepoint loads.
    pub fn timepoint_requests(&self) -> RequestTracker {
        self.timepoint_requests.clone()
    }

    // ========================================================================
    // DATASET
    // ========================================================================

    /// Swaps in another dataset.
    ///
    /// Everything fetched from the old dataset is dropped, in-flight requests
    /// are discarded and the timepoint is clamped to the new dataset.
    pub fn replace_dataset(&mut self, graph: Arc<TrackGraph<S>>) {
        info!(
            "replacing dataset {} with {} ({} timepoints)",
            self.graph.location(),
            graph.location(),
            graph.num_times()
        );
        self.timepoint_requests.invalidate();
        self.lineage_requests.invalidate();
        self.fetcher = LineageFetcher::new(Arc::clone(&graph), self.config.lineage_expansion);
        self.graph = graph;
        self.caches.clear();
        self.segments.clear();
        self.timepoint = self.clamp_timepoint(self.timepoint);
    }

    /// Sets the displayed timepoint, clamped to the dataset; returns the value used.
    pub fn set_timepoint(&mut self, t: u64) -> u64 {
        self.timepoint = self.clamp_timepoint(t);
        self.timepoint
    }

    fn clamp_timepoint(&self, t: u64) -> u64 {
        t.min(self.graph.num_times().saturating_sub(1))
    }

    /// Loads the points of timepoint `t`.
    ///
    /// Starting another load before this one finishes discards this one.
    pub async fn load_timepoint(&self, t: u64) -> Result<FetchOutcome<TimepointPoints>, TrackError> {
        let ticket = self.timepoint_requests.begin();
        let outcome = ticket.guard(self.graph.points_at_time(t)).await;
        match outcome {
            FetchOutcome::Current(points) => Ok(FetchOutcome::Current(points?)),
            FetchOutcome::Discarded => {
                debug!("discarding stale points of time {} (request {})", t, ticket.id());
                Ok(FetchOutcome::Discarded)
            }
        }
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    /// Converts point indices of the displayed timepoint to global ids.
    ///
    /// # Returns
    /// * `Ok(plan)` - ids, count of not yet fetched ids, budget verdict
    /// * `Err(TrackError::OutOfRange)` - an index is past the timepoint's slots
    pub fn plan_selection(&self, indices: &[usize]) -> Result<SelectionPlan, TrackError> {
        let slots = self.graph.max_points_per_timepoint();
        let mut point_ids = BTreeSet::new();
        for &index in indices {
            let slot = index as u64;
            if slot >= slots {
                return Err(TrackError::OutOfRange {
                    what: "slot",
                    index: slot,
                    len: slots,
                });
            }
            point_ids.insert(self.graph.point_id(self.timepoint, slot));
        }
        let new_count = point_ids.iter().filter(|&&id| !self.caches.is_point_fetched(id)).count();
        let exceeds_budget = new_count > self.config.max_num_selected_cells;
        if exceeds_budget {
            warn!(
                "{} new points selected, above the limit of {}",
                new_count, self.config.max_num_selected_cells
            );
        }
        Ok(SelectionPlan {
            point_ids: point_ids.into_iter().collect(),
            new_count,
            exceeds_budget,
        })
    }

    /// Fetches the lineage of `seeds` and adds the new segments to the session.
    ///
    /// A fetch that is overtaken by [`clear_selection`](Self::clear_selection)
    /// or a dataset swap is discarded without touching the session.
    pub async fn fetch_lineage(&mut self, seeds: &[u64]) -> Result<FetchOutcome<LineageReport>, TrackError> {
        let ticket = self.lineage_requests.begin();
        let outcome = self.fetcher.traverse_tracked(seeds, &mut self.caches, &ticket).await?;
        if let FetchOutcome::Current(report) = &outcome {
            for failure in &report.failures {
                warn!("lineage fetch failed for {:?}: {}", failure.subject, failure.error);
            }
            for segment in &report.segments {
                self.add_segment(segment.clone());
            }
            info!(
                "lineage of {} seeds: {} new segments, {} loaded",
                seeds.len(),
                report.segments.len(),
                self.segments.len()
            );
        }
        Ok(outcome)
    }

    /// Adds a segment to the display; returns false if the track was already shown.
    pub fn add_segment(&mut self, segment: TrackSegment) -> bool {
        if self.segments.contains_key(&segment.track_id) {
            warn!("track {} already loaded, ignoring", segment.track_id);
            return false;
        }
        self.segments.insert(segment.track_id, segment);
        true
    }

    pub fn segment(&self, track_id: u64) -> Option<&TrackSegment> {
        self.segments.get(&track_id)
    }

    /// Loaded segments, ordered by track id.
    pub fn segments(&self) -> impl Iterator<Item = &TrackSegment> {
        self.segments.values()
    }

    pub fn loaded_track_count(&self) -> usize {
        self.segments.len()
    }

    /// Drops every loaded segment and forgets what was fetched.
    pub fn clear_selection(&mut self) {
        self.lineage_requests.invalidate();
        self.caches.clear();
        self.segments.clear();
        debug!("selection cleared");
    }
}
