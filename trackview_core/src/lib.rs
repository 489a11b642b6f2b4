//! TrackView Core - Lineage navigation and point selection for cell-tracking datasets
//!
//! The viewer streams a large tracking dataset out of a chunked array store
//! and answers the questions an interactive client asks of it:
//! 1. **Where are the cells now?** Points of one timepoint, cut at the
//!    padding sentinel and scaled into viewer space (`TrackGraph`)
//! 2. **Where did this cell come from, and what did it become?** Every track
//!    segment in the lineage of a selection, each fetched once per session
//!    (`LineageFetcher`)
//! 3. **Which cells did the user mean?** Frustum (rectangle) and sphere
//!    cursor selection over the displayed points (`trackview_select`)
//!
//! All relations are CSR matrices read row by row through a
//! [`SparseRelation`]; their `indptr` arrays are loaded once and shared.

pub mod config;
pub mod error;
pub mod stale;
pub mod trackview_graph;
pub mod trackview_lineage;
pub mod trackview_relation;
pub mod trackview_select;
pub mod viewer_runtime;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use config::{LineageExpansion, TrackGraphConfig, ViewerConfig};
pub use error::TrackError;
pub use stale::{FetchOutcome, RequestTicket, RequestTracker};
pub use trackview_graph::{DatasetScale, LineageRow, TimepointPoints, TrackGraph, TrackSegment};
pub use trackview_lineage::{FetchCaches, FetchFailure, FetchSubject, LineageFetcher, LineageReport};
pub use trackview_relation::{Payload, PayloadKind, RowSlice, SparseRelation};
pub use trackview_select::{
    Camera, InputEvent, Key, PointSelectionMode, PointSelector, PointSet, PointSetId, PointSetRegistry,
    SelectionResult,
};
pub use viewer_runtime::{SelectionPlan, ViewerSession};
