//! The "GRAPH" Engine - point/track query surface of one dataset
//!
//! Composes the three CSR relations of a tracking dataset with its raw
//! per-timepoint coordinate array:
//! - `points`: `[num_times, max_points * stride]`, unfilled slots hold a sentinel
//! - `points_to_tracks`: point id -> owning track ids
//! - `tracks_to_points`: track id -> point ids, xyz payload
//! - `tracks_to_tracks`: track id -> related track ids, parent-id payload
//!
//! Global point ids are `timepoint * max_points + slot`.

use crate::config::TrackGraphConfig;
use crate::error::TrackError;
use crate::trackview_relation::{Payload, PayloadKind, SparseRelation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use trackview_env::{join_path, ArrayMeta, ChunkedArrayStore, StoreError};

/// Values at or below this mark unfilled slots (`-9999.9` in float data, `-127` in int8 data).
pub const SENTINEL_THRESHOLD: f32 = -127.0;

/// Span of the viewer-space cube the dataset is scaled into.
pub const VIEWER_SPAN: f32 = 100.0;

/// Offset added to every scaled coordinate.
pub const VIEWER_OFFSET: f32 = 370.0;

// ============================================================================
// SCALE
// ============================================================================

/// Re-centering and re-scaling of raw coordinates into viewer space.
///
/// Coordinate component `i` becomes `(raw - mean[i]) / extent * 100 + 370`.
/// A fourth (size) component is scaled by `100 / extent` without offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatasetScale {
    /// Mean per stored coordinate component
    pub mean: [f32; 3],

    /// Largest absolute deviation from the mean over all axes
    pub extent: f32,
}

impl Default for DatasetScale {
    fn default() -> Self {
        Self {
            mean: [0.0; 3],
            extent: VIEWER_SPAN,
        }
    }
}

impl DatasetScale {
    /// Reads the scale from the `points` array attributes.
    ///
    /// Returns `Ok(None)` when no scale attribute is present. Missing
    /// individual fields default to `mean = 0`, `extent = 100`. Components
    /// are matched to `mean_<axis>` through the `fields` attribute when the
    /// array has one (`["z", "y", "x"]`), otherwise in `x, y, z` order.
    pub fn from_attrs(meta: &ArrayMeta) -> Result<Option<Self>, TrackError> {
        const KEYS: [&str; 5] = ["mean_x", "mean_y", "mean_z", "extend_xyz", "extent_xyz"];
        if !KEYS.iter().any(|k| meta.attrs.contains_key(*k)) {
            return Ok(None);
        }

        let fields: Vec<String> = match meta.attrs.get("fields") {
            Some(Value::Array(names)) => names.iter().filter_map(|n| n.as_str().map(str::to_string)).collect(),
            _ => vec!["x".into(), "y".into(), "z".into()],
        };

        let mut scale = Self::default();
        for (component, mean) in scale.mean.iter_mut().enumerate() {
            if let Some(axis) = fields.get(component) {
                *mean = meta.attr_f64(&format!("mean_{}", axis)).unwrap_or(0.0) as f32;
            }
        }
        if let Some(extent) = meta.attr_f64("extend_xyz").or_else(|| meta.attr_f64("extent_xyz")) {
            scale.extent = extent as f32;
        }
        if !(scale.extent.is_finite() && scale.extent > 0.0) {
            return Err(TrackError::Config(format!("dataset extent must be positive, got {}", scale.extent)));
        }
        Ok(Some(scale))
    }

    /// Scales one coordinate component.
    pub fn apply_component(&self, component: usize, raw: f32) -> f32 {
        (raw - self.mean[component]) / self.extent * VIEWER_SPAN + VIEWER_OFFSET
    }

    /// Scales a flat buffer of points with `stride` values each, in place.
    pub fn apply(&self, buffer: &mut [f32], stride: usize) {
        for point in buffer.chunks_exact_mut(stride) {
            for (component, value) in point.iter_mut().enumerate() {
                *value = if component < 3 {
                    self.apply_component(component, *value)
                } else {
                    *value / self.extent * VIEWER_SPAN
                };
            }
        }
    }
}

// ============================================================================
// QUERY RESULTS
// ============================================================================

/// Non-fatal data-integrity anomaly found while truncating a timepoint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityWarning {
    /// Index of the first sentinel value in the row
    pub sentinel_index: usize,

    /// Values kept after rounding down to a stride multiple
    pub kept: usize,
}

/// Valid points of one timepoint, in viewer space.
#[derive(Debug, Clone, PartialEq)]
pub struct TimepointPoints {
    pub timepoint: u64,

    /// Flat buffer, `stride` values per point
    pub positions: Vec<f32>,

    pub stride: usize,

    /// Set when the sentinel boundary was not stride-aligned
    pub integrity: Option<IntegrityWarning>,
}

impl TimepointPoints {
    /// Number of valid points.
    pub fn len(&self) -> usize {
        self.positions.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Values of point `slot`.
    pub fn point(&self, slot: usize) -> Option<&[f32]> {
        self.positions.get(slot * self.stride..(slot + 1) * self.stride)
    }
}

/// Points of one track, in viewer space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub track_id: u64,

    /// Flat xyz buffer, 3 values per point
    pub positions: Vec<f32>,

    /// Global point ids, aligned with `positions`
    pub point_ids: Vec<u64>,
}

impl TrackSegment {
    pub fn len(&self) -> usize {
        self.point_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point_ids.is_empty()
    }

    /// Timepoint of each point.
    pub fn timepoints(&self, max_points: u64) -> Vec<u64> {
        self.point_ids.iter().map(|id| id / max_points.max(1)).collect()
    }

    /// First and last timepoint covered by the segment.
    pub fn time_span(&self, max_points: u64) -> Option<(u64, u64)> {
        let times = self.timepoints(max_points);
        Some((*times.iter().min()?, *times.iter().max()?))
    }
}

/// One row of the lineage relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRow {
    pub track_id: u64,

    /// Related track ids
    pub neighbors: Vec<u64>,

    /// Edge payload (parent track id of each neighbor), when stored
    pub parents: Option<Vec<i64>>,
}

// ============================================================================
// TRACK GRAPH
// ============================================================================

/// Read-only query surface over one tracking dataset.
///
/// Constructed once per dataset load and replaced wholesale when another
/// dataset is opened. The only state mutated after construction is the
/// `indptr` cache inside each relation and the lineage referrer index.
pub struct TrackGraph<S: ChunkedArrayStore> {
    store: Arc<S>,
    config: TrackGraphConfig,
    num_times: u64,
    row_len: u64,
    stride: usize,
    max_points: u64,
    scale: Option<DatasetScale>,
    points_to_tracks: SparseRelation<S>,
    tracks_to_points: SparseRelation<S>,
    tracks_to_tracks: SparseRelation<S>,
    referrers: OnceCell<BTreeMap<u64, Vec<u64>>>,
}

impl<S: ChunkedArrayStore> TrackGraph<S> {
    /// Opens a dataset, resolving stride and scale from the `points` attributes.
    pub async fn open(store: Arc<S>, config: TrackGraphConfig) -> Result<Self, TrackError> {
        let points = store.array_meta(&config.points).await?;
        if points.shape.len() != 2 {
            return Err(StoreError::corrupt(&config.points, format!("expected 2D array, got shape {:?}", points.shape)).into());
        }

        let stride = match points.attr_u64("values_per_point") {
            None => 3,
            Some(v @ (3 | 4)) => v as usize,
            Some(v) => return Err(TrackError::Config(format!("values_per_point must be 3 or 4, got {}", v))),
        };
        let row_len = points.row_len();
        if row_len % stride as u64 != 0 {
            return Err(StoreError::corrupt(
                &config.points,
                format!("row length {} is not a multiple of stride {}", row_len, stride),
            )
            .into());
        }
        let num_times = points.rows();
        let max_points = row_len / stride as u64;
        let scale = DatasetScale::from_attrs(&points)?;

        let points_to_tracks = SparseRelation::open(Arc::clone(&store), &config.points_to_tracks, None).await?;
        let tracks_to_points =
            SparseRelation::open(Arc::clone(&store), &config.tracks_to_points, Some(PayloadKind::Float)).await?;
        let lineage_payload = match store.array_meta(&join_path(&config.tracks_to_tracks, "data")).await {
            Ok(_) => Some(PayloadKind::Int),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let tracks_to_tracks = SparseRelation::open(Arc::clone(&store), &config.tracks_to_tracks, lineage_payload).await?;

        if points_to_tracks.rows() != num_times * max_points {
            warn!(
                "points_to_tracks has {} rows, points array implies {}",
                points_to_tracks.rows(),
                num_times * max_points
            );
        }

        info!(
            "opened dataset {}: {} timepoints, {} points/timepoint, stride {}, {} tracks, scale {:?}",
            store.location(),
            num_times,
            max_points,
            stride,
            tracks_to_points.rows(),
            scale
        );

        Ok(Self {
            store,
            config,
            num_times,
            row_len,
            stride,
            max_points,
            scale,
            points_to_tracks,
            tracks_to_points,
            tracks_to_tracks,
            referrers: OnceCell::new(),
        })
    }

    // ========================================================================
    // DIMENSIONS
    // ========================================================================

    pub fn num_times(&self) -> u64 {
        self.num_times
    }

    pub fn max_points_per_timepoint(&self) -> u64 {
        self.max_points
    }

    /// Values per point (3 or 4).
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Scale in effect, `None` for identity.
    pub fn scale(&self) -> Option<DatasetScale> {
        self.scale
    }

    /// Number of addressable point ids.
    pub fn num_points(&self) -> u64 {
        self.points_to_tracks.rows()
    }

    /// Number of track rows.
    pub fn num_tracks(&self) -> u64 {
        self.tracks_to_points.rows()
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    pub fn config(&self) -> &TrackGraphConfig {
        &self.config
    }

    /// Global id of `slot` at timepoint `t`.
    pub fn point_id(&self, t: u64, slot: u64) -> u64 {
        t * self.max_points + slot
    }

    /// Timepoint a point id belongs to.
    pub fn timepoint_of(&self, point_id: u64) -> u64 {
        point_id / self.max_points.max(1)
    }

    /// Slot of a point id within its timepoint.
    pub fn slot_of(&self, point_id: u64) -> u64 {
        point_id % self.max_points.max(1)
    }

    pub fn points_to_tracks(&self) -> &SparseRelation<S> {
        &self.points_to_tracks
    }

    pub fn tracks_to_points(&self) -> &SparseRelation<S> {
        &self.tracks_to_points
    }

    pub fn tracks_to_tracks(&self) -> &SparseRelation<S> {
        &self.tracks_to_tracks
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Valid points of timepoint `t`, scaled into viewer space.
    ///
    /// The row is cut at the first sentinel value. A cut that does not fall
    /// on a point boundary is rounded down and reported in `integrity`.
    pub async fn points_at_time(&self, t: u64) -> Result<TimepointPoints, TrackError> {
        if t >= self.num_times {
            return Err(TrackError::OutOfRange {
                what: "timepoint",
                index: t,
                len: self.num_times,
            });
        }
        debug!("fetching points at time {}", t);
        let mut positions = self
            .store
            .read_floats(&self.config.points, t * self.row_len..(t + 1) * self.row_len)
            .await?;

        let (end, integrity) = truncate_at_sentinel(&positions, self.stride);
        if let Some(warning) = integrity {
            warn!(
                "invalid points at time {}: sentinel at {} not divisible by {}, keeping {}",
                t, warning.sentinel_index, self.stride, warning.kept
            );
        }
        positions.truncate(end);
        if let Some(scale) = self.scale {
            scale.apply(&mut positions, self.stride);
        }

        Ok(TimepointPoints {
            timepoint: t,
            positions,
            stride: self.stride,
            integrity,
        })
    }

    /// Track ids owning `point_id`.
    pub async fn track_ids_for_point(&self, point_id: u64) -> Result<Vec<u64>, TrackError> {
        if point_id >= self.num_points() {
            return Err(TrackError::OutOfRange {
                what: "point",
                index: point_id,
                len: self.num_points(),
            });
        }
        Ok(self.points_to_tracks.get_row(point_id).await?.columns)
    }

    /// Points of `track_id`, scaled into viewer space.
    pub async fn points_for_track(&self, track_id: u64) -> Result<TrackSegment, TrackError> {
        self.check_track(track_id, self.num_tracks())?;
        let row = self.tracks_to_points.get_row(track_id).await?;
        let relation = self.tracks_to_points.name();

        let (values, width) = match row.payload {
            Some(Payload::Float { values, width }) => (values, width),
            _ => return Err(TrackError::inconsistent(relation, "missing coordinate payload")),
        };
        if width < 3 {
            return Err(TrackError::inconsistent(relation, format!("payload width {} < 3", width)));
        }
        if values.len() != row.columns.len() * width {
            return Err(TrackError::inconsistent(
                relation,
                format!("{} positions for {} point ids", values.len() / width, row.columns.len()),
            ));
        }

        let mut positions: Vec<f32> = values.chunks_exact(width).flat_map(|p| p[..3].iter().copied()).collect();
        if let Some(scale) = self.scale {
            scale.apply(&mut positions, 3);
        }

        Ok(TrackSegment {
            track_id,
            positions,
            point_ids: row.columns,
        })
    }

    /// Row `track_id` of the lineage relation.
    pub async fn lineage_for_track(&self, track_id: u64) -> Result<LineageRow, TrackError> {
        self.check_track(track_id, self.tracks_to_tracks.rows())?;
        let row = self.tracks_to_tracks.get_row(track_id).await?;
        let parents = match row.payload {
            Some(Payload::Int(values)) => Some(values),
            Some(Payload::Float { values, .. }) => Some(values.into_iter().map(|v| v as i64).collect()),
            None => None,
        };
        Ok(LineageRow {
            track_id,
            neighbors: row.columns,
            parents,
        })
    }

    /// Inverse of the lineage relation: track id -> tracks whose rows list it.
    ///
    /// Built from one read of the whole relation on first use and kept for
    /// the lifetime of the graph. Concurrent callers share a single load; a
    /// failed load is retried by the next caller.
    pub async fn lineage_referrers(&self) -> Result<&BTreeMap<u64, Vec<u64>>, TrackError> {
        self.referrers
            .get_or_try_init(|| async {
                let relation = &self.tracks_to_tracks;
                let all = relation.get_row_range(0, relation.rows()).await?;
                let mut referrers: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
                for row in 0..relation.rows() {
                    let bounds = relation.row_bounds(row).await?;
                    let columns = all
                        .columns
                        .get(bounds.start as usize..bounds.end as usize)
                        .unwrap_or_default();
                    for &column in columns.iter().filter(|&&c| c != row) {
                        referrers.entry(column).or_default().push(row);
                    }
                }
                debug!(
                    "indexed {} lineage entries by column ({} referenced tracks)",
                    all.columns.len(),
                    referrers.len()
                );
                Ok::<_, TrackError>(referrers)
            })
            .await
    }

    fn check_track(&self, track_id: u64, len: u64) -> Result<(), TrackError> {
        if track_id >= len {
            return Err(TrackError::OutOfRange {
                what: "track",
                index: track_id,
                len,
            });
        }
        Ok(())
    }
}

/// Length to keep from a raw timepoint row, and a warning if it had to be rounded.
pub fn truncate_at_sentinel(row: &[f32], stride: usize) -> (usize, Option<IntegrityWarning>) {
    match row.iter().position(|&v| v <= SENTINEL_THRESHOLD) {
        None => (row.len() - row.len() % stride, None),
        Some(index) if index % stride == 0 => (index, None),
        Some(index) => {
            let kept = index - index % stride;
            (
                kept,
                Some(IntegrityWarning {
                    sentinel_index: index,
                    kept,
                }),
            )
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_store, sample_xyz};
    use approx::assert_relative_eq;
    use serde_json::json;
    use trackview_env::MemoryStore;

    async fn sample_graph() -> TrackGraph<MemoryStore> {
        TrackGraph::open(Arc::new(sample_store()), TrackGraphConfig::default())
            .await
            .unwrap()
    }

    /// Single-timepoint dataset with one raw row and empty relations.
    fn single_row_store(row: Vec<f32>) -> MemoryStore {
        let mut store = MemoryStore::new("row");
        let len = row.len() as u64;
        store.insert_floats("points", vec![1, len], row).unwrap();
        for group in ["points_to_tracks", "tracks_to_points", "tracks_to_tracks"] {
            store.insert_ints(&format!("{}/indptr", group), vec![1], vec![0]).unwrap();
            store.insert_ints(&format!("{}/indices", group), vec![0], vec![]).unwrap();
        }
        store.insert_floats("tracks_to_points/data", vec![0, 3], vec![]).unwrap();
        store
    }

    #[test]
    fn test_truncate_at_sentinel() {
        assert_eq!(truncate_at_sentinel(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, -200.0, 0.0, 0.0], 3), (6, None));
        let (end, warning) = truncate_at_sentinel(&[1.0, 2.0, 3.0, 4.0, 5.0, -200.0, 0.0, 0.0, 0.0], 3);
        assert_eq!(end, 3);
        assert_eq!(warning, Some(IntegrityWarning { sentinel_index: 5, kept: 3 }));
        assert_eq!(truncate_at_sentinel(&[1.0, 2.0, 3.0, 4.0], 4), (4, None));
        assert_eq!(truncate_at_sentinel(&[-127.0, 0.0, 0.0], 3), (0, None));
    }

    #[tokio::test]
    async fn test_open_dimensions() {
        let graph = sample_graph().await;
        assert_eq!(graph.num_times(), 3);
        assert_eq!(graph.max_points_per_timepoint(), 3);
        assert_eq!(graph.stride(), 3);
        assert_eq!(graph.num_points(), 9);
        assert_eq!(graph.num_tracks(), 5);
        assert!(graph.scale().is_none());
        assert!(graph.tracks_to_tracks().has_payload());

        assert_eq!(graph.point_id(2, 1), 7);
        assert_eq!(graph.timepoint_of(7), 2);
        assert_eq!(graph.slot_of(7), 1);
    }

    #[tokio::test]
    async fn test_points_at_time() {
        let graph = sample_graph().await;

        let t0 = graph.points_at_time(0).await.unwrap();
        assert_eq!(t0.len(), 2);
        assert_eq!(t0.positions, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert!(t0.integrity.is_none());

        let t2 = graph.points_at_time(2).await.unwrap();
        assert_eq!(t2.len(), 3);
        assert_eq!(t2.point(2), Some(&sample_xyz(8)[..]));

        assert!(matches!(
            graph.points_at_time(3).await,
            Err(TrackError::OutOfRange { what: "timepoint", .. })
        ));
    }

    #[tokio::test]
    async fn test_points_at_time_rounds_unaligned_sentinel() {
        let store = single_row_store(vec![1.0, 2.0, 3.0, 4.0, 5.0, -200.0, 0.0, 0.0, 0.0]);
        let graph = TrackGraph::open(Arc::new(store), TrackGraphConfig::default()).await.unwrap();

        let points = graph.points_at_time(0).await.unwrap();
        assert_eq!(points.positions, vec![1.0, 2.0, 3.0]);
        assert_eq!(points.integrity.map(|w| w.sentinel_index), Some(5));
    }

    #[tokio::test]
    async fn test_points_at_time_aligned_sentinel() {
        let store = single_row_store(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, -200.0, 0.0, 0.0]);
        let graph = TrackGraph::open(Arc::new(store), TrackGraphConfig::default()).await.unwrap();

        let points = graph.points_at_time(0).await.unwrap();
        assert_eq!(points.positions, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(points.integrity.is_none());
    }

    #[tokio::test]
    async fn test_scale_applied() {
        let mut store = single_row_store(vec![60.0, 0.0, -20.0, 10.0, -9999.9, 0.0, 0.0, 0.0]);
        store.set_attr("points", "values_per_point", json!(4)).unwrap();
        store.set_attr("points", "mean_x", json!(10.0)).unwrap();
        store.set_attr("points", "extent_xyz", json!(50.0)).unwrap();
        let graph = TrackGraph::open(Arc::new(store), TrackGraphConfig::default()).await.unwrap();

        let points = graph.points_at_time(0).await.unwrap();
        assert_eq!(points.stride, 4);
        assert_eq!(points.len(), 1);
        assert_relative_eq!(points.positions[0], 470.0);
        assert_relative_eq!(points.positions[1], 370.0);
        assert_relative_eq!(points.positions[2], 330.0);
        assert_relative_eq!(points.positions[3], 20.0);
    }

    #[test]
    fn test_scale_from_attrs() {
        let mut meta = ArrayMeta::new("points", vec![1, 3], trackview_env::DType::Float32);
        assert_eq!(DatasetScale::from_attrs(&meta).unwrap(), None);

        meta.attrs.insert("fields".into(), json!(["z", "y", "x"]));
        meta.attrs.insert("mean_z".into(), json!(5.0));
        meta.attrs.insert("mean_x".into(), json!(1.0));
        meta.attrs.insert("extend_xyz".into(), json!(20.0));
        let scale = DatasetScale::from_attrs(&meta).unwrap().unwrap();
        assert_eq!(scale.mean, [5.0, 0.0, 1.0]);
        assert_eq!(scale.extent, 20.0);

        meta.attrs.insert("extend_xyz".into(), json!(0.0));
        assert!(matches!(DatasetScale::from_attrs(&meta), Err(TrackError::Config(_))));
    }

    #[tokio::test]
    async fn test_track_ids_for_point() {
        let graph = sample_graph().await;
        assert_eq!(graph.track_ids_for_point(4).await.unwrap(), vec![4]);
        assert_eq!(graph.track_ids_for_point(7).await.unwrap(), vec![3]);
        assert!(graph.track_ids_for_point(2).await.unwrap().is_empty());
        assert!(matches!(
            graph.track_ids_for_point(9).await,
            Err(TrackError::OutOfRange { what: "point", .. })
        ));
    }

    #[tokio::test]
    async fn test_points_for_track() {
        let graph = sample_graph().await;
        let segment = graph.points_for_track(4).await.unwrap();
        assert_eq!(segment.point_ids, vec![1, 4, 8]);
        assert_eq!(segment.positions[6..9], sample_xyz(8));
        assert_eq!(segment.timepoints(3), vec![0, 1, 2]);
        assert_eq!(segment.time_span(3), Some((0, 2)));

        assert!(graph.points_for_track(0).await.unwrap().is_empty());
        assert!(matches!(
            graph.points_for_track(5).await,
            Err(TrackError::OutOfRange { what: "track", .. })
        ));
    }

    #[tokio::test]
    async fn test_points_for_track_length_mismatch() {
        let mut store = sample_store();
        // 6 coordinate rows for 7 point ids
        let data: Vec<f32> = (0..18).map(|v| v as f32).collect();
        store.insert_floats("tracks_to_points/data", vec![6, 3], data).unwrap();
        let graph = TrackGraph::open(Arc::new(store), TrackGraphConfig::default()).await.unwrap();

        assert!(graph.points_for_track(1).await.is_ok());
        assert!(matches!(
            graph.points_for_track(4).await,
            Err(TrackError::InconsistentRelation { .. })
        ));
    }

    #[tokio::test]
    async fn test_lineage_for_track() {
        let graph = sample_graph().await;
        let row = graph.lineage_for_track(1).await.unwrap();
        assert_eq!(row.neighbors, vec![2, 3]);
        assert_eq!(row.parents, Some(vec![1, 1]));
        assert!(graph.lineage_for_track(4).await.unwrap().neighbors.is_empty());
    }

    #[tokio::test]
    async fn test_lineage_referrers() {
        let graph = sample_graph().await;
        let referrers = graph.lineage_referrers().await.unwrap();
        assert_eq!(referrers.get(&1), Some(&vec![2, 3]));
        assert_eq!(referrers.get(&2), Some(&vec![1]));
        assert_eq!(referrers.get(&3), Some(&vec![1]));
        assert!(!referrers.contains_key(&4));
    }

    #[tokio::test]
    async fn test_lineage_without_payload() {
        let store = single_row_store(vec![0.0; 3]);
        let graph = TrackGraph::open(Arc::new(store), TrackGraphConfig::default()).await.unwrap();
        assert!(!graph.tracks_to_tracks().has_payload());
    }

    #[tokio::test]
    async fn test_open_rejects_bad_stride() {
        let mut store = single_row_store(vec![0.0; 6]);
        store.set_attr("points", "values_per_point", json!(5)).unwrap();
        assert!(matches!(
            TrackGraph::open(Arc::new(store), TrackGraphConfig::default()).await,
            Err(TrackError::Config(_))
        ));
    }
}
