//! Property tests over generated relations, rows and datasets.

use crate::oracle::{to_csr, DatasetOracle, OracleConfig};
use nalgebra::{Point2, Point3, Vector3};
use proptest::prelude::*;
use std::sync::Arc;
use trackview_core::trackview_graph::truncate_at_sentinel;
use trackview_core::trackview_select::{select_with_rectangle, CameraPose, OrthographicCamera};
use trackview_core::{Camera, Payload, PayloadKind, PointSet, PointSetRegistry, SparseRelation};
use trackview_env::MemoryStore;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

/// Relation `r` with a two-float payload `[column, row]` per entry.
fn relation_store(rows: &[Vec<u64>]) -> MemoryStore {
    let (indptr, indices) = to_csr(rows);
    let data: Vec<f32> = rows
        .iter()
        .enumerate()
        .flat_map(|(row, cols)| cols.iter().flat_map(move |&c| [c as f32, row as f32]))
        .collect();
    let nnz = indices.len() as u64;
    let mut store = MemoryStore::new("prop");
    store.insert_ints("r/indptr", vec![indptr.len() as u64], indptr).unwrap();
    store.insert_ints("r/indices", vec![nnz], indices).unwrap();
    store.insert_floats("r/data", vec![nnz, 2], data).unwrap();
    store
}

proptest! {
    #[test]
    fn test_rows_match_their_indptr_slices(
        rows in prop::collection::vec(prop::collection::vec(0u64..50, 0..6), 1..10)
    ) {
        let rt = runtime();
        let store = Arc::new(relation_store(&rows));
        let relation = rt
            .block_on(SparseRelation::open(store, "r", Some(PayloadKind::Float)))
            .unwrap();
        prop_assert_eq!(relation.rows(), rows.len() as u64);

        for (i, expected) in rows.iter().enumerate() {
            let row = rt.block_on(relation.get_row(i as u64)).unwrap();
            prop_assert_eq!(&row.columns, expected);
            let values: Vec<f32> = expected.iter().flat_map(|&c| [c as f32, i as f32]).collect();
            prop_assert_eq!(row.payload, Some(Payload::Float { values, width: 2 }));
        }

        let all = rt.block_on(relation.get_row_range(0, rows.len() as u64)).unwrap();
        let flat: Vec<u64> = rows.iter().flatten().copied().collect();
        prop_assert_eq!(all.columns, flat);
        prop_assert!(rt.block_on(relation.get_row(rows.len() as u64)).is_err());
    }

    #[test]
    fn test_sentinel_cut_is_point_aligned(
        stride in 3usize..=4,
        valid in 0usize..40,
        tail in 0usize..10,
    ) {
        let mut row = vec![1.0f32; valid];
        row.extend(std::iter::repeat(-9999.0).take(tail));
        let (kept, warning) = truncate_at_sentinel(&row, stride);

        prop_assert_eq!(kept % stride, 0);
        prop_assert!(kept <= valid);
        if tail > 0 {
            prop_assert_eq!(kept, valid - valid % stride);
            prop_assert_eq!(warning.is_some(), valid % stride != 0);
        } else {
            prop_assert!(warning.is_none());
        }
    }

    #[test]
    fn test_oracle_points_have_one_owner(seed in any::<u64>()) {
        let oracle = DatasetOracle::generate(seed, OracleConfig::default());
        let max_cells = oracle.config().max_cells as u64;
        for track in oracle.tracks() {
            prop_assert!(!track.point_ids.is_empty());
            prop_assert_eq!(track.point_ids.len(), track.positions.len());
            for pair in track.point_ids.windows(2) {
                // one point per timepoint, consecutive timepoints
                prop_assert_eq!(pair[1] / max_cells, pair[0] / max_cells + 1);
            }
            for &point in &track.point_ids {
                prop_assert_eq!(oracle.track_of_point(point), Some(track.id));
            }
        }
    }

    #[test]
    fn test_rectangle_corner_order_is_irrelevant(
        ax in -1.0f64..1.0, ay in -1.0f64..1.0,
        bx in -1.0f64..1.0, by in -1.0f64..1.0,
        points in prop::collection::vec(-20.0f32..20.0, 0..60),
    ) {
        let usable = points.len() - points.len() % 3;
        let mut registry = PointSetRegistry::new();
        registry.register(PointSet::new(points[..usable].to_vec(), 3));
        let camera = Camera::Orthographic(OrthographicCamera {
            pose: CameraPose::new(Point3::new(0.0, 0.0, 50.0), Point3::origin(), Vector3::y()),
            left: -20.0,
            right: 20.0,
            bottom: -20.0,
            top: 20.0,
            near: 1.0,
            far: 100.0,
            zoom: 1.0,
        });

        let a = Point2::new(ax, ay);
        let b = Point2::new(bx, by);
        let forward = select_with_rectangle(a, b, &camera, &registry, 1.0e7).unwrap();
        let mixed = select_with_rectangle(Point2::new(ax, by), Point2::new(bx, ay), &camera, &registry, 1.0e7).unwrap();
        let backward = select_with_rectangle(b, a, &camera, &registry, 1.0e7).unwrap();
        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(&forward, &mixed);
    }
}
