//! Ground truth oracle for simulation.
//!
//! The Oracle grows a synthetic cell-tracking dataset and remembers the
//! "God's eye view" of it:
//! - Every cell track with its points (random-walk positions)
//! - The division tree (each division ends a track and starts two children)
//! - The CSR arrays a converter would write for it

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use trackview_env::{MemoryStore, StoreError};

/// Fill value of unused point slots.
pub const PADDING: f32 = -9999.0;

/// Shape of the generated dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Number of timepoints (default: 12)
    pub num_times: u64,

    /// Cells alive at time 0 (default: 3)
    pub initial_cells: usize,

    /// Maximum cells per timepoint; also the slot count (default: 16)
    pub max_cells: usize,

    /// Per-cell, per-timepoint division probability (default: 0.15)
    pub division_probability: f64,

    /// Random-walk step standard deviation (default: 1.5)
    pub step_std: f64,

    /// Values per point: 3 (xyz) or 4 (xyz + size) (default: 3)
    pub values_per_point: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            num_times: 12,
            initial_cells: 3,
            max_cells: 16,
            division_probability: 0.15,
            step_std: 1.5,
            values_per_point: 3,
        }
    }
}

/// A ground truth track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTrack {
    /// Track id (ids start at 1; 0 means "no parent")
    pub id: u64,

    /// Track this one divided from
    pub parent: Option<u64>,

    /// Tracks created when this one divided
    pub children: Vec<u64>,

    /// Global point ids, one per timepoint, ascending
    pub point_ids: Vec<u64>,

    /// Position of each point
    pub positions: Vec<[f32; 3]>,
}

/// The Oracle - generates the dataset and answers ground truth queries.
pub struct DatasetOracle {
    seed: u64,
    config: OracleConfig,

    /// Tracks by id
    tracks: BTreeMap<u64, SimTrack>,

    /// Owning track of every used point id
    owners: BTreeMap<u64, u64>,

    /// Flat `[num_times, max_cells * values_per_point]` buffer
    points: Vec<f32>,
}

impl DatasetOracle {
    /// Grows a dataset from `seed`.
    pub fn generate(seed: u64, config: OracleConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let stride = config.values_per_point;
        let max_cells = config.max_cells.max(1);
        let row_len = max_cells * stride;

        let mut oracle = Self {
            seed,
            config: config.clone(),
            tracks: BTreeMap::new(),
            owners: BTreeMap::new(),
            points: vec![PADDING; config.num_times as usize * row_len],
        };

        let mut next_id = 1u64;
        let mut alive: Vec<(u64, Vector3<f64>)> = Vec::new();
        for _ in 0..config.initial_cells.min(max_cells) {
            let position = Vector3::new(
                rng.gen_range(100.0..900.0),
                rng.gen_range(100.0..900.0),
                rng.gen_range(100.0..900.0),
            );
            oracle.start_track(next_id, None);
            alive.push((next_id, position));
            next_id += 1;
        }

        for t in 0..config.num_times {
            for (slot, (track_id, position)) in alive.iter().enumerate() {
                let point_id = t * max_cells as u64 + slot as u64;
                let xyz = [position.x as f32, position.y as f32, position.z as f32];
                let offset = t as usize * row_len + slot * stride;
                oracle.points[offset..offset + 3].copy_from_slice(&xyz);
                if stride == 4 {
                    oracle.points[offset + 3] = 5.0;
                }
                oracle.owners.insert(point_id, *track_id);
                if let Some(track) = oracle.tracks.get_mut(track_id) {
                    track.point_ids.push(point_id);
                    track.positions.push(xyz);
                }
            }

            if t + 1 == config.num_times {
                break;
            }
            let mut next_alive = Vec::with_capacity(alive.len());
            let mut population = alive.len();
            for (track_id, position) in alive {
                if population < max_cells && rng.gen_bool(config.division_probability.clamp(0.0, 1.0)) {
                    population += 1;
                    let axis = random_step(&mut rng, config.step_std);
                    for sign in [1.0, -1.0] {
                        oracle.start_track(next_id, Some(track_id));
                        next_alive.push((next_id, clamp_position(position + axis * sign)));
                        next_id += 1;
                    }
                } else {
                    let walk = random_step(&mut rng, config.step_std);
                    next_alive.push((track_id, clamp_position(position + walk)));
                }
            }
            alive = next_alive;
        }
        oracle
    }

    fn start_track(&mut self, id: u64, parent: Option<u64>) {
        if let Some(parent) = parent.and_then(|p| self.tracks.get_mut(&p)) {
            parent.children.push(id);
        }
        self.tracks.insert(
            id,
            SimTrack {
                id,
                parent,
                children: Vec::new(),
                point_ids: Vec::new(),
                positions: Vec::new(),
            },
        );
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Number of track rows (track ids `0..num_tracks`, row 0 empty).
    pub fn num_tracks(&self) -> u64 {
        self.tracks.keys().next_back().map_or(1, |&id| id + 1)
    }

    pub fn num_points(&self) -> u64 {
        self.config.num_times * self.config.max_cells.max(1) as u64
    }

    pub fn track(&self, id: u64) -> Option<&SimTrack> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &SimTrack> {
        self.tracks.values()
    }

    /// Track owning `point_id`, if the slot is used.
    pub fn track_of_point(&self, point_id: u64) -> Option<u64> {
        self.owners.get(&point_id).copied()
    }

    /// Used point ids of timepoint `t`.
    pub fn point_ids_at(&self, t: u64) -> Vec<u64> {
        let max_cells = self.config.max_cells.max(1) as u64;
        self.owners.range(t * max_cells..(t + 1) * max_cells).map(|(&id, _)| id).collect()
    }

    /// Positions of the used slots of timepoint `t`.
    pub fn positions_at(&self, t: u64) -> Vec<[f32; 3]> {
        let stride = self.config.values_per_point;
        let row_len = self.config.max_cells.max(1) * stride;
        let max_cells = self.config.max_cells.max(1) as u64;
        self.point_ids_at(t)
            .into_iter()
            .map(|id| {
                let offset = t as usize * row_len + (id % max_cells) as usize * stride;
                [self.points[offset], self.points[offset + 1], self.points[offset + 2]]
            })
            .collect()
    }

    /// Ancestors and descendants of `track` (the stored lineage row).
    pub fn ancestors_and_descendants(&self, track: u64) -> BTreeSet<u64> {
        let mut related = BTreeSet::new();
        let mut cursor = self.tracks.get(&track).and_then(|t| t.parent);
        while let Some(id) = cursor {
            related.insert(id);
            cursor = self.tracks.get(&id).and_then(|t| t.parent);
        }
        let mut stack: Vec<u64> = self.tracks.get(&track).map(|t| t.children.clone()).unwrap_or_default();
        while let Some(id) = stack.pop() {
            if related.insert(id) {
                if let Some(t) = self.tracks.get(&id) {
                    stack.extend(&t.children);
                }
            }
        }
        related
    }

    /// Whole division tree containing `track`, including it.
    pub fn lineage_component(&self, track: u64) -> BTreeSet<u64> {
        let mut root = track;
        while let Some(parent) = self.tracks.get(&root).and_then(|t| t.parent) {
            root = parent;
        }
        let mut component = self.ancestors_and_descendants(root);
        if self.tracks.contains_key(&root) {
            component.insert(root);
        }
        component
    }

    // ========================================================================
    // CSR EXPORT
    // ========================================================================

    /// Writes the dataset into a fresh store.
    ///
    /// `tracks_to_tracks` holds the ancestor + descendant closure of each
    /// track, with the parent of the column track as payload (0 for roots).
    pub fn build_store(&self) -> Result<MemoryStore, StoreError> {
        let mut store = MemoryStore::new(format!("oracle-{}", self.seed));
        let stride = self.config.values_per_point;
        let row_len = (self.config.max_cells.max(1) * stride) as u64;

        store.insert_floats("points", vec![self.config.num_times, row_len], self.points.clone())?;
        store.set_attr("points", "values_per_point", json!(stride))?;

        // points -> owning track
        let rows: Vec<Vec<u64>> = (0..self.num_points())
            .map(|p| self.track_of_point(p).into_iter().collect())
            .collect();
        let (indptr, indices) = to_csr(&rows);
        insert_relation(&mut store, "points_to_tracks", indptr, indices)?;

        // tracks -> points, with xyz payload
        let track_rows: Vec<Vec<u64>> = (0..self.num_tracks())
            .map(|t| self.track(t).map(|t| t.point_ids.clone()).unwrap_or_default())
            .collect();
        let data: Vec<f32> = (0..self.num_tracks())
            .filter_map(|t| self.track(t))
            .flat_map(|t| t.positions.iter().flatten().copied())
            .collect();
        let (indptr, indices) = to_csr(&track_rows);
        let nnz = indices.len() as u64;
        insert_relation(&mut store, "tracks_to_points", indptr, indices)?;
        store.insert_floats("tracks_to_points/data", vec![nnz, 3], data)?;

        // tracks -> related tracks, with parent payload
        let lineage_rows: Vec<Vec<u64>> = (0..self.num_tracks())
            .map(|t| self.ancestors_and_descendants(t).into_iter().collect())
            .collect();
        let parents: Vec<i64> = lineage_rows
            .iter()
            .flatten()
            .map(|id| self.track(*id).and_then(|t| t.parent).unwrap_or(0) as i64)
            .collect();
        let (indptr, indices) = to_csr(&lineage_rows);
        let nnz = indices.len() as u64;
        insert_relation(&mut store, "tracks_to_tracks", indptr, indices)?;
        store.insert_ints("tracks_to_tracks/data", vec![nnz], parents)?;

        Ok(store)
    }
}

/// Isotropic Gaussian step.
fn random_step(rng: &mut ChaCha8Rng, std: f64) -> Vector3<f64> {
    Vector3::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal) * std)
}

fn clamp_position(p: Vector3<f64>) -> Vector3<f64> {
    p.map(|v| v.clamp(0.0, 1000.0))
}

/// Row lists -> (indptr, indices).
pub fn to_csr(rows: &[Vec<u64>]) -> (Vec<i64>, Vec<i64>) {
    let mut indptr = Vec::with_capacity(rows.len() + 1);
    let mut indices = Vec::new();
    indptr.push(0);
    for row in rows {
        indices.extend(row.iter().map(|&c| c as i64));
        indptr.push(indices.len() as i64);
    }
    (indptr, indices)
}

fn insert_relation(store: &mut MemoryStore, group: &str, indptr: Vec<i64>, indices: Vec<i64>) -> Result<(), StoreError> {
    store.insert_ints(&format!("{}/indptr", group), vec![indptr.len() as u64], indptr)?;
    store.insert_ints(&format!("{}/indices", group), vec![indices.len() as u64], indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = DatasetOracle::generate(7, OracleConfig::default());
        let b = DatasetOracle::generate(7, OracleConfig::default());
        assert_eq!(a.points, b.points);
        assert_eq!(a.num_tracks(), b.num_tracks());
    }

    #[test]
    fn test_every_slot_in_use_has_one_owner() {
        let oracle = DatasetOracle::generate(3, OracleConfig::default());
        for t in 0..oracle.config().num_times {
            let ids = oracle.point_ids_at(t);
            assert!(!ids.is_empty());
            assert!(ids.len() <= oracle.config().max_cells);
            // slots fill from 0 without gaps
            let first = t * oracle.config().max_cells as u64;
            assert_eq!(ids, (first..first + ids.len() as u64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_divisions_link_parent_and_children() {
        let config = OracleConfig {
            division_probability: 1.0,
            initial_cells: 1,
            max_cells: 4,
            num_times: 4,
            ..OracleConfig::default()
        };
        let oracle = DatasetOracle::generate(11, config);
        let root = oracle.track(1).unwrap();
        assert_eq!(root.children, vec![2, 3]);
        assert_eq!(root.point_ids, vec![0]);
        assert_eq!(oracle.track(2).unwrap().parent, Some(1));
        assert!(oracle.ancestors_and_descendants(1).contains(&2));
        // siblings are not in each other's stored row, but share a component
        assert!(!oracle.ancestors_and_descendants(2).contains(&3));
        assert!(oracle.lineage_component(2).contains(&3));
    }

    #[test]
    fn test_to_csr() {
        let (indptr, indices) = to_csr(&[vec![], vec![4, 5], vec![1]]);
        assert_eq!(indptr, vec![0, 0, 2, 3]);
        assert_eq!(indices, vec![4, 5, 1]);
    }

    #[test]
    fn test_build_store_writes_all_arrays() {
        let oracle = DatasetOracle::generate(5, OracleConfig::default());
        let store = oracle.build_store().unwrap();
        for path in [
            "points",
            "points_to_tracks/indptr",
            "points_to_tracks/indices",
            "tracks_to_points/indptr",
            "tracks_to_points/indices",
            "tracks_to_points/data",
            "tracks_to_tracks/indptr",
            "tracks_to_tracks/indices",
            "tracks_to_tracks/data",
        ] {
            assert!(store.contains(path), "missing {}", path);
        }
    }
}
