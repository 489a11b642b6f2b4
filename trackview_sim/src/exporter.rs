//! JSON exporter for offline inspection.
//!
//! Writes the generated dataset (tracks and division tree) together with the
//! scenario results, so a failing seed can be replayed and plotted.

use crate::oracle::DatasetOracle;
use crate::runner::ScenarioResult;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One point of an exported track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPosition {
    pub point_id: u64,
    pub timepoint: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// An exported track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackExport {
    pub track_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<u64>,
    pub points: Vec<PointPosition>,
}

/// Shape of the exported dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub num_times: u64,
    pub max_cells: usize,
    pub num_tracks: usize,
    pub num_points: usize,
    pub divisions: usize,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Seed used
    pub seed: u64,

    /// Dataset shape
    pub dataset: DatasetSummary,

    /// All generated tracks
    pub tracks: Vec<TrackExport>,

    /// Scenario outcomes
    pub results: Vec<ScenarioResult>,

    /// True if every result passed
    pub passed: bool,
}

impl SimExport {
    /// Creates an export of the oracle's dataset, with no results yet.
    pub fn new(seed: u64, oracle: &DatasetOracle) -> Self {
        let max_cells = oracle.config().max_cells.max(1) as u64;
        let tracks: Vec<TrackExport> = oracle
            .tracks()
            .map(|track| TrackExport {
                track_id: track.id,
                parent: track.parent,
                children: track.children.clone(),
                points: track
                    .point_ids
                    .iter()
                    .zip(&track.positions)
                    .map(|(&point_id, p)| PointPosition {
                        point_id,
                        timepoint: point_id / max_cells,
                        x: p[0],
                        y: p[1],
                        z: p[2],
                    })
                    .collect(),
            })
            .collect();

        Self {
            seed,
            dataset: DatasetSummary {
                num_times: oracle.config().num_times,
                max_cells: oracle.config().max_cells,
                num_tracks: tracks.len(),
                num_points: tracks.iter().map(|t| t.points.len()).sum(),
                divisions: tracks.iter().filter(|t| !t.children.is_empty()).count(),
            },
            tracks,
            results: Vec::new(),
            passed: true,
        }
    }

    /// Adds a scenario result.
    pub fn add_result(&mut self, result: ScenarioResult) {
        self.passed &= result.passed;
        self.results.push(result);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleConfig;
    use crate::runner::ScenarioMetrics;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_round_trips_through_file() {
        let oracle = DatasetOracle::generate(4, OracleConfig::default());
        let mut export = SimExport::new(4, &oracle);
        assert_eq!(export.dataset.num_tracks, oracle.tracks().count());
        assert_eq!(
            export.dataset.num_points,
            (0..oracle.config().num_times).map(|t| oracle.point_ids_at(t).len()).sum::<usize>()
        );

        export.add_result(ScenarioResult {
            scenario: ScenarioId::CsrRows,
            seed: 4,
            passed: false,
            failure_reason: Some("boom".to_string()),
            metrics: ScenarioMetrics::default(),
        });
        assert!(!export.passed);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        export.write_to_file(&path).unwrap();

        let parsed: SimExport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.tracks.len(), export.tracks.len());
        assert_eq!(parsed.results[0].scenario, ScenarioId::CsrRows);
        assert_eq!(parsed.tracks[0].points, export.tracks[0].points);
    }
}
