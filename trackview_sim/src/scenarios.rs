//! Simulation scenarios for the viewer core.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: Every CSR row read matches the oracle
    CsrRows,

    /// SIM-002: Concurrent first reads load each `indptr` once
    IndptrSingleFlight,

    /// SIM-003: Overlapping selections fetch each segment once
    LineageDedup,

    /// SIM-004: Random transient faults, retried to completion
    FlakyStore,

    /// SIM-005: Superseded timepoint loads are discarded
    StaleTimepoint,

    /// SIM-006: Rectangle selection ignores corner order
    FrustumSymmetry,

    /// SIM-007: Sphere cursor selection matches brute force
    SphereCursor,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CsrRows,
            ScenarioId::IndptrSingleFlight,
            ScenarioId::LineageDedup,
            ScenarioId::FlakyStore,
            ScenarioId::StaleTimepoint,
            ScenarioId::FrustumSymmetry,
            ScenarioId::SphereCursor,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CsrRows => "csr_rows",
            ScenarioId::IndptrSingleFlight => "indptr_single_flight",
            ScenarioId::LineageDedup => "lineage_dedup",
            ScenarioId::FlakyStore => "flaky_store",
            ScenarioId::StaleTimepoint => "stale_timepoint",
            ScenarioId::FrustumSymmetry => "frustum_symmetry",
            ScenarioId::SphereCursor => "sphere_cursor",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CsrRows => "Owner, segment and lineage rows of every id agree with ground truth",
            ScenarioId::IndptrSingleFlight => "Many concurrent row reads, one indptr read per relation",
            ScenarioId::LineageDedup => "Random overlapping selections, no segment fetched twice",
            ScenarioId::FlakyStore => "20% transient read failures, retries converge to the full lineage",
            ScenarioId::StaleTimepoint => "Rapid timepoint changes under latency, only the last load lands",
            ScenarioId::FrustumSymmetry => "Random rectangles through both camera kinds, corners swapped",
            ScenarioId::SphereCursor => "Random anisotropic cursors against a brute-force distance test",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csr_rows" | "csrrows" | "sim-001" => Ok(ScenarioId::CsrRows),
            "indptr_single_flight" | "singleflight" | "sim-002" => Ok(ScenarioId::IndptrSingleFlight),
            "lineage_dedup" | "dedup" | "sim-003" => Ok(ScenarioId::LineageDedup),
            "flaky_store" | "flaky" | "sim-004" => Ok(ScenarioId::FlakyStore),
            "stale_timepoint" | "stale" | "sim-005" => Ok(ScenarioId::StaleTimepoint),
            "frustum_symmetry" | "frustum" | "sim-006" => Ok(ScenarioId::FrustumSymmetry),
            "sphere_cursor" | "sphere" | "sim-007" => Ok(ScenarioId::SphereCursor),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
