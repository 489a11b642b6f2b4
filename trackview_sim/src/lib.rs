//! TrackView Deterministic Simulation Testing (DST) Harness
//!
//! Grows a synthetic cell-tracking dataset from a single 64-bit seed, writes
//! it into an in-memory chunked store, and drives the viewer core against it
//! while comparing every answer with ground truth.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ tokio current-thread runtime (deterministic polling) │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼──────────┐        ┌────▼──────────┐                 │
//! │  │ ViewerSession │        │ PointSelector │                 │
//! │  │ TrackGraph    │        │ (frustum,     │                 │
//! │  │ Fetcher       │        │  sphere)      │                 │
//! │  └────┬──────────┘        └───────────────┘                 │
//! │       │ reads                                               │
//! │  ┌────▼─────────────────────────────┐                       │
//! │  │ SimStore (counts, delays, faults)│                       │
//! │  └────┬─────────────────────────────┘                       │
//! │       │                                                     │
//! │  ┌────▼─────────────────────────────┐                       │
//! │  │ DatasetOracle (ground truth)     │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackview_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::FlakyStore);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
mod store;
pub mod scenarios;

pub use error::{check, SimError};
pub use exporter::{DatasetSummary, PointPosition, SimExport, TrackExport};
pub use oracle::{to_csr, DatasetOracle, OracleConfig, SimTrack, PADDING};
pub use runner::{cameras, project, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use store::SimStore;

#[cfg(test)]
mod proptests;
