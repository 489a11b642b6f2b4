//! Scenario runner - drives the viewer core against a seeded oracle.

use crate::error::{check, SimError};
use crate::oracle::{DatasetOracle, OracleConfig};
use crate::scenarios::ScenarioId;
use crate::store::SimStore;

use futures_util::future::join_all;
use nalgebra::{Point2, Point3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::{FRAC_PI_3, PI};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use trackview_core::trackview_select::{
    select_with_rectangle, select_with_sphere, CameraPose, HandleMode, OrthographicCamera, PerspectiveCamera,
};
use trackview_core::{
    Camera, FetchOutcome, InputEvent, Key, LineageExpansion, PointSelectionMode, PointSelector, PointSet,
    PointSetRegistry, TrackGraph, TrackGraphConfig, ViewerConfig, ViewerSession,
};

/// Retry limit of the flaky store scenario.
const MAX_ATTEMPTS: usize = 100;

/// Distance from a volume boundary below which brute-force checks are skipped.
const BOUNDARY_EPSILON: f64 = 1e-6;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all checks
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Ground truth comparisons made
    pub checks: u64,

    /// Data reads issued against the store
    pub store_reads: u64,

    /// Reads failed on purpose by the store
    pub injected_failures: u64,

    /// Failed reads reported back by lineage fetches
    pub failed_reads: u64,

    /// Lineage fetches repeated after a failure
    pub retries: u64,

    /// Distinct track segments fetched
    pub segments_fetched: u64,

    /// Requests overtaken by newer ones
    pub discarded_requests: u64,

    /// Points selected over all rounds
    pub points_selected: u64,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Master seed
    seed: u64,

    /// Shape of the generated dataset
    oracle_config: OracleConfig,

    /// Viewer settings under test
    viewer_config: ViewerConfig,

    /// Randomized trials per scenario
    rounds: usize,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            oracle_config: OracleConfig::default(),
            viewer_config: ViewerConfig::default(),
            rounds: 8,
        }
    }

    /// Sets the dataset shape.
    pub fn with_oracle_config(mut self, config: OracleConfig) -> Self {
        self.oracle_config = config;
        self
    }

    /// Sets the viewer configuration.
    pub fn with_viewer_config(mut self, config: ViewerConfig) -> Self {
        self.viewer_config = config;
        self
    }

    /// Sets the number of randomized trials.
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Dataset of this runner; derived from the seed, independent of the fault RNG.
    pub fn oracle(&self) -> DatasetOracle {
        DatasetOracle::generate(self.seed.wrapping_mul(0x9e3779b97f4a7c15), self.oracle_config.clone())
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut metrics = ScenarioMetrics::default();
        let outcome = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime.block_on(self.run_async(scenario, &mut metrics)),
            Err(e) => Err(SimError::from(e)),
        };

        let failure_reason = match outcome {
            Ok(()) => {
                info!("✓ {} complete: {} checks, {} reads", scenario.name(), metrics.checks, metrics.store_reads);
                None
            }
            Err(e) => {
                warn!("✗ {} failed: {}", scenario.name(), e);
                Some(e.to_string())
            }
        };

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            failure_reason,
            metrics,
        }
    }

    async fn run_async(&self, scenario: ScenarioId, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        match scenario {
            ScenarioId::CsrRows => self.run_csr_rows(metrics).await,
            ScenarioId::IndptrSingleFlight => self.run_indptr_single_flight(metrics).await,
            ScenarioId::LineageDedup => self.run_lineage_dedup(metrics).await,
            ScenarioId::FlakyStore => self.run_flaky_store(metrics).await,
            ScenarioId::StaleTimepoint => self.run_stale_timepoint(metrics).await,
            ScenarioId::FrustumSymmetry => self.run_frustum_symmetry(metrics),
            ScenarioId::SphereCursor => self.run_sphere_cursor(metrics),
        }
    }

    async fn open(&self, store: SimStore) -> Result<(Arc<SimStore>, Arc<TrackGraph<SimStore>>), SimError> {
        let store = Arc::new(store);
        let graph = TrackGraph::open(Arc::clone(&store), TrackGraphConfig::default()).await?;
        Ok((store, Arc::new(graph)))
    }

    fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }

    /// Tracks a lineage fetch from `track` is expected to reach.
    fn expected_lineage(&self, oracle: &DatasetOracle, track: u64) -> BTreeSet<u64> {
        match self.viewer_config.lineage_expansion {
            LineageExpansion::BreadthFirst => oracle.lineage_component(track),
            LineageExpansion::StoredClosure => {
                let mut lineage = oracle.ancestors_and_descendants(track);
                lineage.insert(track);
                lineage
            }
        }
    }

    /// SIM-001: CsrRows - every relation row against ground truth.
    async fn run_csr_rows(&self, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        info!("SIM-001: CsrRows - relation rows against ground truth");

        let oracle = self.oracle();
        let (store, graph) = self.open(SimStore::new(oracle.build_store()?, self.seed)).await?;
        check(graph.num_tracks() == oracle.num_tracks(), || {
            format!("graph has {} tracks, oracle {}", graph.num_tracks(), oracle.num_tracks())
        })?;

        for point in 0..oracle.num_points() {
            let owners = graph.track_ids_for_point(point).await?;
            let expected: Vec<u64> = oracle.track_of_point(point).into_iter().collect();
            check(owners == expected, || format!("point {}: owners {:?}, expected {:?}", point, owners, expected))?;
            metrics.checks += 1;
        }

        for track in 0..oracle.num_tracks() {
            let segment = graph.points_for_track(track).await?;
            let (ids, positions) = match oracle.track(track) {
                Some(t) => (t.point_ids.clone(), t.positions.iter().flatten().copied().collect()),
                None => (Vec::new(), Vec::<f32>::new()),
            };
            check(segment.point_ids == ids, || {
                format!("track {}: points {:?}, expected {:?}", track, segment.point_ids, ids)
            })?;
            check(segment.positions == positions, || format!("track {}: positions differ", track))?;

            let row = graph.lineage_for_track(track).await?;
            let related: Vec<u64> = oracle.ancestors_and_descendants(track).into_iter().collect();
            let parents: Vec<i64> = related
                .iter()
                .map(|&id| oracle.track(id).and_then(|t| t.parent).unwrap_or(0) as i64)
                .collect();
            check(row.neighbors == related, || {
                format!("track {}: lineage {:?}, expected {:?}", track, row.neighbors, related)
            })?;
            check(row.parents.as_deref() == Some(&parents[..]), || {
                format!("track {}: parents {:?}, expected {:?}", track, row.parents, parents)
            })?;
            metrics.checks += 4;
        }

        for t in 0..oracle.config().num_times {
            let points = graph.points_at_time(t).await?;
            let observed: Vec<f32> = points
                .positions
                .chunks_exact(points.stride)
                .flat_map(|p| p[..3].iter().copied())
                .collect();
            let expected: Vec<f32> = oracle.positions_at(t).into_iter().flatten().collect();
            check(observed == expected && points.integrity.is_none(), || {
                format!("time {}: {} points read, {} expected", t, points.len(), expected.len() / 3)
            })?;
            metrics.checks += 1;
        }

        metrics.store_reads = store.total_reads();
        Ok(())
    }

    /// SIM-002: IndptrSingleFlight - concurrent first reads share one indptr load.
    async fn run_indptr_single_flight(&self, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        info!("SIM-002: IndptrSingleFlight - concurrent row reads");

        let oracle = self.oracle();
        let (store, graph) = self.open(SimStore::new(oracle.build_store()?, self.seed)).await?;

        let owners = join_all((0..graph.num_points()).map(|p| graph.track_ids_for_point(p))).await;
        let segments = join_all((0..graph.num_tracks()).map(|t| graph.points_for_track(t))).await;
        let lineages = join_all((0..graph.num_tracks()).map(|t| graph.lineage_for_track(t))).await;
        metrics.checks += (owners.len() + segments.len() + lineages.len()) as u64;
        owners.into_iter().collect::<Result<Vec<_>, _>>()?;
        segments.into_iter().collect::<Result<Vec<_>, _>>()?;
        lineages.into_iter().collect::<Result<Vec<_>, _>>()?;

        let config = graph.config();
        for relation in [&config.points_to_tracks, &config.tracks_to_points, &config.tracks_to_tracks] {
            let path = format!("{}/indptr", relation);
            let reads = store.reads(&path);
            debug!("  {} read {} times", path, reads);
            check(reads == 1, || format!("{} read {} times", path, reads))?;
        }

        metrics.store_reads = store.total_reads();
        Ok(())
    }

    /// SIM-003: LineageDedup - overlapping selections never refetch a segment.
    async fn run_lineage_dedup(&self, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        info!("SIM-003: LineageDedup - overlapping selections");

        let oracle = self.oracle();
        let (store, graph) = self.open(SimStore::new(oracle.build_store()?, self.seed)).await?;
        let mut session = ViewerSession::new(graph, self.viewer_config.clone());
        let mut rng = self.rng();
        let max_cells = oracle.config().max_cells.max(1) as u64;

        let mut loaded = BTreeSet::new();
        let mut expected = BTreeSet::new();
        for round in 0..self.rounds {
            let t = rng.gen_range(0..oracle.config().num_times.max(1));
            let ids = oracle.point_ids_at(t);
            if ids.is_empty() {
                continue;
            }
            let mut chosen: Vec<u64> = ids.iter().copied().filter(|_| rng.gen_bool(0.3)).collect();
            if chosen.is_empty() {
                chosen.push(ids[rng.gen_range(0..ids.len())]);
            }
            let slots: Vec<usize> = chosen.iter().map(|id| (id % max_cells) as usize).collect();

            session.set_timepoint(t);
            let plan = session.plan_selection(&slots)?;
            check(plan.point_ids == chosen, || {
                format!("round {}: planned {:?}, selected {:?}", round, plan.point_ids, chosen)
            })?;
            metrics.points_selected += chosen.len() as u64;

            let report = session
                .fetch_lineage(&plan.point_ids)
                .await?
                .into_current()
                .ok_or_else(|| SimError::Check(format!("round {}: lineage fetch discarded", round)))?;
            check(report.is_complete(), || format!("round {}: {} failed reads", round, report.failures.len()))?;
            for id in report.track_ids() {
                check(loaded.insert(id), || format!("round {}: track {} fetched twice", round, id))?;
            }
            for &point in &chosen {
                if let Some(track) = oracle.track_of_point(point) {
                    expected.extend(self.expected_lineage(&oracle, track));
                }
            }
            debug!("  round {}: t={} {} points, {} tracks loaded", round, t, chosen.len(), loaded.len());
            metrics.checks += 1;
        }

        check(loaded == expected, || format!("loaded {:?}, expected {:?}", loaded, expected))?;
        check(session.loaded_track_count() == loaded.len(), || {
            format!("session shows {} tracks, fetched {}", session.loaded_track_count(), loaded.len())
        })?;
        let segment_reads = store.reads("tracks_to_points/indices");
        check(segment_reads == loaded.len() as u64, || {
            format!("{} segment reads for {} segments", segment_reads, loaded.len())
        })?;

        session.clear_selection();
        check(session.caches().added_track_count() == 0 && session.loaded_track_count() == 0, || {
            "clear_selection kept fetched tracks".to_string()
        })?;

        metrics.segments_fetched = loaded.len() as u64;
        metrics.store_reads = store.total_reads();
        Ok(())
    }

    /// SIM-004: FlakyStore - random transient faults, retried until complete.
    async fn run_flaky_store(&self, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        info!("SIM-004: FlakyStore - 20% transient read failures");

        let oracle = self.oracle();
        let store = SimStore::new(oracle.build_store()?, self.seed).with_fault_rate(0.2);
        let (store, graph) = self.open(store).await?;
        let mut session = ViewerSession::new(graph, self.viewer_config.clone());

        let seeds = oracle.point_ids_at(0);
        let mut loaded = BTreeSet::new();
        let mut converged = false;
        for attempt in 0..MAX_ATTEMPTS {
            let report = session
                .fetch_lineage(&seeds)
                .await?
                .into_current()
                .ok_or_else(|| SimError::Check(format!("attempt {}: lineage fetch discarded", attempt)))?;
            for failure in &report.failures {
                check(failure.error.is_retryable(), || {
                    format!("attempt {}: non-retryable failure {}", attempt, failure.error)
                })?;
            }
            metrics.failed_reads += report.failures.len() as u64;
            for id in report.track_ids() {
                check(loaded.insert(id), || format!("attempt {}: track {} fetched twice", attempt, id))?;
            }
            if seeds.iter().all(|&p| session.caches().is_point_fetched(p)) {
                converged = true;
                break;
            }
            metrics.retries += 1;
        }
        check(converged, || format!("lineage incomplete after {} attempts", MAX_ATTEMPTS))?;

        let expected: BTreeSet<u64> = seeds
            .iter()
            .filter_map(|&p| oracle.track_of_point(p))
            .flat_map(|track| self.expected_lineage(&oracle, track))
            .collect();
        check(loaded == expected, || format!("loaded {:?}, expected {:?}", loaded, expected))?;

        info!(
            "  converged after {} retries, {} injected failures",
            metrics.retries,
            store.injected_failures()
        );
        metrics.checks += 1;
        metrics.segments_fetched = loaded.len() as u64;
        metrics.injected_failures = store.injected_failures();
        metrics.store_reads = store.total_reads();
        Ok(())
    }

    /// SIM-005: StaleTimepoint - overlapping loads, only the newest is delivered.
    async fn run_stale_timepoint(&self, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        info!("SIM-005: StaleTimepoint - rapid timepoint changes");

        let oracle = self.oracle();
        let num_times = oracle.config().num_times.max(1);
        let store = SimStore::new(oracle.build_store()?, self.seed).with_latency(Duration::from_millis(1));
        let (store, graph) = self.open(store).await?;
        let mut session = ViewerSession::new(graph, self.viewer_config.clone());
        let mut rng = self.rng();

        let times: Vec<u64> = (0..self.rounds.max(2)).map(|_| rng.gen_range(0..num_times)).collect();
        let outcomes = join_all(times.iter().map(|&t| session.load_timepoint(t))).await;

        let mut current = Vec::new();
        for (&t, outcome) in times.iter().zip(outcomes) {
            match outcome? {
                FetchOutcome::Current(points) => current.push((t, points)),
                FetchOutcome::Discarded => metrics.discarded_requests += 1,
            }
        }
        check(current.len() == 1, || format!("{} loads delivered, expected 1", current.len()))?;
        for (t, points) in &current {
            let observed: Vec<f32> = points
                .positions
                .chunks_exact(points.stride)
                .flat_map(|p| p[..3].iter().copied())
                .collect();
            let expected: Vec<f32> = oracle.positions_at(*t).into_iter().flatten().collect();
            check(observed == expected, || format!("time {}: delivered points differ", t))?;
        }

        let sequential = session.load_timepoint(times[0]).await?;
        check(sequential.is_current(), || "uncontended load was discarded".to_string())?;

        let clamped = session.set_timepoint(num_times + 5);
        check(clamped == num_times - 1, || format!("timepoint clamped to {}", clamped))?;

        metrics.checks += times.len() as u64 + 2;
        metrics.store_reads = store.total_reads();
        Ok(())
    }

    /// SIM-006: FrustumSymmetry - random rectangles against projected points.
    fn run_frustum_symmetry(&self, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        info!("SIM-006: FrustumSymmetry - random rectangles");

        let oracle = self.oracle();
        let mut rng = self.rng();
        let t = rng.gen_range(0..oracle.config().num_times.max(1));
        let positions = oracle.positions_at(t);
        let mut registry = PointSetRegistry::new();
        let id = registry.register(PointSet::new(positions.iter().flatten().copied().collect(), 3));

        for camera in cameras(dataset_center()) {
            for round in 0..self.rounds {
                let a = Point2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
                let b = Point2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
                let max_depth = self.viewer_config.frustum_max_depth;
                let forward = select_with_rectangle(a, b, &camera, &registry, max_depth)?;
                let backward = select_with_rectangle(b, a, &camera, &registry, max_depth)?;
                check(forward == backward, || {
                    format!("{} round {}: swapping corners changed the selection", camera.kind(), round)
                })?;

                let selected = forward.indices(id);
                let (lo, hi) = (Point2::new(a.x.min(b.x), a.y.min(b.y)), Point2::new(a.x.max(b.x), a.y.max(b.y)));
                for (index, p) in positions.iter().enumerate() {
                    let ndc = project(&camera, &to_point(p))?;
                    let margin = (ndc.x - lo.x).min(hi.x - ndc.x).min(ndc.y - lo.y).min(hi.y - ndc.y);
                    let is_selected = selected.contains(&index);
                    if margin > BOUNDARY_EPSILON {
                        check(is_selected, || format!("{} round {}: point {} missed", camera.kind(), round, index))?;
                    } else if margin < -BOUNDARY_EPSILON {
                        check(!is_selected, || {
                            format!("{} round {}: point {} wrongly selected", camera.kind(), round, index)
                        })?;
                    }
                    metrics.checks += 1;
                }
                metrics.points_selected += selected.len() as u64;
            }
        }
        Ok(())
    }

    /// SIM-007: SphereCursor - transformed cursors against a brute-force test.
    fn run_sphere_cursor(&self, metrics: &mut ScenarioMetrics) -> Result<(), SimError> {
        info!("SIM-007: SphereCursor - random anisotropic cursors");

        let oracle = self.oracle();
        let mut rng = self.rng();
        let t = rng.gen_range(0..oracle.config().num_times.max(1));
        let positions = oracle.positions_at(t);
        check(!positions.is_empty(), || format!("time {} has no points", t))?;
        let set = PointSet::new(positions.iter().flatten().copied().collect(), 3);
        let mut registry = PointSetRegistry::new();
        let id = registry.register(set.clone());

        let config = ViewerConfig {
            cursor_radius: 150.0,
            ..self.viewer_config.clone()
        };
        let [_, camera] = cameras(dataset_center());

        for round in 0..self.rounds {
            let mut selector = PointSelector::new(&config);
            selector.set_mode(PointSelectionMode::Sphere);

            let center = to_point(&positions[rng.gen_range(0..positions.len())]);
            let cursor = selector.cursor_mut();
            cursor.set_center(center);
            cursor.set_handle_mode(HandleMode::Scale);
            cursor.drag_handle(Vector3::from_fn(|_, _| rng.gen_range(-0.5..1.0)));
            cursor.set_handle_mode(HandleMode::Rotate);
            cursor.drag_handle(Vector3::from_fn(|_, _| rng.gen_range(-PI..PI)));

            let volume = selector.cursor().volume();
            let inverse = volume
                .linear
                .try_inverse()
                .ok_or_else(|| SimError::Check(format!("round {}: singular cursor transform", round)))?;
            check(selector.preview(&registry).is_empty(), || {
                format!("round {}: locked cursor highlighted points", round)
            })?;
            selector.cursor_mut().set_locked(false);
            let preview = selector.preview(&registry);
            selector.cursor_mut().set_locked(true);
            let selected = preview.indices(id);
            check(selected == select_with_sphere(volume.center, &volume.linear, volume.radius, &set), || {
                format!("round {}: cursor preview differs from direct selection", round)
            })?;

            for (index, p) in positions.iter().enumerate() {
                let distance = (inverse * (to_point(p) - volume.center)).norm();
                let is_selected = selected.contains(&index);
                if distance < volume.radius - BOUNDARY_EPSILON {
                    check(is_selected, || format!("round {}: point {} missed", round, index))?;
                } else if distance > volume.radius + BOUNDARY_EPSILON {
                    check(!is_selected, || format!("round {}: point {} wrongly selected", round, index))?;
                }
                metrics.checks += 1;
            }

            let release = InputEvent::PointerUp {
                ndc: Point2::origin(),
                shift: true,
            };
            let committed = selector.handle(release, &camera, &registry)?;
            check(committed.as_ref() == Some(&preview) && selector.selection() == &preview, || {
                format!("round {}: committed selection differs from preview", round)
            })?;
            metrics.points_selected += preview.total() as u64;
        }

        // modifier held: the cursor jumps onto the point under the pointer
        let mut selector = PointSelector::new(&config);
        selector.set_mode(PointSelectionMode::SphericalCursor);
        let shift_down = InputEvent::KeyDown {
            key: Key::Shift,
            repeat: false,
        };
        selector.handle(shift_down, &camera, &registry)?;
        let target = to_point(&positions[rng.gen_range(0..positions.len())]);
        let ndc = project(&camera, &target)?;
        selector.handle(
            InputEvent::PointerMove {
                ndc: Point2::new(ndc.x, ndc.y),
            },
            &camera,
            &registry,
        )?;
        let moved_to = selector.cursor().center();
        check(positions.iter().any(|p| (to_point(p) - moved_to).norm() < BOUNDARY_EPSILON), || {
            format!("cursor at {:?} is not on a point", moved_to)
        })?;
        selector.handle(InputEvent::KeyUp { key: Key::Shift }, &camera, &registry)?;
        check(selector.cursor().is_locked(), || "cursor still unlocked".to_string())?;
        metrics.checks += 2;
        Ok(())
    }
}

// ============================================================================
// GEOMETRY HELPERS
// ============================================================================

fn to_point(p: &[f32; 3]) -> Point3<f64> {
    Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

/// Middle of the oracle's position range.
fn dataset_center() -> Point3<f64> {
    Point3::new(500.0, 500.0, 500.0)
}

/// A perspective and an orthographic camera looking down `-z` at `center`.
pub fn cameras(center: Point3<f64>) -> [Camera; 2] {
    let pose = CameraPose::new(center + Vector3::new(0.0, 0.0, 1500.0), center, Vector3::y());
    [
        Camera::Perspective(PerspectiveCamera {
            pose,
            fov_y: FRAC_PI_3,
            aspect: 1.0,
            near: 1.0,
            far: 1.0e4,
        }),
        Camera::Orthographic(OrthographicCamera {
            pose,
            left: -600.0,
            right: 600.0,
            bottom: -600.0,
            top: 600.0,
            near: 1.0,
            far: 5000.0,
            zoom: 1.0,
        }),
    ]
}

/// World point -> normalized device coordinates.
pub fn project(camera: &Camera, point: &Point3<f64>) -> Result<Point3<f64>, SimError> {
    let clip = camera.projection_matrix()? * camera.pose()?.view_matrix() * point.to_homogeneous();
    Ok(Point3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w))
}
