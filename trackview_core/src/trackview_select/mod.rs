//! The "SELECT" Engine - 3D point selection geometry
//!
//! Two strategies report which points of the selectable point sets fall
//! inside a volume:
//! - **Frustum**: a screen-space rectangle extruded through the camera
//!   (perspective or orthographic) into a six-plane volume
//! - **Sphere**: a persistent, affinely transformed cursor sphere
//!
//! Selectable point sets are passed in explicitly through a
//! [`PointSetRegistry`]; nothing here walks a scene graph.

pub mod camera;
pub mod frustum;
pub mod selector;
pub mod sphere;

pub use camera::{Camera, CameraPose, OrthographicCamera, PerspectiveCamera, Ray, RayHit};
pub use frustum::{select_with_rectangle, DragState, Frustum, FrustumSelector, Plane};
pub use selector::{PointSelectionMode, PointSelector};
pub use sphere::{select_with_sphere, HandleMode, SphereCursor, SphereVolume};

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// POINT SETS
// ============================================================================

/// Identity of one selectable point set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointSetId(pub Uuid);

impl PointSetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PointSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PointSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A flat position buffer that selections can run against.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    pub id: PointSetId,

    /// Flat buffer, `stride` values per point; the first three are xyz
    pub positions: Vec<f32>,

    pub stride: usize,

    /// Hidden sets are skipped by every selection
    pub visible: bool,
}

impl PointSet {
    pub fn new(positions: Vec<f32>, stride: usize) -> Self {
        Self {
            id: PointSetId::new(),
            positions,
            stride: stride.max(3),
            visible: true,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.positions.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of point `index`.
    pub fn position(&self, index: usize) -> Option<Point3<f64>> {
        let p = self.positions.get(index * self.stride..index * self.stride + 3)?;
        Some(Point3::new(p[0] as f64, p[1] as f64, p[2] as f64))
    }

    /// Iterates over `(index, position)` pairs.
    pub fn iter_positions(&self) -> impl Iterator<Item = (usize, Point3<f64>)> + '_ {
        self.positions
            .chunks_exact(self.stride)
            .enumerate()
            .map(|(i, p)| (i, Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)))
    }
}

/// The point sets currently offered for selection.
#[derive(Debug, Clone, Default)]
pub struct PointSetRegistry {
    sets: Vec<PointSet>,
}

impl PointSetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a set and returns its id.
    pub fn register(&mut self, set: PointSet) -> PointSetId {
        let id = set.id;
        self.sets.retain(|s| s.id != id);
        self.sets.push(set);
        id
    }

    pub fn remove(&mut self, id: PointSetId) -> Option<PointSet> {
        let index = self.sets.iter().position(|s| s.id == id)?;
        Some(self.sets.remove(index))
    }

    pub fn get(&self, id: PointSetId) -> Option<&PointSet> {
        self.sets.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: PointSetId) -> Option<&mut PointSet> {
        self.sets.iter_mut().find(|s| s.id == id)
    }

    /// Visible sets, in registration order.
    pub fn visible(&self) -> impl Iterator<Item = &PointSet> {
        self.sets.iter().filter(|s| s.visible)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

// ============================================================================
// SELECTION RESULT
// ============================================================================

/// Selected local point indices, grouped by point set.
///
/// Index lists are ascending and duplicate-free. Sets with no selected
/// point are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionResult {
    sets: BTreeMap<PointSetId, Vec<usize>>,
}

impl SelectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the indices selected in one set.
    pub fn insert(&mut self, id: PointSetId, mut indices: Vec<usize>) {
        indices.sort_unstable();
        indices.dedup();
        if indices.is_empty() {
            self.sets.remove(&id);
        } else {
            self.sets.insert(id, indices);
        }
    }

    /// Indices selected in `id` (empty if none).
    pub fn indices(&self, id: PointSetId) -> &[usize] {
        self.sets.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PointSetId, &Vec<usize>)> {
        self.sets.iter()
    }

    /// Total selected points over all sets.
    pub fn total(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Keys the selectors react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Selection modifier
    Shift,
    /// Wheel modifier
    Control,
    Char(char),
}

/// Pointer and keyboard input, pointer positions in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown { key: Key, repeat: bool },
    KeyUp { key: Key },
    PointerDown { ndc: Point2<f64> },
    PointerMove { ndc: Point2<f64> },
    PointerUp { ndc: Point2<f64>, shift: bool },
    PointerCancel,
    Wheel { delta_y: f64, ctrl: bool },
}
