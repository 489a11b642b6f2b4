//! Rectangle selection: screen rectangle -> six-plane frustum -> contained points.

use crate::error::TrackError;
use crate::trackview_select::camera::{apply_homogeneous, Camera};
use crate::trackview_select::{PointSetRegistry, SelectionResult};
use nalgebra::{Point2, Point3, Vector3};
use tracing::debug;

// ============================================================================
// PLANES
// ============================================================================

/// Plane `normal . p + constant = 0`; positive distances are on the normal's side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub constant: f64,
}

impl Plane {
    /// Plane through three points; the normal is `(c - b) x (a - b)`, normalized.
    pub fn from_coplanar_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Self {
        let normal = (c - b).cross(&(a - b)).normalize();
        Self {
            normal,
            constant: -normal.dot(&a.coords),
        }
    }

    /// Signed distance of `p` from the plane.
    pub fn distance_to_point(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.constant
    }

    /// Same plane, facing the other way.
    pub fn negated(&self) -> Self {
        Self {
            normal: -self.normal,
            constant: -self.constant,
        }
    }
}

/// Convex volume bounded by six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Top, right, bottom, left, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Returns true if `p` is on the inner side of all six planes.
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(p) >= 0.0)
    }

    /// Frustum under the screen rectangle spanned by two NDC corners.
    ///
    /// Corner order does not matter. Perspective corner rays are extended
    /// to `max_depth` to form the far plane.
    pub fn from_rectangle(
        corner_a: Point2<f64>,
        corner_b: Point2<f64>,
        camera: &Camera,
        max_depth: f64,
    ) -> Result<Self, TrackError> {
        let (mut a, mut b) = (corner_a, corner_b);
        // zero-area rectangles would give a zero-volume frustum
        if a.x == b.x {
            b.x += f64::EPSILON;
        }
        if a.y == b.y {
            b.y += f64::EPSILON;
        }
        if a.x > b.x {
            std::mem::swap(&mut a.x, &mut b.x);
        }
        if a.y > b.y {
            std::mem::swap(&mut a.y, &mut b.y);
        }
        let (left, right, bottom, top) = (a.x, b.x, a.y, b.y);

        let unproject = camera.unprojection_matrix()?;
        let at = |x: f64, y: f64, z: f64| apply_homogeneous(&unproject, Point3::new(x, y, z));

        let tl = at(left, top, -1.0);
        let tr = at(right, top, -1.0);
        let dr = at(right, bottom, -1.0);
        let dl = at(left, bottom, -1.0);

        let planes = match camera {
            Camera::Perspective(c) => {
                let eye = c.pose.eye;
                let extend = |corner: &Point3<f64>| eye + (corner - eye).normalize() * max_depth;
                let (ftr, fdr, fdl) = (extend(&tr), extend(&dr), extend(&dl));
                [
                    Plane::from_coplanar_points(&eye, &tl, &tr),
                    Plane::from_coplanar_points(&eye, &tr, &dr),
                    Plane::from_coplanar_points(&dr, &dl, &eye),
                    Plane::from_coplanar_points(&dl, &tl, &eye),
                    Plane::from_coplanar_points(&tr, &dr, &dl),
                    Plane::from_coplanar_points(&ftr, &fdr, &fdl).negated(),
                ]
            }
            Camera::Orthographic(_) => {
                let ftl = at(left, top, 1.0);
                let ftr = at(right, top, 1.0);
                let fdr = at(right, bottom, 1.0);
                let fdl = at(left, bottom, 1.0);
                [
                    Plane::from_coplanar_points(&tl, &ftl, &ftr),
                    Plane::from_coplanar_points(&tr, &ftr, &fdr),
                    Plane::from_coplanar_points(&fdr, &fdl, &dl),
                    Plane::from_coplanar_points(&fdl, &ftl, &tl),
                    Plane::from_coplanar_points(&tr, &dr, &dl),
                    Plane::from_coplanar_points(&ftr, &fdr, &fdl).negated(),
                ]
            }
            Camera::Unsupported { kind } => return Err(TrackError::UnsupportedCameraType(kind.clone())),
        };
        Ok(Self { planes })
    }

    /// Indices of contained points in every visible set of `registry`.
    pub fn select(&self, registry: &PointSetRegistry) -> SelectionResult {
        let mut result = SelectionResult::new();
        for set in registry.visible() {
            let indices: Vec<usize> = set
                .iter_positions()
                .filter(|(_, p)| self.contains_point(p))
                .map(|(i, _)| i)
                .collect();
            result.insert(set.id, indices);
        }
        result
    }
}

/// Selects every point under the screen rectangle `corner_a`..`corner_b`.
///
/// # Returns
/// * `Ok(result)` - contained indices per visible point set
/// * `Err(TrackError::UnsupportedCameraType)` - camera is neither perspective nor orthographic
pub fn select_with_rectangle(
    corner_a: Point2<f64>,
    corner_b: Point2<f64>,
    camera: &Camera,
    registry: &PointSetRegistry,
    max_depth: f64,
) -> Result<SelectionResult, TrackError> {
    let frustum = Frustum::from_rectangle(corner_a, corner_b, camera, max_depth)?;
    let result = frustum.select(registry);
    debug!(
        "rectangle selection {:?} -> {:?} through {} camera: {} points",
        corner_a,
        corner_b,
        camera.kind(),
        result.total()
    );
    Ok(result)
}

// ============================================================================
// DRAG STATE MACHINE
// ============================================================================

/// Progress of a rectangle drag.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { start: Point2<f64>, end: Point2<f64> },
}

/// Rectangle selector driven by selection-modifier and pointer input.
///
/// While the modifier is held a pointer press starts a drag, moves track
/// the far corner and the release runs the containment test once. A
/// pointer that was already pressed when the modifier went down blocks
/// selection until it is released.
#[derive(Debug, Clone, Default)]
pub struct FrustumSelector {
    state: DragState,
    selecting: bool,
    blocked: bool,
    max_depth: f64,
}

impl FrustumSelector {
    pub fn new(max_depth: f64) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    /// Returns true while the selection modifier is active.
    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    /// Modifier pressed or released; ignored while blocked.
    pub fn set_selecting(&mut self, selecting: bool) {
        if self.blocked {
            return;
        }
        self.selecting = selecting;
        if !selecting {
            self.state = DragState::Idle;
        }
    }

    /// Pointer pressed.
    pub fn pointer_down(&mut self, ndc: Point2<f64>) {
        if self.selecting {
            self.begin_drag(ndc);
        } else {
            self.blocked = true;
        }
    }

    /// Idle -> dragging.
    pub fn begin_drag(&mut self, start: Point2<f64>) {
        self.state = DragState::Dragging { start, end: start };
    }

    /// Moves the far corner of an active drag.
    pub fn update_drag(&mut self, end: Point2<f64>) {
        if let DragState::Dragging { start, .. } = self.state {
            self.state = DragState::Dragging { start, end };
        }
    }

    /// Dragging -> idle, selecting the final rectangle.
    ///
    /// Returns `Ok(None)` when no drag was in progress.
    pub fn end_drag(
        &mut self,
        end: Point2<f64>,
        camera: &Camera,
        registry: &PointSetRegistry,
    ) -> Result<Option<SelectionResult>, TrackError> {
        self.blocked = false;
        let DragState::Dragging { start, .. } = std::mem::take(&mut self.state) else {
            return Ok(None);
        };
        select_with_rectangle(start, end, camera, registry, self.max_depth).map(Some)
    }

    /// Abandons an active drag and unblocks.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
        self.blocked = false;
    }
}
