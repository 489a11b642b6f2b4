//! Sphere selection: a persistent cursor volume with an affine transform.

use crate::config::ViewerConfig;
use crate::trackview_select::camera::{Ray, RayHit};
use crate::trackview_select::{PointSet, PointSetId, PointSetRegistry, SelectionResult};
use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// VOLUME
// ============================================================================

/// Sphere of `radius` around `center`, deformed by `linear` (rotation * scale).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereVolume {
    pub center: Point3<f64>,
    pub radius: f64,
    pub linear: Matrix3<f64>,
}

impl SphereVolume {
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self {
            center,
            radius,
            linear: Matrix3::identity(),
        }
    }

    /// Indices of the points of `set` strictly inside the volume.
    pub fn select_points(&self, set: &PointSet) -> Vec<usize> {
        select_with_sphere(self.center, &self.linear, self.radius, set)
    }

    /// Contained indices per visible point set.
    pub fn select(&self, registry: &PointSetRegistry) -> SelectionResult {
        let mut result = SelectionResult::new();
        for set in registry.visible() {
            result.insert(set.id, self.select_points(set));
        }
        result
    }
}

/// Indices of the points of `set` inside a transformed sphere.
///
/// Each point is moved into the sphere's local frame with
/// `linear^-1 * (p - center)` and kept when its length is below `radius`.
/// A singular `linear` encloses no volume and selects nothing.
pub fn select_with_sphere(center: Point3<f64>, linear: &Matrix3<f64>, radius: f64, set: &PointSet) -> Vec<usize> {
    let Some(inverse) = linear.try_inverse() else {
        return Vec::new();
    };
    set.iter_positions()
        .filter(|(_, p)| (inverse * (p - center)).norm() < radius)
        .map(|(i, _)| i)
        .collect()
}

// ============================================================================
// CURSOR
// ============================================================================

/// Which transform a handle drag applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HandleMode {
    #[default]
    Translate,
    Rotate,
    Scale,
}

/// Interactive sphere cursor.
///
/// The cursor is locked in place unless the selection modifier is held;
/// while unlocked it follows the first point hit by the pointer ray.
/// Transform handles (translate/rotate/scale) only act while attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereCursor {
    center: Point3<f64>,
    rotation: UnitQuaternion<f64>,
    scale: Vector3<f64>,
    radius: f64,
    visible: bool,
    locked: bool,
    handles_attached: bool,
    handle_mode: HandleMode,
    wheel_sensitivity: f64,
    raycast_threshold: f64,
}

impl SphereCursor {
    /// Hidden, locked cursor at the origin.
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            center: Point3::origin(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
            radius: config.cursor_radius,
            visible: false,
            locked: true,
            handles_attached: false,
            handle_mode: HandleMode::Translate,
            wheel_sensitivity: config.wheel_sensitivity,
            raycast_threshold: config.raycast_threshold,
        }
    }

    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    pub fn set_center(&mut self, center: Point3<f64>) {
        self.center = center;
    }

    pub fn scale(&self) -> Vector3<f64> {
        self.scale
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn toggle_visible(&mut self) {
        self.visible = !self.visible;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn handles_attached(&self) -> bool {
        self.handles_attached
    }

    pub fn set_handles_attached(&mut self, attached: bool) {
        self.handles_attached = attached;
    }

    pub fn handle_mode(&self) -> HandleMode {
        self.handle_mode
    }

    pub fn set_handle_mode(&mut self, mode: HandleMode) {
        self.handle_mode = mode;
    }

    /// Rotation * scale part of the cursor's world transform.
    pub fn linear(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner() * Matrix3::from_diagonal(&self.scale)
    }

    /// Current selection volume.
    pub fn volume(&self) -> SphereVolume {
        SphereVolume {
            center: self.center,
            radius: self.radius,
            linear: self.linear(),
        }
    }

    /// Wheel input; with the modifier held scales the cursor by `1 + delta_y * sensitivity`.
    ///
    /// Returns true if the cursor changed.
    pub fn wheel(&mut self, delta_y: f64, modifier: bool) -> bool {
        if !modifier {
            return false;
        }
        let factor = 1.0 + delta_y * self.wheel_sensitivity;
        if factor <= 0.0 {
            return false;
        }
        self.scale *= factor;
        true
    }

    /// Moves an unlocked cursor onto the nearest point hit by `ray`.
    pub fn follow_ray(&mut self, ray: &Ray, registry: &PointSetRegistry) -> Option<(PointSetId, RayHit)> {
        if self.locked {
            return None;
        }
        let hit = registry
            .visible()
            .filter_map(|set| ray.first_point_hit(set, self.raycast_threshold).map(|hit| (set.id, hit)))
            .min_by(|a, b| a.1.distance.total_cmp(&b.1.distance))?;
        self.center = hit.1.point;
        Some(hit)
    }

    /// Applies a handle drag according to the handle mode.
    ///
    /// `delta` is a translation, a scaled rotation axis (radians) or a
    /// per-axis relative scale change. Ignored while handles are detached.
    pub fn drag_handle(&mut self, delta: Vector3<f64>) -> bool {
        if !self.handles_attached {
            return false;
        }
        match self.handle_mode {
            HandleMode::Translate => self.center += delta,
            HandleMode::Rotate => self.rotation = UnitQuaternion::from_scaled_axis(delta) * self.rotation,
            HandleMode::Scale => {
                let scaled = self.scale.component_mul(&(Vector3::repeat(1.0) + delta));
                if scaled.iter().any(|s| *s <= 0.0) {
                    return false;
                }
                self.scale = scaled;
            }
        }
        true
    }

    /// Points inside the cursor, without touching any selection state.
    ///
    /// Empty while the cursor is hidden or locked; only a cursor the user is
    /// actively moving highlights its contents.
    pub fn preview(&self, registry: &PointSetRegistry) -> SelectionResult {
        if !self.visible || self.locked {
            return SelectionResult::new();
        }
        self.volume().select(registry)
    }

    /// Selection to make canonical, or `None` while the cursor is hidden.
    pub fn commit(&self, registry: &PointSetRegistry) -> Option<SelectionResult> {
        if !self.visible {
            return None;
        }
        let result = self.volume().select(registry);
        debug!("sphere selection at {:?}: {} points", self.center, result.total());
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn config() -> ViewerConfig {
        ViewerConfig {
            cursor_radius: 1.0,
            raycast_threshold: 0.5,
            ..ViewerConfig::default()
        }
    }

    #[test]
    fn test_unit_sphere_selects_inner_point() {
        let set = PointSet::new(vec![0.5, 0.0, 0.0, 2.0, 0.0, 0.0], 3);
        assert_eq!(select_with_sphere(Point3::origin(), &Matrix3::identity(), 1.0, &set), vec![0]);
    }

    #[test]
    fn test_boundary_is_excluded() {
        let set = PointSet::new(vec![1.0, 0.0, 0.0, 0.0, -0.999, 0.0], 3);
        assert_eq!(select_with_sphere(Point3::origin(), &Matrix3::identity(), 1.0, &set), vec![1]);
    }

    #[test]
    fn test_anisotropic_and_rotated_volume() {
        let set = PointSet::new(vec![11.5, 10.0, 10.0, 10.0, 11.5, 10.0], 3);
        let center = Point3::new(10.0, 10.0, 10.0);

        let stretched_x = Matrix3::from_diagonal(&Vector3::new(2.0, 1.0, 1.0));
        assert_eq!(select_with_sphere(center, &stretched_x, 1.0, &set), vec![0]);

        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let stretched_y = rotation.to_rotation_matrix().into_inner() * stretched_x;
        assert_eq!(select_with_sphere(center, &stretched_y, 1.0, &set), vec![1]);

        assert!(select_with_sphere(center, &Matrix3::zeros(), 1.0, &set).is_empty());
    }

    #[test]
    fn test_wheel_scales_with_modifier() {
        let mut cursor = SphereCursor::new(&ViewerConfig::default());
        assert!(!cursor.wheel(100.0, false));
        assert!(cursor.wheel(100.0, true));
        assert_relative_eq!(cursor.scale(), Vector3::repeat(1.1), epsilon = 1e-12);
        assert!(cursor.wheel(-100.0, true));
        assert_relative_eq!(cursor.scale(), Vector3::repeat(1.1 * 0.9), epsilon = 1e-12);
        assert!(!cursor.wheel(-1000.0, true));
    }

    #[test]
    fn test_follow_ray_only_when_unlocked() {
        let mut registry = PointSetRegistry::new();
        registry.register(PointSet::new(vec![0.0, 0.2, -5.0, 0.0, 0.0, -9.0], 3));
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, -1.0));
        let mut cursor = SphereCursor::new(&config());

        assert!(cursor.follow_ray(&ray, &registry).is_none());
        assert_eq!(cursor.center(), Point3::origin());

        cursor.set_locked(false);
        let (_, hit) = cursor.follow_ray(&ray, &registry).unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(cursor.center(), Point3::new(0.0, 0.2f32 as f64, -5.0));
    }

    #[test]
    fn test_handles() {
        let mut cursor = SphereCursor::new(&config());
        assert!(!cursor.drag_handle(Vector3::x()));

        cursor.set_handles_attached(true);
        assert!(cursor.drag_handle(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(cursor.center(), Point3::new(1.0, 2.0, 3.0));

        cursor.set_handle_mode(HandleMode::Scale);
        assert!(cursor.drag_handle(Vector3::new(1.0, 0.0, 0.0)));
        assert_eq!(cursor.scale(), Vector3::new(2.0, 1.0, 1.0));
        assert!(!cursor.drag_handle(Vector3::new(0.0, -1.0, 0.0)));

        cursor.set_handle_mode(HandleMode::Rotate);
        assert!(cursor.drag_handle(Vector3::new(0.0, 0.0, FRAC_PI_2)));
        let linear = cursor.linear();
        // the stretched x axis now points along y
        assert_relative_eq!(linear * Vector3::x(), Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_preview_and_commit_require_visibility() {
        let mut registry = PointSetRegistry::new();
        let id = registry.register(PointSet::new(vec![0.5, 0.0, 0.0], 3));
        let mut cursor = SphereCursor::new(&config());

        assert!(cursor.preview(&registry).is_empty());
        assert!(cursor.commit(&registry).is_none());

        cursor.toggle_visible();
        cursor.set_locked(false);
        assert_eq!(cursor.preview(&registry).indices(id), &[0]);
        assert_eq!(cursor.commit(&registry).unwrap().indices(id), &[0]);
    }

    #[test]
    fn test_locked_cursor_previews_nothing_but_commits() {
        let mut registry = PointSetRegistry::new();
        let id = registry.register(PointSet::new(vec![0.5, 0.0, 0.0, 4.0, 0.0, 0.0], 3));
        let mut cursor = SphereCursor::new(&config());
        cursor.toggle_visible();
        assert!(cursor.is_locked());

        assert!(cursor.preview(&registry).is_empty());
        assert_eq!(cursor.commit(&registry).unwrap().indices(id), &[0]);

        cursor.set_locked(false);
        assert_eq!(cursor.preview(&registry).indices(id), &[0]);
        cursor.set_locked(true);
        assert!(cursor.preview(&registry).is_empty());
    }
}
