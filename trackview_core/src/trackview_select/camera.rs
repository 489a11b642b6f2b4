//! Cameras, unprojection and pointer rays.
//!
//! Conventions follow OpenGL: right-handed view space looking down `-z`,
//! normalized device coordinates in `[-1, 1]` on all three axes with
//! `z = -1` on the near plane.

use crate::error::TrackError;
use crate::trackview_select::PointSet;
use nalgebra::{Isometry3, Matrix4, Orthographic3, Perspective3, Point2, Point3, Unit, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Position and orientation shared by both camera kinds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub eye: Point3<f64>,
    pub target: Point3<f64>,
    pub up: Vector3<f64>,
}

impl CameraPose {
    pub fn new(eye: Point3<f64>, target: Point3<f64>, up: Vector3<f64>) -> Self {
        Self { eye, target, up }
    }

    /// World -> view transform.
    pub fn view_matrix(&self) -> Matrix4<f64> {
        Isometry3::look_at_rh(&self.eye, &self.target, &self.up).to_homogeneous()
    }

    /// Unit viewing direction.
    pub fn forward(&self) -> Vector3<f64> {
        (self.target - self.eye).normalize()
    }
}

/// Pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCamera {
    pub pose: CameraPose,
    /// Vertical field of view in radians
    pub fov_y: f64,
    /// Width / height
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
}

/// Parallel-projection camera; the view box shrinks as `zoom` grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrthographicCamera {
    pub pose: CameraPose,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
    pub near: f64,
    pub far: f64,
    pub zoom: f64,
}

/// The camera a selection is made through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Camera {
    Perspective(PerspectiveCamera),
    Orthographic(OrthographicCamera),
    /// Any other projection; selection through it fails
    Unsupported { kind: String },
}

impl Camera {
    /// Name of the camera kind, for logs and errors.
    pub fn kind(&self) -> &str {
        match self {
            Camera::Perspective(_) => "perspective",
            Camera::Orthographic(_) => "orthographic",
            Camera::Unsupported { kind } => kind,
        }
    }

    /// Pose of a supported camera.
    pub fn pose(&self) -> Result<&CameraPose, TrackError> {
        match self {
            Camera::Perspective(c) => Ok(&c.pose),
            Camera::Orthographic(c) => Ok(&c.pose),
            Camera::Unsupported { kind } => Err(TrackError::UnsupportedCameraType(kind.clone())),
        }
    }

    /// View -> clip transform.
    pub fn projection_matrix(&self) -> Result<Matrix4<f64>, TrackError> {
        match self {
            Camera::Perspective(c) => Ok(*Perspective3::new(c.aspect, c.fov_y, c.near, c.far).as_matrix()),
            Camera::Orthographic(c) => {
                let zoom = if c.zoom > 0.0 { c.zoom } else { 1.0 };
                let dx = (c.right - c.left) / (2.0 * zoom);
                let dy = (c.top - c.bottom) / (2.0 * zoom);
                let cx = (c.right + c.left) / 2.0;
                let cy = (c.top + c.bottom) / 2.0;
                Ok(*Orthographic3::new(cx - dx, cx + dx, cy - dy, cy + dy, c.near, c.far).as_matrix())
            }
            Camera::Unsupported { kind } => Err(TrackError::UnsupportedCameraType(kind.clone())),
        }
    }

    /// Clip -> world transform.
    pub fn unprojection_matrix(&self) -> Result<Matrix4<f64>, TrackError> {
        let view_projection = self.projection_matrix()? * self.pose()?.view_matrix();
        view_projection
            .try_inverse()
            .ok_or_else(|| TrackError::Config(format!("{} camera has a singular projection", self.kind())))
    }

    /// World position of a point given in normalized device coordinates.
    pub fn unproject(&self, ndc: Point3<f64>) -> Result<Point3<f64>, TrackError> {
        Ok(apply_homogeneous(&self.unprojection_matrix()?, ndc))
    }

    /// Pointer ray through `ndc`, starting at the eye (perspective) or on the near plane (orthographic).
    pub fn ray_from_ndc(&self, ndc: Point2<f64>) -> Result<Ray, TrackError> {
        let unproject = self.unprojection_matrix()?;
        match self {
            Camera::Perspective(c) => {
                let through = apply_homogeneous(&unproject, Point3::new(ndc.x, ndc.y, 0.5));
                Ok(Ray::new(c.pose.eye, through - c.pose.eye))
            }
            Camera::Orthographic(c) => {
                let origin = apply_homogeneous(&unproject, Point3::new(ndc.x, ndc.y, -1.0));
                Ok(Ray::new(origin, c.pose.forward()))
            }
            Camera::Unsupported { kind } => Err(TrackError::UnsupportedCameraType(kind.clone())),
        }
    }
}

/// Transforms a point by a 4x4 matrix, dividing by `w`.
pub(crate) fn apply_homogeneous(m: &Matrix4<f64>, p: Point3<f64>) -> Point3<f64> {
    let v = m * Vector4::new(p.x, p.y, p.z, 1.0);
    Point3::new(v.x / v.w, v.y / v.w, v.z / v.w)
}

// ============================================================================
// RAYCASTING
// ============================================================================

/// Half-line from `origin` along a unit `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
}

/// Nearest point hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Index of the point within its set
    pub index: usize,

    /// World position of the point
    pub point: Point3<f64>,

    /// Distance from the ray origin along the ray
    pub distance: f64,

    /// Perpendicular distance between point and ray
    pub offset: f64,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction: Unit::new_normalize(direction),
        }
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction.into_inner() * t
    }

    /// Nearest point (by distance along the ray) within `threshold` of the ray.
    ///
    /// Points behind the origin are ignored.
    pub fn first_point_hit(&self, set: &PointSet, threshold: f64) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for (index, point) in set.iter_positions() {
            let to_point = point - self.origin;
            let distance = to_point.dot(&self.direction);
            if distance < 0.0 {
                continue;
            }
            let offset = (to_point - self.direction.into_inner() * distance).norm();
            if offset > threshold {
                continue;
            }
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(RayHit {
                    index,
                    point,
                    distance,
                    offset,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn perspective() -> Camera {
        Camera::Perspective(PerspectiveCamera {
            pose: CameraPose::new(Point3::origin(), Point3::new(0.0, 0.0, -1.0), Vector3::y()),
            fov_y: FRAC_PI_2,
            aspect: 1.0,
            near: 1.0,
            far: 100.0,
        })
    }

    fn orthographic() -> Camera {
        Camera::Orthographic(OrthographicCamera {
            pose: CameraPose::new(Point3::new(0.0, 0.0, 10.0), Point3::origin(), Vector3::y()),
            left: -5.0,
            right: 5.0,
            bottom: -5.0,
            top: 5.0,
            near: 1.0,
            far: 20.0,
            zoom: 1.0,
        })
    }

    #[test]
    fn test_perspective_unproject_near_corners() {
        let camera = perspective();
        // 90 degree fov, near = 1: near plane spans [-1, 1] at z = -1
        let corner = camera.unproject(Point3::new(1.0, 1.0, -1.0)).unwrap();
        assert_relative_eq!(corner, Point3::new(1.0, 1.0, -1.0), epsilon = 1e-9);
        let far = camera.unproject(Point3::new(0.0, 0.0, 1.0)).unwrap();
        assert_relative_eq!(far.z, -100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_orthographic_unproject_and_zoom() {
        let camera = orthographic();
        let corner = camera.unproject(Point3::new(-1.0, 1.0, -1.0)).unwrap();
        assert_relative_eq!(corner, Point3::new(-5.0, 5.0, 9.0), epsilon = 1e-9);

        let Camera::Orthographic(mut zoomed) = camera else { unreachable!() };
        zoomed.zoom = 2.0;
        let corner = Camera::Orthographic(zoomed).unproject(Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_relative_eq!(corner, Point3::new(2.5, 2.5, -10.0), epsilon = 1e-9);
    }

    #[test]
    fn test_rays() {
        let ray = perspective().ray_from_ndc(Point2::new(0.0, 0.0)).unwrap();
        assert_relative_eq!(ray.origin, Point3::origin());
        assert_relative_eq!(ray.direction.into_inner(), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-9);

        let ray = orthographic().ray_from_ndc(Point2::new(1.0, 0.0)).unwrap();
        assert_relative_eq!(ray.origin, Point3::new(5.0, 0.0, 9.0), epsilon = 1e-9);
        assert_relative_eq!(ray.direction.into_inner(), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_unsupported_camera() {
        let camera = Camera::Unsupported { kind: "stereo".into() };
        assert_eq!(camera.kind(), "stereo");
        assert!(matches!(
            camera.ray_from_ndc(Point2::origin()),
            Err(TrackError::UnsupportedCameraType(kind)) if kind == "stereo"
        ));
    }

    #[test]
    fn test_first_point_hit() {
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, -1.0));
        let set = PointSet::new(
            vec![
                0.0, 0.0, 5.0, // behind the origin
                3.0, 0.0, -20.0, // nearest within threshold
                0.5, 0.0, -40.0, // farther
                50.0, 0.0, -10.0, // outside threshold
            ],
            3,
        );

        let hit = ray.first_point_hit(&set, 5.0).unwrap();
        assert_eq!(hit.index, 1);
        assert_relative_eq!(hit.distance, 20.0);
        assert_relative_eq!(hit.offset, 3.0);

        assert_eq!(ray.first_point_hit(&set, 1.0).map(|h| h.index), Some(2));
        assert!(ray.first_point_hit(&set, 0.1).is_none());
        assert_relative_eq!(ray.at(2.0), Point3::new(0.0, 0.0, -2.0));
    }
}
