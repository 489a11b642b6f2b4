//! Input dispatch over the rectangle and sphere selectors.

use crate::config::ViewerConfig;
use crate::error::TrackError;
use crate::trackview_select::camera::Camera;
use crate::trackview_select::frustum::FrustumSelector;
use crate::trackview_select::sphere::{HandleMode, SphereCursor};
use crate::trackview_select::{InputEvent, Key, PointSetRegistry, SelectionResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which selector receives input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSelectionMode {
    /// Screen-space rectangle
    #[default]
    Box,
    /// Sphere that follows the pointer while the modifier is held
    SphericalCursor,
    /// Sphere placed with transform handles
    Sphere,
}

/// Routes input events to the active selector and holds the canonical selection.
#[derive(Debug, Clone)]
pub struct PointSelector {
    mode: PointSelectionMode,
    frustum: FrustumSelector,
    cursor: SphereCursor,
    selection: SelectionResult,
}

impl PointSelector {
    pub fn new(config: &ViewerConfig) -> Self {
        let mut selector = Self {
            mode: PointSelectionMode::Box,
            frustum: FrustumSelector::new(config.frustum_max_depth),
            cursor: SphereCursor::new(config),
            selection: SelectionResult::new(),
        };
        selector.set_mode(PointSelectionMode::Box);
        selector
    }

    pub fn mode(&self) -> PointSelectionMode {
        self.mode
    }

    /// Switches selector, resetting cursor visibility, handles and lock.
    ///
    /// Any rectangle drag in progress is abandoned.
    pub fn set_mode(&mut self, mode: PointSelectionMode) {
        self.mode = mode;
        self.frustum.cancel();
        self.frustum.set_selecting(false);
        let (visible, attached) = match mode {
            PointSelectionMode::Box => (false, false),
            PointSelectionMode::SphericalCursor => (true, false),
            PointSelectionMode::Sphere => (true, true),
        };
        self.cursor.set_visible(visible);
        self.cursor.set_handles_attached(attached);
        self.cursor.set_locked(true);
        info!("selection mode: {:?}", mode);
    }

    pub fn cursor(&self) -> &SphereCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut SphereCursor {
        &mut self.cursor
    }

    pub fn frustum(&self) -> &FrustumSelector {
        &self.frustum
    }

    /// The last committed selection.
    pub fn selection(&self) -> &SelectionResult {
        &self.selection
    }

    pub fn clear_selection(&mut self) {
        self.selection = SelectionResult::new();
    }

    /// Points the sphere cursor would select right now.
    pub fn preview(&self, registry: &PointSetRegistry) -> SelectionResult {
        match self.mode {
            PointSelectionMode::Box => SelectionResult::new(),
            _ => self.cursor.preview(registry),
        }
    }

    /// Applies one input event.
    ///
    /// # Returns
    /// * `Ok(Some(result))` - the event committed a new selection
    /// * `Ok(None)` - state changed (or not) without a selection
    /// * `Err(TrackError::UnsupportedCameraType)` - selection through an unsupported camera
    pub fn handle(
        &mut self,
        event: InputEvent,
        camera: &Camera,
        registry: &PointSetRegistry,
    ) -> Result<Option<SelectionResult>, TrackError> {
        let committed = match self.mode {
            PointSelectionMode::Box => self.handle_box(event, camera, registry)?,
            PointSelectionMode::SphericalCursor | PointSelectionMode::Sphere => {
                self.handle_sphere(event, camera, registry)?
            }
        };
        if let Some(result) = &committed {
            debug!("committed selection of {} points", result.total());
            self.selection = result.clone();
        }
        Ok(committed)
    }

    fn handle_box(
        &mut self,
        event: InputEvent,
        camera: &Camera,
        registry: &PointSetRegistry,
    ) -> Result<Option<SelectionResult>, TrackError> {
        match event {
            InputEvent::KeyDown { key: Key::Shift, repeat: false } => self.frustum.set_selecting(true),
            InputEvent::KeyUp { key: Key::Shift } => self.frustum.set_selecting(false),
            InputEvent::PointerDown { ndc } => self.frustum.pointer_down(ndc),
            InputEvent::PointerMove { ndc } => self.frustum.update_drag(ndc),
            InputEvent::PointerUp { ndc, .. } => return self.frustum.end_drag(ndc, camera, registry),
            InputEvent::PointerCancel => self.frustum.cancel(),
            _ => {}
        }
        Ok(None)
    }

    fn handle_sphere(
        &mut self,
        event: InputEvent,
        camera: &Camera,
        registry: &PointSetRegistry,
    ) -> Result<Option<SelectionResult>, TrackError> {
        match event {
            InputEvent::KeyDown { key: Key::Shift, .. } => self.cursor.set_locked(false),
            InputEvent::KeyUp { key: Key::Shift } => self.cursor.set_locked(true),
            InputEvent::KeyDown { key: Key::Char(c), .. } => match c.to_ascii_lowercase() {
                's' => self.cursor.toggle_visible(),
                'w' => self.cursor.set_handle_mode(HandleMode::Translate),
                'e' => self.cursor.set_handle_mode(HandleMode::Rotate),
                'r' => self.cursor.set_handle_mode(HandleMode::Scale),
                _ => {}
            },
            InputEvent::PointerMove { ndc } if !self.cursor.is_locked() => {
                let ray = camera.ray_from_ndc(ndc)?;
                self.cursor.follow_ray(&ray, registry);
            }
            InputEvent::PointerUp { shift: true, .. } => return Ok(self.cursor.commit(registry)),
            InputEvent::Wheel { delta_y, ctrl } => {
                self.cursor.wheel(delta_y, ctrl);
            }
            _ => {}
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trackview_select::camera::{CameraPose, OrthographicCamera};
    use approx::assert_relative_eq;
    use crate::trackview_select::{PointSet, PointSetId};
    use nalgebra::{Point2, Point3, Vector3};

    fn camera() -> Camera {
        Camera::Orthographic(OrthographicCamera {
            pose: CameraPose::new(Point3::new(0.0, 0.0, 10.0), Point3::origin(), Vector3::y()),
            left: -10.0,
            right: 10.0,
            bottom: -10.0,
            top: 10.0,
            near: 1.0,
            far: 100.0,
            zoom: 1.0,
        })
    }

    fn registry() -> (PointSetRegistry, PointSetId) {
        let mut registry = PointSetRegistry::new();
        let id = registry.register(PointSet::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 8.0, 8.0, 0.0], 3));
        (registry, id)
    }

    fn config() -> ViewerConfig {
        ViewerConfig {
            cursor_radius: 2.0,
            raycast_threshold: 0.5,
            ..ViewerConfig::default()
        }
    }

    fn key_down(key: Key) -> InputEvent {
        InputEvent::KeyDown { key, repeat: false }
    }

    #[test]
    fn test_mode_effects() {
        let mut selector = PointSelector::new(&config());
        assert_eq!(selector.mode(), PointSelectionMode::Box);
        assert!(!selector.cursor().is_visible());

        selector.set_mode(PointSelectionMode::SphericalCursor);
        assert!(selector.cursor().is_visible());
        assert!(!selector.cursor().handles_attached());
        assert!(selector.cursor().is_locked());

        selector.set_mode(PointSelectionMode::Sphere);
        assert!(selector.cursor().is_visible());
        assert!(selector.cursor().handles_attached());

        selector.set_mode(PointSelectionMode::Box);
        assert!(!selector.cursor().is_visible());
        assert!(!selector.cursor().handles_attached());
    }

    #[test]
    fn test_box_drag_commits_selection() {
        let (registry, id) = registry();
        let camera = camera();
        let mut selector = PointSelector::new(&config());

        let events = [
            key_down(Key::Shift),
            InputEvent::PointerDown { ndc: Point2::new(-0.2, 0.2) },
            InputEvent::PointerMove { ndc: Point2::new(0.0, 0.0) },
        ];
        for event in events {
            assert!(selector.handle(event, &camera, &registry).unwrap().is_none());
        }
        let up = InputEvent::PointerUp { ndc: Point2::new(0.2, -0.2), shift: true };
        let result = selector.handle(up, &camera, &registry).unwrap().unwrap();
        assert_eq!(result.indices(id), &[0, 1]);
        assert_eq!(selector.selection(), &result);

        selector.clear_selection();
        assert!(selector.selection().is_empty());
    }

    #[test]
    fn test_box_without_modifier_selects_nothing() {
        let (registry, _) = registry();
        let camera = camera();
        let mut selector = PointSelector::new(&config());

        selector
            .handle(InputEvent::PointerDown { ndc: Point2::new(-0.2, 0.2) }, &camera, &registry)
            .unwrap();
        // modifier pressed mid-gesture is ignored until the pointer is released
        selector.handle(key_down(Key::Shift), &camera, &registry).unwrap();
        assert!(!selector.frustum().is_selecting());
        let up = InputEvent::PointerUp { ndc: Point2::new(0.2, -0.2), shift: true };
        assert!(selector.handle(up, &camera, &registry).unwrap().is_none());
        assert!(selector.selection().is_empty());
    }

    #[test]
    fn test_cursor_follows_pointer_and_commits() {
        let (registry, id) = registry();
        let camera = camera();
        let mut selector = PointSelector::new(&config());
        selector.set_mode(PointSelectionMode::SphericalCursor);

        // locked: moving does nothing
        selector
            .handle(InputEvent::PointerMove { ndc: Point2::new(0.4, 0.4) }, &camera, &registry)
            .unwrap();
        assert_eq!(selector.cursor().center(), Point3::origin());

        selector.handle(key_down(Key::Shift), &camera, &registry).unwrap();
        assert!(!selector.cursor().is_locked());
        // NDC 0.8 maps to world 8 on an ortho camera spanning [-10, 10]
        selector
            .handle(InputEvent::PointerMove { ndc: Point2::new(0.8, 0.8) }, &camera, &registry)
            .unwrap();
        assert_eq!(selector.cursor().center(), Point3::new(8.0, 8.0, 0.0));
        assert_eq!(selector.preview(&registry).indices(id), &[2]);

        selector
            .handle(InputEvent::KeyUp { key: Key::Shift }, &camera, &registry)
            .unwrap();
        assert!(selector.cursor().is_locked());
        assert!(selector.preview(&registry).is_empty());

        let no_shift = InputEvent::PointerUp { ndc: Point2::origin(), shift: false };
        assert!(selector.handle(no_shift, &camera, &registry).unwrap().is_none());
        let up = InputEvent::PointerUp { ndc: Point2::origin(), shift: true };
        let result = selector.handle(up, &camera, &registry).unwrap().unwrap();
        assert_eq!(result.indices(id), &[2]);
    }

    #[test]
    fn test_sphere_keys_and_wheel() {
        let (registry, _) = registry();
        let camera = camera();
        let mut selector = PointSelector::new(&config());
        selector.set_mode(PointSelectionMode::Sphere);

        selector.handle(key_down(Key::Char('e')), &camera, &registry).unwrap();
        assert_eq!(selector.cursor().handle_mode(), HandleMode::Rotate);
        selector.handle(key_down(Key::Char('r')), &camera, &registry).unwrap();
        assert_eq!(selector.cursor().handle_mode(), HandleMode::Scale);
        selector.handle(key_down(Key::Char('w')), &camera, &registry).unwrap();
        assert_eq!(selector.cursor().handle_mode(), HandleMode::Translate);

        selector.handle(key_down(Key::Char('s')), &camera, &registry).unwrap();
        assert!(!selector.cursor().is_visible());
        let up = InputEvent::PointerUp { ndc: Point2::origin(), shift: true };
        assert!(selector.handle(up, &camera, &registry).unwrap().is_none());

        selector
            .handle(InputEvent::Wheel { delta_y: 500.0, ctrl: true }, &camera, &registry)
            .unwrap();
        assert_relative_eq!(selector.cursor().scale(), Vector3::repeat(1.5), epsilon = 1e-12);
    }

    #[test]
    fn test_unsupported_camera_error_surfaces() {
        let (registry, _) = registry();
        let camera = Camera::Unsupported { kind: "fisheye".into() };
        let mut selector = PointSelector::new(&config());
        selector.handle(key_down(Key::Shift), &camera, &registry).unwrap();
        selector
            .handle(InputEvent::PointerDown { ndc: Point2::new(-0.2, 0.2) }, &camera, &registry)
            .unwrap();
        let up = InputEvent::PointerUp { ndc: Point2::new(0.2, -0.2), shift: true };
        assert!(matches!(
            selector.handle(up, &camera, &registry),
            Err(TrackError::UnsupportedCameraType(_))
        ));
    }
}
