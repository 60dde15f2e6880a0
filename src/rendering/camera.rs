use crate::core::{bounds::GroundQuad, geo::Point};
use crate::layers::tile::FrameInput;
use nalgebra::{Matrix4, Point3, Vector3, Vector4};

/// Ground-plane point (x east, y north) to 3D world space, where the ground is
/// `y = 0`, y points up and north is `-z`.
pub fn ground_to_world(point: Point) -> Point3<f64> {
    Point3::new(point.x, 0.0, -point.y)
}

/// Drops a 3D world position onto the ground plane.
pub fn world_to_ground(point: &Point3<f64>) -> Point {
    Point::new(point.x, -point.z)
}

/// Perspective camera over the ground plane
pub struct Camera {
    pub eye: Point3<f64>,
    pub target: Point3<f64>,
    /// Vertical field of view in radians
    pub fov_y: f64,
    /// Width over height
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    /// Projection matrix
    projection_matrix: Matrix4<f64>,
    /// View matrix
    view_matrix: Matrix4<f64>,
    /// Combined view-projection matrix
    view_projection_matrix: Matrix4<f64>,
    /// Whether matrices need updating
    dirty: bool,
}

impl Camera {
    /// Create a new camera
    pub fn new(eye: Point3<f64>, target: Point3<f64>, fov_y_degrees: f64, aspect: f64) -> Self {
        let mut camera = Self {
            eye,
            target,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.1,
            far: 1.0e9,
            projection_matrix: Matrix4::identity(),
            view_matrix: Matrix4::identity(),
            view_projection_matrix: Matrix4::identity(),
            dirty: true,
        };

        camera.update_matrices();
        camera
    }

    /// Camera `height` units above the ground looking at `focus`, tilted
    /// `pitch_degrees` away from straight down (towards the north).
    pub fn looking_at_ground(
        focus: Point,
        height: f64,
        pitch_degrees: f64,
        fov_y_degrees: f64,
        aspect: f64,
    ) -> Self {
        let target = ground_to_world(focus);
        let back = height * pitch_degrees.to_radians().tan();
        let eye = Point3::new(target.x, height, target.z + back);
        Self::new(eye, target, fov_y_degrees, aspect)
    }

    /// Update camera position
    pub fn set_eye(&mut self, eye: Point3<f64>) {
        if self.eye != eye {
            self.eye = eye;
            self.dirty = true;
        }
    }

    pub fn set_target(&mut self, target: Point3<f64>) {
        if self.target != target {
            self.target = target;
            self.dirty = true;
        }
    }

    pub fn set_aspect(&mut self, aspect: f64) {
        if (self.aspect - aspect).abs() > f64::EPSILON {
            self.aspect = aspect;
            self.dirty = true;
        }
    }

    /// Moves eye and target together across the ground.
    pub fn pan(&mut self, delta: Point) {
        let offset = Vector3::new(delta.x, 0.0, -delta.y);
        self.eye += offset;
        self.target += offset;
        self.dirty = true;
    }

    /// Height of the eye above the ground plane.
    pub fn height(&self) -> f64 {
        self.eye.y
    }

    /// Get the current view-projection matrix
    pub fn view_projection_matrix(&mut self) -> &Matrix4<f64> {
        if self.dirty {
            self.update_matrices();
        }
        &self.view_projection_matrix
    }

    /// Get the view matrix
    pub fn view_matrix(&mut self) -> &Matrix4<f64> {
        if self.dirty {
            self.update_matrices();
        }
        &self.view_matrix
    }

    /// Get the projection matrix
    pub fn projection_matrix(&mut self) -> &Matrix4<f64> {
        if self.dirty {
            self.update_matrices();
        }
        &self.projection_matrix
    }

    /// Where the line of sight meets the ground, or the target dropped onto
    /// the ground when it never does.
    pub fn focus_on_ground(&self) -> Point {
        let direction = self.target - self.eye;
        intersect_ground(&self.eye, &direction)
            .map(|hit| world_to_ground(&hit))
            .unwrap_or_else(|| world_to_ground(&self.target))
    }

    /// The four frustum corner rays intersected with the ground plane.
    /// `None` when any ray misses, e.g. when the horizon is in view.
    pub fn visible_ground(&mut self) -> Option<GroundQuad> {
        let inverse = self.view_projection_matrix().try_inverse()?;
        let mut corners = [Point::default(); 4];
        for (corner, (ndc_x, ndc_y)) in corners
            .iter_mut()
            .zip([(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)])
        {
            let near = unproject(&inverse, ndc_x, ndc_y, -1.0)?;
            let far = unproject(&inverse, ndc_x, ndc_y, 1.0)?;
            let hit = intersect_ground(&near, &(far - near))?;
            *corner = world_to_ground(&hit);
        }
        Some(GroundQuad::new(corners))
    }

    /// Camera state in the form the tile layer consumes each frame.
    pub fn frame_input(&mut self) -> FrameInput {
        FrameInput {
            focus: self.focus_on_ground(),
            camera_height: self.height(),
            visible_ground: self.visible_ground(),
            viewport_bounds: None,
        }
    }

    /// Update internal matrices
    fn update_matrices(&mut self) {
        self.projection_matrix =
            Matrix4::new_perspective(self.aspect, self.fov_y, self.near, self.far);

        let direction = self.target - self.eye;
        // Looking straight down, "up" on screen is north.
        let up = if direction.normalize().y.abs() > 0.999 {
            Vector3::new(0.0, 0.0, -1.0)
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };
        self.view_matrix = Matrix4::look_at_rh(&self.eye, &self.target, &up);

        // Combine view and projection matrices
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;

        self.dirty = false;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::looking_at_ground(Point::new(0.0, 0.0), 10_000.0, 0.0, 60.0, 16.0 / 9.0)
    }
}

fn unproject(inverse: &Matrix4<f64>, ndc_x: f64, ndc_y: f64, ndc_z: f64) -> Option<Point3<f64>> {
    let world = inverse * Vector4::new(ndc_x, ndc_y, ndc_z, 1.0);
    if world.w.abs() < f64::EPSILON {
        return None;
    }
    Some(Point3::new(world.x / world.w, world.y / world.w, world.z / world.w))
}

/// Hit of the ray `origin + t * direction` (t >= 0) with `y = 0`.
fn intersect_ground(origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<Point3<f64>> {
    if direction.y.abs() < 1e-12 {
        return None;
    }
    let t = -origin.y / direction.y;
    if !t.is_finite() || t < 0.0 {
        return None;
    }
    Some(origin + direction * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_down_camera_sees_square() {
        let mut camera = Camera::looking_at_ground(Point::new(10.0, 20.0), 100.0, 0.0, 90.0, 1.0);
        let quad = camera.visible_ground().unwrap();
        let bounds = quad.bounds().unwrap();
        assert!((bounds.min.x - -90.0).abs() < 1e-6);
        assert!((bounds.max.x - 110.0).abs() < 1e-6);
        assert!((bounds.min.y - -80.0).abs() < 1e-6);
        assert!((bounds.max.y - 120.0).abs() < 1e-6);

        let focus = camera.focus_on_ground();
        assert!((focus.x - 10.0).abs() < 1e-9);
        assert!((focus.y - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_horizon_in_view_has_no_quad() {
        // Tilted 80° with a 60° field of view: the top edge looks above the horizon.
        let mut camera = Camera::looking_at_ground(Point::new(0.0, 0.0), 100.0, 80.0, 60.0, 1.5);
        assert!(camera.visible_ground().is_none());

        let input = camera.frame_input();
        assert!(input.visible_ground.is_none());
        assert!((input.camera_height - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_tilted_camera_sees_further_north() {
        let mut camera = Camera::looking_at_ground(Point::new(0.0, 0.0), 100.0, 30.0, 40.0, 1.0);
        let bounds = camera.visible_ground().unwrap().bounds().unwrap();
        assert!(bounds.max.y > -bounds.min.y);
        assert!(bounds.contains(&Point::new(0.0, 0.0)));
    }
}
