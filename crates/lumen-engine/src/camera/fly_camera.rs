use glam::{Mat4, Vec3};

/// Default yaw in degrees; looks down -Z.
pub const YAW: f32 = -90.0;
pub const PITCH: f32 = 0.0;
/// World units per second.
pub const SPEED: f32 = 2.5;
/// Degrees per pointer unit.
pub const SENSITIVITY: f32 = 0.1;
/// Vertical field of view in degrees.
pub const ZOOM: f32 = 45.0;

const PITCH_LIMIT: f32 = 89.0;
const ZOOM_MIN: f32 = 1.0;
const ZOOM_MAX: f32 = 45.0;

/// Keyboard-driven movement directions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
}

/// Read-only snapshot of the camera handed to the renderer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    /// Vertical field of view in degrees.
    pub zoom: f32,
}

impl CameraState {
    /// Look-at from `position` towards `position + front`.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,

    yaw: f32,
    pitch: f32,

    pub movement_speed: f32,
    pub mouse_sensitivity: f32,
    zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::Y, YAW, PITCH)
    }
}

impl Camera {
    pub fn new(position: Vec3, world_up: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            up: world_up,
            right: Vec3::X,
            world_up,
            yaw,
            pitch,
            movement_speed: SPEED,
            mouse_sensitivity: SENSITIVITY,
            zoom: ZOOM,
        };
        camera.update_vectors();
        camera
    }

    /// Camera at `position` with the default orientation.
    pub fn at(position: Vec3) -> Self {
        Self::new(position, Vec3::Y, YAW, PITCH)
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            position: self.position,
            front: self.front,
            up: self.up,
            right: self.right,
            zoom: self.zoom,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.state().view_matrix()
    }

    /// Moves along the camera basis, scaled by `dt` seconds.
    pub fn process_keyboard(&mut self, direction: Movement, dt: f32) {
        let velocity = self.movement_speed * dt;
        match direction {
            Movement::Forward => self.position += self.front * velocity,
            Movement::Backward => self.position -= self.front * velocity,
            Movement::Left => self.position -= self.right * velocity,
            Movement::Right => self.position += self.right * velocity,
        }
    }

    /// Turns by a pointer offset. Positive `dy` looks up.
    pub fn process_mouse_movement(&mut self, dx: f32, dy: f32, constrain_pitch: bool) {
        self.yaw += dx * self.mouse_sensitivity;
        self.pitch += dy * self.mouse_sensitivity;

        // Past ±90° the look-at basis flips.
        if constrain_pitch {
            self.pitch = self.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }

        self.update_vectors();
    }

    /// Narrows the field of view when scrolling up.
    pub fn process_mouse_scroll(&mut self, dy: f32) {
        self.zoom = (self.zoom - dy).clamp(ZOOM_MIN, ZOOM_MAX);
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}
