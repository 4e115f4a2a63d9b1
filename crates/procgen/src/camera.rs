//! Perspective cameras for mesh sketches.
//!
//! Matrices follow GL conventions (right-handed, clip depth `-w..w`); the GPU
//! backend remaps depth for wgpu after the vertex stage.

use glam::{Mat4, Vec3};

use crate::program::{UniformValue, Uniforms};

/// A perspective projection looking from `eye` towards `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl Camera {
    /// Looks down -Z at the origin from five units away.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y,
            aspect,
            near,
            far,
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
        }
    }

    pub fn look_at(mut self, eye: impl Into<Vec3>, target: impl Into<Vec3>) -> Self {
        self.eye = eye.into();
        self.target = target.into();
        self
    }

    pub fn up(mut self, up: impl Into<Vec3>) -> Self {
        self.up = up.into();
        self
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y, self.aspect, self.near, self.far)
    }

    /// World to eye space. An `up` parallel to the view direction falls back
    /// to +Z so the basis stays defined.
    pub fn view(&self) -> Mat4 {
        let forward = self.target - self.eye;
        let up = if forward.cross(self.up).length_squared() <= f32::EPSILON {
            Vec3::Z
        } else {
            self.up
        };
        Mat4::look_at_rh(self.eye, self.target, up)
    }

    /// Normalized device coordinates of a world-space point.
    pub fn project(&self, point: impl Into<Vec3>) -> Vec3 {
        (self.projection() * self.view()).project_point3(point.into())
    }

    /// `u_projection` and `u_view`, ready to merge into a draw's uniforms.
    pub fn uniforms(&self) -> Uniforms {
        Uniforms::new()
            .with("u_projection", self.projection())
            .with("u_view", self.view())
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        UniformValue::Mat4(value.to_cols_array_2d())
    }
}
