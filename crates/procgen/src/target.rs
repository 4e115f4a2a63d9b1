//! Render targets, draw submission, and the backend seam.

use std::ops::{Deref, DerefMut};

use crate::color::Rgba;
use crate::error::{FrameError, SetupError};
use crate::geometry::{GeometryId, Mesh, Primitive};
use crate::program::{Program, ProgramId, Uniforms};

/// Handle to an offscreen target owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub usize);

/// Where draw calls currently land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Destination {
    #[default]
    Screen,
    Target(TargetId),
}

impl From<TargetId> for Destination {
    fn from(id: TargetId) -> Self {
        Destination::Target(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Rgba16Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub depth: bool,
    /// Keeps the previous frame readable while the current one is drawn.
    pub feedback: bool,
    /// Filled with `write_pixels` from `Sketch::update` instead of by a pass.
    pub uploaded: bool,
}

impl TargetDescriptor {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format: PixelFormat::Rgba8,
            depth: false,
            feedback: false,
            uploaded: false,
        }
    }

    pub fn format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_depth(mut self) -> Self {
        self.depth = true;
        self
    }

    pub fn feedback(mut self) -> Self {
        self.feedback = true;
        self
    }

    pub fn uploaded(mut self) -> Self {
        self.uploaded = true;
        self
    }

    pub fn validate(&self, max_dimension: u32) -> Result<(), SetupError> {
        let invalid = |reason: String| SetupError::Target {
            target: self.label.clone(),
            reason,
        };
        if self.label.trim().is_empty() {
            return Err(invalid("label is empty".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.feedback && self.uploaded {
            return Err(invalid("a target cannot be both feedback and uploaded".into()));
        }
        if self.width > max_dimension || self.height > max_dimension {
            return Err(invalid(format!(
                "size {}x{} exceeds the backend limit of {max_dimension}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Replace,
    Alpha,
    Additive,
}

impl BlendMode {
    /// Blends `src` over `dst` the way the GPU blend states do.
    pub fn apply(self, src: Rgba, dst: Rgba) -> Rgba {
        match self {
            BlendMode::Replace => src,
            BlendMode::Alpha => {
                let a = src.a;
                Rgba::new(
                    src.r * a + dst.r * (1.0 - a),
                    src.g * a + dst.g * (1.0 - a),
                    src.b * a + dst.b * (1.0 - a),
                    a + dst.a * (1.0 - a),
                )
            }
            BlendMode::Additive => Rgba::new(
                (dst.r + src.r * src.a).min(1.0),
                (dst.g + src.g * src.a).min(1.0),
                (dst.b + src.b * src.a).min(1.0),
                (dst.a + src.a).min(1.0),
            ),
        }
    }
}

/// One draw against the current destination.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub uniforms: &'a Uniforms,
    pub geometry: GeometryId,
    pub primitive: Primitive,
    pub blend: BlendMode,
}

impl<'a> DrawCall<'a> {
    pub fn new(program: ProgramId, geometry: GeometryId, uniforms: &'a Uniforms) -> Self {
        Self {
            program,
            uniforms,
            geometry,
            primitive: Primitive::Triangles,
            blend: BlendMode::Replace,
        }
    }

    pub fn primitive(mut self, primitive: Primitive) -> Self {
        self.primitive = primitive;
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// Flat 2D primitives in pixel coordinates, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgba,
    },
    Circle {
        centre: [f32; 2],
        radius: f32,
        color: Rgba,
    },
}

impl Shape {
    pub fn color(&self) -> Rgba {
        match self {
            Shape::Rect { color, .. } | Shape::Circle { color, .. } => *color,
        }
    }

    /// Covers a whole `width` x `height` surface.
    pub fn fill(width: u32, height: u32, color: Rgba) -> Self {
        Shape::Rect {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            color,
        }
    }

    /// Pixel-centre coverage test.
    pub fn covers(&self, px: f32, py: f32) -> bool {
        match *self {
            Shape::Rect {
                x,
                y,
                width,
                height,
                ..
            } => px >= x && px < x + width && py >= y && py < y + height,
            Shape::Circle { centre, radius, .. } => {
                let dx = px - centre[0];
                let dy = py - centre[1];
                dx * dx + dy * dy <= radius * radius
            }
        }
    }
}

/// Row-major pixels read back from a destination, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Rgba>,
}

impl PixelBuffer {
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width * height) as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|px| px.to_rgba8()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// CPU rasteriser for flat shapes; the `2d` surface mode.
    Software,
    /// wgpu device; the `gpu` surface mode.
    Gpu,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Software => "2d",
            BackendKind::Gpu => "gpu",
        }
    }
}

/// Everything a sketch may ask of a renderer.
///
/// Setup-only operations return [`SetupError`]; per-frame operations return
/// [`FrameError`]. All drawing goes to the current [`Destination`], which is
/// changed with [`RenderBackend::bind`] or, preferably, [`use_target`].
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;
    fn surface_size(&self) -> (u32, u32);

    fn create_target(&mut self, descriptor: TargetDescriptor) -> Result<TargetId, SetupError>;
    fn target(&self, id: TargetId) -> Option<&TargetDescriptor>;
    fn create_program(&mut self, program: Program) -> Result<ProgramId, SetupError>;
    fn program(&self, id: ProgramId) -> Option<&Program>;
    fn create_geometry(&mut self, mesh: &Mesh) -> Result<GeometryId, SetupError>;

    /// Replaces a mesh's contents; the vertex layout may not change.
    fn update_geometry(&mut self, id: GeometryId, mesh: &Mesh) -> Result<(), FrameError>;

    fn destination(&self) -> Destination;
    /// Redirects drawing and returns the previous destination.
    fn bind(&mut self, destination: Destination) -> Result<Destination, FrameError>;

    /// Fills a destination. Feedback targets refuse to be cleared.
    fn clear(&mut self, destination: Destination, color: Rgba) -> Result<(), FrameError>;
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), FrameError>;
    fn draw_shapes(&mut self, shapes: &[Shape], blend: BlendMode) -> Result<(), FrameError>;
    /// Stretches a target's sampled contents over the current destination.
    fn blit(&mut self, source: TargetId, blend: BlendMode) -> Result<(), FrameError>;

    /// Uploads a full image into a target, e.g. an audio spectrum strip.
    fn write_pixels(&mut self, target: TargetId, pixels: &[Rgba]) -> Result<(), FrameError>;
    fn read_pixels(&mut self, destination: Destination) -> Result<PixelBuffer, FrameError>;

    fn begin_frame(&mut self) -> Result<(), FrameError>;
    /// Finishes the frame and advances every feedback target.
    fn end_frame(&mut self) -> Result<(), FrameError>;
}

impl<T: RenderBackend + ?Sized> RenderBackend for Box<T> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn surface_size(&self) -> (u32, u32) {
        (**self).surface_size()
    }

    fn create_target(&mut self, descriptor: TargetDescriptor) -> Result<TargetId, SetupError> {
        (**self).create_target(descriptor)
    }

    fn target(&self, id: TargetId) -> Option<&TargetDescriptor> {
        (**self).target(id)
    }

    fn create_program(&mut self, program: Program) -> Result<ProgramId, SetupError> {
        (**self).create_program(program)
    }

    fn program(&self, id: ProgramId) -> Option<&Program> {
        (**self).program(id)
    }

    fn create_geometry(&mut self, mesh: &Mesh) -> Result<GeometryId, SetupError> {
        (**self).create_geometry(mesh)
    }

    fn update_geometry(&mut self, id: GeometryId, mesh: &Mesh) -> Result<(), FrameError> {
        (**self).update_geometry(id, mesh)
    }

    fn destination(&self) -> Destination {
        (**self).destination()
    }

    fn bind(&mut self, destination: Destination) -> Result<Destination, FrameError> {
        (**self).bind(destination)
    }

    fn clear(&mut self, destination: Destination, color: Rgba) -> Result<(), FrameError> {
        (**self).clear(destination, color)
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), FrameError> {
        (**self).draw(call)
    }

    fn draw_shapes(&mut self, shapes: &[Shape], blend: BlendMode) -> Result<(), FrameError> {
        (**self).draw_shapes(shapes, blend)
    }

    fn blit(&mut self, source: TargetId, blend: BlendMode) -> Result<(), FrameError> {
        (**self).blit(source, blend)
    }

    fn write_pixels(&mut self, target: TargetId, pixels: &[Rgba]) -> Result<(), FrameError> {
        (**self).write_pixels(target, pixels)
    }

    fn read_pixels(&mut self, destination: Destination) -> Result<PixelBuffer, FrameError> {
        (**self).read_pixels(destination)
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        (**self).begin_frame()
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        (**self).end_frame()
    }
}

/// Scoped redirection of drawing to another destination.
///
/// Dereferences to the backend; the previous destination is restored when
/// the scope drops, including during unwinding.
pub struct TargetScope<'a> {
    backend: &'a mut (dyn RenderBackend + 'a),
    previous: Destination,
}

impl<'a> TargetScope<'a> {
    pub fn enter(
        backend: &'a mut (dyn RenderBackend + 'a),
        destination: Destination,
    ) -> Result<Self, FrameError> {
        let previous = backend.bind(destination)?;
        Ok(Self { backend, previous })
    }

    pub fn previous(&self) -> Destination {
        self.previous
    }
}

impl<'a> Deref for TargetScope<'a> {
    type Target = dyn RenderBackend + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.backend
    }
}

impl<'a> DerefMut for TargetScope<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.backend
    }
}

impl Drop for TargetScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.backend.bind(self.previous) {
            tracing::error!(error = %err, "failed to restore render destination");
        }
    }
}

/// Runs `draw` with `destination` bound, restoring the previous destination
/// on every exit path.
pub fn use_target<'a, R>(
    backend: &'a mut (dyn RenderBackend + 'a),
    destination: impl Into<Destination>,
    draw: impl FnOnce(&mut dyn RenderBackend) -> Result<R, FrameError>,
) -> Result<R, FrameError> {
    let mut scope = TargetScope::enter(backend, destination.into())?;
    draw(&mut *scope)
}
