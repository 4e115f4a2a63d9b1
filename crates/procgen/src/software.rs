//! CPU render backend for the `2d` surface mode and for tests.
//!
//! Flat shapes are rasterised exactly. Mesh draws are validated against
//! their program and recorded but not shaded, since GLSL never runs here.

use crate::color::Rgba;
use crate::error::{FrameError, SetupError};
use crate::geometry::{GeometryId, Mesh, Primitive};
use crate::program::{AttributeKind, Program, ProgramId, Uniforms};
use crate::target::{
    BackendKind, BlendMode, Destination, DrawCall, PixelBuffer, PixelFormat, RenderBackend, Shape,
    TargetDescriptor, TargetId,
};

const MAX_DIMENSION: u32 = 8192;

/// One observable backend action, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawRecord {
    Clear {
        destination: Destination,
        color: Rgba,
    },
    Mesh {
        destination: Destination,
        program: String,
        uniforms: Uniforms,
        elements: usize,
        primitive: Primitive,
        blend: BlendMode,
    },
    Shapes {
        destination: Destination,
        count: usize,
    },
    Blit {
        source: TargetId,
        destination: Destination,
    },
    Upload {
        target: TargetId,
    },
    EndFrame,
}

impl DrawRecord {
    pub fn destination(&self) -> Option<Destination> {
        match self {
            DrawRecord::Clear { destination, .. }
            | DrawRecord::Mesh { destination, .. }
            | DrawRecord::Shapes { destination, .. }
            | DrawRecord::Blit { destination, .. } => Some(*destination),
            DrawRecord::Upload { target } => Some(Destination::Target(*target)),
            DrawRecord::EndFrame => None,
        }
    }
}

struct Canvas {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<Rgba>,
}

impl Canvas {
    fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            pixels: vec![Rgba::TRANSPARENT; (width * height) as usize],
        }
    }

    fn quantize(&self, color: Rgba) -> Rgba {
        match self.format {
            PixelFormat::Rgba8 => Rgba::from_rgba8(color.to_rgba8()),
            PixelFormat::Rgba16Float => color,
        }
    }

    fn fill(&mut self, color: Rgba) {
        let stored = self.quantize(color);
        self.pixels.iter_mut().for_each(|px| *px = stored);
    }

    fn raster(&mut self, shape: &Shape, blend: BlendMode) {
        let (min_x, min_y, max_x, max_y) = match *shape {
            Shape::Rect {
                x,
                y,
                width,
                height,
                ..
            } => (x, y, x + width, y + height),
            Shape::Circle { centre, radius, .. } => (
                centre[0] - radius,
                centre[1] - radius,
                centre[0] + radius,
                centre[1] + radius,
            ),
        };
        let clamp_x = |v: f32| v.floor().clamp(0.0, self.width as f32) as u32;
        let clamp_y = |v: f32| v.floor().clamp(0.0, self.height as f32) as u32;
        let (x0, x1) = (clamp_x(min_x), clamp_x(max_x + 1.0));
        let (y0, y1) = (clamp_y(min_y), clamp_y(max_y + 1.0));
        let color = shape.color();
        for y in y0..y1 {
            for x in x0..x1 {
                if shape.covers(x as f32 + 0.5, y as f32 + 0.5) {
                    let index = (y * self.width + x) as usize;
                    let blended = blend.apply(color, self.pixels[index]);
                    self.pixels[index] = self.quantize(blended);
                }
            }
        }
    }

    fn snapshot(&self) -> PixelBuffer {
        PixelBuffer {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }
}

struct SoftTarget {
    descriptor: TargetDescriptor,
    canvas: Canvas,
    /// Last frame's contents for feedback targets.
    previous: Option<Vec<Rgba>>,
}

struct SoftGeometry {
    layout: Vec<(String, AttributeKind)>,
    elements: usize,
}

/// Deterministic in-memory renderer.
pub struct SoftwareBackend {
    screen: Canvas,
    targets: Vec<SoftTarget>,
    programs: Vec<Program>,
    geometry: Vec<SoftGeometry>,
    destination: Destination,
    log: Vec<DrawRecord>,
    frames: u64,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: Canvas::new(width, height, PixelFormat::Rgba8),
            targets: Vec::new(),
            programs: Vec::new(),
            geometry: Vec::new(),
            destination: Destination::Screen,
            log: Vec::new(),
            frames: 0,
        }
    }

    pub fn log(&self) -> &[DrawRecord] {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.log)
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames
    }

    fn target_entry(&self, id: TargetId) -> Result<&SoftTarget, FrameError> {
        self.targets.get(id.0).ok_or(FrameError::UnknownTarget(id.0))
    }

    fn canvas_mut(&mut self, destination: Destination) -> Result<&mut Canvas, FrameError> {
        match destination {
            Destination::Screen => Ok(&mut self.screen),
            Destination::Target(id) => self
                .targets
                .get_mut(id.0)
                .map(|target| &mut target.canvas)
                .ok_or(FrameError::UnknownTarget(id.0)),
        }
    }

    fn check_samples(&self, program: &Program, uniforms: &Uniforms) -> Result<(), FrameError> {
        for texture in uniforms.textures() {
            let target = self.target_entry(texture)?;
            if self.destination == Destination::Target(texture) && !target.descriptor.feedback {
                return Err(FrameError::InvalidDraw {
                    program: program.name().to_string(),
                    reason: format!(
                        "samples target '{}' while drawing into it",
                        target.descriptor.label
                    ),
                });
            }
        }
        Ok(())
    }
}

impl RenderBackend for SoftwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn create_target(&mut self, descriptor: TargetDescriptor) -> Result<TargetId, SetupError> {
        descriptor.validate(MAX_DIMENSION)?;
        let id = TargetId(self.targets.len());
        let canvas = Canvas::new(descriptor.width, descriptor.height, descriptor.format);
        let previous = descriptor.feedback.then(|| canvas.pixels.clone());
        tracing::debug!(
            target_label = %descriptor.label,
            width = descriptor.width,
            height = descriptor.height,
            feedback = descriptor.feedback,
            "created software render target"
        );
        self.targets.push(SoftTarget {
            descriptor,
            canvas,
            previous,
        });
        Ok(id)
    }

    fn target(&self, id: TargetId) -> Option<&TargetDescriptor> {
        self.targets.get(id.0).map(|target| &target.descriptor)
    }

    fn create_program(&mut self, program: Program) -> Result<ProgramId, SetupError> {
        let id = ProgramId(self.programs.len());
        self.programs.push(program);
        Ok(id)
    }

    fn program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(id.0)
    }

    fn create_geometry(&mut self, mesh: &Mesh) -> Result<GeometryId, SetupError> {
        let elements = mesh.element_count().map_err(SetupError::Backend)?;
        let id = GeometryId(self.geometry.len());
        self.geometry.push(SoftGeometry {
            layout: mesh
                .attributes
                .iter()
                .map(|(name, data)| (name.to_string(), data.kind))
                .collect(),
            elements,
        });
        Ok(id)
    }

    fn update_geometry(&mut self, id: GeometryId, mesh: &Mesh) -> Result<(), FrameError> {
        let elements = mesh.element_count().map_err(FrameError::Backend)?;
        let layout: Vec<(String, AttributeKind)> = mesh
            .attributes
            .iter()
            .map(|(name, data)| (name.to_string(), data.kind))
            .collect();
        let entry = self
            .geometry
            .get_mut(id.0)
            .ok_or(FrameError::UnknownGeometry(id.0))?;
        if entry.layout != layout {
            return Err(FrameError::Backend(format!(
                "geometry #{} changed its vertex layout",
                id.0
            )));
        }
        entry.elements = elements;
        Ok(())
    }

    fn destination(&self) -> Destination {
        self.destination
    }

    fn bind(&mut self, destination: Destination) -> Result<Destination, FrameError> {
        if let Destination::Target(id) = destination {
            self.target_entry(id)?;
        }
        Ok(std::mem::replace(&mut self.destination, destination))
    }

    fn clear(&mut self, destination: Destination, color: Rgba) -> Result<(), FrameError> {
        if let Destination::Target(id) = destination {
            let target = self.target_entry(id)?;
            if target.descriptor.feedback {
                return Err(FrameError::FeedbackClear(target.descriptor.label.clone()));
            }
        }
        self.canvas_mut(destination)?.fill(color);
        self.log.push(DrawRecord::Clear { destination, color });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), FrameError> {
        let program = self
            .programs
            .get(call.program.0)
            .ok_or(FrameError::UnknownProgram(call.program.0))?;
        let geometry = self
            .geometry
            .get(call.geometry.0)
            .ok_or(FrameError::UnknownGeometry(call.geometry.0))?;
        let invalid = |reason: String| FrameError::InvalidDraw {
            program: program.name().to_string(),
            reason,
        };
        program.check_uniforms(call.uniforms).map_err(&invalid)?;
        for (name, kind) in program.attributes() {
            match geometry.layout.iter().find(|(attr, _)| attr == name) {
                Some((_, actual)) if actual == kind => {}
                Some((_, actual)) => {
                    return Err(invalid(format!(
                        "attribute '{name}' expects {} but geometry holds {}",
                        kind.glsl_type(),
                        actual.glsl_type()
                    )))
                }
                None => {
                    return Err(invalid(format!(
                        "attribute '{name}' is missing from geometry #{}",
                        call.geometry.0
                    )))
                }
            }
        }
        self.check_samples(program, call.uniforms)?;
        self.log.push(DrawRecord::Mesh {
            destination: self.destination,
            program: program.name().to_string(),
            uniforms: call.uniforms.clone(),
            elements: geometry.elements,
            primitive: call.primitive,
            blend: call.blend,
        });
        Ok(())
    }

    fn draw_shapes(&mut self, shapes: &[Shape], blend: BlendMode) -> Result<(), FrameError> {
        let destination = self.destination;
        let canvas = self.canvas_mut(destination)?;
        for shape in shapes {
            canvas.raster(shape, blend);
        }
        self.log.push(DrawRecord::Shapes {
            destination,
            count: shapes.len(),
        });
        Ok(())
    }

    fn blit(&mut self, source: TargetId, blend: BlendMode) -> Result<(), FrameError> {
        let destination = self.destination;
        if destination == Destination::Target(source) && !self.target_entry(source)?.descriptor.feedback
        {
            return Err(FrameError::InvalidDraw {
                program: "blit".into(),
                reason: "source and destination are the same target".into(),
            });
        }
        let sampled = self.sampled_pixels(source)?;
        let canvas = self.canvas_mut(destination)?;
        for y in 0..canvas.height {
            let sy = (y as u64 * sampled.height as u64 / canvas.height as u64) as u32;
            for x in 0..canvas.width {
                let sx = (x as u64 * sampled.width as u64 / canvas.width as u64) as u32;
                let src = sampled.pixels[(sy * sampled.width + sx) as usize];
                let index = (y * canvas.width + x) as usize;
                let blended = blend.apply(src, canvas.pixels[index]);
                canvas.pixels[index] = canvas.quantize(blended);
            }
        }
        self.log.push(DrawRecord::Blit {
            source,
            destination,
        });
        Ok(())
    }

    fn write_pixels(&mut self, target: TargetId, pixels: &[Rgba]) -> Result<(), FrameError> {
        let entry = self
            .targets
            .get_mut(target.0)
            .ok_or(FrameError::UnknownTarget(target.0))?;
        let expected = (entry.descriptor.width * entry.descriptor.height) as usize;
        if pixels.len() != expected {
            return Err(FrameError::InvalidUpload {
                target: entry.descriptor.label.clone(),
                reason: format!("expected {expected} pixels, got {}", pixels.len()),
            });
        }
        for (slot, px) in entry.canvas.pixels.iter_mut().zip(pixels) {
            *slot = *px;
        }
        if entry.canvas.format == PixelFormat::Rgba8 {
            for px in entry.canvas.pixels.iter_mut() {
                *px = Rgba::from_rgba8(px.to_rgba8());
            }
        }
        self.log.push(DrawRecord::Upload { target });
        Ok(())
    }

    fn read_pixels(&mut self, destination: Destination) -> Result<PixelBuffer, FrameError> {
        Ok(self.canvas_mut(destination)?.snapshot())
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        self.destination = Destination::Screen;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        for target in self.targets.iter_mut() {
            if let Some(previous) = target.previous.as_mut() {
                previous.clone_from(&target.canvas.pixels);
            }
        }
        self.frames += 1;
        self.log.push(DrawRecord::EndFrame);
        Ok(())
    }
}

impl SoftwareBackend {
    /// Contents a program sampling `id` would see this frame: the previous
    /// frame for feedback targets, the current contents otherwise.
    pub fn sampled_pixels(&self, id: TargetId) -> Result<PixelBuffer, FrameError> {
        let target = self.target_entry(id)?;
        let pixels = target
            .previous
            .clone()
            .unwrap_or_else(|| target.canvas.pixels.clone());
        Ok(PixelBuffer {
            width: target.descriptor.width,
            height: target.descriptor.height,
            pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::use_target;

    #[test]
    fn cleared_target_reads_back_exactly() {
        let mut backend = SoftwareBackend::new(32, 32);
        let target = backend
            .create_target(TargetDescriptor::new("swatch", 64, 64).format(PixelFormat::Rgba16Float))
            .expect("target");
        let color = Rgba::new(0.1, 0.25, 0.7, 0.9);
        backend.clear(target.into(), color).expect("clear");
        let pixels = backend.read_pixels(target.into()).expect("read");
        assert_eq!(pixels.pixels.len(), 64 * 64);
        assert!(pixels.pixels.iter().all(|px| *px == color));
    }

    #[test]
    fn rgba8_targets_quantize_once() {
        let mut backend = SoftwareBackend::new(8, 8);
        let target = backend
            .create_target(TargetDescriptor::new("bytes", 4, 4))
            .expect("target");
        let color = Rgba::new(0.2, 0.4, 0.6, 1.0);
        backend.clear(target.into(), color).expect("clear");
        let pixels = backend.read_pixels(target.into()).expect("read");
        assert!(pixels.to_rgba8().chunks(4).all(|px| px == color.to_rgba8()));
    }

    #[test]
    fn use_target_restores_destination() {
        let mut backend = SoftwareBackend::new(8, 8);
        let target = backend
            .create_target(TargetDescriptor::new("offscreen", 4, 4))
            .expect("target");
        let result = use_target(&mut backend, target, |inner| {
            assert_eq!(inner.destination(), Destination::Target(target));
            Err::<(), _>(FrameError::Backend("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(backend.destination(), Destination::Screen);
    }

    #[test]
    fn use_target_restores_destination_on_panic() {
        let mut backend = SoftwareBackend::new(8, 8);
        let target = backend
            .create_target(TargetDescriptor::new("offscreen", 4, 4))
            .expect("target");
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = use_target(&mut backend, target, |_| -> Result<(), FrameError> {
                panic!("draw failed")
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(backend.destination(), Destination::Screen);
    }

    #[test]
    fn feedback_targets_refuse_clear_and_keep_history() {
        let mut backend = SoftwareBackend::new(8, 8);
        let trail = backend
            .create_target(TargetDescriptor::new("trail", 4, 4).feedback())
            .expect("target");
        assert!(matches!(
            backend.clear(trail.into(), Rgba::BLACK),
            Err(FrameError::FeedbackClear(_))
        ));

        use_target(&mut backend, trail, |inner| {
            inner.draw_shapes(&[Shape::fill(4, 4, Rgba::WHITE)], BlendMode::Replace)
        })
        .expect("draw");
        assert_eq!(
            backend.sampled_pixels(trail).expect("sample").pixels[0],
            Rgba::TRANSPARENT
        );
        backend.end_frame().expect("end");
        assert_eq!(
            backend.sampled_pixels(trail).expect("sample").pixels[0],
            Rgba::WHITE
        );
        // Contents carry into the next frame.
        assert_eq!(
            backend.read_pixels(trail.into()).expect("read").pixels[0],
            Rgba::WHITE
        );
    }

    #[test]
    fn circle_raster_covers_centre_not_corners() {
        let mut backend = SoftwareBackend::new(16, 16);
        backend.clear(Destination::Screen, Rgba::BLACK).expect("clear");
        backend
            .draw_shapes(
                &[Shape::Circle {
                    centre: [8.0, 8.0],
                    radius: 4.0,
                    color: Rgba::WHITE,
                }],
                BlendMode::Replace,
            )
            .expect("draw");
        let pixels = backend.read_pixels(Destination::Screen).expect("read");
        assert_eq!(pixels.get(8, 8), Some(Rgba::WHITE));
        assert_eq!(pixels.get(0, 0), Some(Rgba::BLACK));
        assert_eq!(pixels.get(15, 15), Some(Rgba::BLACK));
    }

    #[test]
    fn blit_stretches_source() {
        let mut backend = SoftwareBackend::new(8, 8);
        let small = backend
            .create_target(TargetDescriptor::new("small", 2, 2))
            .expect("target");
        backend
            .write_pixels(small, &[Rgba::WHITE, Rgba::BLACK, Rgba::BLACK, Rgba::WHITE])
            .expect("upload");
        backend.blit(small, BlendMode::Replace).expect("blit");
        let screen = backend.read_pixels(Destination::Screen).expect("read");
        assert_eq!(screen.get(0, 0), Some(Rgba::WHITE));
        assert_eq!(screen.get(7, 0), Some(Rgba::BLACK));
        assert_eq!(screen.get(7, 7), Some(Rgba::WHITE));
    }

    #[test]
    fn upload_size_is_checked() {
        let mut backend = SoftwareBackend::new(8, 8);
        let strip = backend
            .create_target(TargetDescriptor::new("spectrum", 4, 1))
            .expect("target");
        let err = backend
            .write_pixels(strip, &[Rgba::WHITE; 3])
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidUpload { .. }));
        backend.write_pixels(strip, &[Rgba::WHITE; 4]).expect("upload");
    }

    #[test]
    fn zero_sized_target_is_a_setup_error() {
        let mut backend = SoftwareBackend::new(8, 8);
        let err = backend
            .create_target(TargetDescriptor::new("empty", 0, 4))
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
