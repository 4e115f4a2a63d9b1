//! [`RenderBackend`] on top of a headless wgpu device.
//!
//! Draws are recorded into one pending command encoder and submitted lazily:
//! before queue writes, before readbacks, and at the end of every frame. Each
//! clear, draw, shape batch, and blit is its own render pass, so passes see
//! each other's results in submission order.

use std::iter;

use anyhow::Result;
use procgen::{
    AttributeKind, BackendKind, BlendMode, Destination, DrawCall, FrameError, GeometryId, Mesh,
    PixelBuffer, PixelFormat, Primitive, Program, ProgramId, RenderBackend, Rgba, SetupError,
    Shape, TargetDescriptor, TargetId, UniformValue, Uniforms,
};
use wgpu::util::DeviceExt;

use super::context::{AdapterProfile, GpuContext, GpuOptions};
use super::pipeline::{
    BuiltinModules, PipelineCache, PipelineKey, PipelineSource, ProgramModules, DEPTH_FORMAT,
};
use super::readback::read_rgba8;
use super::SCREEN_FORMAT;
use crate::compile::translate;

const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

struct Surface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Surface {
    fn new(
        device: &wgpu::Device,
        label: &str,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        samples: u32,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(size.0, size.1),
            mip_level_count: 1,
            sample_count: samples,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

struct GpuTarget {
    descriptor: TargetDescriptor,
    format: wgpu::TextureFormat,
    current: Surface,
    /// Last frame's contents; what programs sample from feedback targets.
    previous: Option<Surface>,
    depth: Option<Surface>,
}

impl GpuTarget {
    fn sampled_view(&self) -> &wgpu::TextureView {
        self.previous
            .as_ref()
            .map(|surface| &surface.view)
            .unwrap_or(&self.current.view)
    }
}

struct Screen {
    width: u32,
    height: u32,
    resolved: Surface,
    multisampled: Option<Surface>,
    depth: Surface,
    samples: u32,
}

struct GpuProgram {
    program: Program,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

struct GpuGeometry {
    layout: Vec<(String, AttributeKind)>,
    buffers: Vec<wgpu::Buffer>,
    indices: Option<wgpu::Buffer>,
    elements: u32,
}

/// Render attachments and pipeline parameters for one destination.
struct Attachments {
    color: wgpu::TextureView,
    resolve: Option<wgpu::TextureView>,
    depth: Option<wgpu::TextureView>,
    format: wgpu::TextureFormat,
    samples: u32,
    size: (u32, u32),
}

/// GPU renderer for the `gpu` surface mode.
pub struct GpuBackend {
    context: GpuContext,
    screen: Screen,
    targets: Vec<GpuTarget>,
    programs: Vec<GpuProgram>,
    modules: Vec<ProgramModules>,
    geometry: Vec<GpuGeometry>,
    builtins: BuiltinModules,
    pipelines: PipelineCache,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    destination: Destination,
    encoder: Option<wgpu::CommandEncoder>,
    frames: u64,
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

fn clear_color(color: Rgba) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color.r),
        g: f64::from(color.g),
        b: f64::from(color.b),
        a: f64::from(color.a),
    }
}

fn pending<'a>(
    slot: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    slot.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sketch frame encoder"),
        })
    })
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    attachments: &Attachments,
    clear: Option<Rgba>,
) -> wgpu::RenderPass<'e> {
    let (load, depth_load) = match clear {
        Some(color) => (
            wgpu::LoadOp::Clear(clear_color(color)),
            wgpu::LoadOp::Clear(1.0),
        ),
        None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
    };
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &attachments.color,
            depth_slice: None,
            resolve_target: attachments.resolve.as_ref(),
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: attachments.depth.as_ref().map(|view| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn backend_error(err: impl std::fmt::Display) -> FrameError {
    FrameError::Backend(err.to_string())
}

impl GpuBackend {
    /// Creates a headless device and a `width` x `height` screen texture.
    pub fn new(width: u32, height: u32, options: GpuOptions) -> Result<Self> {
        let context = GpuContext::headless(options)?;
        anyhow::ensure!(
            width > 0 && height > 0,
            "surface size {width}x{height} must be non-zero"
        );
        anyhow::ensure!(
            width <= context.max_dimension && height <= context.max_dimension,
            "surface size {width}x{height} exceeds the adapter limit of {}",
            context.max_dimension
        );
        context.device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            tracing::error!(%error, "uncaptured wgpu error");
        }));

        let device = &context.device;
        let samples = context.screen_samples;
        let screen = Screen {
            width,
            height,
            resolved: Surface::new(device, "screen", (width, height), SCREEN_FORMAT, 1, TARGET_USAGE),
            multisampled: (samples > 1).then(|| {
                Surface::new(
                    device,
                    "screen msaa",
                    (width, height),
                    SCREEN_FORMAT,
                    samples,
                    wgpu::TextureUsages::RENDER_ATTACHMENT,
                )
            }),
            depth: Surface::new(
                device,
                "screen depth",
                (width, height),
                DEPTH_FORMAT,
                samples,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            ),
            samples,
        };

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("program sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let nearest_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blit sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let builtins = BuiltinModules::new(device);

        tracing::info!(
            adapter = %context.adapter_profile.name,
            width,
            height,
            samples,
            "initialised gpu backend"
        );

        let mut backend = Self {
            context,
            screen,
            targets: Vec::new(),
            programs: Vec::new(),
            modules: Vec::new(),
            geometry: Vec::new(),
            builtins,
            pipelines: PipelineCache::default(),
            linear_sampler,
            nearest_sampler,
            destination: Destination::Screen,
            encoder: None,
            frames: 0,
        };
        backend
            .clear_attachments(Destination::Screen, Rgba::TRANSPARENT)
            .map_err(anyhow::Error::new)?;
        Ok(backend)
    }

    pub fn adapter(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    /// MSAA sample count of the screen destination.
    pub fn screen_samples(&self) -> u32 {
        self.screen.samples
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames
    }

    /// Submits every recorded pass.
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.context.queue.submit(iter::once(encoder.finish()));
        }
    }

    fn target_entry(&self, id: TargetId) -> Result<&GpuTarget, FrameError> {
        self.targets.get(id.0).ok_or(FrameError::UnknownTarget(id.0))
    }

    fn attachments(&self, destination: Destination) -> Result<Attachments, FrameError> {
        match destination {
            Destination::Screen => {
                let screen = &self.screen;
                let (color, resolve) = match screen.multisampled.as_ref() {
                    Some(msaa) => (msaa.view.clone(), Some(screen.resolved.view.clone())),
                    None => (screen.resolved.view.clone(), None),
                };
                Ok(Attachments {
                    color,
                    resolve,
                    depth: Some(screen.depth.view.clone()),
                    format: SCREEN_FORMAT,
                    samples: screen.samples,
                    size: (screen.width, screen.height),
                })
            }
            Destination::Target(id) => {
                let target = self.target_entry(id)?;
                Ok(Attachments {
                    color: target.current.view.clone(),
                    resolve: None,
                    depth: target.depth.as_ref().map(|surface| surface.view.clone()),
                    format: target.format,
                    samples: 1,
                    size: (target.descriptor.width, target.descriptor.height),
                })
            }
        }
    }

    fn clear_attachments(&mut self, destination: Destination, color: Rgba) -> Result<(), FrameError> {
        let attachments = self.attachments(destination)?;
        let encoder = pending(&mut self.encoder, &self.context.device);
        drop(begin_pass(encoder, "clear pass", &attachments, Some(color)));
        Ok(())
    }

    fn pipeline(
        &mut self,
        source: PipelineSource,
        blend: BlendMode,
        primitive: Primitive,
        destination: Destination,
    ) -> Result<wgpu::RenderPipeline, String> {
        let attachments = self.attachments(destination).map_err(|err| err.to_string())?;
        let key = PipelineKey {
            source,
            blend,
            primitive,
            format: attachments.format,
            samples: attachments.samples,
            depth: attachments.depth.is_some(),
        };
        self.pipelines
            .get_or_build(&self.context.device, key, &self.builtins, &self.modules)
    }

    /// Encodes a fullscreen blit of `view` into `destination`.
    fn encode_blit(
        &mut self,
        view: &wgpu::TextureView,
        destination: Destination,
        blend: BlendMode,
    ) -> Result<(), FrameError> {
        let pipeline = self
            .pipeline(PipelineSource::Blit, blend, Primitive::Triangles, destination)
            .map_err(|reason| FrameError::InvalidDraw {
                program: "blit".into(),
                reason,
            })?;
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("blit bind group"),
                layout: &self.builtins.blit_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.nearest_sampler),
                    },
                ],
            });
        let attachments = self.attachments(destination)?;
        let encoder = pending(&mut self.encoder, &self.context.device);
        let mut pass = begin_pass(encoder, "blit pass", &attachments, None);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn scratch(&self, width: u32, height: u32) -> Surface {
        Surface::new(
            &self.context.device,
            "rgba8 scratch",
            (width, height),
            wgpu::TextureFormat::Rgba8Unorm,
            1,
            TARGET_USAGE,
        )
    }

    fn upload_geometry(&self, mesh: &Mesh) -> Result<GpuGeometry, String> {
        let elements = u32::try_from(mesh.element_count()?)
            .map_err(|_| "mesh has more elements than fit in u32".to_string())?;
        let device = &self.context.device;
        let mut layout = Vec::new();
        let mut buffers = Vec::new();
        for (name, data) in mesh.attributes.iter() {
            layout.push((name.to_string(), data.kind));
            buffers.push(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(name),
                contents: bytemuck::cast_slice(&data.values),
                usage: wgpu::BufferUsages::VERTEX,
            }));
        }
        let indices = mesh.indices.as_ref().map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("indices"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        Ok(GpuGeometry {
            layout,
            buffers,
            indices,
            elements,
        })
    }

    fn texture_bind_group(
        &self,
        id: ProgramId,
        uniforms: &Uniforms,
    ) -> Result<Option<wgpu::BindGroup>, FrameError> {
        let modules = &self.modules[id.0];
        let Some(layout) = modules.texture_layout.as_ref() else {
            return Ok(None);
        };
        let mut views = Vec::with_capacity(modules.translated.textures.len());
        for name in &modules.translated.textures {
            let target = match uniforms.get(name) {
                Some(UniformValue::Texture(target)) => *target,
                _ => {
                    return Err(FrameError::InvalidDraw {
                        program: self.programs[id.0].program.name().to_string(),
                        reason: format!("texture uniform '{name}' is not bound to a target"),
                    })
                }
            };
            views.push(self.target_entry(target)?.sampled_view());
        }
        let mut entries = Vec::with_capacity(views.len() * 2);
        for (index, view) in views.into_iter().enumerate() {
            let binding = index as u32 * 2;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
            });
        }
        Ok(Some(self.context.device.create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("program textures"),
                layout,
                entries: &entries,
            },
        )))
    }

    fn validate_draw(&self, call: &DrawCall<'_>) -> Result<(), FrameError> {
        let entry = self
            .programs
            .get(call.program.0)
            .ok_or(FrameError::UnknownProgram(call.program.0))?;
        let geometry = self
            .geometry
            .get(call.geometry.0)
            .ok_or(FrameError::UnknownGeometry(call.geometry.0))?;
        let program = &entry.program;
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
        for texture in call.uniforms.textures() {
            let target = self.target_entry(texture)?;
            if self.destination == Destination::Target(texture) && !target.descriptor.feedback {
                return Err(invalid(format!(
                    "samples target '{}' while drawing into it",
                    target.descriptor.label
                )));
            }
        }
        Ok(())
    }
}

impl RenderBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn create_target(&mut self, descriptor: TargetDescriptor) -> Result<TargetId, SetupError> {
        descriptor.validate(self.context.max_dimension)?;
        let device = &self.context.device;
        let size = (descriptor.width, descriptor.height);
        let format = texture_format(descriptor.format);
        let current = Surface::new(device, &descriptor.label, size, format, 1, TARGET_USAGE);
        let previous = descriptor
            .feedback
            .then(|| Surface::new(device, &descriptor.label, size, format, 1, TARGET_USAGE));
        let depth = descriptor.depth.then(|| {
            Surface::new(
                device,
                &descriptor.label,
                size,
                DEPTH_FORMAT,
                1,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        tracing::debug!(
            target_label = %descriptor.label,
            width = descriptor.width,
            height = descriptor.height,
            format = ?format,
            feedback = descriptor.feedback,
            "created gpu render target"
        );

        let id = TargetId(self.targets.len());
        self.targets.push(GpuTarget {
            descriptor,
            format,
            current,
            previous,
            depth,
        });
        self.clear_attachments(Destination::Target(id), Rgba::TRANSPARENT)
            .map_err(|err| SetupError::Backend(err.to_string()))?;
        Ok(id)
    }

    fn target(&self, id: TargetId) -> Option<&TargetDescriptor> {
        self.targets.get(id.0).map(|target| &target.descriptor)
    }

    fn create_program(&mut self, program: Program) -> Result<ProgramId, SetupError> {
        let translated = translate(&program).map_err(|reason| SetupError::Program {
            program: program.name().to_string(),
            reason,
        })?;
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let modules = ProgramModules::new(
            device,
            program.name(),
            translated,
            program.attributes().to_vec(),
        );
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SetupError::Compile {
                program: program.name().to_string(),
                message: err.to_string(),
            });
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("program uniforms"),
            size: modules.translated.layout.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("program uniform bind group"),
            layout: &modules.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        tracing::debug!(
            program = program.name(),
            textures = modules.translated.textures.len(),
            uniform_bytes = modules.translated.layout.size(),
            "compiled gpu program"
        );

        let id = ProgramId(self.programs.len());
        self.modules.push(modules);
        self.programs.push(GpuProgram {
            program,
            uniform_buffer,
            uniform_bind_group,
        });
        Ok(id)
    }

    fn program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(id.0).map(|entry| &entry.program)
    }

    fn create_geometry(&mut self, mesh: &Mesh) -> Result<GeometryId, SetupError> {
        let geometry = self.upload_geometry(mesh).map_err(SetupError::Backend)?;
        let id = GeometryId(self.geometry.len());
        self.geometry.push(geometry);
        Ok(id)
    }

    fn update_geometry(&mut self, id: GeometryId, mesh: &Mesh) -> Result<(), FrameError> {
        let layout = self
            .geometry
            .get(id.0)
            .map(|entry| entry.layout.clone())
            .ok_or(FrameError::UnknownGeometry(id.0))?;
        let replacement = self.upload_geometry(mesh).map_err(FrameError::Backend)?;
        if replacement.layout != layout {
            return Err(FrameError::Backend(format!(
                "geometry #{} changed its vertex layout",
                id.0
            )));
        }
        self.geometry[id.0] = replacement;
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
        self.clear_attachments(destination, color)
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), FrameError> {
        self.validate_draw(call)?;
        let destination = self.destination;
        let pipeline = self
            .pipeline(
                PipelineSource::Program(call.program),
                call.blend,
                call.primitive,
                destination,
            )
            .map_err(|reason| FrameError::InvalidDraw {
                program: self.programs[call.program.0].program.name().to_string(),
                reason,
            })?;
        let textures = self.texture_bind_group(call.program, call.uniforms)?;

        let attachments = self.attachments(destination)?;
        let resolution = [attachments.size.0 as f32, attachments.size.1 as f32];
        let modules = &self.modules[call.program.0];
        let entry = &self.programs[call.program.0];
        let geometry = &self.geometry[call.geometry.0];
        if geometry.elements == 0 {
            return Ok(());
        }

        let staging = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform staging"),
                contents: &modules.translated.layout.pack(resolution, call.uniforms),
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        let encoder = pending(&mut self.encoder, &self.context.device);
        encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &entry.uniform_buffer,
            0,
            modules.translated.layout.size() as u64,
        );

        let mut pass = begin_pass(encoder, "mesh pass", &attachments, None);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &entry.uniform_bind_group, &[]);
        if let Some(textures) = textures.as_ref() {
            pass.set_bind_group(1, textures, &[]);
        }
        for (slot, (name, _)) in modules.attributes.iter().enumerate() {
            let index = geometry
                .layout
                .iter()
                .position(|(attr, _)| attr == name)
                .ok_or_else(|| backend_error(format!("attribute '{name}' vanished")))?;
            pass.set_vertex_buffer(slot as u32, geometry.buffers[index].slice(..));
        }
        match geometry.indices.as_ref() {
            Some(indices) => {
                pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..geometry.elements, 0, 0..1);
            }
            None => pass.draw(0..geometry.elements, 0..1),
        }
        Ok(())
    }

    fn draw_shapes(&mut self, shapes: &[Shape], blend: BlendMode) -> Result<(), FrameError> {
        let destination = self.destination;
        let attachments = self.attachments(destination)?;
        let resolution = [attachments.size.0 as f32, attachments.size.1 as f32, 0.0, 0.0];
        if shapes.is_empty() {
            return Ok(());
        }

        let mut instances: Vec<f32> = Vec::with_capacity(shapes.len() * 12);
        for shape in shapes {
            let color = shape.color();
            match *shape {
                Shape::Rect {
                    x,
                    y,
                    width,
                    height,
                    ..
                } => {
                    instances.extend_from_slice(&[x, y, x + width, y + height]);
                    instances.extend_from_slice(&[color.r, color.g, color.b, color.a]);
                    instances.extend_from_slice(&[0.0; 4]);
                }
                Shape::Circle { centre, radius, .. } => {
                    instances.extend_from_slice(&[
                        centre[0] - radius,
                        centre[1] - radius,
                        centre[0] + radius,
                        centre[1] + radius,
                    ]);
                    instances.extend_from_slice(&[color.r, color.g, color.b, color.a]);
                    instances.extend_from_slice(&[centre[0], centre[1], radius, 1.0]);
                }
            }
        }

        let pipeline = self
            .pipeline(PipelineSource::Shapes, blend, Primitive::Triangles, destination)
            .map_err(|reason| FrameError::InvalidDraw {
                program: "shapes".into(),
                reason,
            })?;
        let device = &self.context.device;
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shape instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shape params"),
            contents: bytemuck::cast_slice(&resolution),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shape bind group"),
            layout: &self.builtins.shape_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params.as_entire_binding(),
            }],
        });

        let attachments = self.attachments(destination)?;
        let encoder = pending(&mut self.encoder, &self.context.device);
        let mut pass = begin_pass(encoder, "shape pass", &attachments, None);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, instance_buffer.slice(..));
        pass.draw(0..6, 0..shapes.len() as u32);
        Ok(())
    }

    fn blit(&mut self, source: TargetId, blend: BlendMode) -> Result<(), FrameError> {
        let destination = self.destination;
        let target = self.target_entry(source)?;
        if destination == Destination::Target(source) && !target.descriptor.feedback {
            return Err(FrameError::InvalidDraw {
                program: "blit".into(),
                reason: "source and destination are the same target".into(),
            });
        }
        let view = target.sampled_view().clone();
        self.encode_blit(&view, destination, blend)
    }

    fn write_pixels(&mut self, target: TargetId, pixels: &[Rgba]) -> Result<(), FrameError> {
        let entry = self.target_entry(target)?;
        let (width, height) = (entry.descriptor.width, entry.descriptor.height);
        let expected = (width * height) as usize;
        if pixels.len() != expected {
            return Err(FrameError::InvalidUpload {
                target: entry.descriptor.label.clone(),
                reason: format!("expected {expected} pixels, got {}", pixels.len()),
            });
        }
        let bytes: Vec<u8> = pixels.iter().flat_map(|px| px.to_rgba8()).collect();
        let direct = entry.format == wgpu::TextureFormat::Rgba8Unorm;
        let scratch = (!direct).then(|| self.scratch(width, height));
        let destination_texture = match scratch.as_ref() {
            Some(surface) => surface.texture.clone(),
            None => entry.current.texture.clone(),
        };

        self.flush();
        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &destination_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            extent(width, height),
        );
        if let Some(surface) = scratch {
            self.encode_blit(&surface.view, Destination::Target(target), BlendMode::Replace)?;
        }
        Ok(())
    }

    fn read_pixels(&mut self, destination: Destination) -> Result<PixelBuffer, FrameError> {
        let (texture, width, height) = match destination {
            Destination::Screen => (
                self.screen.resolved.texture.clone(),
                self.screen.width,
                self.screen.height,
            ),
            Destination::Target(id) => {
                let target = self.target_entry(id)?;
                let (width, height) = (target.descriptor.width, target.descriptor.height);
                if target.format == wgpu::TextureFormat::Rgba8Unorm {
                    (target.current.texture.clone(), width, height)
                } else {
                    let view = target.current.view.clone();
                    let scratch = self.scratch(width, height);
                    self.encode_blit_into(&view, &scratch)?;
                    (scratch.texture, width, height)
                }
            }
        };

        self.flush();
        let bytes = read_rgba8(&self.context.device, &self.context.queue, &texture, width, height)
            .map_err(|err| backend_error(format!("{err:#}")))?;
        Ok(PixelBuffer {
            width,
            height,
            pixels: bytes
                .chunks_exact(4)
                .map(|px| Rgba::from_rgba8([px[0], px[1], px[2], px[3]]))
                .collect(),
        })
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        self.destination = Destination::Screen;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        let encoder = pending(&mut self.encoder, &self.context.device);
        for target in &self.targets {
            if let Some(previous) = target.previous.as_ref() {
                encoder.copy_texture_to_texture(
                    target.current.texture.as_image_copy(),
                    previous.texture.as_image_copy(),
                    extent(target.descriptor.width, target.descriptor.height),
                );
            }
        }
        self.flush();
        self.frames += 1;
        Ok(())
    }
}

impl GpuBackend {
    /// Blits `view` into a standalone RGBA8 surface, bypassing destinations.
    fn encode_blit_into(
        &mut self,
        view: &wgpu::TextureView,
        surface: &Surface,
    ) -> Result<(), FrameError> {
        let key = PipelineKey {
            source: PipelineSource::Blit,
            blend: BlendMode::Replace,
            primitive: Primitive::Triangles,
            format: wgpu::TextureFormat::Rgba8Unorm,
            samples: 1,
            depth: false,
        };
        let pipeline = self
            .pipelines
            .get_or_build(&self.context.device, key, &self.builtins, &self.modules)
            .map_err(backend_error)?;
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("readback blit bind group"),
                layout: &self.builtins.blit_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.nearest_sampler),
                    },
                ],
            });
        let attachments = Attachments {
            color: surface.view.clone(),
            resolve: None,
            depth: None,
            format: wgpu::TextureFormat::Rgba8Unorm,
            samples: 1,
            size: (0, 0),
        };
        let encoder = pending(&mut self.encoder, &self.context.device);
        let mut pass = begin_pass(encoder, "readback blit pass", &attachments, None);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}
