//! Interactive preview: a winit window showing frames produced elsewhere.
//!
//! The window owns its own wgpu surface and device. Each redraw asks the
//! [`FrameSource`] for a finished [`PixelBuffer`], uploads it, and stretches
//! it over the swapchain image. Escape or closing the window ends the loop.

use std::iter;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use procgen::PixelBuffer;
use wgpu::naga::ShaderStage;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::compile::{shader_module, BLIT_FRAGMENT_GLSL, BLIT_VERTEX_GLSL};
use crate::gpu::pipeline::texture_layout_entries;

const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Something that renders one frame per call, e.g. a running sketch.
pub trait FrameSource {
    fn title(&self) -> String;
    fn size(&self) -> (u32, u32);
    fn next_frame(&mut self) -> Result<PixelBuffer>;
}

#[derive(Clone)]
struct FrameTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

struct Presenter {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    frame: Option<FrameTexture>,
}

impl Presenter {
    fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });
        let surface = instance
            .create_surface(window)
            .context("failed to create preview surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find an adapter for the preview surface")?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("preview device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create preview device")?;

        let caps = surface.get_capabilities(&adapter);
        // Frames are already display-referred bytes; avoid a second encode.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("preview surface reports no formats"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("preview layout"),
            entries: &texture_layout_entries(1),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("preview pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let vertex = shader_module(&device, "preview vertex", BLIT_VERTEX_GLSL, ShaderStage::Vertex);
        let fragment = shader_module(
            &device,
            "preview fragment",
            BLIT_FRAGMENT_GLSL,
            ShaderStage::Fragment,
        );
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("preview pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("preview sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        tracing::debug!(?format, width = config.width, height = config.height, "preview surface ready");
        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            layout,
            sampler,
            frame: None,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    fn frame_texture(&mut self, size: (u32, u32)) -> FrameTexture {
        if let Some(frame) = self.frame.as_ref().filter(|frame| frame.size == size) {
            return frame.clone();
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("preview frame"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("preview bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        let frame = FrameTexture {
            texture,
            bind_group,
            size,
        };
        self.frame = Some(frame.clone());
        frame
    }

    fn present(&mut self, frame: &PixelBuffer) -> Result<(), wgpu::SurfaceError> {
        let bytes = frame.to_rgba8();
        let size = (frame.width, frame.height);
        let texture = self.frame_texture(size);
        self.queue.write_texture(
            texture.texture.as_image_copy(),
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.0 * 4),
                rows_per_image: Some(size.1),
            },
            wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
        );

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("preview encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("preview pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &texture.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Frame timing summarised once per [`STATS_INTERVAL`].
struct FrameStats {
    window_start: Instant,
    frames: u32,
    slowest: Duration,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            slowest: Duration::ZERO,
        }
    }

    fn record(&mut self, frame_time: Duration) {
        self.frames += 1;
        self.slowest = self.slowest.max(frame_time);
        let elapsed = self.window_start.elapsed();
        if elapsed >= STATS_INTERVAL {
            let fps = f64::from(self.frames) / elapsed.as_secs_f64();
            tracing::debug!(
                fps,
                slowest_ms = self.slowest.as_millis() as u64,
                "preview frame stats"
            );
            *self = Self::new();
        }
    }
}

/// Opens a window sized to the source and shows frames until closed.
///
/// Must be called from the main thread. Errors from the source end the loop
/// and are returned.
pub fn run_preview<S: FrameSource>(mut source: S) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let (width, height) = source.size();
    let window = WindowBuilder::new()
        .with_title(source.title())
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);
    let mut presenter = Presenter::new(window.clone())?;
    let mut stats = FrameStats::new();
    let mut failure: Option<anyhow::Error> = None;

    tracing::info!(title = %source.title(), width, height, "preview window open");
    event_loop.set_control_flow(ControlFlow::Poll);
    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && matches!(event.logical_key, Key::Named(NamedKey::Escape))
                {
                    elwt.exit();
                }
            }
            WindowEvent::Resized(size) => presenter.resize(size),
            WindowEvent::RedrawRequested => {
                let started = Instant::now();
                let frame = match source.next_frame() {
                    Ok(frame) => frame,
                    Err(err) => {
                        failure = Some(err);
                        elwt.exit();
                        return;
                    }
                };
                match presenter.present(&frame) {
                    Ok(()) => stats.record(started.elapsed()),
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        presenter.reconfigure();
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        failure = Some(anyhow!("preview surface out of memory"));
                        elwt.exit();
                    }
                    Err(other) => {
                        tracing::warn!(error = ?other, "surface error; retrying next frame");
                    }
                }
            }
            _ => {}
        },
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    });

    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_reset_after_interval() {
        let mut stats = FrameStats::new();
        stats.record(Duration::from_millis(4));
        stats.record(Duration::from_millis(9));
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.slowest, Duration::from_millis(9));

        stats.window_start = Instant::now() - STATS_INTERVAL;
        stats.record(Duration::from_millis(1));
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.slowest, Duration::ZERO);
    }
}
