use std::collections::HashMap;

use procgen::{AttributeKind, BlendMode, Primitive, ProgramId};
use wgpu::naga::ShaderStage;

use crate::compile::{
    shader_module, TranslatedProgram, BLIT_FRAGMENT_GLSL, BLIT_VERTEX_GLSL, SHAPE_FRAGMENT_GLSL,
    SHAPE_VERTEX_GLSL,
};

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Bytes per shape instance: bounds, colour, circle parameters.
pub(crate) const SHAPE_INSTANCE_STRIDE: u64 = 48;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PipelineSource {
    Program(ProgramId),
    Shapes,
    Blit,
}

/// Everything a render pipeline bakes in besides its shaders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub source: PipelineSource,
    pub blend: BlendMode,
    pub primitive: Primitive,
    pub format: wgpu::TextureFormat,
    pub samples: u32,
    pub depth: bool,
}

/// Compiled modules and layouts for one sketch program.
pub(crate) struct ProgramModules {
    pub translated: TranslatedProgram,
    pub vertex: wgpu::ShaderModule,
    pub fragment: wgpu::ShaderModule,
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: Option<wgpu::BindGroupLayout>,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub attributes: Vec<(String, AttributeKind)>,
}

impl ProgramModules {
    pub fn new(
        device: &wgpu::Device,
        name: &str,
        translated: TranslatedProgram,
        attributes: Vec<(String, AttributeKind)>,
    ) -> Self {
        let vertex = shader_module(
            device,
            &format!("{name} vertex"),
            &translated.vertex,
            ShaderStage::Vertex,
        );
        let fragment = shader_module(
            device,
            &format!("{name} fragment"),
            &translated.fragment,
            ShaderStage::Fragment,
        );
        let uniform_layout = uniform_layout(device, "program uniform layout");
        let texture_layout = (!translated.textures.is_empty()).then(|| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("program texture layout"),
                entries: &texture_layout_entries(translated.textures.len()),
            })
        });
        let mut groups = vec![&uniform_layout];
        if let Some(layout) = texture_layout.as_ref() {
            groups.push(layout);
        }
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &groups,
            push_constant_ranges: &[],
        });

        Self {
            translated,
            vertex,
            fragment,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            attributes,
        }
    }
}

/// Shaders shared by every backend instance: flat shapes and blits.
pub(crate) struct BuiltinModules {
    pub shape_vertex: wgpu::ShaderModule,
    pub shape_fragment: wgpu::ShaderModule,
    pub shape_uniform_layout: wgpu::BindGroupLayout,
    shape_pipeline_layout: wgpu::PipelineLayout,
    pub blit_vertex: wgpu::ShaderModule,
    pub blit_fragment: wgpu::ShaderModule,
    pub blit_layout: wgpu::BindGroupLayout,
    blit_pipeline_layout: wgpu::PipelineLayout,
}

impl BuiltinModules {
    pub fn new(device: &wgpu::Device) -> Self {
        let shape_uniform_layout = uniform_layout(device, "shape uniform layout");
        let shape_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shape pipeline layout"),
            bind_group_layouts: &[&shape_uniform_layout],
            push_constant_ranges: &[],
        });
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit layout"),
            entries: &texture_layout_entries(1),
        });
        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit pipeline layout"),
            bind_group_layouts: &[&blit_layout],
            push_constant_ranges: &[],
        });

        Self {
            shape_vertex: shader_module(device, "shape vertex", SHAPE_VERTEX_GLSL, ShaderStage::Vertex),
            shape_fragment: shader_module(
                device,
                "shape fragment",
                SHAPE_FRAGMENT_GLSL,
                ShaderStage::Fragment,
            ),
            shape_uniform_layout,
            shape_pipeline_layout,
            blit_vertex: shader_module(device, "blit vertex", BLIT_VERTEX_GLSL, ShaderStage::Vertex),
            blit_fragment: shader_module(
                device,
                "blit fragment",
                BLIT_FRAGMENT_GLSL,
                ShaderStage::Fragment,
            ),
            blit_layout,
            blit_pipeline_layout,
        }
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Texture/sampler pairs at bindings `2i` and `2i + 1`.
pub(crate) fn texture_layout_entries(count: usize) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(count * 2);
    for index in 0..count as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

pub(crate) fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Replace => None,
        BlendMode::Alpha => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

pub(crate) fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
    }
}

fn vertex_format(kind: AttributeKind) -> wgpu::VertexFormat {
    match kind {
        AttributeKind::Float => wgpu::VertexFormat::Float32,
        AttributeKind::Vec2 => wgpu::VertexFormat::Float32x2,
        AttributeKind::Vec3 => wgpu::VertexFormat::Float32x3,
        AttributeKind::Vec4 => wgpu::VertexFormat::Float32x4,
    }
}

/// Render pipelines built on demand and kept for the backend's lifetime.
#[derive(Default)]
pub(crate) struct PipelineCache {
    entries: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn get_or_build(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
        builtins: &BuiltinModules,
        programs: &[ProgramModules],
    ) -> Result<wgpu::RenderPipeline, String> {
        if let Some(pipeline) = self.entries.get(&key) {
            return Ok(pipeline.clone());
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = build_pipeline(device, key, builtins, programs)?;
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(err.to_string());
        }
        tracing::debug!(?key, "built render pipeline");
        self.entries.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    key: PipelineKey,
    builtins: &BuiltinModules,
    programs: &[ProgramModules],
) -> Result<wgpu::RenderPipeline, String> {
    let program_attributes: Vec<wgpu::VertexAttribute>;
    let shape_attributes = [
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 0,
            shader_location: 0,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 16,
            shader_location: 1,
        },
        wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 32,
            shader_location: 2,
        },
    ];
    let mut buffers: Vec<wgpu::VertexBufferLayout<'_>> = Vec::new();

    let (layout, vertex, fragment) = match key.source {
        PipelineSource::Program(id) => {
            let modules = programs
                .get(id.0)
                .ok_or_else(|| format!("unknown program #{}", id.0))?;
            program_attributes = modules
                .attributes
                .iter()
                .enumerate()
                .map(|(location, (_, kind))| wgpu::VertexAttribute {
                    format: vertex_format(*kind),
                    offset: 0,
                    shader_location: location as u32,
                })
                .collect();
            for (attribute, (_, kind)) in program_attributes.iter().zip(&modules.attributes) {
                buffers.push(wgpu::VertexBufferLayout {
                    array_stride: (kind.components() * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: std::slice::from_ref(attribute),
                });
            }
            (&modules.pipeline_layout, &modules.vertex, &modules.fragment)
        }
        PipelineSource::Shapes => {
            buffers.push(wgpu::VertexBufferLayout {
                array_stride: SHAPE_INSTANCE_STRIDE,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &shape_attributes,
            });
            (
                &builtins.shape_pipeline_layout,
                &builtins.shape_vertex,
                &builtins.shape_fragment,
            )
        }
        PipelineSource::Blit => (
            &builtins.blit_pipeline_layout,
            &builtins.blit_vertex,
            &builtins.blit_fragment,
        ),
    };

    let topology = topology(key.primitive);
    let strip_index_format = matches!(
        topology,
        wgpu::PrimitiveTopology::TriangleStrip | wgpu::PrimitiveTopology::LineStrip
    )
    .then_some(wgpu::IndexFormat::Uint32);
    let depth_tested = matches!(key.source, PipelineSource::Program(_));

    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("sketch pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: key.depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth_tested,
            depth_compare: if depth_tested {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: key.samples,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: blend_state(key.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_disables_blending() {
        assert!(blend_state(BlendMode::Replace).is_none());
        let additive = blend_state(BlendMode::Additive).expect("additive");
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
        let alpha = blend_state(BlendMode::Alpha).expect("alpha");
        assert_eq!(alpha.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn primitives_map_to_topologies() {
        assert_eq!(
            topology(Primitive::Triangles),
            wgpu::PrimitiveTopology::TriangleList
        );
        assert_eq!(topology(Primitive::Points), wgpu::PrimitiveTopology::PointList);
        assert_eq!(topology(Primitive::LineStrip), wgpu::PrimitiveTopology::LineStrip);
    }

    #[test]
    fn texture_entries_pair_up() {
        let entries = texture_layout_entries(2);
        let bindings: Vec<u32> = entries.iter().map(|entry| entry.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
        assert!(matches!(entries[1].ty, wgpu::BindingType::Sampler(_)));
    }
}
