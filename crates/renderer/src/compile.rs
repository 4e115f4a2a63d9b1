use std::borrow::Cow;
use std::fmt::Write as _;

use procgen::{Program, UniformKind};
use wgpu::naga::ShaderStage;

use crate::gpu::uniforms::UniformLayout;

/// A sketch program rewritten from WebGL-style GLSL into Vulkan GLSL.
#[derive(Debug, Clone)]
pub(crate) struct TranslatedProgram {
    pub vertex: String,
    pub fragment: String,
    pub layout: UniformLayout,
    /// Sampled uniforms in binding order within set 1.
    pub textures: Vec<String>,
}

pub(crate) fn shader_module(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    stage: ShaderStage,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_string()),
            stage,
            defines: &[],
        },
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Varying {
    ty: String,
    name: String,
}

/// Produces self-contained `#version 450` vertex and fragment shaders.
///
/// Steps performed on each source:
///
/// 1. Drop `#version`, `precision`, `uniform`, `attribute` and `varying`
///    lines; the header redeclares all of them with explicit locations.
/// 2. Prepend a header holding the uniform block, texture bindings, and
///    macro aliases that keep the WebGL names working.
/// 3. Rename the user's `main` and append a real `main` that adapts clip
///    depth (vertex) or the fragment origin (fragment).
pub(crate) fn translate(program: &Program) -> Result<TranslatedProgram, String> {
    let vertex_varyings = scan_varyings(program.vertex_source())?;
    let fragment_varyings = scan_varyings(program.fragment_source())?;
    for varying in &fragment_varyings {
        match vertex_varyings.iter().find(|v| v.name == varying.name) {
            None => {
                return Err(format!(
                    "varying '{}' is read by the fragment source but never written",
                    varying.name
                ))
            }
            Some(v) if v.ty != varying.ty => {
                return Err(format!(
                    "varying '{}' is {} in the vertex source but {} in the fragment source",
                    varying.name, v.ty, varying.ty
                ))
            }
            Some(_) => {}
        }
    }

    let layout = UniformLayout::for_program(program);
    let textures: Vec<String> = program
        .uniforms()
        .iter()
        .filter(|(_, kind)| *kind == UniformKind::Texture)
        .map(|(name, _)| name.clone())
        .collect();
    let shared = shared_header(&layout, &textures);

    let mut vertex = String::from("#version 450\n");
    for (location, (name, kind)) in program.attributes().iter().enumerate() {
        let _ = writeln!(
            vertex,
            "layout(location = {location}) in {} {name};",
            kind.glsl_type()
        );
    }
    for (location, varying) in vertex_varyings.iter().enumerate() {
        let _ = writeln!(
            vertex,
            "layout(location = {location}) out {} {};",
            varying.ty, varying.name
        );
    }
    vertex.push_str(&shared);
    vertex.push_str(VERTEX_PRELUDE);
    vertex.push_str("#line 1\n");
    vertex.push_str(&sanitize(program.vertex_source()));
    vertex.push_str(VERTEX_FOOTER);

    let mut fragment = String::from("#version 450\n");
    for varying in &fragment_varyings {
        let location = vertex_varyings
            .iter()
            .position(|v| v.name == varying.name)
            .unwrap_or_default();
        let _ = writeln!(
            fragment,
            "layout(location = {location}) in {} {};",
            varying.ty, varying.name
        );
    }
    fragment.push_str(&shared);
    fragment.push_str(FRAGMENT_PRELUDE);
    fragment.push_str("#line 1\n");
    fragment.push_str(&sanitize(program.fragment_source()));
    fragment.push_str(FRAGMENT_FOOTER);

    Ok(TranslatedProgram {
        vertex,
        fragment,
        layout,
        textures,
    })
}

fn shared_header(layout: &UniformLayout, textures: &[String]) -> String {
    let mut header = String::new();
    header.push_str("layout(std140, set = 0, binding = 0) uniform SketchParams {\n");
    for slot in layout.slots() {
        let _ = writeln!(header, "    {} _{};", slot.kind.glsl_type(), slot.name);
    }
    header.push_str("} sketch_params;\n");
    for slot in layout.slots().iter().filter(|slot| !slot.internal) {
        let _ = writeln!(header, "#define {0} sketch_params._{0}", slot.name);
    }
    for (index, name) in textures.iter().enumerate() {
        let binding = index * 2;
        let _ = writeln!(
            header,
            "layout(set = 1, binding = {binding}) uniform texture2D {name}_texture;"
        );
        let _ = writeln!(
            header,
            "layout(set = 1, binding = {}) uniform sampler {name}_sampler;",
            binding + 1
        );
        let _ = writeln!(
            header,
            "#define {name} sampler2D({name}_texture, {name}_sampler)"
        );
    }
    // Render targets are stored top row first; WebGL samples bottom row first.
    header.push_str("#define texture2D(s, uv) texture(s, vec2((uv).x, 1.0 - (uv).y))\n");
    header
}

/// Removes the lines the header replaces, keeping line numbers stable.
fn sanitize(source: &str) -> String {
    let mut sanitized = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim_start();
        let replaced = trimmed.starts_with("#version")
            || ["precision ", "uniform ", "attribute ", "varying "]
                .iter()
                .any(|prefix| trimmed.starts_with(prefix));
        if !replaced {
            sanitized.push_str(line);
        }
        sanitized.push('\n');
    }
    sanitized
}

fn scan_varyings(source: &str) -> Result<Vec<Varying>, String> {
    let mut varyings = Vec::new();
    for line in source.lines() {
        let Some(rest) = line.trim_start().strip_prefix("varying ") else {
            continue;
        };
        let declaration = rest.split(';').next().unwrap_or_default();
        let mut tokens = declaration
            .split_whitespace()
            .filter(|token| !matches!(*token, "lowp" | "mediump" | "highp"));
        let ty = tokens
            .next()
            .ok_or_else(|| "varying declaration without a type".to_string())?
            .to_string();
        let names = tokens.collect::<Vec<_>>().join(" ");
        for name in names.split(',').map(str::trim) {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(format!("malformed varying declaration '{}'", rest.trim()));
            }
            varyings.push(Varying {
                ty: ty.clone(),
                name: name.to_string(),
            });
        }
    }
    Ok(varyings)
}

const VERTEX_PRELUDE: &str = r"float sketch_point_size;
#define gl_PointSize sketch_point_size
#define main sketch_main
";

/// Maps GL clip depth (-w..w) onto wgpu's 0..w range.
const VERTEX_FOOTER: &str = r"#undef main
void main() {
    sketch_main();
    gl_Position.z = (gl_Position.z + gl_Position.w) * 0.5;
}
";

const FRAGMENT_PRELUDE: &str = r"layout(location = 0) out vec4 sketch_frag_color;
vec4 sketch_frag_coord;
#define gl_FragColor sketch_frag_color
#define gl_FragCoord sketch_frag_coord
#define main sketch_main
";

/// Recreates GL's bottom-left `gl_FragCoord` before calling the user's main.
const FRAGMENT_FOOTER: &str = r"#undef main
void main() {
    #undef gl_FragCoord
    vec4 builtin_coord = gl_FragCoord;
    #define gl_FragCoord sketch_frag_coord
    sketch_frag_coord = vec4(
        builtin_coord.x,
        sketch_params._sketch_resolution.y - builtin_coord.y,
        builtin_coord.z,
        builtin_coord.w
    );
    sketch_main();
}
";

/// Instanced quads for [`procgen::Shape`]s, positioned in pixels (y down).
pub(crate) const SHAPE_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) in vec4 a_bounds;
layout(location = 1) in vec4 a_color;
layout(location = 2) in vec4 a_circle;
layout(location = 0) out vec2 v_pixel;
layout(location = 1) out vec4 v_color;
layout(location = 2) flat out vec4 v_circle;

layout(std140, set = 0, binding = 0) uniform ShapeParams {
    vec2 resolution;
} params;

const vec2 corners[6] = vec2[6](
    vec2(0.0, 0.0),
    vec2(1.0, 0.0),
    vec2(0.0, 1.0),
    vec2(0.0, 1.0),
    vec2(1.0, 0.0),
    vec2(1.0, 1.0)
);

void main() {
    vec2 corner = corners[uint(gl_VertexIndex)];
    vec2 pixel = mix(a_bounds.xy, a_bounds.zw, corner);
    v_pixel = pixel;
    v_color = a_color;
    v_circle = a_circle;
    vec2 ndc = vec2(
        pixel.x / params.resolution.x * 2.0 - 1.0,
        1.0 - pixel.y / params.resolution.y * 2.0
    );
    gl_Position = vec4(ndc, 0.0, 1.0);
}
";

pub(crate) const SHAPE_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_pixel;
layout(location = 1) in vec4 v_color;
layout(location = 2) flat in vec4 v_circle;
layout(location = 0) out vec4 out_color;

void main() {
    if (v_circle.w > 0.5 && distance(v_pixel, v_circle.xy) > v_circle.z) {
        discard;
    }
    out_color = v_color;
}
";

/// Full-screen triangle with top-left texture coordinates.
pub(crate) const BLIT_VERTEX_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[uint(gl_VertexIndex)];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

pub(crate) const BLIT_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D source_texture;
layout(set = 0, binding = 1) uniform sampler source_sampler;

void main() {
    out_color = texture(sampler2D(source_texture, source_sampler), v_uv);
}
";
