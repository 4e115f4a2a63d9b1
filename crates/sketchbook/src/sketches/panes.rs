use procgen::geometry::{fullscreen, web};
use procgen::math::Curve;
use procgen::{
    AttributeKind, Camera, DrawCall, Frame, FrameError, GeometryId, Pass, PixelFormat, Program,
    ProgramId, ProgramSpec, RenderBackend, Rgba, SetupContext, SetupError, Sketch,
    TargetDescriptor, TargetId, UniformKind, Uniforms,
};

const COARSE_SIZE: u32 = 64;
const FINE_SIZE: u32 = 1024;

const WEB_VERTEX: &str = r"
precision mediump float;

uniform float u_time;
uniform mat4 u_projection, u_view;

attribute vec3 a_position;
attribute vec2 a_uv;
attribute float a_offset;

varying vec2 v_uv;
varying float v_offset;

void main() {
    v_uv = a_uv;
    v_offset = a_offset;
    float ripple = sin((u_time + a_uv.x) * 6.283185307179586) * 0.05;
    vec3 p = a_position;
    p.z += ripple;
    gl_Position = u_projection * u_view * vec4(p, 1.0);
}
";

const WEB_FRAGMENT: &str = r"
precision mediump float;

uniform sampler2D u_spectrum;
uniform vec4 u_tint;

varying vec2 v_uv;
varying float v_offset;

void main() {
    float level = texture2D(u_spectrum, vec2(v_uv.x, 0.5)).r;
    float shade = 0.5 + 0.5 * v_offset;
    gl_FragColor = vec4(u_tint.rgb * shade + vec3(level * 0.6), 1.0);
}
";

const COMPOSITE_VERTEX: &str = r"
precision mediump float;

attribute vec2 a_position;

varying vec2 v_uv;

void main() {
    v_uv = a_position * 0.5 + 0.5;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

const COMPOSITE_FRAGMENT: &str = r"
precision mediump float;

uniform sampler2D u_coarse, u_fine;
uniform float u_mix;

varying vec2 v_uv;

void main() {
    gl_FragColor = mix(texture2D(u_coarse, v_uv), texture2D(u_fine, v_uv), u_mix);
}
";

fn web_program() -> Result<Program, SetupError> {
    ProgramSpec::new("web")
        .vertex(WEB_VERTEX)
        .fragment(WEB_FRAGMENT)
        .uniform("u_time", UniformKind::Float)
        .uniform("u_spectrum", UniformKind::Texture)
        .uniform("u_tint", UniformKind::Vec4)
        .uniform("u_projection", UniformKind::Mat4)
        .uniform("u_view", UniformKind::Mat4)
        .attribute("a_position", AttributeKind::Vec3)
        .attribute("a_uv", AttributeKind::Vec2)
        .attribute("a_offset", AttributeKind::Float)
        .build()
}

fn composite_program() -> Result<Program, SetupError> {
    ProgramSpec::new("composite")
        .vertex(COMPOSITE_VERTEX)
        .fragment(COMPOSITE_FRAGMENT)
        .uniform("u_coarse", UniformKind::Texture)
        .uniform("u_fine", UniformKind::Texture)
        .uniform("u_mix", UniformKind::Float)
        .attribute("a_position", AttributeKind::Vec2)
        .build()
}

/// Square targets, so the aspect is fixed at 1.
fn camera(frame: &Frame<'_>) -> Camera {
    let sway = frame.time.playhead.sine() * 0.5;
    Camera::perspective(45f32.to_radians(), 1.0, 0.1, 20.0)
        .look_at([sway, -2.4, 1.8], [0.0, 0.0, 0.0])
        .up([0.0, 0.0, 1.0])
}

struct Resources {
    spectrum: TargetId,
    coarse: TargetId,
    fine: TargetId,
    web: ProgramId,
    composite: ProgramId,
    surface: GeometryId,
    quad: GeometryId,
}

/// A noise web drawn twice, into a blocky 64² target and a half-float 1024²
/// one, then cross-faded on screen over the loop. The camera sways around the
/// web once per loop. The spectrum reaches the web shader as a one-row data
/// texture uploaded every frame.
///
/// Params: `segments` (64), `amplitude` (0.4).
#[derive(Default)]
pub struct PanesSketch {
    resources: Option<Resources>,
    tint: Rgba,
}

impl Sketch for PanesSketch {
    fn name(&self) -> &str {
        "panes"
    }

    fn requires_gpu(&self) -> bool {
        true
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError> {
        let bins = u32::try_from(ctx.audio_bins())
            .map_err(|_| SetupError::Sketch("audio bin count does not fit a texture".into()))?;
        let segments = ctx.params.usize_or("segments", 64).clamp(1, 512) as u32;
        let amplitude = ctx.params.f32_or("amplitude", 0.4);

        let hue = ctx.rng.range(0.0, 360.0);
        self.tint = Rgba::from_hsl(hue, ctx.rng.range(0.4, 0.8), ctx.rng.range(0.35, 0.6));
        let backdrop = Rgba::grey(ctx.rng.range(0.0, 0.1));

        let backend = &mut *ctx.backend;
        let spectrum =
            backend.create_target(TargetDescriptor::new("spectrum", bins, 1).uploaded())?;
        let coarse = backend.create_target(
            TargetDescriptor::new("coarse", COARSE_SIZE, COARSE_SIZE).with_depth(),
        )?;
        let fine = backend.create_target(
            TargetDescriptor::new("fine", FINE_SIZE, FINE_SIZE)
                .format(PixelFormat::Rgba16Float)
                .with_depth(),
        )?;
        let web_mesh = web(ctx.noise, 2.0, segments, amplitude);
        let resources = Resources {
            spectrum,
            coarse,
            fine,
            web: backend.create_program(web_program()?)?,
            composite: backend.create_program(composite_program()?)?,
            surface: backend.create_geometry(&web_mesh)?,
            quad: backend.create_geometry(&fullscreen())?,
        };

        // The spectrum is uploaded in `update`, so no pass writes it.
        ctx.add_pass(Pass::new("coarse", coarse).reads(spectrum).clear(backdrop));
        ctx.add_pass(Pass::new("fine", fine).reads(spectrum).clear(backdrop));
        ctx.add_pass(
            Pass::to_screen("composite")
                .reads(coarse)
                .reads(fine)
                .overwrite(),
        );
        self.resources = Some(resources);
        Ok(())
    }

    fn update(
        &mut self,
        frame: &Frame<'_>,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        let Some(resources) = self.resources.as_ref() else {
            return Ok(());
        };
        let bins = frame.audio.levels().len() as u32;
        backend.write_pixels(resources.spectrum, &frame.audio.to_pixels(bins, 1))
    }

    fn render(
        &mut self,
        frame: &Frame<'_>,
        pass: &Pass,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        let Some(resources) = self.resources.as_ref() else {
            return Ok(());
        };
        match pass.name.as_str() {
            "composite" => {
                let uniforms = Uniforms::new()
                    .with("u_coarse", resources.coarse)
                    .with("u_fine", resources.fine)
                    .with("u_mix", Curve::Smoothstep.sample(frame.time.playhead.ping_pong()));
                backend.draw(&DrawCall::new(resources.composite, resources.quad, &uniforms))
            }
            _ => {
                let uniforms = Uniforms::new()
                    .with("u_time", frame.playhead())
                    .with("u_spectrum", resources.spectrum)
                    .with("u_tint", self.tint)
                    .extend(&camera(frame).uniforms());
                backend.draw(&DrawCall::new(resources.web, resources.surface, &uniforms))
            }
        }
    }
}
