use procgen::geometry::{cube, cylinder, icosphere, torus};
use procgen::{
    generate, AttributeKind, Camera, DrawCall, Element, Frame, FrameError, FrameParams,
    GeneratorConfig, GeometryId, Layout, Mesh, Palette, Pass, Program, ProgramId, ProgramSpec,
    RenderBackend, Rgba, SetupContext, SetupError, Sketch, SketchParams, UniformKind,
};

const TUBE_VERTEX: &str = r"
precision mediump float;

uniform float u_time, u_wave, u_audio, u_offset;
uniform vec3 u_position, u_random;
uniform vec4 u_color;
uniform mat4 u_projection, u_view;

attribute vec3 a_position, a_normal;

varying float v_shade;

mat3 rotate_x(float angle) {
    float c = cos(angle);
    float s = sin(angle);
    return mat3(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c);
}

mat3 rotate_y(float angle) {
    float c = cos(angle);
    float s = sin(angle);
    return mat3(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c);
}

void main() {
    float spin = (u_time + u_random.x) * 6.283185307179586;
    float tilt = (u_random.y - 0.5) * 3.141592653589793 + u_wave * 0.25;
    mat3 turn = rotate_y(spin) * rotate_x(tilt);
    vec3 stretch = vec3(1.0, 1.0 + u_audio + u_offset * 0.25, 1.0);
    vec3 p = turn * (a_position * stretch) + u_position;
    vec3 n = normalize(turn * a_normal);
    v_shade = 0.35 + 0.65 * max(dot(n, normalize(vec3(0.4, 0.8, 0.6))), 0.0);
    gl_Position = u_projection * u_view * vec4(p, 1.0);
}
";

const TUBE_FRAGMENT: &str = r"
precision mediump float;

uniform vec4 u_color;

varying float v_shade;

void main() {
    gl_FragColor = vec4(u_color.rgb * v_shade, u_color.a);
}
";

fn tube_program() -> Result<Program, SetupError> {
    ProgramSpec::new("tube")
        .vertex(TUBE_VERTEX)
        .fragment(TUBE_FRAGMENT)
        .uniform("u_time", UniformKind::Float)
        .uniform("u_wave", UniformKind::Float)
        .uniform("u_audio", UniformKind::Float)
        .uniform("u_offset", UniformKind::Float)
        .uniform("u_position", UniformKind::Vec3)
        .uniform("u_random", UniformKind::Vec3)
        .uniform("u_color", UniformKind::Vec4)
        .uniform("u_projection", UniformKind::Mat4)
        .uniform("u_view", UniformKind::Mat4)
        .attribute("a_position", AttributeKind::Vec3)
        .attribute("a_normal", AttributeKind::Vec3)
        .build()
}

fn solid(params: &SketchParams) -> Result<Mesh, SetupError> {
    let radius = params.f32_or("radius", 0.06);
    let length = params.f32_or("length", 1.2);
    match params.text_or("shape", "cylinder") {
        "cylinder" => Ok(cylinder(radius, length, 16, 1)),
        "cube" => Ok(cube(length * 0.3)),
        "icosphere" => Ok(icosphere(length * 0.2, 2)),
        "torus" => Ok(torus(length * 0.25, radius, 24, 12)),
        other => Err(SetupError::Sketch(format!(
            "unknown shape '{other}', expected cylinder, cube, icosphere or torus"
        ))),
    }
}

/// Randomly scattered solids, each spinning once per loop from its own
/// phase. Taller while its slice of the spectrum is loud.
///
/// Params: `count` (40), `spread` (1.2), `radius` (0.06), `length` (1.2),
/// `shape` (`cylinder`, `cube`, `icosphere` or `torus`).
#[derive(Default)]
pub struct TubesSketch {
    tubes: Vec<Element>,
    program: Option<ProgramId>,
    mesh: Option<GeometryId>,
    camera: Option<Camera>,
}

impl Sketch for TubesSketch {
    fn name(&self) -> &str {
        "tubes"
    }

    fn requires_gpu(&self) -> bool {
        true
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError> {
        let count = ctx.params.usize_or("count", 40);
        let config = GeneratorConfig {
            layout: Layout::Scatter,
            spread: ctx.params.f32_or("spread", 1.2),
            noise_scale: 0.75,
            palette: Palette {
                saturation: (0.3, 0.7),
                lightness: (0.45, 0.7),
                ..Palette::default()
            },
            ..GeneratorConfig::default()
        };
        let background = Rgba::grey(ctx.rng.range(0.8, 0.95));
        self.tubes = generate(ctx.rng, ctx.noise, count, &config);
        let aspect = ctx.width() as f32 / ctx.height() as f32;
        self.camera = Some(
            Camera::perspective(50f32.to_radians(), aspect, 0.1, 20.0)
                .look_at([0.0, 0.0, 4.0], [0.0, 0.0, 0.0]),
        );

        let mesh = solid(ctx.params)?;
        self.mesh = Some(ctx.backend.create_geometry(&mesh)?);
        self.program = Some(ctx.backend.create_program(tube_program()?)?);
        tracing::debug!(count, "scattered tubes");

        ctx.add_pass(Pass::to_screen("tubes").clear(background));
        Ok(())
    }

    fn render(
        &mut self,
        frame: &Frame<'_>,
        _pass: &Pass,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        let (Some(program), Some(mesh), Some(camera)) = (self.program, self.mesh, self.camera)
        else {
            return Ok(());
        };
        let view = camera.uniforms();
        let bins = frame.audio.levels().len();
        let count = self.tubes.len().max(1);
        for tube in &self.tubes {
            let level = frame.audio.level(tube.index * bins / count);
            let uniforms = FrameParams::new(tube, &frame.time, level)
                .uniforms()
                .extend(&view);
            backend.draw(&DrawCall::new(program, mesh, &uniforms))?;
        }
        Ok(())
    }
}
