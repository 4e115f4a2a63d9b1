//! Sketch lifecycle: setup behind a readiness gate, then frame driving.
//!
//! [`SketchRunner::setup`] consumes the runner and only returns a
//! [`ReadySketch`] once the sketch, its pass graph, and any pending audio are
//! all ready. Frames can only be rendered through the ready handle, so the
//! frame loop can never start on half-initialised state.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::audio::{AudioFrame, AudioInput, AudioProcessor, DecibelRange, FeatureSource};
use crate::color::Rgba;
use crate::error::{FrameError, SetupError};
use crate::geometry::{GeometryId, Mesh};
use crate::graph::{Load, Pass, PassGraph, PassGraphBuilder};
use crate::noise::NoiseField;
use crate::playhead::{Clock, FrameTime};
use crate::program::{Program, ProgramId};
use crate::random::{RandomStream, Seed};
use crate::target::{
    BackendKind, BlendMode, Destination, DrawCall, PixelBuffer, RenderBackend, Shape,
    TargetDescriptor, TargetId, TargetScope,
};

/// Surface and timing settings fixed for the lifetime of a sketch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub width: u32,
    pub height: u32,
    pub seed: Seed,
    pub duration: Duration,
    /// Spectrum length used when no audio source dictates one.
    pub audio_bins: usize,
    pub decibels: DecibelRange,
    pub smoothing: f32,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            seed: Seed(0),
            duration: Duration::from_secs(4),
            audio_bins: 128,
            decibels: DecibelRange::default(),
            smoothing: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

/// Free-form per-sketch tuning values, usually from a config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SketchParams {
    values: BTreeMap<String, ParamValue>,
}

impl SketchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParamValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn f32_or(&self, name: &str, default: f32) -> f32 {
        self.number(name).map(|v| v as f32).unwrap_or(default)
    }

    /// Non-negative whole numbers only; anything else falls back.
    pub fn usize_or(&self, name: &str, default: usize) -> usize {
        match self.number(name) {
            Some(v) if v >= 0.0 && v.fract() == 0.0 => v as usize,
            _ => default,
        }
    }

    pub fn text_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.values.get(name) {
            Some(ParamValue::Text(value)) => value.as_str(),
            _ => default,
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            Some(ParamValue::Bool(value)) => *value,
            _ => default,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// What a sketch sees while preparing its resources.
pub struct SetupContext<'a> {
    pub rng: &'a mut RandomStream,
    pub noise: &'a NoiseField,
    pub backend: &'a mut dyn RenderBackend,
    pub graph: &'a mut PassGraphBuilder,
    pub params: &'a SketchParams,
    settings: &'a RunnerSettings,
}

impl SetupContext<'_> {
    pub fn width(&self) -> u32 {
        self.settings.width
    }

    pub fn height(&self) -> u32 {
        self.settings.height
    }

    pub fn seed(&self) -> Seed {
        self.settings.seed
    }

    pub fn audio_bins(&self) -> usize {
        self.settings.audio_bins
    }

    pub fn add_pass(&mut self, pass: Pass) {
        self.graph.add(pass);
    }
}

/// Per-frame inputs shared by every pass.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub time: FrameTime,
    pub width: u32,
    pub height: u32,
    pub seed: Seed,
    pub audio: &'a AudioFrame,
}

impl Frame<'_> {
    pub fn playhead(&self) -> f32 {
        self.time.playhead.value()
    }
}

/// A generative sketch.
///
/// `setup` runs once. `begin` runs once before the first frame. Each frame
/// calls `update` once, then `render` once per scheduled pass with that
/// pass's destination already bound (and cleared, if it asked for that).
pub trait Sketch {
    fn name(&self) -> &str;

    /// Sketches that issue mesh draws need a backend that shades them.
    fn requires_gpu(&self) -> bool {
        false
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError>;

    fn begin(&mut self) {}

    fn update(
        &mut self,
        _frame: &Frame<'_>,
        _backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        Ok(())
    }

    fn render(
        &mut self,
        frame: &Frame<'_>,
        pass: &Pass,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError>;
}

/// A sketch and its collaborators before setup.
pub struct SketchRunner<B> {
    sketch: Box<dyn Sketch>,
    backend: B,
    settings: RunnerSettings,
    params: SketchParams,
    audio: AudioInput,
}

impl<B: RenderBackend> SketchRunner<B> {
    pub fn new(sketch: Box<dyn Sketch>, backend: B, settings: RunnerSettings) -> Self {
        Self {
            sketch,
            backend,
            settings,
            params: SketchParams::default(),
            audio: AudioInput::None,
        }
    }

    pub fn with_params(mut self, params: SketchParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_audio(mut self, audio: AudioInput) -> Self {
        self.audio = audio;
        self
    }

    /// Runs sketch setup, builds the pass graph, and waits for audio.
    pub fn setup(self) -> Result<ReadySketch<B>, SetupError> {
        let SketchRunner {
            mut sketch,
            mut backend,
            settings,
            params,
            audio,
        } = self;

        let name = sketch.name().to_string();
        if sketch.requires_gpu() && backend.kind() != BackendKind::Gpu {
            return Err(SetupError::BackendMismatch {
                required: BackendKind::Gpu.as_str(),
                available: backend.kind().as_str(),
            });
        }

        let mut rng = RandomStream::new(settings.seed);
        let noise = NoiseField::new(settings.seed);
        let mut builder = PassGraphBuilder::new();
        {
            let mut ctx = SetupContext {
                rng: &mut rng,
                noise: &noise,
                backend: &mut backend,
                graph: &mut builder,
                params: &params,
                settings: &settings,
            };
            sketch.setup(&mut ctx)?;
        }
        if builder.is_empty() {
            return Err(SetupError::Graph(format!("sketch '{name}' declared no passes")));
        }
        let graph = builder.build(&backend)?;

        let source = audio.resolve()?;
        let bins = match &source {
            Some(source) if source.bins() != settings.audio_bins => {
                return Err(SetupError::Sketch(format!(
                    "audio source provides {} bins but {} are configured",
                    source.bins(),
                    settings.audio_bins
                )));
            }
            _ => settings.audio_bins,
        };
        let processor = AudioProcessor::new(bins, settings.decibels, settings.smoothing);

        tracing::info!(
            sketch = %name,
            seed = %settings.seed,
            passes = graph.len(),
            audio = source.is_some(),
            backend = backend.kind().as_str(),
            "sketch ready"
        );

        Ok(ReadySketch {
            sketch,
            backend,
            settings,
            graph,
            source,
            processor,
            begun: false,
            frames: 0,
        })
    }
}

/// A fully set-up sketch that can render frames.
pub struct ReadySketch<B> {
    sketch: Box<dyn Sketch>,
    backend: B,
    settings: RunnerSettings,
    graph: PassGraph,
    source: Option<Box<dyn FeatureSource>>,
    processor: AudioProcessor,
    begun: bool,
    frames: u64,
}

impl<B: RenderBackend> ReadySketch<B> {
    /// Renders one frame at `time`.
    ///
    /// Takes a single audio snapshot, runs `update`, then each pass in
    /// scheduled order.
    pub fn render_frame(&mut self, time: FrameTime) -> Result<(), FrameError> {
        if !self.begun {
            self.sketch.begin();
            self.begun = true;
        }

        let audio = match self.source.as_mut() {
            Some(source) => {
                let snapshot = source.features(&time);
                self.processor.process(snapshot.as_ref())
            }
            None => AudioFrame::silent(self.processor.bins()),
        };
        let frame = Frame {
            time,
            width: self.settings.width,
            height: self.settings.height,
            seed: self.settings.seed,
            audio: &audio,
        };

        self.backend.begin_frame()?;
        self.sketch.update(&frame, &mut self.backend)?;
        for (_, pass) in self.graph.scheduled() {
            let mut scope = TargetScope::enter(&mut self.backend, pass.writes)?;
            if let Load::Clear(color) = pass.load {
                scope.clear(pass.writes, color)?;
            }
            let mut declared = DeclaredReads {
                backend: &mut *scope,
                pass,
            };
            self.sketch.render(&frame, pass, &mut declared).map_err(|err| {
                tracing::error!(pass = %pass.name, error = %err, "pass failed");
                err
            })?;
        }
        self.backend.end_frame()?;
        self.frames += 1;
        Ok(())
    }

    /// Samples `clock` and renders the frame it reports.
    pub fn render_next(&mut self, clock: &mut dyn Clock) -> Result<FrameTime, FrameError> {
        let time = clock.sample();
        self.render_frame(time)?;
        Ok(time)
    }

    pub fn name(&self) -> &str {
        self.sketch.name()
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn graph(&self) -> &PassGraph {
        &self.graph
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// True once a configured audio source has failed to deliver features.
    pub fn audio_degraded(&self) -> bool {
        self.processor.degraded()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

/// The backend as one pass sees it: sampling a target the pass did not list
/// in [`Pass::reads`] is refused, so the schedule can rely on the
/// declarations.
struct DeclaredReads<'a> {
    backend: &'a mut dyn RenderBackend,
    pass: &'a Pass,
}

impl DeclaredReads<'_> {
    fn check_sample(&self, target: TargetId) -> Result<(), FrameError> {
        if self.pass.reads.contains(&target) {
            return Ok(());
        }
        let label = self
            .backend
            .target(target)
            .map(|descriptor| descriptor.label.clone())
            .unwrap_or_else(|| format!("#{}", target.0));
        Err(FrameError::UndeclaredRead {
            pass: self.pass.name.clone(),
            target: label,
        })
    }
}

impl RenderBackend for DeclaredReads<'_> {
    fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    fn surface_size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    fn create_target(&mut self, descriptor: TargetDescriptor) -> Result<TargetId, SetupError> {
        self.backend.create_target(descriptor)
    }

    fn target(&self, id: TargetId) -> Option<&TargetDescriptor> {
        self.backend.target(id)
    }

    fn create_program(&mut self, program: Program) -> Result<ProgramId, SetupError> {
        self.backend.create_program(program)
    }

    fn program(&self, id: ProgramId) -> Option<&Program> {
        self.backend.program(id)
    }

    fn create_geometry(&mut self, mesh: &Mesh) -> Result<GeometryId, SetupError> {
        self.backend.create_geometry(mesh)
    }

    fn update_geometry(&mut self, id: GeometryId, mesh: &Mesh) -> Result<(), FrameError> {
        self.backend.update_geometry(id, mesh)
    }

    fn destination(&self) -> Destination {
        self.backend.destination()
    }

    fn bind(&mut self, destination: Destination) -> Result<Destination, FrameError> {
        self.backend.bind(destination)
    }

    fn clear(&mut self, destination: Destination, color: Rgba) -> Result<(), FrameError> {
        self.backend.clear(destination, color)
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), FrameError> {
        for target in call.uniforms.textures() {
            self.check_sample(target)?;
        }
        self.backend.draw(call)
    }

    fn draw_shapes(&mut self, shapes: &[Shape], blend: BlendMode) -> Result<(), FrameError> {
        self.backend.draw_shapes(shapes, blend)
    }

    fn blit(&mut self, source: TargetId, blend: BlendMode) -> Result<(), FrameError> {
        self.check_sample(source)?;
        self.backend.blit(source, blend)
    }

    fn write_pixels(&mut self, target: TargetId, pixels: &[Rgba]) -> Result<(), FrameError> {
        self.backend.write_pixels(target, pixels)
    }

    fn read_pixels(&mut self, destination: Destination) -> Result<PixelBuffer, FrameError> {
        self.backend.read_pixels(destination)
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        self.backend.begin_frame()
    }

    fn end_frame(&mut self) -> Result<(), FrameError> {
        self.backend.end_frame()
    }
}
