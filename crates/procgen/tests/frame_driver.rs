use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use procgen::{
    AudioFeatures, AudioInput, BlendMode, Destination, DrawRecord, FeatureSource, Flock, Frame,
    FrameError, FrameTime, Pass, PendingSource, RandomStream, RenderBackend, Rgba,
    RunnerSettings, Seed, SetupContext, SetupError, Shape, Sketch, SketchRunner,
    SoftwareBackend, StaticSource, TargetDescriptor, TargetId,
};

fn settings(width: u32, height: u32) -> RunnerSettings {
    RunnerSettings {
        width,
        height,
        seed: Seed(42),
        audio_bins: 8,
        ..RunnerSettings::default()
    }
}

/// Declares its passes in reverse dependency order.
struct Layers {
    scene: Option<TargetId>,
    blur: Option<TargetId>,
}

impl Sketch for Layers {
    fn name(&self) -> &str {
        "layers"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError> {
        let scene = ctx
            .backend
            .create_target(TargetDescriptor::new("scene", 16, 16))?;
        let blur = ctx
            .backend
            .create_target(TargetDescriptor::new("blur", 8, 8))?;
        ctx.add_pass(
            Pass::to_screen("composite")
                .reads(scene)
                .reads(blur)
                .clear(Rgba::BLACK),
        );
        ctx.add_pass(Pass::new("blur", blur).reads(scene).overwrite());
        ctx.add_pass(Pass::new("scene", scene).clear(Rgba::WHITE));
        self.scene = Some(scene);
        self.blur = Some(blur);
        Ok(())
    }

    fn render(
        &mut self,
        _frame: &Frame<'_>,
        pass: &Pass,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        match pass.name.as_str() {
            "blur" => backend.blit(self.scene.expect("scene"), BlendMode::Replace),
            "composite" => backend.blit(self.blur.expect("blur"), BlendMode::Alpha),
            _ => Ok(()),
        }
    }
}

#[test]
fn offscreen_passes_finish_before_their_readers() {
    let runner = SketchRunner::new(
        Box::new(Layers {
            scene: None,
            blur: None,
        }),
        SoftwareBackend::new(32, 32),
        settings(32, 32),
    );
    let mut ready = runner.setup().expect("setup");
    ready.render_frame(FrameTime::at(0.0)).expect("frame");

    let scene = ready.backend().target(TargetId(0)).expect("scene").label.clone();
    assert_eq!(scene, "scene");

    let destinations: Vec<Destination> = ready
        .backend_mut()
        .take_log()
        .iter()
        .filter_map(DrawRecord::destination)
        .collect();
    let first = |d: Destination| destinations.iter().position(|x| *x == d).expect("drawn");
    let last = |d: Destination| destinations.iter().rposition(|x| *x == d).expect("drawn");
    let scene = Destination::Target(TargetId(0));
    let blur = Destination::Target(TargetId(1));
    assert!(last(scene) < first(blur));
    assert!(last(blur) < first(Destination::Screen));

    let screen = ready
        .backend_mut()
        .read_pixels(Destination::Screen)
        .expect("read");
    assert!(screen.pixels.iter().all(|px| *px == Rgba::WHITE));
}

/// Draws a bar whose width follows the overall audio level.
struct Meter;

impl Sketch for Meter {
    fn name(&self) -> &str {
        "meter"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError> {
        ctx.add_pass(Pass::to_screen("main").clear(Rgba::BLACK));
        Ok(())
    }

    fn render(
        &mut self,
        frame: &Frame<'_>,
        _pass: &Pass,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        let level = frame.audio.overall();
        let wave = frame.time.playhead.sine() * 0.5 + 0.5;
        backend.draw_shapes(
            &[
                Shape::Rect {
                    x: 0.0,
                    y: 0.0,
                    width: 4.0 + level * 28.0,
                    height: 8.0,
                    color: Rgba::WHITE,
                },
                Shape::Circle {
                    centre: [16.0, 24.0],
                    radius: 2.0 + wave * 6.0,
                    color: Rgba::new(1.0, 0.0, 0.0, 1.0),
                },
            ],
            BlendMode::Replace,
        )
    }
}

struct Unavailable;

impl FeatureSource for Unavailable {
    fn bins(&self) -> usize {
        8
    }

    fn features(&mut self, _time: &FrameTime) -> Option<AudioFeatures> {
        None
    }
}

fn render_meter(audio: AudioInput, at: f32) -> Vec<Rgba> {
    let runner = SketchRunner::new(Box::new(Meter), SoftwareBackend::new(32, 32), settings(32, 32))
        .with_audio(audio);
    let mut ready = runner.setup().expect("setup");
    ready.render_frame(FrameTime::at(at)).expect("frame");
    ready
        .backend_mut()
        .read_pixels(Destination::Screen)
        .expect("read")
        .pixels
}

#[test]
fn missing_audio_matches_the_silent_baseline() {
    let baseline = render_meter(AudioInput::None, 0.3);
    let unavailable = render_meter(AudioInput::Ready(Box::new(Unavailable)), 0.3);
    let silent = render_meter(
        AudioInput::Ready(Box::new(StaticSource::new(AudioFeatures::new(vec![
            -100.0;
            8
        ])))),
        0.3,
    );
    assert_eq!(baseline, unavailable);
    assert_eq!(baseline, silent);

    let loud = render_meter(
        AudioInput::Ready(Box::new(StaticSource::new(AudioFeatures::new(vec![0.0; 8])))),
        0.3,
    );
    assert_ne!(baseline, loud);
}

#[test]
fn loop_start_and_wrapped_end_render_identically() {
    let start = render_meter(AudioInput::None, 0.0);
    let end = render_meter(AudioInput::None, 1.0);
    assert_eq!(start, end);
    assert_ne!(start, render_meter(AudioInput::None, 0.25));
}

struct CountingSource {
    calls: Arc<AtomicUsize>,
}

impl FeatureSource for CountingSource {
    fn bins(&self) -> usize {
        8
    }

    fn features(&mut self, _time: &FrameTime) -> Option<AudioFeatures> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(AudioFeatures::new(vec![-50.0; 8]))
    }
}

#[test]
fn audio_is_sampled_once_per_frame() {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = SketchRunner::new(
        Box::new(Layers {
            scene: None,
            blur: None,
        }),
        SoftwareBackend::new(32, 32),
        settings(32, 32),
    )
    .with_audio(AudioInput::Ready(Box::new(CountingSource {
        calls: Arc::clone(&calls),
    })));
    let mut ready = runner.setup().expect("setup");
    for i in 0..5 {
        ready.render_frame(FrameTime::at(i as f32 / 5.0)).expect("frame");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

struct FailingLoad;

impl PendingSource for FailingLoad {
    fn describe(&self) -> String {
        "missing.wav".into()
    }

    fn wait(self: Box<Self>) -> Result<Box<dyn FeatureSource>, SetupError> {
        Err(SetupError::Asset {
            path: PathBuf::from("missing.wav"),
            reason: "file not found".into(),
        })
    }
}

#[test]
fn asynchronous_load_failure_surfaces_at_setup() {
    let runner = SketchRunner::new(Box::new(Meter), SoftwareBackend::new(32, 32), settings(32, 32))
        .with_audio(AudioInput::Pending(Box::new(FailingLoad)));
    let err = runner.setup().err().expect("setup must fail");
    assert!(err.to_string().contains("missing.wav"), "{err}");
}

struct Swatch {
    target: Option<TargetId>,
    color: Rgba,
}

impl Sketch for Swatch {
    fn name(&self) -> &str {
        "swatch"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError> {
        let target = ctx
            .backend
            .create_target(TargetDescriptor::new("swatch", 64, 64))?;
        ctx.add_pass(Pass::new("fill", target).clear(self.color));
        self.target = Some(target);
        Ok(())
    }

    fn render(
        &mut self,
        _frame: &Frame<'_>,
        _pass: &Pass,
        _backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        Ok(())
    }
}

#[test]
fn cleared_target_reads_back_its_clear_color() {
    let color = Rgba::from_rgba8([51, 102, 153, 255]);
    let runner = SketchRunner::new(
        Box::new(Swatch {
            target: None,
            color,
        }),
        SoftwareBackend::new(16, 16),
        settings(16, 16),
    );
    let mut ready = runner.setup().expect("setup");
    ready.render_frame(FrameTime::at(0.5)).expect("frame");
    let pixels = ready
        .backend_mut()
        .read_pixels(Destination::Target(TargetId(0)))
        .expect("read");
    assert_eq!((pixels.width, pixels.height), (64, 64));
    assert!(pixels.pixels.iter().all(|px| *px == color));
}

#[test]
fn wide_flock_has_no_separation_after_one_step() {
    let mut rng = RandomStream::new(Seed(42));
    let radius = 400.0;
    let mut flock = Flock::ring(
        &mut rng,
        200,
        [512.0, 512.0],
        radius,
        [0.0, 0.0],
        [1024.0, 1024.0],
    );
    // Neighbours on the ring sit 2R sin(pi/200) apart, well beyond 4 units.
    for i in 0..flock.len() {
        assert_eq!(flock.separation(i), [0.0, 0.0]);
    }
    let expected: Vec<[f32; 2]> = (0..flock.len())
        .map(|i| {
            let c = flock.cohesion(i);
            let a = flock.alignment(i);
            [c[0] + a[0], c[1] + a[1]]
        })
        .collect();
    flock.step();
    for (boid, velocity) in flock.boids().iter().zip(expected) {
        assert_eq!(boid.velocity, velocity);
    }
}
