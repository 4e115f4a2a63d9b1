use procgen::math::{lerp, unipolar, TAU};
use procgen::{
    generate, BlendMode, Element, Frame, FrameError, FrameParams, GeneratorConfig, Layout, Palette,
    Pass, RenderBackend, Rgba, SetupContext, SetupError, Shape, Sketch, TargetDescriptor, TargetId,
};

/// Dots orbiting the centre, smeared through a feedback buffer.
///
/// The trail target is never cleared: each frame copies last frame's trail
/// into itself, veils it with the background, and stamps the dots again.
/// The screen shows the trail with the live dots on top.
///
/// Params: `count` (5), `fade` (0.08).
#[derive(Default)]
pub struct EchoSketch {
    trail: Option<TargetId>,
    dots: Vec<Element>,
    background: Rgba,
    fade: f32,
    centre: [f32; 2],
    orbit: f32,
    size: f32,
}

impl EchoSketch {
    fn stamps(&self, frame: &Frame<'_>) -> Vec<Shape> {
        let audio = frame.audio.overall();
        let angle = frame.playhead() * TAU;
        let (sin, cos) = angle.sin_cos();
        self.dots
            .iter()
            .map(|dot| {
                let params = FrameParams::new(dot, &frame.time, audio);
                let [x, y, _] = params.position;
                let reach = self.orbit * lerp(0.2, 1.0, unipolar(params.wave));
                Shape::Circle {
                    centre: [
                        self.centre[0] + (x * cos - y * sin) * reach,
                        self.centre[1] + (x * sin + y * cos) * reach,
                    ],
                    radius: self.size * (1.0 + params.audio + params.random[1] * 0.5),
                    color: params.color,
                }
            })
            .collect()
    }
}

impl Sketch for EchoSketch {
    fn name(&self) -> &str {
        "echo"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError> {
        let (width, height) = (ctx.width(), ctx.height());
        let count = ctx.params.usize_or("count", 5);
        self.fade = ctx.params.f32_or("fade", 0.08).clamp(0.0, 1.0);
        self.background = Rgba::grey(ctx.rng.range(0.05, 0.15));
        self.centre = [width as f32 / 2.0, height as f32 / 2.0];
        self.orbit = width.min(height) as f32 * 0.35;
        self.size = width.min(height) as f32 * 0.02;

        let config = GeneratorConfig {
            layout: Layout::Ring,
            spread: 1.0,
            palette: Palette {
                lightness: (0.55, 0.75),
                ..Palette::default()
            },
            ..GeneratorConfig::default()
        };
        self.dots = generate(ctx.rng, ctx.noise, count, &config);

        let trail = ctx
            .backend
            .create_target(TargetDescriptor::new("trail", width, height).feedback())?;
        self.trail = Some(trail);

        ctx.add_pass(Pass::new("trail", trail).reads(trail));
        ctx.add_pass(
            Pass::to_screen("present")
                .reads(trail)
                .clear(self.background),
        );
        Ok(())
    }

    fn render(
        &mut self,
        frame: &Frame<'_>,
        pass: &Pass,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        let Some(trail) = self.trail else {
            return Ok(());
        };
        let stamps = self.stamps(frame);
        match pass.name.as_str() {
            "trail" => {
                backend.blit(trail, BlendMode::Replace)?;
                let (width, height) = backend.surface_size();
                let veil = Shape::fill(width, height, self.background.with_alpha(self.fade));
                backend.draw_shapes(&[veil], BlendMode::Alpha)?;
                backend.draw_shapes(&stamps, BlendMode::Alpha)
            }
            _ => {
                backend.blit(trail, BlendMode::Alpha)?;
                backend.draw_shapes(&stamps, BlendMode::Alpha)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procgen::{
        Destination, DrawRecord, FrameTime, RunnerSettings, Seed, SketchRunner, SoftwareBackend,
    };

    fn ready(seed: u64) -> procgen::ReadySketch<SoftwareBackend> {
        let settings = RunnerSettings {
            width: 64,
            height: 64,
            seed: Seed(seed),
            ..RunnerSettings::default()
        };
        SketchRunner::new(
            Box::new(EchoSketch::default()),
            SoftwareBackend::new(64, 64),
            settings,
        )
        .setup()
        .expect("setup")
    }

    #[test]
    fn trail_is_written_before_the_screen_reads_it() {
        let mut sketch = ready(3);
        sketch.render_frame(FrameTime::at(0.25)).expect("frame");

        let order: Vec<&str> = sketch
            .graph()
            .scheduled()
            .map(|(_, pass)| pass.name.as_str())
            .collect();
        assert_eq!(order, ["trail", "present"]);

        let log = sketch.backend().log();
        let trail_blit = log
            .iter()
            .position(|record| matches!(record, DrawRecord::Blit { destination: Destination::Target(_), .. }))
            .expect("trail blit");
        let screen_blit = log
            .iter()
            .position(|record| matches!(record, DrawRecord::Blit { destination: Destination::Screen, .. }))
            .expect("screen blit");
        assert!(trail_blit < screen_blit);
        assert!(!log.iter().any(|record| matches!(
            record,
            DrawRecord::Clear { destination: Destination::Target(_), .. }
        )));
    }

    #[test]
    fn trail_accumulates_across_frames() {
        let mut sketch = ready(11);
        let trail = sketch.backend().target(procgen::TargetId(0)).map(|t| t.feedback);
        assert_eq!(trail, Some(true));

        sketch.render_frame(FrameTime::at(0.0)).expect("first");
        let first = sketch
            .backend()
            .sampled_pixels(procgen::TargetId(0))
            .expect("trail");
        sketch.render_frame(FrameTime::at(0.1)).expect("second");
        let second = sketch
            .backend()
            .sampled_pixels(procgen::TargetId(0))
            .expect("trail");
        assert_ne!(first, second);
        assert_eq!(sketch.backend().frames_completed(), 2);
    }

    #[test]
    fn loop_ends_where_it_starts() {
        let sketch = EchoSketch {
            dots: vec![Element {
                index: 0,
                t: 0.0,
                position: [1.0, 0.0, 0.0],
                color: Rgba::WHITE,
                random: [0.2, 0.4, 0.6],
                offset: 0.0,
            }],
            centre: [32.0, 32.0],
            orbit: 20.0,
            size: 2.0,
            ..EchoSketch::default()
        };
        let silence = procgen::AudioFrame::silent(8);
        let frame_at = |playhead: f32| Frame {
            time: FrameTime::at(playhead),
            width: 64,
            height: 64,
            seed: Seed(0),
            audio: &silence,
        };
        let start = sketch.stamps(&frame_at(0.0));
        let end = sketch.stamps(&frame_at(1.0));
        let (Shape::Circle { centre: a, .. }, Shape::Circle { centre: b, .. }) = (start[0], end[0])
        else {
            panic!("expected circles");
        };
        assert!((a[0] - b[0]).abs() < 1e-3 && (a[1] - b[1]).abs() < 1e-3);
    }
}
