use procgen::{
    BlendMode, Flock, FlockRules, Frame, FrameError, Pass, RenderBackend, Rgba, SetupContext,
    SetupError, Shape, Sketch,
};

/// Boids released from a ring, one flocking step per frame.
///
/// Params: `count` (200), `radius` (a quarter of the short side),
/// `too_close` (4.0).
#[derive(Default)]
pub struct FlockSketch {
    flock: Option<Flock>,
    ink: Rgba,
}

impl Sketch for FlockSketch {
    fn name(&self) -> &str {
        "flock"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<(), SetupError> {
        let (width, height) = (ctx.width() as f32, ctx.height() as f32);
        let count = ctx.params.usize_or("count", 200);
        let radius = ctx.params.f32_or("radius", width.min(height) * 0.25);
        let rules = FlockRules {
            too_close: ctx.params.f32_or("too_close", FlockRules::default().too_close),
            ..FlockRules::default()
        };

        let paper = Rgba::grey(ctx.rng.range(0.85, 1.0));
        self.ink = Rgba::grey(ctx.rng.range(0.0, 0.3));
        self.flock = Some(
            Flock::ring(
                ctx.rng,
                count,
                [width / 2.0, height / 2.0],
                radius,
                [0.0, 0.0],
                [width, height],
            )
            .with_rules(rules),
        );
        tracing::debug!(count, radius, "released flock");

        ctx.add_pass(Pass::to_screen("boids").clear(paper));
        Ok(())
    }

    fn update(
        &mut self,
        _frame: &Frame<'_>,
        _backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        if let Some(flock) = self.flock.as_mut() {
            flock.step();
        }
        Ok(())
    }

    fn render(
        &mut self,
        _frame: &Frame<'_>,
        _pass: &Pass,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), FrameError> {
        let Some(flock) = self.flock.as_ref() else {
            return Ok(());
        };
        let shapes: Vec<Shape> = flock
            .boids()
            .iter()
            .map(|boid| Shape::Circle {
                centre: boid.position,
                radius: Flock::radius(boid),
                color: self.ink,
            })
            .collect();
        backend.draw_shapes(&shapes, BlendMode::Alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procgen::{
        Destination, DrawRecord, FrameTime, ParamValue, RunnerSettings, Seed, SketchParams,
        SketchRunner, SoftwareBackend,
    };

    fn settings(seed: u64) -> RunnerSettings {
        RunnerSettings {
            width: 96,
            height: 96,
            seed: Seed(seed),
            ..RunnerSettings::default()
        }
    }

    #[test]
    fn draws_one_disc_per_boid_over_paper() {
        let mut params = SketchParams::new();
        params.insert("count", ParamValue::Number(12.0));
        let mut ready = SketchRunner::new(
            Box::new(FlockSketch::default()),
            SoftwareBackend::new(96, 96),
            settings(42),
        )
        .with_params(params)
        .setup()
        .expect("setup");

        ready.render_frame(FrameTime::at(0.0)).expect("frame");

        let log = ready.backend().log();
        assert!(matches!(log[0], DrawRecord::Clear { destination: Destination::Screen, .. }));
        assert!(log.contains(&DrawRecord::Shapes {
            destination: Destination::Screen,
            count: 12,
        }));
        let pixels = ready
            .backend_mut()
            .read_pixels(Destination::Screen)
            .expect("read");
        let corner = pixels.get(0, 0).expect("corner");
        assert!(corner.r > 0.8 && corner.r == corner.g && corner.g == corner.b);
    }

    #[test]
    fn same_seed_renders_same_frames() {
        let render = |seed: u64| {
            let mut ready = SketchRunner::new(
                Box::new(FlockSketch::default()),
                SoftwareBackend::new(96, 96),
                settings(seed),
            )
            .setup()
            .expect("setup");
            for frame in 0..3 {
                ready
                    .render_frame(FrameTime::at(frame as f32 / 3.0))
                    .expect("frame");
            }
            ready
                .backend_mut()
                .read_pixels(Destination::Screen)
                .expect("read")
        };
        assert_eq!(render(7), render(7));
    }
}
