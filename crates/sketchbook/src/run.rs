use anyhow::{Context, Result};
use procgen::{Destination, LoopClock, PixelBuffer, ReadySketch, RenderBackend};
use renderer::{run_preview, FrameSource};
use tracing_subscriber::EnvFilter;

use crate::bootstrap;
use crate::cli::{Cli, Command, ListArgs, RunArgs};
use crate::export::run_export;
use crate::paths::AppPaths;
use crate::sketches::{self, SketchEntry, SketchSummary};

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        "resolved sketchbook paths"
    );

    match cli.command {
        Command::Run(args) => run_window(args, &paths),
        Command::Export(args) => {
            let dir = run_export(&args, &paths)?;
            println!("{}", dir.display());
            Ok(())
        }
        Command::List(args) => list(args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_window(args: RunArgs, paths: &AppPaths) -> Result<()> {
    let plan = bootstrap::resolve(&args.sketch, paths)?;
    tracing::info!(
        sketch = plan.name(),
        seed = %plan.settings.seed,
        width = plan.settings.width,
        height = plan.settings.height,
        backend = %plan.backend,
        config = ?plan.config_file,
        "starting preview"
    );
    let sketch = plan.launch()?;
    let clock = LoopClock::new(plan.settings.duration);
    run_preview(Preview { sketch, clock })
}

/// Loops a ready sketch on the wall clock and hands each frame to the window.
struct Preview {
    sketch: ReadySketch<Box<dyn RenderBackend>>,
    clock: LoopClock,
}

impl FrameSource for Preview {
    fn title(&self) -> String {
        format!(
            "sketchbook: {} (seed {})",
            self.sketch.name(),
            self.sketch.settings().seed
        )
    }

    fn size(&self) -> (u32, u32) {
        let settings = self.sketch.settings();
        (settings.width, settings.height)
    }

    fn next_frame(&mut self) -> Result<PixelBuffer> {
        self.sketch
            .render_next(&mut self.clock)
            .context("failed to render frame")?;
        self.sketch
            .backend_mut()
            .read_pixels(Destination::Screen)
            .context("failed to read back frame")
    }
}

fn list(args: ListArgs) -> Result<()> {
    let summaries: Vec<SketchSummary> = sketches::CATALOG
        .iter()
        .map(SketchEntry::summary)
        .collect();
    if args.json {
        let json = serde_json::to_string_pretty(&summaries)
            .context("failed to serialise sketch list")?;
        println!("{json}");
        return Ok(());
    }
    for summary in &summaries {
        println!(
            "{:<8} {:<4} {:>4}x{:<4} {:>5.2}s  {}",
            summary.name,
            summary.backend,
            summary.width,
            summary.height,
            summary.duration_secs,
            summary.description
        );
    }
    Ok(())
}
