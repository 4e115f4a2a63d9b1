use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use procgen::{Destination, SteppedClock};

use crate::bootstrap::{self, LaunchPlan};
use crate::cli::ExportArgs;
use crate::paths::AppPaths;

/// Renders `--frames` evenly spaced frames of one loop to numbered PNGs and
/// returns the directory they were written to.
pub fn run_export(args: &ExportArgs, paths: &AppPaths) -> Result<PathBuf> {
    if args.frames == 0 {
        bail!("--frames must be at least 1");
    }
    let plan = bootstrap::resolve(&args.sketch, paths)?;
    let root = match &args.out {
        Some(dir) => dir.clone(),
        None => paths.exports_dir().join(timestamp_dir(Local::now())),
    };
    let dir = root.join(sequence_dir(&plan));
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    tracing::info!(
        sketch = plan.name(),
        seed = %plan.settings.seed,
        frames = args.frames,
        backend = %plan.backend,
        config = ?plan.config_file,
        dir = %dir.display(),
        "exporting frames"
    );
    write_frames(&plan, args.frames, &dir)?;
    Ok(dir)
}

fn write_frames(plan: &LaunchPlan, frames: u64, dir: &Path) -> Result<()> {
    let mut ready = plan.launch()?;
    let mut clock = SteppedClock::new(frames, plan.settings.duration);
    for index in 0..frames {
        let time = ready
            .render_next(&mut clock)
            .with_context(|| format!("failed to render frame {index}"))?;
        let pixels = ready
            .backend_mut()
            .read_pixels(Destination::Screen)
            .with_context(|| format!("failed to read back frame {index}"))?;
        let path = dir.join(frame_file_name(index));
        renderer::save_png(&pixels, &path)?;
        tracing::debug!(
            frame = index,
            playhead = time.playhead.value(),
            path = %path.display(),
            "wrote frame"
        );
    }
    Ok(())
}

fn sequence_dir(plan: &LaunchPlan) -> String {
    format!("{}-{}", plan.name(), plan.settings.seed)
}

fn frame_file_name(index: u64) -> String {
    format!("frame-{index:05}.png")
}

fn timestamp_dir(now: DateTime<Local>) -> String {
    now.format("%Y.%m.%d-%H.%M.%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn frame_names_sort_lexically() {
        assert_eq!(frame_file_name(0), "frame-00000.png");
        assert_eq!(frame_file_name(42), "frame-00042.png");
        assert!(frame_file_name(9) < frame_file_name(10));
    }

    #[test]
    fn timestamp_matches_sketch_naming() {
        let moment = Local
            .with_ymd_and_hms(2019, 5, 16, 18, 30, 48)
            .single()
            .expect("unambiguous local time");
        assert_eq!(timestamp_dir(moment), "2019.05.16-18.30.48");
    }
}
