use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sketchconfig::{parse_antialias, parse_duration, BackendChoice};

#[derive(Parser, Debug)]
#[command(
    name = "sketchbook",
    author,
    version,
    about = "Seeded generative sketches, previewed live or exported frame by frame"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Loop a sketch in a preview window.
    Run(RunArgs),
    /// Render a fixed number of evenly spaced frames to PNG files.
    Export(ExportArgs),
    /// Show the built-in sketches.
    List(ListArgs),
}

/// Flags shared by every command that runs a sketch.
#[derive(Args, Debug, Clone)]
pub struct SketchArgs {
    /// Built-in sketch name (see `sketchbook list`).
    #[arg(value_name = "SKETCH")]
    pub sketch: String,

    /// Sketch config TOML; defaults to `<config_dir>/sketches/<SKETCH>.toml` when present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seed for the random stream and noise field; negative values are accepted.
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,

    /// Override the surface resolution (e.g. `1024x1024`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Loop duration, e.g. `8.77s`, `4`, or `1m 30s`.
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// WAV file whose spectrum drives audio-reactive sketches.
    #[arg(long, value_name = "PATH")]
    pub audio: Option<PathBuf>,

    /// Surface mode: `2d` (CPU) or `gpu`.
    #[arg(long, value_name = "MODE", value_parser = BackendChoice::parse)]
    pub backend: Option<BackendChoice>,

    /// Multisample the screen on the gpu backend: `on` or `off`.
    #[arg(long, value_name = "on|off", value_parser = parse_antialias)]
    pub antialias: Option<bool>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub sketch: SketchArgs,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub sketch: SketchArgs,

    /// Number of frames spread evenly over one loop.
    #[arg(long, default_value_t = 1)]
    pub frames: u64,

    /// Output root; defaults to a timestamped folder under the data directory.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print machine-readable JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_accepts_shared_flags() {
        let cli = Cli::try_parse_from([
            "sketchbook",
            "export",
            "flock",
            "--frames",
            "3",
            "--seed",
            "-7",
            "--size",
            "64x48",
            "--duration",
            "8.77s",
            "--backend",
            "2d",
            "--antialias",
            "off",
        ])
        .expect("parse");
        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.frames, 3);
        assert_eq!(args.sketch.sketch, "flock");
        assert_eq!(args.sketch.seed, Some(-7));
        assert_eq!(args.sketch.size.as_deref(), Some("64x48"));
        assert_eq!(args.sketch.duration, Some(Duration::from_secs_f64(8.77)));
        assert_eq!(args.sketch.backend, Some(BackendChoice::Software));
        assert_eq!(args.sketch.antialias, Some(false));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result = Cli::try_parse_from(["sketchbook", "run", "echo", "--backend", "vulkan"]);
        assert!(result.is_err());
    }

    #[test]
    fn list_defaults_to_table() {
        let cli = Cli::try_parse_from(["sketchbook", "list"]).expect("parse");
        assert!(matches!(cli.command, Command::List(ListArgs { json: false })));
    }
}
