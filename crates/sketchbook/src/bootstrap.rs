use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use procgen::{
    AudioInput, DecibelRange, ParamValue, ReadySketch, RenderBackend, RunnerSettings, Seed,
    SketchParams, SketchRunner, SoftwareBackend,
};
use renderer::{GpuBackend, GpuOptions};
use sketchconfig::{AudioSection, BackendChoice, ParamEntry, SketchConfig};

use crate::cli::SketchArgs;
use crate::paths::AppPaths;
use crate::sketches::{self, SketchEntry};

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow!("expected WxH format, e.g. 1024x1024"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

/// Everything needed to start one sketch, after layering defaults, the
/// config file, and command-line flags.
#[derive(Debug)]
pub struct LaunchPlan {
    pub entry: &'static SketchEntry,
    pub config_file: Option<PathBuf>,
    pub settings: RunnerSettings,
    pub params: SketchParams,
    pub backend: BackendChoice,
    pub antialias: bool,
    pub audio: Option<AudioSection>,
}

pub fn resolve(args: &SketchArgs, paths: &AppPaths) -> Result<LaunchPlan> {
    let entry = sketches::find(&args.sketch).ok_or_else(|| {
        anyhow!(
            "unknown sketch '{}'; available: {}",
            args.sketch,
            sketches::names().join(", ")
        )
    })?;

    let mut config = entry.defaults();
    let config_file = args.config.clone().or_else(|| {
        let candidate = paths.sketch_config(entry.name);
        candidate.is_file().then_some(candidate)
    });
    if let Some(path) = config_file.as_deref() {
        let file = load_config_file(path)?;
        if let Some(named) = file.sketch.as_deref() {
            if !named.eq_ignore_ascii_case(entry.name) {
                bail!(
                    "config {} is for sketch '{named}', not '{}'",
                    path.display(),
                    entry.name
                );
            }
        }
        tracing::info!(path = %path.display(), "loaded sketch config");
        config = config.layered(file);
    }
    config = config.layered(cli_overrides(args)?);
    if let Some(path) = &args.audio {
        match config.audio.as_mut() {
            Some(section) => section.path = path.clone(),
            None => config.audio = Some(AudioSection::new(path)),
        }
    }
    config
        .validate()
        .context("invalid sketch configuration after applying overrides")?;

    plan_from_config(entry, config_file, config)
}

fn load_config_file(path: &Path) -> Result<SketchConfig> {
    let mut file = SketchConfig::from_path(path)
        .with_context(|| format!("failed to load sketch config {}", path.display()))?;
    // Audio paths in a config file are relative to the file itself.
    if let (Some(audio), Some(dir)) = (file.audio.as_mut(), path.parent()) {
        if audio.path.is_relative() {
            audio.path = dir.join(&audio.path);
        }
    }
    Ok(file)
}

fn cli_overrides(args: &SketchArgs) -> Result<SketchConfig> {
    let mut overrides = SketchConfig {
        seed: args.seed.map(|seed| Seed::from_i64(seed).value()),
        duration: args.duration,
        ..SketchConfig::default()
    };
    if let Some(spec) = args.size.as_deref() {
        let (width, height) = parse_surface_size(spec)
            .with_context(|| format!("invalid --size '{spec}'"))?;
        overrides.surface.width = Some(width);
        overrides.surface.height = Some(height);
    }
    overrides.surface.backend = args.backend;
    overrides.surface.antialias = args.antialias;
    Ok(overrides)
}

fn plan_from_config(
    entry: &'static SketchEntry,
    config_file: Option<PathBuf>,
    config: SketchConfig,
) -> Result<LaunchPlan> {
    let defaults = RunnerSettings::default();
    let seed = match config.seed {
        Some(seed) => Seed(seed),
        None => {
            let seed = Seed::random();
            tracing::info!(%seed, "no seed given; picked one at random");
            seed
        }
    };

    let mut settings = RunnerSettings {
        width: config.surface.width.unwrap_or(defaults.width),
        height: config.surface.height.unwrap_or(defaults.height),
        seed,
        duration: config.duration.unwrap_or(defaults.duration),
        ..defaults
    };
    if let Some(audio) = &config.audio {
        settings.audio_bins = audio.bins;
        settings.decibels = DecibelRange::new(audio.floor_db, audio.ceiling_db);
        settings.smoothing = audio.smoothing;
    }

    let mut params = SketchParams::new();
    for (name, value) in config.params {
        let value = match value {
            ParamEntry::Bool(flag) => ParamValue::Bool(flag),
            ParamEntry::Number(number) => ParamValue::Number(number),
            ParamEntry::Text(text) => ParamValue::Text(text),
        };
        params.insert(name, value);
    }

    Ok(LaunchPlan {
        entry,
        config_file,
        settings,
        params,
        backend: config.surface.backend.unwrap_or(BackendChoice::Software),
        antialias: config.surface.antialias.unwrap_or(true),
        audio: config.audio,
    })
}

impl LaunchPlan {
    pub fn name(&self) -> &'static str {
        self.entry.name
    }

    fn create_backend(&self) -> Result<Box<dyn RenderBackend>> {
        let (width, height) = (self.settings.width, self.settings.height);
        match self.backend {
            BackendChoice::Software => Ok(Box::new(SoftwareBackend::new(width, height))),
            BackendChoice::Gpu => {
                let options = GpuOptions {
                    antialias: self.antialias,
                    ..GpuOptions::default()
                };
                let gpu = GpuBackend::new(width, height, options)
                    .context("failed to initialise the gpu backend")?;
                tracing::info!(
                    adapter = %gpu.adapter().name,
                    samples = gpu.screen_samples(),
                    "gpu backend ready"
                );
                Ok(Box::new(gpu))
            }
        }
    }

    fn audio_input(&self) -> AudioInput {
        match &self.audio {
            Some(section) => {
                tracing::info!(
                    path = %section.path.display(),
                    bins = section.bins,
                    "loading audio in the background"
                );
                AudioInput::Pending(Box::new(media::load_async(&section.path, section.bins)))
            }
            None => AudioInput::None,
        }
    }

    /// Creates the backend, runs sketch setup, and waits for audio.
    pub fn launch(&self) -> Result<ReadySketch<Box<dyn RenderBackend>>> {
        let audio = self.audio_input();
        let backend = self.create_backend()?;
        SketchRunner::new(self.entry.build(), backend, self.settings.clone())
            .with_params(self.params.clone())
            .with_audio(audio)
            .setup()
            .with_context(|| format!("failed to set up sketch '{}'", self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn args(sketch: &str) -> SketchArgs {
        SketchArgs {
            sketch: sketch.to_string(),
            config: None,
            seed: None,
            size: None,
            duration: None,
            audio: None,
            backend: None,
            antialias: None,
        }
    }

    fn paths(root: &TempDir) -> AppPaths {
        AppPaths::from_raw(root.path().join("config"), root.path().join("data"))
    }

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(parse_surface_size("640x480").unwrap(), (640, 480));
        assert_eq!(parse_surface_size(" 32 X 16 ").unwrap(), (32, 16));
        assert!(parse_surface_size("0x10").is_err());
        assert!(parse_surface_size("1024").is_err());
    }

    #[test]
    fn defaults_apply_without_config() {
        let root = TempDir::new().unwrap();
        let mut request = args("flock");
        request.seed = Some(42);
        let plan = resolve(&request, &paths(&root)).unwrap();
        assert_eq!(plan.name(), "flock");
        assert_eq!(plan.settings.width, 1024);
        assert_eq!(plan.settings.seed, Seed(42));
        assert_eq!(plan.backend, BackendChoice::Software);
        assert!(plan.config_file.is_none());
        assert!(plan.audio.is_none());
    }

    #[test]
    fn config_file_sits_between_defaults_and_flags() {
        let root = TempDir::new().unwrap();
        let paths = paths(&root);
        let file = paths.sketch_config("echo");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(
            &file,
            r#"
seed = 99
duration = "2s"

[surface]
width = 300
height = 200

[audio]
path = "track.wav"
bins = 64

[params]
count = 9
"#,
        )
        .unwrap();

        let mut request = args("echo");
        request.size = Some("128x64".into());
        let plan = resolve(&request, &paths).unwrap();
        assert_eq!(plan.config_file.as_deref(), Some(file.as_path()));
        assert_eq!(plan.settings.seed, Seed(99));
        assert_eq!(plan.settings.duration, Duration::from_secs(2));
        assert_eq!((plan.settings.width, plan.settings.height), (128, 64));
        assert_eq!(plan.settings.audio_bins, 64);
        assert_eq!(plan.params.usize_or("count", 0), 9);
        let audio = plan.audio.expect("audio");
        assert_eq!(audio.path, file.parent().unwrap().join("track.wav"));
    }

    #[test]
    fn negative_seeds_fold_into_the_seed_space() {
        let root = TempDir::new().unwrap();
        let mut request = args("flock");
        request.seed = Some(-5);
        let plan = resolve(&request, &paths(&root)).unwrap();
        assert_eq!(plan.settings.seed, Seed::from_i64(-5));
    }

    #[test]
    fn rejects_config_for_another_sketch() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("other.toml");
        fs::write(&path, "sketch = \"tubes\"\n").unwrap();
        let mut request = args("flock");
        request.config = Some(path);
        let err = resolve(&request, &paths(&root)).unwrap_err();
        assert!(err.to_string().contains("'tubes'"));
    }

    #[test]
    fn unknown_sketch_lists_alternatives() {
        let root = TempDir::new().unwrap();
        let err = resolve(&args("nope"), &paths(&root)).unwrap_err();
        assert!(err.to_string().contains("flock"));
    }

    #[test]
    fn software_plan_launches() {
        let root = TempDir::new().unwrap();
        let mut request = args("flock");
        request.size = Some("48x48".into());
        request.seed = Some(1);
        let plan = resolve(&request, &paths(&root)).unwrap();
        let mut ready = plan.launch().unwrap();
        ready
            .render_frame(procgen::FrameTime::at(0.0))
            .unwrap();
        assert_eq!(ready.frames_rendered(), 1);
    }
}
