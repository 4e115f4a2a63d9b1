use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BackendChoice {
    #[serde(rename = "2d")]
    Software,
    #[serde(rename = "gpu")]
    Gpu,
}

impl BackendChoice {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "2d" | "software" | "cpu" => Ok(Self::Software),
            "gpu" | "webgl" | "wgpu" => Ok(Self::Gpu),
            other => Err(format!("invalid backend '{other}'; expected '2d' or 'gpu'")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Software => "2d",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A free-form sketch parameter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamEntry {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SketchConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub sketch: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub surface: Surface,
    #[serde(default)]
    pub audio: Option<AudioSection>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Surface {
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_backend_opt")]
    pub backend: Option<BackendChoice>,
    #[serde(default, deserialize_with = "deserialize_antialias_opt")]
    pub antialias: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioSection {
    pub path: PathBuf,
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default = "default_floor_db")]
    pub floor_db: f32,
    #[serde(default = "default_ceiling_db")]
    pub ceiling_db: f32,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
}

impl AudioSection {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bins: default_bins(),
            floor_db: default_floor_db(),
            ceiling_db: default_ceiling_db(),
            smoothing: default_smoothing(),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_bins() -> usize {
    128
}

fn default_floor_db() -> f32 {
    -100.0
}

fn default_ceiling_db() -> f32 {
    0.0
}

fn default_smoothing() -> f32 {
    0.8
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_duration(v).map(Some).map_err(E::custom)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Parses `"8.77s"`, `"1m 30s"` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    let bare = match trimmed.strip_suffix('s') {
        Some(rest) if !rest.ends_with(|c: char| c.is_ascii_alphabetic()) => rest.trim_end(),
        _ => trimmed,
    };
    if let Ok(seconds) = bare.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(format!("invalid duration '{raw}': must be non-negative"));
        }
        return Ok(Duration::from_secs_f64(seconds));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{raw}': {err}"))
}

fn deserialize_backend_opt<'de, D>(deserializer: D) -> Result<Option<BackendChoice>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| BackendChoice::parse(&value).map_err(de::Error::custom))
        .transpose()
}

fn deserialize_antialias_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Flag(bool),
        Str(String),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    match helper {
        None => Ok(None),
        Some(Helper::Flag(value)) => Ok(Some(value)),
        Some(Helper::Str(raw)) => parse_antialias(&raw).map(Some).map_err(de::Error::custom),
    }
}

pub fn parse_antialias(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "auto" => Ok(true),
        "off" | "false" | "no" | "none" => Ok(false),
        other => Err(format!("invalid antialias setting '{other}'; expected 'on' or 'off'")),
    }
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            sketch: None,
            seed: None,
            duration: None,
            surface: Surface::default(),
            audio: None,
            params: BTreeMap::new(),
        }
    }
}

impl SketchConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SketchConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Fields set in `other` win; params merge key by key.
    pub fn layered(mut self, other: SketchConfig) -> SketchConfig {
        self.sketch = other.sketch.or(self.sketch);
        self.seed = other.seed.or(self.seed);
        self.duration = other.duration.or(self.duration);
        self.surface.width = other.surface.width.or(self.surface.width);
        self.surface.height = other.surface.height.or(self.surface.height);
        self.surface.backend = other.surface.backend.or(self.surface.backend);
        self.surface.antialias = other.surface.antialias.or(self.surface.antialias);
        self.audio = other.audio.or(self.audio);
        self.params.extend(other.params);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if let Some(sketch) = &self.sketch {
            if sketch.trim().is_empty() {
                return Err(ConfigError::Invalid("sketch name may not be empty".into()));
            }
        }

        for (field, value) in [("width", self.surface.width), ("height", self.surface.height)] {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "surface.{field} must be greater than zero"
                )));
            }
        }

        if let Some(duration) = self.duration {
            if duration.is_zero() {
                return Err(ConfigError::Invalid(
                    "duration must be greater than zero".into(),
                ));
            }
        }

        if let Some(audio) = &self.audio {
            if audio.path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("audio.path may not be empty".into()));
            }
            if audio.bins < 2 || !audio.bins.is_power_of_two() {
                return Err(ConfigError::Invalid(format!(
                    "audio.bins must be a power of two >= 2, got {}",
                    audio.bins
                )));
            }
            if !(audio.floor_db < audio.ceiling_db) {
                return Err(ConfigError::Invalid(format!(
                    "audio.floor_db ({}) must be below audio.ceiling_db ({})",
                    audio.floor_db, audio.ceiling_db
                )));
            }
            if !(0.0..1.0).contains(&audio.smoothing) {
                return Err(ConfigError::Invalid(format!(
                    "audio.smoothing must be in [0, 1), got {}",
                    audio.smoothing
                )));
            }
        }

        for key in self.params.keys() {
            if key.trim().is_empty() {
                return Err(ConfigError::Invalid("param names may not be empty".into()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
sketch = "panes"
seed = 20180410
duration = "8.77s"

[surface]
width = 1024
height = 768
backend = "gpu"
antialias = "off"

[audio]
path = "music/track.wav"
bins = 256
smoothing = 0.5

[params]
count = 20
wireframe = true
label = "night"
"#;

    #[test]
    fn parses_sample_config() {
        let config = SketchConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.sketch.as_deref(), Some("panes"));
        assert_eq!(config.seed, Some(20180410));
        assert_eq!(config.duration, Some(Duration::from_secs_f64(8.77)));
        assert_eq!(config.surface.width, Some(1024));
        assert_eq!(config.surface.backend, Some(BackendChoice::Gpu));
        assert_eq!(config.surface.antialias, Some(false));

        let audio = config.audio.as_ref().expect("audio section");
        assert_eq!(audio.bins, 256);
        assert_eq!(audio.floor_db, -100.0);
        assert_eq!(audio.smoothing, 0.5);

        assert_eq!(config.params.get("count"), Some(&ParamEntry::Number(20.0)));
        assert_eq!(config.params.get("wireframe"), Some(&ParamEntry::Bool(true)));
        assert_eq!(
            config.params.get("label"),
            Some(&ParamEntry::Text("night".into()))
        );
    }

    #[test]
    fn empty_config_is_valid() {
        let config = SketchConfig::from_toml_str("").expect("empty config");
        assert_eq!(config.version, 1);
        assert!(config.sketch.is_none());
        assert!(config.audio.is_none());
    }

    #[test]
    fn numeric_durations_are_seconds() {
        let config = SketchConfig::from_toml_str("duration = 4").unwrap();
        assert_eq!(config.duration, Some(Duration::from_secs(4)));
        let config = SketchConfig::from_toml_str("duration = 2.5").unwrap();
        assert_eq!(config.duration, Some(Duration::from_secs_f64(2.5)));
    }

    #[test]
    fn rejects_invalid_values() {
        for input in [
            "version = 2",
            "duration = 0",
            "[surface]\nwidth = 0",
            "[surface]\nbackend = \"canvas\"",
            "[audio]\npath = \"a.wav\"\nbins = 100",
            "[audio]\npath = \"a.wav\"\nfloor_db = 0\nceiling_db = -10",
            "[audio]\npath = \"a.wav\"\nsmoothing = 1.0",
        ] {
            assert!(
                SketchConfig::from_toml_str(input).is_err(),
                "expected rejection of {input:?}"
            );
        }
    }

    #[test]
    fn layering_prefers_later_values() {
        let base = SketchConfig::from_toml_str(SAMPLE).unwrap();
        let overrides = SketchConfig::from_toml_str(
            r#"
seed = 7
[surface]
width = 64
[params]
count = 3
"#,
        )
        .unwrap();
        let merged = base.layered(overrides);
        assert_eq!(merged.seed, Some(7));
        assert_eq!(merged.surface.width, Some(64));
        assert_eq!(merged.surface.height, Some(768));
        assert_eq!(merged.params.get("count"), Some(&ParamEntry::Number(3.0)));
        assert_eq!(merged.params.get("wireframe"), Some(&ParamEntry::Bool(true)));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flock.toml");
        std::fs::write(&path, "sketch = \"flock\"\nseed = 42\n").unwrap();
        let config = SketchConfig::from_path(&path).unwrap();
        assert_eq!(config.seed, Some(42));

        let missing = SketchConfig::from_path(&dir.path().join("none.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("8.77s").unwrap(), Duration::from_secs_f64(8.77));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("-1").is_err());
        assert!(parse_antialias("ON").unwrap());
        assert!(parse_antialias("maybe").is_err());
        assert_eq!(BackendChoice::parse("2D").unwrap(), BackendChoice::Software);
    }
}
