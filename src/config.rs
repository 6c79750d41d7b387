use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "gesture_capture.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub display: DisplayConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub estimator: EstimatorConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    /// JPEG quality of captured photos (1-100)
    pub jpeg_quality: u8,
    /// Flip snapshots horizontally so they match the selfie preview
    pub mirrored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub sample_interval_ms: u64,
    pub countdown_start: u8,
    pub countdown_tick_ms: u64,
    pub estimator_load_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorBackend {
    Simulated,
    Scripted,
    Process,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub backend: EstimatorBackend,
    /// External landmark detector, used by the process backend
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Where frames are written for the external detector
    pub frame_path: PathBuf,
    /// Readings replayed by the scripted backend: a finger count, or
    /// `"none"` for a frame without a hand
    #[serde(with = "script_readings")]
    pub script: Vec<Option<u8>>,
}

mod script_readings {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    const NO_HAND: &str = "none";

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Reading {
        Fingers(u8),
        Label(String),
    }

    pub fn serialize<S: Serializer>(script: &[Option<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        script
            .iter()
            .map(|reading| match reading {
                Some(fingers) => Reading::Fingers(*fingers),
                None => Reading::Label(NO_HAND.to_string()),
            })
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Option<u8>>, D::Error> {
        Vec::<Reading>::deserialize(deserializer)?
            .into_iter()
            .map(|reading| match reading {
                Reading::Fingers(fingers) => Ok(Some(fingers)),
                Reading::Label(label) if label == NO_HAND => Ok(None),
                Reading::Label(label) => Err(de::Error::custom(format!(
                    "unknown scripted reading {:?}, expected a finger count or \"{}\"",
                    label, NO_HAND
                ))),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub output_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig {
                width: 800,
                height: 480,
                fullscreen: true,
            },
            camera: CameraConfig {
                width: 800,
                height: 600,
                jpeg_quality: 92,
                mirrored: true,
            },
            capture: CaptureConfig {
                sample_interval_ms: 300,
                countdown_start: 3,
                countdown_tick_ms: 1000,
                estimator_load_timeout_ms: 30_000,
            },
            estimator: EstimatorConfig {
                backend: EstimatorBackend::Simulated,
                command: None,
                args: Vec::new(),
                frame_path: PathBuf::from("/tmp/gesture_capture_frame.jpg"),
                script: vec![Some(1), Some(2), Some(3)],
            },
            paths: PathConfig {
                output_dir: PathBuf::from("captures"),
                config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
            Ok(default_config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;
        config.validate()?;

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow::anyhow!("Invalid display dimensions"));
        }

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow::anyhow!("Invalid camera resolution"));
        }

        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(anyhow::anyhow!("JPEG quality must be between 1 and 100"));
        }

        if self.capture.sample_interval_ms == 0 || self.capture.countdown_tick_ms == 0 {
            return Err(anyhow::anyhow!("Capture intervals must be non-zero"));
        }

        if self.capture.countdown_start == 0 {
            return Err(anyhow::anyhow!("Countdown must start above zero"));
        }

        if self.estimator.backend == EstimatorBackend::Process && self.estimator.command.is_none() {
            return Err(anyhow::anyhow!("Process estimator requires a command"));
        }

        Ok(())
    }

    pub fn create_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.output_dir)
            .with_context(|| format!("Failed to create output directory: {}",
                self.paths.output_dir.display()))?;

        log::info!("Created necessary directories");
        Ok(())
    }
}

impl CaptureConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn estimator_load_timeout(&self) -> Duration {
        Duration::from_millis(self.estimator_load_timeout_ms)
    }
}

// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn display_size(mut self, width: u32, height: u32) -> Self {
        self.config.display.width = width;
        self.config.display.height = height;
        self
    }

    pub fn fullscreen(mut self, enabled: bool) -> Self {
        self.config.display.fullscreen = enabled;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.camera.jpeg_quality = quality;
        self
    }

    pub fn mirrored(mut self, mirrored: bool) -> Self {
        self.config.camera.mirrored = mirrored;
        self
    }

    pub fn sample_interval_ms(mut self, interval: u64) -> Self {
        self.config.capture.sample_interval_ms = interval;
        self
    }

    pub fn countdown(mut self, start: u8, tick_ms: u64) -> Self {
        self.config.capture.countdown_start = start;
        self.config.capture.countdown_tick_ms = tick_ms;
        self
    }

    pub fn estimator_load_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.capture.estimator_load_timeout_ms = timeout;
        self
    }

    pub fn process_estimator(mut self, command: &str, args: &[&str]) -> Self {
        self.config.estimator.backend = EstimatorBackend::Process;
        self.config.estimator.command = Some(command.to_string());
        self.config.estimator.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn scripted_estimator(self, counts: &[u8]) -> Self {
        let readings: Vec<Option<u8>> = counts.iter().copied().map(Some).collect();
        self.scripted_readings(&readings)
    }

    /// Scripted backend whose readings may include frames without a hand
    pub fn scripted_readings(mut self, readings: &[Option<u8>]) -> Self {
        self.config.estimator.backend = EstimatorBackend::Scripted;
        self.config.estimator.script = readings.to_vec();
        self
    }

    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.paths.output_dir = dir.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Environment-specific configuration presets
impl Config {
    pub fn raspberry_pi_7inch() -> Self {
        Config {
            display: DisplayConfig {
                width: 800,
                height: 480,
                fullscreen: true,
            },
            ..Default::default()
        }
    }

    pub fn development_desktop() -> Self {
        Config {
            display: DisplayConfig {
                width: 1024,
                height: 768,
                fullscreen: false,
            },
            capture: CaptureConfig {
                estimator_load_timeout_ms: 10_000,
                ..Config::default().capture
            },
            ..Default::default()
        }
    }
}
