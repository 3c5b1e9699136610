//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where per-video output folders are created.
    pub output_dir: PathBuf,

    /// Default inference pipeline settings.
    pub pipeline: PipelineDefaults,

    /// Default motion script settings.
    pub script: ScriptDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default inference pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDefaults {
    /// Capacity of every inter-stage queue, in frames.
    pub queue_capacity: usize,

    /// Frames per detector batch. Detectors without batch support use 1.
    pub batch_size: usize,

    /// Seconds between progress reports (never below 0.1).
    pub progress_interval_secs: f64,

    /// Square side length frames are scaled/cropped to before detection.
    pub render_resolution: u32,

    /// Camera pitch (degrees) used when flattening panoramic sources.
    pub pitch: i32,

    /// Hardware decode backend: "auto", "none", or a backend name such as "cuda".
    pub hwaccel: String,

    /// ffmpeg executable.
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable.
    pub ffprobe_path: PathBuf,
}

/// Default motion script parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptDefaults {
    /// Author string written into generated scripts.
    pub author: String,

    /// Copy the finished script next to the source video.
    pub copy_to_video_dir: bool,

    /// Back up an existing script of ours before overwriting it.
    pub make_backup: bool,

    /// Visvalingam–Whyatt area threshold.
    pub simplify_factor: f64,

    /// Rounding step applied to simplified positions.
    pub rounding_step: u32,

    /// Values below this become 0.
    pub threshold_low: f64,

    /// Values above this become 100.
    pub threshold_high: f64,

    /// Percentage added to local maxima.
    pub boost_up_pct: f64,

    /// Percentage removed from local minima.
    pub boost_down_pct: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "kinetrace_inference=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_output(),
            pipeline: PipelineDefaults::default(),
            script: ScriptDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            queue_capacity: 500,
            batch_size: 30,
            progress_interval_secs: 0.25,
            render_resolution: 1080,
            pitch: -25,
            hwaccel: "auto".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for ScriptDefaults {
    fn default() -> Self {
        Self {
            author: "kinetrace".to_string(),
            copy_to_video_dir: false,
            make_backup: true,
            simplify_factor: 8.0,
            rounding_step: 5,
            threshold_low: 10.0,
            threshold_high: 90.0,
            boost_up_pct: 10.0,
            boost_down_pct: 15.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl PipelineDefaults {
    /// Progress interval with the lower bound applied.
    pub fn progress_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.progress_interval_secs.max(0.1))
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("kinetrace").join("config.json")
}

/// Default output directory.
fn dirs_default_output() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("kinetrace").join("output")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("kinetrace-config-{tag}-{}", std::process::id()))
            .join("config.json")
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from(&temp_config_path("missing"));
        assert_eq!(config.pipeline.queue_capacity, 500);
        assert_eq!(config.script.rounding_step, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_config_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"pipeline": {"batch_size": 4}}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.pipeline.batch_size, 4);
        assert_eq!(config.pipeline.queue_capacity, 500);
        assert_eq!(config.logging.level, "info");

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_garbage_file_falls_back_to_defaults() {
        let path = temp_config_path("garbage");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.pipeline.batch_size, 30);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_config_path("save");
        let mut config = AppConfig::default();
        config.script.author = "tester".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.script.author, "tester");

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_progress_interval_floor() {
        let defaults = PipelineDefaults {
            progress_interval_secs: 0.01,
            ..Default::default()
        };
        assert_eq!(defaults.progress_interval().as_millis(), 100);
    }
}
