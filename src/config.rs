use crate::capture::PatternStyle;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the camera API, e.g. http://localhost:8000/api/camera/
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_analyze_path")]
    pub analyze_path: String,

    #[serde(default)]
    pub camera_id: Option<String>,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub in_flight: InFlightPolicy,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default = "default_shortcut")]
    pub shortcut: Option<String>,

    #[serde(default)]
    pub auto_start: bool,

    /// Where to write the latest annotated frame
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    #[serde(default)]
    pub on_start: Option<String>,

    #[serde(default)]
    pub on_stop: Option<String>,

    #[serde(default)]
    pub on_detect: Option<String>,
}

/// What to do with a sampling tick while an analyze request is still pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InFlightPolicy {
    /// Skip the tick; at most one request in flight
    #[default]
    Skip,
    /// Submit anyway; only results newer than the last applied one are kept
    Latest,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    TestPattern {
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
        #[serde(default = "default_style")]
        style: PatternStyle,
    },
    Directory {
        path: PathBuf,
        #[serde(default = "default_repeat")]
        repeat: bool,
    },
    Snapshot {
        url: String,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::TestPattern {
            width: default_width(),
            height: default_height(),
            style: default_style(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000/api/camera/".to_string()
}

fn default_analyze_path() -> String {
    "stream/".to_string()
}

fn default_interval_ms() -> u64 {
    200
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_timeout() -> u64 {
    5
}

fn default_shortcut() -> Option<String> {
    Some("SUPER+ALT+B".to_string())
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_style() -> PatternStyle {
    PatternStyle::Belt
}

fn default_repeat() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            analyze_path: default_analyze_path(),
            camera_id: None,
            interval_ms: default_interval_ms(),
            jpeg_quality: default_jpeg_quality(),
            timeout: default_timeout(),
            in_flight: InFlightPolicy::default(),
            source: SourceConfig::default(),
            shortcut: default_shortcut(),
            auto_start: false,
            snapshot_path: None,
            on_start: None,
            on_stop: None,
            on_detect: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    /// (~/.config/beltwatch/config.json) when none is given.
    ///
    /// A missing file is created with the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save(&config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("beltwatch").join("config.json"))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.api_url) {
            return Err(anyhow::anyhow!("api_url must be an http(s) URL"));
        }

        if self.interval_ms < 100 {
            return Err(anyhow::anyhow!("interval_ms must be at least 100"));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow::anyhow!("jpeg_quality must be between 1 and 100"));
        }

        if self.timeout == 0 {
            return Err(anyhow::anyhow!("timeout must be at least 1 second"));
        }

        if self.camera_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(anyhow::anyhow!("camera_id cannot be empty"));
        }

        match &self.source {
            SourceConfig::TestPattern { width, height, .. } => {
                if *width == 0 || *height == 0 {
                    return Err(anyhow::anyhow!("test_pattern size cannot be zero"));
                }
            }
            SourceConfig::Directory { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(anyhow::anyhow!("directory source needs a path"));
                }
            }
            SourceConfig::Snapshot { url } => {
                if !is_http_url(url) {
                    return Err(anyhow::anyhow!("snapshot source url must be http(s)"));
                }
            }
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.interval(), Duration::from_millis(200));
        assert_eq!(config.in_flight, InFlightPolicy::Skip);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "camera_id": "belt_1",
                "in_flight": "latest",
                "source": { "kind": "directory", "path": "/srv/frames" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.camera_id.as_deref(), Some("belt_1"));
        assert_eq!(config.in_flight, InFlightPolicy::Latest);
        assert_eq!(
            config.source,
            SourceConfig::Directory {
                path: PathBuf::from("/srv/frames"),
                repeat: true
            }
        );
        assert_eq!(config.analyze_path, "stream/");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            interval_ms: 50,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.interval_ms = 200;
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.jpeg_quality = 80;
        config.api_url = "localhost:8000".to_string();
        assert!(config.validate().is_err());

        config.api_url = default_api_url();
        config.camera_id = Some("  ".to_string());
        assert!(config.validate().is_err());

        config.camera_id = None;
        config.source = SourceConfig::Snapshot {
            url: "rtsp://camera".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.api_url, default_api_url());
        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.interval_ms, config.interval_ms);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
