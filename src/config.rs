//! Configuration management for CrabStream
//!
//! Settings come from an optional TOML file (`crabstream.toml` by default)
//! layered under environment variables of the form
//! `CRABSTREAM__<SECTION>__<KEY>`, e.g. `CRABSTREAM__SERVER__PORT=9000`.

use crate::errors::CameraError;
use crate::frame_source::SourceOptions;
use crate::types::{DeviceId, Resolution};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CRABSTREAM";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub camera: CameraConfig,
    pub stream: StreamSettings,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// Camera device selection and mode negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index or path, e.g. `0` or `/dev/video0`
    pub device: DeviceId,
    /// Mode requested when the device is opened; absent keeps the device default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Largest per-axis deviation accepted by a resolution change, in pixels
    pub resolution_tolerance: u32,
    /// Sleep between acquisition loop iterations, in milliseconds
    pub frame_interval_ms: u64,
}

/// MJPEG stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Interval between stream parts, in milliseconds
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving captured stills
    pub capture_dir: PathBuf,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::default(),
            resolution: None,
            resolution_tolerance: crate::frame_source::DEFAULT_RESOLUTION_TOLERANCE,
            frame_interval_ms: 10,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: crate::codec::DEFAULT_JPEG_QUALITY,
            poll_interval_ms: 100,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from("./captures"),
            static_dir: PathBuf::from("./static"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl StreamSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl StreamConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    /// A missing file is not an error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let file = File::from(path).format(FileFormat::Toml).required(false);
        let config = Self::build(Config::builder().add_source(file))?;
        log::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, CameraError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_from_file(Self::default_path()),
        }
    }

    /// Parse TOML text, then apply environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, CameraError> {
        Self::build(Config::builder().add_source(File::from_str(contents, FileFormat::Toml)))
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, CameraError> {
        let config: StreamConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, self.to_toml_string()?)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, CameraError> {
        toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("crabstream.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CameraError> {
        if let Some(resolution) = self.camera.resolution {
            if resolution.width == 0 || resolution.height == 0 {
                return Err(CameraError::Config("Invalid camera resolution".to_string()));
            }
        }
        if self.camera.frame_interval_ms == 0 {
            return Err(CameraError::Config(
                "Camera frame interval must be positive".to_string(),
            ));
        }
        if self.stream.jpeg_quality == 0 || self.stream.jpeg_quality > 100 {
            return Err(CameraError::Config(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }
        if self.stream.poll_interval_ms == 0 {
            return Err(CameraError::Config(
                "Stream poll interval must be positive".to_string(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(CameraError::Config("Server host is empty".to_string()));
        }
        Ok(())
    }

    /// Frame source settings derived from the `[camera]` section.
    pub fn source_options(&self) -> SourceOptions {
        let options = SourceOptions::new(self.camera.device.clone())
            .with_frame_interval(Duration::from_millis(self.camera.frame_interval_ms))
            .with_tolerance(self.camera.resolution_tolerance);
        match self.camera.resolution {
            Some(resolution) => options.with_resolution(resolution),
            None => options,
        }
    }
}
