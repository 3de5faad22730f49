//! Service configuration
//!
//! Layered as defaults, then an optional TOML file, then `SECURECAM__*`
//! environment variables (`SECURECAM__SERVER__PORT=9090`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use api::ServerConfig;
use camera_capture::{
    CameraBackend, CaptureConfig, CapturePlatform, Facing, FixedOrientation, ManualOrientation,
    OrientationSensor, StaticPreferences, SyntheticBackend,
};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::SupervisorError;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "securecam.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SECURECAM";

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub camera: CameraSettings,
    pub watchdog: WatchdogConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists
    pub fn load(path: Option<&Path>) -> Result<Self, SupervisorError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };
        Self::from_builder(
            Config::builder()
                .add_source(file)
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SupervisorError> {
        Ok(builder.build()?.try_deserialize()?)
    }
}

/// Capture backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Synthetic,
    V4l2,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Synthetic => f.write_str("synthetic"),
            BackendKind::V4l2 => f.write_str("v4l2"),
        }
    }
}

/// Camera section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub backend: BackendKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
    /// Camera opened by default instead of the first one with `default_facing`
    pub selected_camera_id: Option<String>,
    pub default_facing: Facing,
    /// Fixed device rotation in degrees; unset means no orientation sensor
    pub device_orientation: Option<i32>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Synthetic,
            width: 640,
            height: 480,
            fps: 30,
            jpeg_quality: 90,
            selected_camera_id: None,
            default_facing: Facing::Back,
            device_orientation: None,
        }
    }
}

impl CameraSettings {
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            width: self.width,
            height: self.height,
            jpeg_quality: self.jpeg_quality,
            ..Default::default()
        }
    }

    /// Build the platform services described by this section
    pub fn platform(&self) -> Result<CapturePlatform, SupervisorError> {
        let backend: Arc<dyn CameraBackend> = match self.backend {
            BackendKind::Synthetic => Arc::new(
                SyntheticBackend::default()
                    .with_fps(self.fps)
                    .with_quality(self.jpeg_quality),
            ),
            #[cfg(feature = "v4l2")]
            BackendKind::V4l2 => Arc::new(camera_capture::V4l2Backend::new(self.fps)),
            #[cfg(not(feature = "v4l2"))]
            BackendKind::V4l2 => {
                return Err(SupervisorError::UnsupportedBackend(self.backend.to_string()))
            }
        };

        let sensor: Arc<dyn OrientationSensor> = match self.device_orientation {
            Some(degrees) => Arc::new(ManualOrientation::with_initial(degrees)),
            None => Arc::new(FixedOrientation),
        };

        let preferences = StaticPreferences {
            selected_camera_id: self.selected_camera_id.clone(),
            default_facing: self.default_facing,
        };

        Ok(CapturePlatform::new(backend, sensor, Arc::new(preferences)))
    }
}

/// Watchdog section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    /// Seconds between health checks
    pub interval_secs: u64,
    /// Minimum seconds between capture restarts
    pub grace_secs: u64,
    /// Delay between camera start and going live
    pub settle_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15,
            grace_secs: 15,
            settle_ms: 2000,
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Metrics section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter address; disabled when unset
    pub listen: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::PreferenceStore;
    use config::FileFormat;
    use std::collections::HashMap;

    fn load(toml: &str, env: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_builder(
            Config::builder()
                .add_source(File::from_str(toml, FileFormat::Toml))
                .add_source(
                    Environment::with_prefix(ENV_PREFIX)
                        .separator("__")
                        .source(Some(vars)),
                ),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = load("", &[]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.stream_interval_ms, 100);
        assert_eq!(config.server.stream_retry_ms, 500);
        assert_eq!(config.camera.backend, BackendKind::Synthetic);
        assert_eq!((config.camera.width, config.camera.height), (640, 480));
        assert_eq!(config.camera.default_facing, Facing::Back);
        assert!(config.watchdog.enabled);
        assert_eq!(config.watchdog.interval(), Duration::from_secs(15));
        assert_eq!(config.watchdog.grace(), Duration::from_secs(15));
        assert_eq!(config.watchdog.settle(), Duration::from_secs(2));
        assert_eq!(config.logging.level, "info");
        assert!(config.metrics.listen.is_none());
    }

    #[test]
    fn test_file_values() {
        let config = load(
            r#"
            [server]
            port = 9000
            advertise_host = "cam.local"

            [camera]
            default_facing = "front"
            selected_camera_id = "1"
            device_orientation = 90

            [watchdog]
            enabled = false
            "#,
            &[],
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.advertise_host.as_deref(), Some("cam.local"));
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.camera.default_facing, Facing::Front);
        assert_eq!(config.camera.selected_camera_id.as_deref(), Some("1"));
        assert_eq!(config.camera.device_orientation, Some(90));
        assert!(!config.watchdog.enabled);
        assert_eq!(config.watchdog.interval_secs, 15);
    }

    #[test]
    fn test_environment_overrides_file() {
        let config = load(
            "[server]\nport = 9000\n",
            &[
                ("SECURECAM__SERVER__PORT", "9100"),
                ("SECURECAM__LOGGING__LEVEL", "debug"),
            ],
        );
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_default_file_is_fine() {
        let config = AppConfig::from_builder(
            Config::builder().add_source(File::with_name("does-not-exist.toml").required(false)),
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let result = AppConfig::from_builder(
            Config::builder().add_source(File::from_str(
                "[camera]\nbackend = \"webcam\"\n",
                FileFormat::Toml,
            )),
        );
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }

    #[test]
    fn test_synthetic_platform() {
        let platform = CameraSettings::default().platform().unwrap();
        assert_eq!(platform.backend.name(), "synthetic");
        assert_eq!(platform.preferences.default_facing(), Facing::Back);
        assert!(platform.preferences.selected_camera_id().is_none());
    }

    #[cfg(not(feature = "v4l2"))]
    #[test]
    fn test_v4l2_requires_feature() {
        let settings = CameraSettings {
            backend: BackendKind::V4l2,
            ..Default::default()
        };
        assert!(matches!(
            settings.platform(),
            Err(SupervisorError::UnsupportedBackend(_))
        ));
    }
}
