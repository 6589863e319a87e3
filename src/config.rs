use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::capture::FacingMode;
use crate::detect::{AuthScheme, RequestFormat};

const DEFAULT_BACKEND_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const MAX_CAMERA_DIMENSION: u32 = 8192;
const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:8787";

#[derive(Debug, Deserialize, Default)]
struct BrainsightConfigFile {
    backend: Option<BackendConfigFile>,
    camera: Option<CameraConfigFile>,
    relay: Option<RelayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    url: Option<String>,
    format: Option<RequestFormat>,
    model: Option<String>,
    max_tokens: Option<u32>,
    auth: Option<AuthScheme>,
    api_key_env: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    front_device: Option<String>,
    facing: Option<FacingMode>,
    width: Option<u32>,
    height: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrainsightConfig {
    pub backend: BackendSettings,
    pub camera: CameraSettings,
    pub relay: RelaySettings,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub url: String,
    pub format: RequestFormat,
    pub model: String,
    pub max_tokens: u32,
    pub auth: AuthScheme,
    /// Name of the environment variable holding the credential.
    pub api_key_env: String,
    /// `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Rear-facing (or only) device; `stub://...` selects the synthetic camera.
    pub device: String,
    /// User-facing device, when the host has one.
    pub front_device: Option<String>,
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
    /// JPEG quality on the encoder's 1..=100 scale.
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub addr: String,
}

impl Default for BrainsightConfig {
    fn default() -> Self {
        Self::from_file(BrainsightConfigFile::default())
    }
}

impl BrainsightConfig {
    /// Defaults, then `$BRAINSIGHT_CONFIG` (JSON, or TOML by extension), then
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BRAINSIGHT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BrainsightConfigFile) -> Self {
        let backend = file.backend.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        Self {
            backend: BackendSettings {
                url: backend
                    .url
                    .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
                format: backend.format.unwrap_or_default(),
                model: backend.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_tokens: backend.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                auth: backend.auth.unwrap_or_default(),
                api_key_env: backend
                    .api_key_env
                    .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
                timeout: backend.timeout_secs.map(Duration::from_secs),
            },
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                front_device: camera.front_device,
                facing: camera.facing.unwrap_or_default(),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                jpeg_quality: camera.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            relay: RelaySettings {
                addr: file
                    .relay
                    .and_then(|relay| relay.addr)
                    .unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string()),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("BRAINSIGHT_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend.url = url.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var("BRAINSIGHT_MODEL") {
            if !model.trim().is_empty() {
                self.backend.model = model.trim().to_string();
            }
        }
        if let Ok(timeout) = std::env::var("BRAINSIGHT_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("BRAINSIGHT_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.backend.timeout = Some(Duration::from_secs(seconds));
        }
        if let Ok(device) = std::env::var("BRAINSIGHT_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device.trim().to_string();
            }
        }
        if let Ok(addr) = std::env::var("BRAINSIGHT_RELAY_ADDR") {
            if !addr.trim().is_empty() {
                self.relay.addr = addr.trim().to_string();
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.backend.url)
            .map_err(|e| anyhow!("invalid backend url '{}': {}", self.backend.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "backend url must use http or https, got '{}'",
                url.scheme()
            ));
        }
        if self.backend.model.trim().is_empty() {
            return Err(anyhow!("backend model must not be empty"));
        }
        if self.backend.max_tokens == 0 {
            return Err(anyhow!("backend max_tokens must be greater than zero"));
        }
        if self.backend.timeout == Some(Duration::ZERO) {
            return Err(anyhow!("backend timeout must be greater than zero"));
        }
        if self.backend.api_key_env.trim().is_empty() {
            return Err(anyhow!("backend api_key_env must name an environment variable"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be greater than zero"));
        }
        if self.camera.width > MAX_CAMERA_DIMENSION || self.camera.height > MAX_CAMERA_DIMENSION {
            return Err(anyhow!(
                "camera dimensions must not exceed {}x{}",
                MAX_CAMERA_DIMENSION,
                MAX_CAMERA_DIMENSION
            ));
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(anyhow!("camera jpeg_quality must be between 1 and 100"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<BrainsightConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
