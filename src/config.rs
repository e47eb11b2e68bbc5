use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_LIVENESS_INTERVAL_SECS: u64 = 10;
const DEFAULT_LIVENESS_TIMEOUT_SECS: u64 = 5;
const DEFAULT_DETECT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SPEECH_COMMAND: &str = "espeak";
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_REPORT_DIR: &str = ".";

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    api_url: Option<String>,
    report_dir: Option<PathBuf>,
    liveness: Option<LivenessConfigFile>,
    detect: Option<DetectConfigFile>,
    narration: Option<NarrationConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct LivenessConfigFile {
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct NarrationConfigFile {
    enabled: Option<bool>,
    command: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Normalised service base URL (no trailing slash).
    pub api_url: String,
    pub report_dir: PathBuf,
    pub liveness: LivenessSettings,
    pub detect_timeout: Duration,
    pub narration: NarrationSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct LivenessSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NarrationSettings {
    pub enabled: bool,
    pub command: String,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            liveness: LivenessSettings {
                interval: Duration::from_secs(DEFAULT_LIVENESS_INTERVAL_SECS),
                timeout: Duration::from_secs(DEFAULT_LIVENESS_TIMEOUT_SECS),
            },
            detect_timeout: Duration::from_secs(DEFAULT_DETECT_TIMEOUT_SECS),
            narration: NarrationSettings {
                enabled: false,
                command: DEFAULT_SPEECH_COMMAND.to_string(),
            },
            camera: CameraSettings {
                device: DEFAULT_CAMERA_DEVICE.to_string(),
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
            },
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCENE_SCOUT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        let defaults = Self::default();
        let liveness = LivenessSettings {
            interval: file
                .liveness
                .as_ref()
                .and_then(|l| l.interval_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.liveness.interval),
            timeout: file
                .liveness
                .as_ref()
                .and_then(|l| l.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.liveness.timeout),
        };
        let narration = NarrationSettings {
            enabled: file
                .narration
                .as_ref()
                .and_then(|n| n.enabled)
                .unwrap_or(defaults.narration.enabled),
            command: file
                .narration
                .and_then(|n| n.command)
                .unwrap_or(defaults.narration.command),
        };
        let camera = CameraSettings {
            device: file
                .camera
                .as_ref()
                .and_then(|c| c.device.clone())
                .unwrap_or(defaults.camera.device),
            width: file
                .camera
                .as_ref()
                .and_then(|c| c.width)
                .unwrap_or(defaults.camera.width),
            height: file
                .camera
                .as_ref()
                .and_then(|c| c.height)
                .unwrap_or(defaults.camera.height),
        };
        Self {
            api_url: file.api_url.unwrap_or(defaults.api_url),
            report_dir: file.report_dir.unwrap_or(defaults.report_dir),
            liveness,
            detect_timeout: file
                .detect
                .and_then(|d| d.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.detect_timeout),
            narration,
            camera,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SCENE_SCOUT_API_URL") {
            if !url.trim().is_empty() {
                self.api_url = url;
            }
        }
        if let Ok(secs) = std::env::var("SCENE_SCOUT_LIVENESS_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                anyhow!("SCENE_SCOUT_LIVENESS_SECS must be an integer number of seconds")
            })?;
            self.liveness.interval = Duration::from_secs(secs);
        }
        if let Ok(cmd) = std::env::var("SCENE_SCOUT_SPEECH_CMD") {
            if !cmd.trim().is_empty() {
                self.narration.command = cmd;
            }
        }
        if let Ok(device) = std::env::var("SCENE_SCOUT_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(dir) = std::env::var("SCENE_SCOUT_REPORT_DIR") {
            if !dir.trim().is_empty() {
                self.report_dir = PathBuf::from(dir);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.api_url = normalize_base_url(&self.api_url)?;
        if self.liveness.interval.is_zero() {
            return Err(anyhow!("liveness interval must be greater than zero"));
        }
        if self.liveness.timeout.is_zero() {
            return Err(anyhow!("liveness timeout must be greater than zero"));
        }
        if self.detect_timeout.is_zero() {
            return Err(anyhow!("detect timeout must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be greater than zero"));
        }
        Ok(())
    }
}

/// Trims whitespace and trailing slashes; an empty value falls back to the default.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace());
    let base = if trimmed.is_empty() {
        DEFAULT_API_URL
    } else {
        trimmed
    };
    let parsed = Url::parse(base).map_err(|e| anyhow!("invalid api url '{}': {}", base, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(base.to_string()),
        other => Err(anyhow!(
            "unsupported api url scheme '{}'; expected http or https",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_strips_whitespace_and_trailing_slashes() -> Result<()> {
        assert_eq!(
            normalize_base_url("  http://detector:8000// \n")?,
            "http://detector:8000"
        );
        assert_eq!(normalize_base_url("https://a.example/api/")?, "https://a.example/api");
        assert_eq!(normalize_base_url("http://h/ /")?, "http://h");
        assert_eq!(normalize_base_url("http://h / // \t/")?, "http://h");
        Ok(())
    }

    #[test]
    fn empty_base_url_falls_back_to_default() -> Result<()> {
        assert_eq!(normalize_base_url("   ")?, DEFAULT_API_URL);
        assert_eq!(normalize_base_url("/")?, DEFAULT_API_URL);
        Ok(())
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        assert!(normalize_base_url("ftp://detector").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }
}
