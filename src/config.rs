use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::throttle::DEFAULT_CLASSIFICATION_INTERVAL;
use crate::ui::UiMode;

const DEFAULT_DEVICE: &str = "stub://back_camera";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 224;
const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Deserialize, Default)]
struct LiveClassifyConfigFile {
    camera: Option<CameraConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    throttle: Option<ThrottleConfigFile>,
    ui: Option<UiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    permission: Option<PermissionMode>,
    grant_on_prompt: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    top_k: Option<usize>,
    imagenet_normalization: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ThrottleConfigFile {
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct UiConfigFile {
    mode: Option<String>,
}

/// How camera permission is decided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Granted,
    Denied,
    Restricted,
    /// Not yet determined; the request is answered by `grant_on_prompt`.
    Prompt,
    /// Stub devices are granted, device nodes are probed.
    #[default]
    Auto,
}

impl PermissionMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "restricted" => Ok(Self::Restricted),
            "prompt" => Ok(Self::Prompt),
            "auto" => Ok(Self::Auto),
            other => Err(anyhow!("unknown permission mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveClassifyConfig {
    pub camera: CameraSettings,
    pub classifier: ClassifierSettings,
    pub throttle_interval: Duration,
    pub ui_mode: UiMode,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub permission: PermissionMode,
    pub grant_on_prompt: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
            permission: PermissionMode::Auto,
            grant_on_prompt: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub top_k: usize,
    pub imagenet_normalization: bool,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            labels_path: None,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            top_k: DEFAULT_TOP_K,
            imagenet_normalization: true,
        }
    }
}

impl Default for LiveClassifyConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            classifier: ClassifierSettings::default(),
            throttle_interval: DEFAULT_CLASSIFICATION_INTERVAL,
            ui_mode: UiMode::Auto,
        }
    }
}

impl LiveClassifyConfig {
    /// Defaults, then the file named by `LIVE_CLASSIFY_CONFIG`, then env.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_CLASSIFY_CONFIG").ok();
        Self::load_with(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file taking the place of
    /// `LIVE_CLASSIFY_CONFIG`.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(Some(path))
    }

    fn load_with(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LiveClassifyConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let camera = match file.camera {
            Some(camera) => CameraSettings {
                device: camera.device.unwrap_or(defaults.camera.device),
                width: camera.width.unwrap_or(defaults.camera.width),
                height: camera.height.unwrap_or(defaults.camera.height),
                target_fps: camera.target_fps.unwrap_or(defaults.camera.target_fps),
                permission: camera.permission.unwrap_or(defaults.camera.permission),
                grant_on_prompt: camera
                    .grant_on_prompt
                    .unwrap_or(defaults.camera.grant_on_prompt),
            },
            None => defaults.camera,
        };
        let classifier = match file.classifier {
            Some(classifier) => ClassifierSettings {
                backend: classifier.backend.unwrap_or(defaults.classifier.backend),
                model_path: classifier.model_path,
                labels_path: classifier.labels_path,
                input_width: classifier
                    .input_width
                    .unwrap_or(defaults.classifier.input_width),
                input_height: classifier
                    .input_height
                    .unwrap_or(defaults.classifier.input_height),
                top_k: classifier.top_k.unwrap_or(defaults.classifier.top_k),
                imagenet_normalization: classifier
                    .imagenet_normalization
                    .unwrap_or(defaults.classifier.imagenet_normalization),
            },
            None => defaults.classifier,
        };
        let throttle_interval = file
            .throttle
            .and_then(|throttle| throttle.interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.throttle_interval);
        let ui_mode = match file.ui.and_then(|ui| ui.mode) {
            Some(mode) => UiMode::parse(&mode)?,
            None => defaults.ui_mode,
        };
        Ok(Self {
            camera,
            classifier,
            throttle_interval,
            ui_mode,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("LIVE_CLASSIFY_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(mode) = std::env::var("LIVE_CLASSIFY_PERMISSION") {
            if !mode.trim().is_empty() {
                self.camera.permission = PermissionMode::parse(&mode)?;
            }
        }
        if let Ok(backend) = std::env::var("LIVE_CLASSIFY_BACKEND") {
            if !backend.trim().is_empty() {
                self.classifier.backend = backend;
            }
        }
        if let Ok(path) = std::env::var("LIVE_CLASSIFY_MODEL") {
            if !path.trim().is_empty() {
                self.classifier.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("LIVE_CLASSIFY_LABELS") {
            if !path.trim().is_empty() {
                self.classifier.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(interval) = std::env::var("LIVE_CLASSIFY_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("LIVE_CLASSIFY_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.throttle_interval = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Check invariants. Also run by the binary after CLI overrides.
    pub fn validate(&mut self) -> Result<()> {
        self.camera.device = self.camera.device.trim().to_string();
        if self.camera.device.is_empty() {
            bail!("camera device must not be empty");
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            bail!("camera width and height must be greater than zero");
        }
        if self.camera.target_fps == 0 {
            bail!("camera target_fps must be greater than zero");
        }

        self.classifier.backend = self.classifier.backend.trim().to_ascii_lowercase();
        match self.classifier.backend.as_str() {
            "stub" => {}
            "tract" => {
                if self.classifier.model_path.is_none() {
                    bail!("classifier backend 'tract' requires model_path");
                }
            }
            other => bail!("unknown classifier backend '{}'", other),
        }
        if self.classifier.input_width == 0 || self.classifier.input_height == 0 {
            bail!("classifier input size must be greater than zero");
        }
        if self.classifier.top_k == 0 {
            bail!("classifier top_k must be at least 1");
        }

        if self.throttle_interval.is_zero() {
            bail!("throttle interval must be greater than zero");
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<LiveClassifyConfigFile> {
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
    fn empty_file_yields_defaults() {
        let cfg = LiveClassifyConfig::from_file(LiveClassifyConfigFile::default()).unwrap();
        assert_eq!(cfg.camera.device, DEFAULT_DEVICE);
        assert_eq!(cfg.classifier.backend, "stub");
        assert_eq!(cfg.throttle_interval, Duration::from_millis(500));
    }

    #[test]
    fn permission_modes_parse_case_insensitively() {
        assert_eq!(PermissionMode::parse("Denied").unwrap(), PermissionMode::Denied);
        assert_eq!(PermissionMode::parse(" prompt ").unwrap(), PermissionMode::Prompt);
        assert!(PermissionMode::parse("maybe").is_err());
    }

    #[test]
    fn tract_without_model_is_rejected() {
        let mut cfg = LiveClassifyConfig::default();
        cfg.classifier.backend = "Tract".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("model_path"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = LiveClassifyConfig::default();
        cfg.throttle_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_camera_section_keeps_other_defaults() {
        let file: LiveClassifyConfigFile =
            serde_json::from_str(r#"{"camera": {"permission": "restricted"}}"#).unwrap();
        let cfg = LiveClassifyConfig::from_file(file).unwrap();
        assert_eq!(cfg.camera.permission, PermissionMode::Restricted);
        assert_eq!(cfg.camera.width, DEFAULT_WIDTH);
        assert!(cfg.camera.grant_on_prompt);
    }
}
