// ============================================================================
// ENGINE SETTINGS: persisted `key=value` configuration
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::EditResult;
use crate::ops::healing::HealingProviderConfig;

pub const MIN_BRUSH_SIZE: u32 = 5;
pub const MAX_BRUSH_SIZE: u32 = 50;
pub const BRUSH_STEP: u32 = 5;

/// Engine settings that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Deadline for decoding one overlay image.
    pub decode_timeout_secs: u64,
    /// Deadline for one remote healing call.
    pub provider_timeout_secs: u64,
    /// Removal brush width in display px (5–50).
    pub brush_size: u32,
    /// New marks are fitted into a square of this many display px.
    pub mark_max_size: u32,
    /// JPEG export quality (1–100).
    pub jpeg_quality: u8,

    // Remote healing provider. Empty endpoint = heal locally.
    pub provider_endpoint: String,
    pub provider_api_key: String,
    pub provider_secret_key: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            decode_timeout_secs: 8,
            provider_timeout_secs: 20,
            brush_size: 20,
            mark_max_size: 150,
            jpeg_quality: 90,
            provider_endpoint: String::new(),
            provider_api_key: String::new(),
            provider_secret_key: String::new(),
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/mockupfe/mockupfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MockupFE\mockupfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/MockupFE/mockupfe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("mockupfe");
            return Some(config_dir.join("mockupfe_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("MockupFE").join("mockupfe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("MockupFE")
                    .join("mockupfe_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("mockupfe_settings.cfg")))
        }
    }

    /// Load settings from the default location (defaults if missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines. Unknown keys are ignored; malformed values keep
    /// their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "decode_timeout_secs" => {
                    s.decode_timeout_secs = val.parse().unwrap_or(s.decode_timeout_secs).max(1);
                }
                "provider_timeout_secs" => {
                    s.provider_timeout_secs = val.parse().unwrap_or(s.provider_timeout_secs).max(1);
                }
                "brush_size" => {
                    s.brush_size = val
                        .parse()
                        .unwrap_or(s.brush_size)
                        .clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
                }
                "mark_max_size" => {
                    s.mark_max_size = val.parse().unwrap_or(s.mark_max_size).max(1);
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val.parse().unwrap_or(s.jpeg_quality).clamp(1, 100);
                }
                "provider_endpoint" => s.provider_endpoint = val.to_string(),
                "provider_api_key" => s.provider_api_key = val.to_string(),
                "provider_secret_key" => s.provider_secret_key = val.to_string(),
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "decode_timeout_secs={}\n\
             provider_timeout_secs={}\n\
             brush_size={}\n\
             mark_max_size={}\n\
             jpeg_quality={}\n\
             provider_endpoint={}\n\
             provider_api_key={}\n\
             provider_secret_key={}\n",
            self.decode_timeout_secs,
            self.provider_timeout_secs,
            self.brush_size,
            self.mark_max_size,
            self.jpeg_quality,
            self.provider_endpoint,
            self.provider_api_key,
            self.provider_secret_key,
        )
    }

    /// Save settings to the default location.
    pub fn save(&self) -> EditResult<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> EditResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }

    /// Provider configuration, or `None` when no endpoint is set (local healing).
    pub fn provider_config(&self) -> Option<HealingProviderConfig> {
        if self.provider_endpoint.is_empty() {
            return None;
        }
        Some(
            HealingProviderConfig::new(self.provider_endpoint.clone())
                .with_credentials(self.provider_api_key.clone(), self.provider_secret_key.clone())
                .with_timeout(Duration::from_secs(self.provider_timeout_secs)),
        )
    }
}
