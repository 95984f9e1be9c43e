//! Persisted user settings.
//!
//! ## Location
//!
//! Settings live at `<config dir>/herald/settings.json` (see
//! [`HeraldSettings::default_path`]). A missing file means defaults.
//!
//! ## Migration
//!
//! Files written before settings version 2.0 (or with no version at all)
//! are discarded in favour of defaults on load.
//!
//! ## Atomicity
//!
//! Saves use a temp file + rename so an interrupted write never leaves a
//! truncated settings file behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::HeraldError;
use crate::providers::observatory;
use crate::types::{RatePreset, SpeechApi};
use crate::voices::DEFAULT_VOICE;

/// Current settings schema version.
pub const SETTINGS_VERSION: f64 = 2.0;

/// Default cache budget in megabytes.
pub const DEFAULT_CACHE_SIZE_MB: u64 = 100;

const APP_DIR: &str = "herald";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Credentials for the direct Azure endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureSettings {
    /// `Ocp-Apim-Subscription-Key` value.
    pub subscription_key: String,
    /// Azure region, e.g. `eastus`.
    pub region: String,
}

/// Configuration for an OpenAI-compatible endpoint.
///
/// Blank fields fall back to the provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub endpoint: String,
    pub key: String,
    pub model: String,
    pub voice: String,
}

/// Everything Herald reads from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldSettings {
    /// Schema version; absent in files older than 2.0.
    #[serde(default)]
    pub settings_version: f64,
    /// Which provider to synthesize with.
    pub api: SpeechApi,
    /// Catalog display name (e.g. `"British - Sonia - cheerful"`) or a raw
    /// provider voice name.
    pub selected_voice: String,
    /// Speech rate preset.
    pub rate: RatePreset,
    /// Cache budget in megabytes; values below 1 are treated as 1.
    pub cache_size_mb: u64,
    /// Cache directory override.
    pub cache_dir: Option<PathBuf>,
    /// Observatory user ID, obtained by registering.
    pub user_id: Option<String>,
    /// Observatory proxy base URL.
    pub observatory_endpoint: String,
    pub azure: AzureSettings,
    pub openai: OpenAiSettings,
}

impl Default for HeraldSettings {
    fn default() -> Self {
        Self {
            settings_version: SETTINGS_VERSION,
            api: SpeechApi::default(),
            selected_voice: DEFAULT_VOICE.to_string(),
            rate: RatePreset::default(),
            cache_size_mb: DEFAULT_CACHE_SIZE_MB,
            cache_dir: None,
            user_id: None,
            observatory_endpoint: observatory::DEFAULT_ENDPOINT.to_string(),
            azure: AzureSettings::default(),
            openai: OpenAiSettings::default(),
        }
    }
}

impl HeraldSettings {
    /// `<config dir>/herald/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE_NAME))
    }

    /// Load settings from `path`.
    ///
    /// A missing file yields defaults, as does a file from before version 2.0.
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError::Settings` if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &Path) -> Result<Self, HeraldError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(settings_error(path, e)),
        };

        let settings: Self = serde_json::from_str(&contents).map_err(|e| settings_error(path, e))?;

        if settings.settings_version < SETTINGS_VERSION {
            tracing::info!(
                path = %path.display(),
                found = settings.settings_version,
                current = SETTINGS_VERSION,
                "Settings predate the current version; resetting to defaults"
            );
            return Ok(Self::default());
        }

        Ok(settings)
    }

    /// Write settings to `path`, creating parent directories.
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError::Settings` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), HeraldError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| settings_error(path, e))?;

        let json = serde_json::to_string_pretty(self).map_err(|e| settings_error(path, e))?;

        let mut temp_file =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| settings_error(path, e))?;
        temp_file
            .write_all(json.as_bytes())
            .and_then(|()| temp_file.flush())
            .map_err(|e| settings_error(path, e))?;
        temp_file.persist(path).map_err(|e| settings_error(path, e))?;

        tracing::debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// The configured cache directory, or `<cache dir>/herald`.
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join(APP_DIR)))
    }

    /// The cache budget, at least 1 MB.
    pub fn effective_cache_size_mb(&self) -> u64 {
        self.cache_size_mb.max(1)
    }
}

fn settings_error(path: &Path, error: impl std::fmt::Display) -> HeraldError {
    HeraldError::Settings {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = HeraldSettings::default();
        assert_eq!(settings.selected_voice, "American - Christopher");
        assert_eq!(settings.rate, RatePreset::Default);
        assert_eq!(settings.cache_size_mb, 100);
        assert_eq!(settings.api, SpeechApi::Observatory);
        assert_eq!(settings.observatory_endpoint, "https://api.observatory.xjph.net/");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = HeraldSettings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, HeraldSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = HeraldSettings {
            api: SpeechApi::Azure,
            selected_voice: "British - Sonia - cheerful".into(),
            rate: RatePreset::Faster,
            user_id: Some("abc".into()),
            azure: AzureSettings {
                subscription_key: "k".into(),
                region: "uksouth".into(),
            },
            ..HeraldSettings::default()
        };

        settings.save(&path).unwrap();
        assert_eq!(HeraldSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_old_version_resets_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"settings_version": 1.3, "selected_voice": "British - Ryan", "cache_size_mb": 5}"#,
        )
        .unwrap();

        assert_eq!(HeraldSettings::load(&path).unwrap(), HeraldSettings::default());
    }

    #[test]
    fn test_missing_version_resets_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"selected_voice": "British - Ryan"}"#).unwrap();

        assert_eq!(HeraldSettings::load(&path).unwrap().selected_voice, DEFAULT_VOICE);
    }

    #[test]
    fn test_partial_current_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"settings_version": 2.0, "rate": "Slowest"}"#).unwrap();

        let settings = HeraldSettings::load(&path).unwrap();
        assert_eq!(settings.rate, RatePreset::Slowest);
        assert_eq!(settings.cache_size_mb, DEFAULT_CACHE_SIZE_MB);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{{{").unwrap();

        let err = HeraldSettings::load(&path).unwrap_err();
        assert!(matches!(err, HeraldError::Settings { .. }));
    }

    #[test]
    fn test_cache_size_minimum() {
        let settings = HeraldSettings {
            cache_size_mb: 0,
            ..HeraldSettings::default()
        };
        assert_eq!(settings.effective_cache_size_mb(), 1);
    }

    #[test]
    fn test_cache_dir_override() {
        let settings = HeraldSettings {
            cache_dir: Some(PathBuf::from("/tmp/herald-test")),
            ..HeraldSettings::default()
        };
        assert_eq!(settings.resolved_cache_dir(), Some(PathBuf::from("/tmp/herald-test")));
    }
}
