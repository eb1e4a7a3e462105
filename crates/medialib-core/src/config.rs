use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metadata;

const DEFAULT_CONFIG_PATHS: &[&str] = &["./medialib.toml", "~/.config/medialib/config.toml"];

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_workers() -> usize {
    1
}

/// Run settings, read from TOML and overridden from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library_path: Option<PathBuf>,
    pub source_directory_path: Option<PathBuf>,
    /// Variant suffixes in priority order, e.g. `["-Medienserver", "-Internet"]`.
    pub variant_suffixes: Vec<String>,
    pub banner_file_postfix: Option<String>,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub workers: usize,
    pub report_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            library_path: None,
            source_directory_path: None,
            variant_suffixes: Vec::new(),
            banner_file_postfix: None,
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            workers: default_workers(),
            report_path: None,
        }
    }
}

/// Settings after the run-level checks, with tools resolved to full paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSettings {
    pub library_path: PathBuf,
    pub source_directory_path: PathBuf,
    pub variant_suffixes: Vec<String>,
    pub banner_file_postfix: Option<String>,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub workers: usize,
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

fn resolve_tool(name: &str) -> Result<PathBuf, ConfigError> {
    metadata::locate_tool(name).ok_or_else(|| ConfigError::ToolNotFound(name.to_string()))
}

impl Settings {
    /// Run-level checks. Nothing is processed unless these pass.
    pub fn validate(&self) -> Result<ValidatedSettings, ConfigError> {
        self.validate_with(resolve_tool)
    }

    pub(crate) fn validate_with(
        &self,
        resolve_tool: impl Fn(&str) -> Result<PathBuf, ConfigError>,
    ) -> Result<ValidatedSettings, ConfigError> {
        let library_path = self
            .library_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(expand)
            .ok_or(ConfigError::MissingLibraryPath)?;
        if !library_path.is_dir() {
            return Err(ConfigError::LibraryNotFound(library_path));
        }

        let source_directory_path = self
            .source_directory_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(expand)
            .ok_or(ConfigError::MissingSourceDirectory)?;
        if !source_directory_path.is_dir() {
            return Err(ConfigError::SourceNotFound(source_directory_path));
        }

        if self.variant_suffixes.is_empty() {
            return Err(ConfigError::NoVariantSuffixes);
        }
        if let Some(index) = self.variant_suffixes.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::EmptyVariantSuffix(index));
        }

        let banner_file_postfix = self
            .banner_file_postfix
            .clone()
            .filter(|b| !b.trim().is_empty());
        if banner_file_postfix.is_none() {
            tracing::warn!("no banner file postfix configured, sets with two or more images will not get artwork");
        }

        Ok(ValidatedSettings {
            library_path,
            source_directory_path,
            variant_suffixes: self.variant_suffixes.clone(),
            banner_file_postfix,
            ffmpeg: resolve_tool(&self.ffmpeg)?,
            ffprobe: resolve_tool(&self.ffprobe)?,
            workers: self.workers.max(1),
        })
    }
}

/// Read settings from a TOML file.
pub fn load_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load settings from `custom_path`, else from the first default location
/// that exists, else defaults.
pub fn load_settings(custom_path: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = custom_path {
        return load_settings_file(&expand(path));
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading settings");
            return load_settings_file(path);
        }
    }

    Ok(Settings::default())
}
