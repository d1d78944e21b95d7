use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::BndError;

pub const CONFIG_ENV: &str = "BND_CONFIG";
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub local_path: String,
    pub remote_path: String,
    #[serde(default)]
    pub ignored_subject_level_dirs: Option<Vec<String>>,
    #[serde(default)]
    pub whitelisted_files_in_root: Option<Vec<String>>,
    #[serde(default)]
    pub extensions_to_rename_and_upload: Option<Vec<String>>,
    #[serde(default)]
    pub expected_cameras: Option<usize>,
}

/// Process-wide settings, built once at startup and passed by reference.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub local_path: Utf8PathBuf,
    pub remote_path: Utf8PathBuf,
    pub ignored_subject_level_dirs: Vec<String>,
    pub whitelisted_files_in_root: Vec<String>,
    pub extensions_to_rename_and_upload: Vec<String>,
    pub expected_cameras: Option<usize>,
}

impl ResolvedConfig {
    /// Config with default lists, for callers that only know the two roots.
    pub fn with_roots(local_path: Utf8PathBuf, remote_path: Utf8PathBuf) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            local_path,
            remote_path,
            ignored_subject_level_dirs: default_ignored_subject_level_dirs(),
            whitelisted_files_in_root: default_whitelisted_files_in_root(),
            extensions_to_rename_and_upload: default_extensions_to_rename(),
            expected_cameras: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BndError> {
        let config_path = Self::config_path(path)?;
        if !config_path.exists() {
            return Err(BndError::MissingConfig(config_path));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BndError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BndError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// `--config`, then `$BND_CONFIG`, then `<config dir>/bnd/config.json`.
    pub fn config_path(path: Option<&str>) -> Result<PathBuf, BndError> {
        if let Some(path) = path {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("bnd").join("config.json"))
            .ok_or_else(|| {
                BndError::InvalidConfig("unable to resolve the user config directory".to_string())
            })
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, BndError> {
        let schema_version = config.schema_version.unwrap_or(CURRENT_SCHEMA_VERSION);
        if schema_version != CURRENT_SCHEMA_VERSION {
            return Err(BndError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let local_path = absolute_root("local_path", &config.local_path)?;
        let remote_path = absolute_root("remote_path", &config.remote_path)?;
        if local_path == remote_path {
            return Err(BndError::InvalidConfig(
                "local_path and remote_path must differ".to_string(),
            ));
        }

        let extensions = config
            .extensions_to_rename_and_upload
            .unwrap_or_else(default_extensions_to_rename)
            .into_iter()
            .map(|ext| {
                let ext = ext.trim().to_string();
                if ext.len() < 2 || !ext.starts_with('.') {
                    Err(BndError::InvalidConfig(format!(
                        "extension must look like \".txt\", got {ext:?}"
                    )))
                } else {
                    Ok(ext)
                }
            })
            .collect::<Result<Vec<_>, BndError>>()?;

        if config.expected_cameras == Some(0) {
            return Err(BndError::InvalidConfig(
                "expected_cameras must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            local_path,
            remote_path,
            ignored_subject_level_dirs: config
                .ignored_subject_level_dirs
                .unwrap_or_else(default_ignored_subject_level_dirs),
            whitelisted_files_in_root: config
                .whitelisted_files_in_root
                .unwrap_or_else(default_whitelisted_files_in_root),
            extensions_to_rename_and_upload: extensions,
            expected_cameras: config.expected_cameras,
        })
    }

    /// Writes a fresh config with default lists. Refuses to replace an existing file.
    pub fn init(
        path: Option<&str>,
        local_path: &str,
        remote_path: &str,
    ) -> Result<(PathBuf, ResolvedConfig), BndError> {
        let config_path = Self::config_path(path)?;
        if config_path.exists() {
            return Err(BndError::InvalidConfig(format!(
                "config file already exists at {}",
                config_path.display()
            )));
        }
        let config = Config {
            schema_version: Some(CURRENT_SCHEMA_VERSION),
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            ignored_subject_level_dirs: Some(default_ignored_subject_level_dirs()),
            whitelisted_files_in_root: Some(default_whitelisted_files_in_root()),
            extensions_to_rename_and_upload: Some(default_extensions_to_rename()),
            expected_cameras: None,
        };
        let content = serde_json::to_vec_pretty(&config)
            .map_err(|err| BndError::ConfigParse(err.to_string()))?;
        let resolved = Self::resolve_config(config)?;
        let utf8_path = Utf8PathBuf::from_path_buf(config_path.clone())
            .map_err(|_| BndError::InvalidConfig("non-utf8 config path".to_string()))?;
        crate::store::write_bytes_atomic(&utf8_path, &content)?;
        Ok((config_path, resolved))
    }
}

fn absolute_root(field: &str, value: &str) -> Result<Utf8PathBuf, BndError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BndError::InvalidConfig(format!("{field} is empty")));
    }
    let path = Utf8Path::new(trimmed);
    if !path.is_absolute() {
        return Err(BndError::InvalidConfig(format!(
            "{field} must be an absolute path, got {trimmed}"
        )));
    }
    Ok(path.to_path_buf())
}

pub fn default_ignored_subject_level_dirs() -> Vec<String> {
    vec!["treadmill-calibration".to_string()]
}

pub fn default_whitelisted_files_in_root() -> Vec<String> {
    vec![
        "comment.txt".to_string(),
        "traj_plan.txt".to_string(),
        "trajectory.txt".to_string(),
        "channel_map.txt".to_string(),
    ]
}

pub fn default_extensions_to_rename() -> Vec<String> {
    vec![".txt".to_string()]
}
