use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::QtlError;
use crate::naming::{DEFAULT_DATASET_PATTERN, DEFAULT_STUDY_PATTERN, NamingRules};

pub const DEFAULT_CONFIG_FILE: &str = "qtlformer.json";
pub const DEFAULT_WORKERS: usize = 5;
/// `{study}/{dataset}/{file}`
pub const LOCAL_RELATIVE_DEPTH: usize = 3;
pub const DEFAULT_CREDIBLE_SETS_SUFFIX: &str = "credible_sets.parquet";
pub const DEFAULT_LBF_VARIABLE_SUFFIX: &str = "lbf_variable.parquet";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub study_pattern: Option<String>,
    #[serde(default)]
    pub dataset_pattern: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub relative_depth: Option<usize>,
    #[serde(default)]
    pub credible_sets_suffix: Option<String>,
    #[serde(default)]
    pub lbf_variable_suffix: Option<String>,
}

/// File names of the two artifacts every dataset directory must hold,
/// as `{dataset_id}.{suffix}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub credible_sets_suffix: String,
    pub lbf_variable_suffix: String,
}

impl ArtifactLayout {
    pub fn credible_sets_path(&self, dataset_path: &str, dataset_id: &str) -> String {
        format!(
            "{}/{dataset_id}.{}",
            dataset_path.trim_end_matches('/'),
            self.credible_sets_suffix
        )
    }

    pub fn lbf_variable_path(&self, dataset_path: &str, dataset_id: &str) -> String {
        format!(
            "{}/{dataset_id}.{}",
            dataset_path.trim_end_matches('/'),
            self.lbf_variable_suffix
        )
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            credible_sets_suffix: DEFAULT_CREDIBLE_SETS_SUFFIX.to_string(),
            lbf_variable_suffix: DEFAULT_LBF_VARIABLE_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub naming: NamingRules,
    pub artifacts: ArtifactLayout,
    pub workers: usize,
    /// `None` keeps artifact paths as the backend reported them.
    pub relative_depth: Option<usize>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            naming: NamingRules::default(),
            artifacts: ArtifactLayout::default(),
            workers: DEFAULT_WORKERS,
            relative_depth: None,
        }
    }
}

impl ResolvedConfig {
    pub fn with_workers(mut self, workers: usize) -> Result<Self, QtlError> {
        self.workers = check_workers(workers)?;
        Ok(self)
    }

    pub fn with_relative_depth(mut self, depth: Option<usize>) -> Result<Self, QtlError> {
        self.relative_depth = depth.map(check_depth).transpose()?;
        Ok(self)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    // only an explicitly named file is required to exist
    pub fn resolve(path: Option<&str>) -> Result<Config, QtlError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| QtlError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| QtlError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config, object_store: bool) -> Result<ResolvedConfig, QtlError> {
        let naming = NamingRules::new(
            config
                .study_pattern
                .as_deref()
                .unwrap_or(DEFAULT_STUDY_PATTERN),
            config
                .dataset_pattern
                .as_deref()
                .unwrap_or(DEFAULT_DATASET_PATTERN),
        )?;

        let artifacts = ArtifactLayout {
            credible_sets_suffix: check_suffix(
                config
                    .credible_sets_suffix
                    .unwrap_or_else(|| DEFAULT_CREDIBLE_SETS_SUFFIX.to_string()),
            )?,
            lbf_variable_suffix: check_suffix(
                config
                    .lbf_variable_suffix
                    .unwrap_or_else(|| DEFAULT_LBF_VARIABLE_SUFFIX.to_string()),
            )?,
        };

        let workers = check_workers(config.workers.unwrap_or(DEFAULT_WORKERS))?;
        let relative_depth = match config.relative_depth {
            Some(depth) => Some(check_depth(depth)?),
            None if object_store => None,
            None => Some(LOCAL_RELATIVE_DEPTH),
        };

        Ok(ResolvedConfig {
            naming,
            artifacts,
            workers,
            relative_depth,
        })
    }
}

fn check_workers(workers: usize) -> Result<usize, QtlError> {
    if workers == 0 {
        return Err(QtlError::InvalidConfig(
            "workers must be at least 1".to_string(),
        ));
    }
    Ok(workers)
}

fn check_depth(depth: usize) -> Result<usize, QtlError> {
    if depth == 0 {
        return Err(QtlError::InvalidConfig(
            "relative_depth must be at least 1".to_string(),
        ));
    }
    Ok(depth)
}

fn check_suffix(suffix: String) -> Result<String, QtlError> {
    if suffix.is_empty() || suffix.contains('/') {
        return Err(QtlError::InvalidConfig(format!(
            "artifact suffix '{suffix}' must be a non-empty file name suffix"
        )));
    }
    Ok(suffix)
}
