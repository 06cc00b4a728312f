use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use crate::domain::{Dataset, Study, relative_path, trailing_segment};
use crate::error::{NamingError, QtlError};
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Resolved(T),
    Absent(Skip),
}

impl<T> Resolution<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            Resolution::Resolved(value) => Some(value),
            Resolution::Absent(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Resolution::Absent(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skip {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    InvalidStudyName {
        #[serde(serialize_with = "serialize_display")]
        error: NamingError,
    },
    InvalidDatasetName {
        #[serde(serialize_with = "serialize_display")]
        error: NamingError,
    },
    MissingArtifacts {
        dataset_id: String,
        missing: Vec<String>,
    },
}

impl SkipReason {
    pub fn is_stray_entry(&self) -> bool {
        matches!(self, SkipReason::InvalidDatasetName { .. })
    }
}

fn serialize_display<S: serde::Serializer>(
    error: &NamingError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

pub struct Resolver<'a> {
    storage: &'a dyn Storage,
    config: &'a ResolvedConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(storage: &'a dyn Storage, config: &'a ResolvedConfig) -> Self {
        Self { storage, config }
    }

    pub fn resolve_dataset(&self, path: &str) -> Result<Resolution<Dataset>, QtlError> {
        let id = match self.config.naming.validate_dataset(trailing_segment(path)) {
            Ok(id) => id.to_string(),
            Err(error) => {
                debug!(path, %error, "not a dataset directory");
                return Ok(Resolution::Absent(Skip {
                    path: path.to_string(),
                    reason: SkipReason::InvalidDatasetName { error },
                }));
            }
        };

        let artifacts = &self.config.artifacts;
        let credible_sets_path = artifacts.credible_sets_path(path, &id);
        let lbf_variable_path = artifacts.lbf_variable_path(path, &id);

        let mut missing = Vec::new();
        for artifact in [&credible_sets_path, &lbf_variable_path] {
            if !self.storage.exists(artifact)? {
                missing.push(artifact.clone());
            }
        }
        if !missing.is_empty() {
            warn!(
                dataset_id = %id,
                missing = ?missing,
                "dataset is missing required SuSiE files, skipping"
            );
            return Ok(Resolution::Absent(Skip {
                path: path.to_string(),
                reason: SkipReason::MissingArtifacts {
                    dataset_id: id,
                    missing,
                },
            }));
        }

        let (credible_sets_path, lbf_variable_path) = match self.config.relative_depth {
            Some(depth) => (
                relative_path(&credible_sets_path, depth),
                relative_path(&lbf_variable_path, depth),
            ),
            None => (credible_sets_path, lbf_variable_path),
        };
        Ok(Resolution::Resolved(Dataset::new(
            id,
            credible_sets_path,
            lbf_variable_path,
        )))
    }

    pub fn resolve_study(&self, path: &str) -> Result<Study, NamingError> {
        let id = self.config.naming.validate_study(trailing_segment(path))?;
        Ok(Study::new(id.to_string(), path.to_string()))
    }

    /// Absent children are appended to `skipped`, in listing order.
    pub fn populate(&self, study: Study, skipped: &mut Vec<Skip>) -> Result<Study, QtlError> {
        let children = self.storage.list(study.path())?;
        let mut datasets = Vec::with_capacity(children.len());
        for child in &children {
            match self.resolve_dataset(child)? {
                Resolution::Resolved(dataset) => datasets.push(dataset),
                Resolution::Absent(skip) => skipped.push(skip),
            }
        }
        debug!(
            study_id = study.id(),
            datasets = datasets.len(),
            entries = children.len(),
            "populated study"
        );
        Ok(study.with_datasets(datasets))
    }

    pub fn scan_study(&self, path: &str) -> Result<StudyScan, QtlError> {
        let study = match self.resolve_study(path) {
            Ok(study) => study,
            Err(error) => {
                warn!(path, %error, "skipping invalid study path");
                return Ok(StudyScan {
                    study: Resolution::Absent(Skip {
                        path: path.to_string(),
                        reason: SkipReason::InvalidStudyName { error },
                    }),
                    skipped: Vec::new(),
                });
            }
        };
        let mut skipped = Vec::new();
        let study = self.populate(study, &mut skipped)?;
        Ok(StudyScan {
            study: Resolution::Resolved(study),
            skipped,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StudyScan {
    pub study: Resolution<Study>,
    pub skipped: Vec<Skip>,
}
