use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::domain::{ManifestRecord, Study};
use crate::error::QtlError;
use crate::resolve::{Resolution, Resolver, Skip, StudyScan};
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct Manifest {
    studies: Vec<Study>,
    skipped: Vec<Skip>,
    records: Vec<ManifestRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManifestStats {
    pub studies: usize,
    pub datasets: usize,
    pub skipped: usize,
    pub ignored: usize,
}

impl Manifest {
    pub fn new(studies: Vec<Study>, skipped: Vec<Skip>) -> Self {
        let records = Self::flatten(&studies);
        Self {
            studies,
            skipped,
            records,
        }
    }

    // studies first, then datasets, in stored order
    pub fn flatten(studies: &[Study]) -> Vec<ManifestRecord> {
        studies
            .iter()
            .flat_map(|study| {
                study
                    .datasets()
                    .iter()
                    .map(move |dataset| ManifestRecord::from_pair(study, dataset))
            })
            .collect()
    }

    pub fn studies(&self) -> &[Study] {
        &self.studies
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn skipped(&self) -> &[Skip] {
        &self.skipped
    }

    pub fn stats(&self) -> ManifestStats {
        let ignored = self
            .skipped
            .iter()
            .filter(|skip| skip.reason.is_stray_entry())
            .count();
        ManifestStats {
            studies: self.studies.len(),
            datasets: self.records.len(),
            skipped: self.skipped.len() - ignored,
            ignored,
        }
    }

    pub fn log_statistics(&self) {
        let stats = self.stats();
        info!(
            studies = stats.studies,
            datasets = stats.datasets,
            skipped = stats.skipped,
            ignored = stats.ignored,
            "manifest statistics"
        );
        for study in &self.studies {
            info!(
                study_id = study.id(),
                datasets = study.datasets().len(),
                "study"
            );
        }
    }
}

pub struct ManifestBuilder<'a> {
    storage: &'a dyn Storage,
    config: &'a ResolvedConfig,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(storage: &'a dyn Storage, config: &'a ResolvedConfig) -> Self {
        Self { storage, config }
    }

    /// Scans `root` and returns the manifest of every valid study below it.
    ///
    /// Studies are resolved on a pool of `config.workers` threads; the result
    /// follows the root listing order regardless of which study finishes first.
    /// Invalid names and incomplete datasets are skipped. Any backend failure,
    /// starting with the root listing, aborts the build.
    pub fn build(&self, root: &str) -> Result<Manifest, QtlError> {
        let study_paths = self.storage.list(root)?;
        info!(root, entries = study_paths.len(), "listed root");

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|index| format!("qtlformer-scan-{index}"))
            .build()
            .map_err(|err| QtlError::InvalidConfig(format!("worker pool: {err}")))?;

        let resolver = Resolver::new(self.storage, self.config);
        let outcomes: Vec<(usize, Result<StudyScan, QtlError>)> = pool.install(|| {
            study_paths
                .par_iter()
                .enumerate()
                .map(|(index, path)| (index, resolver.scan_study(path)))
                .collect()
        });

        let mut slots: Vec<Option<StudyScan>> = std::iter::repeat_with(|| None)
            .take(study_paths.len())
            .collect();
        for (index, outcome) in outcomes {
            slots[index] = Some(outcome?);
        }

        let mut studies = Vec::new();
        let mut skipped = Vec::new();
        for scan in slots.into_iter().flatten() {
            let StudyScan {
                study,
                skipped: dataset_skips,
            } = scan;
            match study {
                Resolution::Resolved(study) => studies.push(study),
                Resolution::Absent(skip) => skipped.push(skip),
            }
            skipped.extend(dataset_skips);
        }

        Ok(Manifest::new(studies, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Dataset;

    fn study(id: &str, datasets: &[&str]) -> Study {
        Study::new(id.to_string(), format!("root/{id}")).with_datasets(
            datasets
                .iter()
                .map(|dataset| {
                    Dataset::new(
                        dataset.to_string(),
                        format!("{id}/{dataset}/{dataset}.credible_sets.parquet"),
                        format!("{id}/{dataset}/{dataset}.lbf_variable.parquet"),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn flatten_orders_by_study_then_dataset() {
        let studies = vec![study("QTS2", &["QTD9", "QTD3"]), study("QTS1", &["QTD1"])];
        let records = Manifest::flatten(&studies);
        let pairs = records
            .iter()
            .map(|record| (record.study_id.as_str(), record.dataset_id.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![("QTS2", "QTD9"), ("QTS2", "QTD3"), ("QTS1", "QTD1")]
        );
    }

    #[test]
    fn flatten_is_pure() {
        let studies = vec![study("QTS1", &["QTD1", "QTD2"]), study("QTS2", &[])];
        assert_eq!(Manifest::flatten(&studies), Manifest::flatten(&studies));

        let manifest = Manifest::new(studies.clone(), Vec::new());
        assert_eq!(manifest.records(), Manifest::flatten(&studies).as_slice());
    }

    #[test]
    fn empty_study_is_kept_without_rows() {
        let manifest = Manifest::new(vec![study("QTS1", &[])], Vec::new());
        assert_eq!(
            manifest.stats(),
            ManifestStats {
                studies: 1,
                datasets: 0,
                skipped: 0,
                ignored: 0,
            }
        );
        assert!(manifest.records().is_empty());
    }

    #[test]
    fn stray_entries_are_counted_apart_from_skips() {
        use crate::error::NamingError;
        use crate::resolve::SkipReason;

        let stray = |name: &str| Skip {
            path: format!("root/QTS1/{name}"),
            reason: SkipReason::InvalidDatasetName {
                error: NamingError::Mismatch {
                    name: name.to_string(),
                    pattern: "^QTD\\d+$".to_string(),
                },
            },
        };
        let incomplete = Skip {
            path: "root/QTS1/QTD2".to_string(),
            reason: SkipReason::MissingArtifacts {
                dataset_id: "QTD2".to_string(),
                missing: vec!["root/QTS1/QTD2/QTD2.lbf_variable.parquet".to_string()],
            },
        };
        let manifest = Manifest::new(
            vec![study("QTS1", &["QTD1"])],
            vec![stray("_SUCCESS"), incomplete, stray("README.md")],
        );
        let stats = manifest.stats();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.ignored, 2);
        assert_eq!(manifest.skipped().len(), 3);
    }
}
