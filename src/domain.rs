use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    id: String,
    credible_sets_path: String,
    lbf_variable_path: String,
}

impl Dataset {
    pub(crate) fn new(id: String, credible_sets_path: String, lbf_variable_path: String) -> Self {
        Self {
            id,
            credible_sets_path,
            lbf_variable_path,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn credible_sets_path(&self) -> &str {
        &self.credible_sets_path
    }

    pub fn lbf_variable_path(&self) -> &str {
        &self.lbf_variable_path
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Study {
    id: String,
    path: String,
    datasets: Vec<Dataset>,
}

impl Study {
    pub(crate) fn new(id: String, path: String) -> Self {
        Self {
            id,
            path,
            datasets: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub(crate) fn with_datasets(mut self, datasets: Vec<Dataset>) -> Self {
        self.datasets = datasets;
        self
    }
}

/// One manifest row. Field order is the column order of every rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestRecord {
    pub study_id: String,
    pub dataset_id: String,
    pub credible_sets_path: String,
    pub lbf_variable_path: String,
}

impl ManifestRecord {
    pub const COLUMNS: [&'static str; 4] = [
        "study_id",
        "dataset_id",
        "credible_sets_path",
        "lbf_variable_path",
    ];

    pub fn from_pair(study: &Study, dataset: &Dataset) -> Self {
        Self {
            study_id: study.id.clone(),
            dataset_id: dataset.id.clone(),
            credible_sets_path: dataset.credible_sets_path.clone(),
            lbf_variable_path: dataset.lbf_variable_path.clone(),
        }
    }
}

pub fn trailing_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

pub fn relative_path(path: &str, depth: usize) -> String {
    let segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    let start = segments.len().saturating_sub(depth);
    segments[start..].join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_segment_of_paths() {
        assert_eq!(trailing_segment("gs://bucket/QTS1/QTD2"), "QTD2");
        assert_eq!(trailing_segment("/data/QTS1/"), "QTS1");
        assert_eq!(trailing_segment("QTS1"), "QTS1");
        assert_eq!(trailing_segment(""), "");
    }

    #[test]
    fn relative_path_keeps_suffix() {
        assert_eq!(
            relative_path("/mnt/data/QTS1/QTD1/QTD1.credible_sets.parquet", 3),
            "QTS1/QTD1/QTD1.credible_sets.parquet"
        );
        assert_eq!(relative_path("QTD1/a.parquet", 3), "QTD1/a.parquet");
        assert_eq!(relative_path("/a/b/c/d", 1), "d");
    }
}
