use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use clap::ValueEnum;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use tracing::info;

use crate::domain::ManifestRecord;
use crate::error::QtlError;
use crate::manifest::{Manifest, ManifestStats};
use crate::resolve::Skip;
use crate::storage::{Storage, write_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Tsv,
    Parquet,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Tsv => write!(f, "tsv"),
            OutputFormat::Parquet => write!(f, "parquet"),
        }
    }
}

pub fn write_manifest(
    storage: &dyn Storage,
    path: &str,
    records: &[ManifestRecord],
    format: OutputFormat,
) -> Result<(), QtlError> {
    info!(path, %format, rows = records.len(), "writing manifest");
    write_with(storage, path, |sink| match format {
        OutputFormat::Tsv => write_tsv(sink, records),
        OutputFormat::Parquet => write_parquet(sink, records),
    })?;
    info!(path, "manifest successfully written");
    Ok(())
}

pub fn write_tsv<W: Write>(writer: W, records: &[ManifestRecord]) -> Result<W, QtlError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_writer(writer);
    if records.is_empty() {
        writer
            .write_record(ManifestRecord::COLUMNS)
            .map_err(|err| QtlError::Output(err.to_string()))?;
    }
    for record in records {
        writer
            .serialize(record)
            .map_err(|err| QtlError::Output(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| QtlError::Output(err.to_string()))
}

pub fn record_batch(records: &[ManifestRecord]) -> Result<RecordBatch, QtlError> {
    let schema = Arc::new(Schema::new(
        ManifestRecord::COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ));
    let columns = vec![
        string_column(records, |record| record.study_id.as_str()),
        string_column(records, |record| record.dataset_id.as_str()),
        string_column(records, |record| record.credible_sets_path.as_str()),
        string_column(records, |record| record.lbf_variable_path.as_str()),
    ];
    RecordBatch::try_new(schema, columns).map_err(|err| QtlError::Output(err.to_string()))
}

fn string_column<F>(records: &[ManifestRecord], select: F) -> ArrayRef
where
    F: Fn(&ManifestRecord) -> &str,
{
    Arc::new(StringArray::from_iter_values(records.iter().map(select)))
}

pub fn write_parquet<W: Write + Send>(
    writer: W,
    records: &[ManifestRecord],
) -> Result<W, QtlError> {
    let batch = record_batch(records)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(writer, batch.schema(), Some(props))
        .map_err(|err| QtlError::Output(err.to_string()))?;
    writer
        .write(&batch)
        .map_err(|err| QtlError::Output(err.to_string()))?;
    writer
        .into_inner()
        .map_err(|err| QtlError::Output(err.to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    pub input: String,
    pub output: String,
    pub format: String,
    #[serde(flatten)]
    pub stats: ManifestStats,
    pub skipped_entries: Vec<Skip>,
}

impl ManifestSummary {
    pub fn new(input: &str, output: &str, format: OutputFormat, manifest: &Manifest) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
            format: format.to_string(),
            stats: manifest.stats(),
            skipped_entries: manifest.skipped().to_vec(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &ManifestSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(study: &str, dataset: &str) -> ManifestRecord {
        ManifestRecord {
            study_id: study.to_string(),
            dataset_id: dataset.to_string(),
            credible_sets_path: format!("{study}/{dataset}/{dataset}.credible_sets.parquet"),
            lbf_variable_path: format!("{study}/{dataset}/{dataset}.lbf_variable.parquet"),
        }
    }

    #[test]
    fn tsv_has_header_and_column_order() {
        let bytes = write_tsv(Vec::new(), &[record("QTS1", "QTD1")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "study_id\tdataset_id\tcredible_sets_path\tlbf_variable_path\n\
             QTS1\tQTD1\tQTS1/QTD1/QTD1.credible_sets.parquet\tQTS1/QTD1/QTD1.lbf_variable.parquet\n"
        );
    }

    #[test]
    fn empty_tsv_still_has_header() {
        let bytes = write_tsv(Vec::new(), &[]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "study_id\tdataset_id\tcredible_sets_path\tlbf_variable_path\n"
        );
    }

    #[test]
    fn record_batch_schema() {
        let batch = record_batch(&[record("QTS1", "QTD1"), record("QTS1", "QTD2")]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let names = batch
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect::<Vec<_>>();
        assert_eq!(names, ManifestRecord::COLUMNS);
    }

    #[test]
    fn parquet_round_trips_rows() {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let records = vec![record("QTS1", "QTD1"), record("QTS2", "QTD5")];
        let file = write_parquet(tempfile::tempfile().unwrap(), &records).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches = reader.collect::<Result<Vec<_>, _>>().unwrap();
        let rows: usize = batches.iter().map(|batch| batch.num_rows()).sum();
        assert_eq!(rows, 2);
        let dataset_ids = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(dataset_ids.value(1), "QTD5");
    }

    #[test]
    fn summary_lists_skipped_entries() {
        use crate::error::NamingError;
        use crate::resolve::SkipReason;

        let manifest = Manifest::new(
            Vec::new(),
            vec![Skip {
                path: "root/bad-name".to_string(),
                reason: SkipReason::InvalidStudyName {
                    error: NamingError::Mismatch {
                        name: "bad-name".to_string(),
                        pattern: "QTS".to_string(),
                    },
                },
            }],
        );
        let summary = ManifestSummary::new("root", "out.tsv", OutputFormat::Tsv, &manifest);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["skipped"], 1);
        assert_eq!(value["ignored"], 0);
        assert_eq!(value["format"], "tsv");
        assert_eq!(value["skipped_entries"][0]["reason"]["kind"], "invalid_study_name");
        assert_eq!(
            value["skipped_entries"][0]["reason"]["error"],
            "name 'bad-name' does not match pattern 'QTS'"
        );
    }
}
