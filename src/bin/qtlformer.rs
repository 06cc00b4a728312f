use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use qtlformer::config::ConfigLoader;
use qtlformer::error::QtlError;
use qtlformer::manifest::ManifestBuilder;
use qtlformer::output::{JsonOutput, ManifestSummary, OutputFormat, write_manifest};
use qtlformer::storage::{GcsOptions, Location, open_storage};

#[derive(Parser)]
#[command(name = "qtlformer")]
#[command(about = "QTL manifest preparation tool")]
#[command(version, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Prepare a QTL manifest from a study tree and write it to OUTPUT_PATH")]
    Manifest(ManifestArgs),
    #[command(about = "Harmonise SuSiE QTL data into study loci")]
    SusieToStudyLocus(SusieArgs),
    #[command(about = "Convert a QTL manifest to a study index")]
    ManifestToStudyIndex(StudyIndexArgs),
}

#[derive(Args)]
struct ManifestArgs {
    /// Root holding one directory per study (local path or gs://bucket/prefix)
    input_path: String,

    /// Destination of the manifest (local path or gs://bucket/object)
    output_path: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
    format: OutputFormat,

    /// JSON config file (defaults to ./qtlformer.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Studies resolved in parallel
    #[arg(long)]
    workers: Option<usize>,

    /// Keep only this many trailing segments of artifact paths
    #[arg(long)]
    relative_depth: Option<usize>,

    #[command(flatten)]
    storage: StorageArgs,

    /// Print a JSON summary to stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SusieArgs {
    susie_path: String,
    study_locus_path: String,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args)]
struct StudyIndexArgs {
    manifest_path: String,
    metadata_path: String,
    study_index_path: String,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args)]
struct StorageArgs {
    /// Project billed for object-store requests
    #[arg(long)]
    project_id: Option<String>,
}

impl StorageArgs {
    fn gcs_options(&self) -> Result<GcsOptions, QtlError> {
        let mut options = GcsOptions::from_env();
        if let Some(project) = &self.project_id {
            if project.trim().is_empty() {
                return Err(QtlError::InvalidConfig(
                    "project id must be provided".to_string(),
                ));
            }
            options.project_id = Some(project.trim().to_string());
        }
        Ok(options)
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<QtlError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &QtlError) -> u8 {
    match error {
        QtlError::InvalidLocation(_)
        | QtlError::InvalidPattern { .. }
        | QtlError::InvalidConfig(_)
        | QtlError::ConfigRead(_)
        | QtlError::ConfigParse(_)
        | QtlError::Naming(_) => 2,
        QtlError::StorageHttp(_) | QtlError::StorageStatus { .. } | QtlError::Filesystem(_) => 3,
        QtlError::Output(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Manifest(args) => run_manifest(args).map_err(miette::Report::new),
        Commands::SusieToStudyLocus(args) => run_susie(args).map_err(miette::Report::new),
        Commands::ManifestToStudyIndex(args) => {
            run_study_index(args).map_err(miette::Report::new)
        }
    }
}

fn run_manifest(args: ManifestArgs) -> Result<(), QtlError> {
    info!("starting QTL manifest preparation");
    let input = Location::parse(&args.input_path)?;
    let output = Location::parse(&args.output_path)?;
    let gcs = args.storage.gcs_options()?;

    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let mut resolved = ConfigLoader::resolve_config(config, input.is_object_store())?;
    if let Some(workers) = args.workers {
        resolved = resolved.with_workers(workers)?;
    }
    if let Some(depth) = args.relative_depth {
        resolved = resolved.with_relative_depth(Some(depth))?;
    }

    let source = open_storage(&input, &gcs)?;
    let manifest = ManifestBuilder::new(source.as_ref(), &resolved).build(&input.to_string())?;
    manifest.log_statistics();

    let sink = open_storage(&output, &gcs)?;
    write_manifest(
        sink.as_ref(),
        &output.to_string(),
        manifest.records(),
        args.format,
    )?;

    if args.json {
        let summary = ManifestSummary::new(
            &input.to_string(),
            &output.to_string(),
            args.format,
            &manifest,
        );
        JsonOutput::print_summary(&summary).map_err(|err| QtlError::Output(err.to_string()))?;
    }
    Ok(())
}

fn run_susie(args: SusieArgs) -> Result<(), QtlError> {
    Location::parse(&args.susie_path)?;
    Location::parse(&args.study_locus_path)?;
    args.storage.gcs_options()?;
    info!("starting SuSiE QTL harmonisation");
    Ok(())
}

fn run_study_index(args: StudyIndexArgs) -> Result<(), QtlError> {
    Location::parse(&args.manifest_path)?;
    Location::parse(&args.study_index_path)?;
    if args.metadata_path.trim().is_empty() {
        return Err(QtlError::InvalidLocation(
            "metadata path must be a non-empty string".to_string(),
        ));
    }
    args.storage.gcs_options()?;
    info!("starting QTL manifest to study index conversion");
    Ok(())
}
