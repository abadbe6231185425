use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use voice_biomarkers::audio::intake;
use voice_biomarkers::submission::{FeatureSink, JsonFileSink, RecordingMetadata, Submission};
use voice_biomarkers::{AnalysisProfile, AudioSource, BiomarkerPipeline, ExtractorConfig};

/// voice-biomarkers - acoustic biomarker extraction
///
/// Decodes one recording, conditions it, screens its quality and prints the
/// flat feature record as JSON on stdout.
#[derive(Parser, Debug)]
#[command(name = "voice-biomarkers")]
#[command(version)]
#[command(about = "Extract acoustic voice biomarkers from a recording", long_about = None)]
struct Args {
    /// Input recording (wav, mp3, ogg, m4a, webm or flac)
    #[arg(value_name = "INPUT")]
    input_file: PathBuf,

    /// JSON file overriding analysis parameters
    #[arg(long, value_name = "PATH", conflicts_with = "profile")]
    config: Option<PathBuf>,

    /// Named parameter set
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Run analysis branches on separate threads
    #[arg(long)]
    parallel: bool,

    /// Pretty-print the JSON record
    #[arg(long)]
    pretty: bool,

    /// Also write a submission envelope to this path
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Subject identifier for the submission envelope
    #[arg(long, value_name = "ID", requires = "output")]
    subject: Option<String>,

    #[arg(long)]
    age: Option<u32>,

    #[arg(long)]
    gender: Option<String>,

    #[arg(long)]
    language: Option<String>,

    /// Clinical label, e.g. "pd" or "control"
    #[arg(long)]
    label: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Capture path, e.g. "browser" or "upload"
    #[arg(long)]
    source: Option<String>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileArg {
    Clinical,
    Legacy,
}

impl From<ProfileArg> for AnalysisProfile {
    fn from(profile: ProfileArg) -> Self {
        match profile {
            ProfileArg::Clinical => AnalysisProfile::Clinical,
            ProfileArg::Legacy => AnalysisProfile::Legacy,
        }
    }
}

impl Args {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.input_file.is_file(),
            "Input file does not exist or is not a file: {:?}",
            self.input_file
        );
        intake::check_file(&self.input_file)
            .with_context(|| format!("Input rejected: {:?}", self.input_file))?;
        if let Some(output) = &self.output {
            ensure!(
                !output.is_dir(),
                "Output path must be a file, got directory: {:?}",
                output
            );
        }
        Ok(())
    }

    fn extractor_config(&self) -> Result<ExtractorConfig> {
        let config = match self.profile {
            Some(profile) => ExtractorConfig::for_profile(profile.into()),
            None => ExtractorConfig::from_override(self.config.clone())?,
        };
        let parallel = self.parallel || config.parallel_branches;
        Ok(config.with_parallel_branches(parallel))
    }

    fn metadata(&self) -> RecordingMetadata {
        RecordingMetadata {
            age: self.age,
            gender: self.gender.clone(),
            language: self.language.clone(),
            clinical_label: self.label.clone(),
            notes: self.notes.clone(),
            recording_source: self.source.clone(),
        }
    }

    fn subject_id(&self) -> String {
        self.subject.clone().unwrap_or_else(|| {
            self.input_file
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "anonymous".to_string())
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    args.validate()
        .context("Failed to validate command-line arguments")?;

    let config = args
        .extractor_config()
        .context("Failed to load analysis configuration")?;
    let pipeline = BiomarkerPipeline::new(config);
    let record = pipeline
        .extract(&AudioSource::from_path(&args.input_file))
        .with_context(|| format!("Feature extraction failed for {:?}", args.input_file))?;

    let document = if args.pretty {
        serde_json::to_string_pretty(&record)
    } else {
        serde_json::to_string(&record)
    }
    .context("Failed to serialize feature record")?;
    println!("{}", document);

    if let Some(output) = &args.output {
        let submission = Submission::new(args.subject_id(), args.metadata(), record);
        JsonFileSink::new(output)
            .submit(&submission)
            .context("Failed to write submission")?;
        tracing::info!(path = ?output, "submission written");
    }

    Ok(())
}
