use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_db_validator::app::{ProgressEvent, ProgressSink, RunOptions, Validator};
use kira_db_validator::blast::{INSPECT_TOOL, SystemToolRunner};
use kira_db_validator::config::{ConfigLoader, ResolvedConfig};
use kira_db_validator::discovery::DiscoveryFilter;
use kira_db_validator::domain::{MoleculeType, SequenceRecord};
use kira_db_validator::error::ValidatorError;
use kira_db_validator::output::{JsonOutput, MarkdownOutput};
use kira_db_validator::pipeline::ValidationPipeline;
use kira_db_validator::references::ReferenceLibrary;

#[derive(Parser)]
#[command(name = "kira-dbv")]
#[command(about = "Validate BLAST databases: file completeness, index integrity and search hits")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Discover and validate every database under a root directory")]
    Validate(ValidateArgs),
    #[command(about = "Print the reference queries used for a group")]
    References(ReferencesArgs),
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(long)]
    root: Utf8PathBuf,

    #[arg(long = "group")]
    groups: Vec<String>,

    #[arg(long)]
    release: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    deadline_secs: Option<u64>,

    #[arg(long)]
    blast_bin_dir: Option<PathBuf>,

    #[arg(long, value_name = "GROUP=PATH")]
    sequence_file: Vec<String>,

    #[arg(long)]
    no_file_checks: bool,

    #[arg(long)]
    no_integrity_checks: bool,

    #[arg(long)]
    report_limit: Option<usize>,

    #[arg(long)]
    json: bool,

    #[arg(long)]
    json_out: Option<PathBuf>,

    #[arg(long)]
    markdown_out: Option<PathBuf>,

    #[arg(long)]
    quiet: bool,
}

#[derive(Args)]
struct ReferencesArgs {
    #[arg(long, default_value = "universal")]
    group: String,

    #[arg(long)]
    molecule_type: Option<MoleculeType>,
}

struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<ValidatorError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &ValidatorError) -> u8 {
    match error {
        ValidatorError::RootNotFound(_) => 2,
        ValidatorError::MissingTool(_) | ValidatorError::ToolSpawn { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate(args) => run_validate(args, config),
        Commands::References(args) => run_references(args, config),
    }
}

fn run_validate(args: ValidateArgs, mut config: ResolvedConfig) -> miette::Result<ExitCode> {
    apply_overrides(&args, &mut config)?;

    let runner = SystemToolRunner::new(config.blast_bin_dir.clone());
    let mut required = vec!["blastn", "blastp"];
    if config.pipeline.enable_integrity_checks {
        required.push(INSPECT_TOOL);
    }
    if let Some(missing) = runner.missing_tools(&required).into_iter().next() {
        return Err(ValidatorError::MissingTool(missing).into());
    }

    let library = ReferenceLibrary::builtin().with_overrides(config.custom_sequences.clone());
    let pipeline = ValidationPipeline::new(
        runner,
        Arc::new(library),
        config.search.clone(),
        config.pipeline.clone(),
    );
    let validator = Validator::new(pipeline);
    let options = RunOptions {
        workers: config.workers,
        filter: DiscoveryFilter {
            groups: config.groups.clone(),
            release: config.release.clone(),
        },
        deadline: args.deadline_secs.map(Duration::from_secs),
    };

    let outcome = if args.quiet {
        validator.run(&args.root, &options, &JsonOutput)
    } else {
        validator.run(&args.root, &options, &StderrProgress)
    };
    let report = &outcome.report;

    if let Some(path) = &args.json_out {
        JsonOutput::write_report(report, path)?;
    }
    if let Some(path) = &args.markdown_out {
        MarkdownOutput::write_report(report, config.report_limit, path)?;
    }
    if args.json {
        JsonOutput::print_report(report).into_diagnostic()?;
    } else {
        print!("{}", MarkdownOutput::render(report, config.report_limit));
    }

    if let Some(err) = &outcome.discovery_error {
        eprintln!("{err}");
        return Ok(ExitCode::from(map_exit_code(err)));
    }
    if outcome.no_databases() {
        return Ok(ExitCode::from(2));
    }
    if report.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn apply_overrides(args: &ValidateArgs, config: &mut ResolvedConfig) -> miette::Result<()> {
    if !args.groups.is_empty() {
        config.groups = args.groups.clone();
    }
    if let Some(release) = &args.release {
        config.release = Some(release.clone());
    }
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    if let Some(dir) = &args.blast_bin_dir {
        config.blast_bin_dir = Some(dir.clone());
    }
    if let Some(limit) = args.report_limit {
        config.report_limit = limit;
    }
    if args.no_file_checks {
        config.pipeline.enable_file_checks = false;
    }
    if args.no_integrity_checks {
        config.pipeline.enable_integrity_checks = false;
    }

    let mut overrides = BTreeMap::<String, Vec<SequenceRecord>>::new();
    for spec in &args.sequence_file {
        let (group, path) = spec.split_once('=').ok_or_else(|| {
            ValidatorError::ConfigParse(format!("expected GROUP=PATH, got {spec}"))
        })?;
        let text = std::fs::read_to_string(path)
            .map_err(|_| ValidatorError::ConfigRead(PathBuf::from(path)))?;
        let fallback_id = format!("{}_custom", group.to_ascii_lowercase());
        let record = SequenceRecord::from_fasta(&text, &fallback_id, None)?;
        overrides
            .entry(group.trim().to_ascii_uppercase())
            .or_default()
            .push(record);
    }
    // Command-line files replace config-supplied sequences for the same group.
    for (group, records) in overrides {
        config.replace_custom_sequences(&group, records);
    }
    Ok(())
}

fn run_references(args: ReferencesArgs, config: ResolvedConfig) -> miette::Result<ExitCode> {
    let library = ReferenceLibrary::builtin().with_overrides(config.custom_sequences);
    let types = match args.molecule_type {
        Some(molecule_type) => vec![molecule_type],
        None => vec![MoleculeType::Nucleotide, MoleculeType::Protein],
    };
    for molecule_type in types {
        for record in library.sequences_for(&args.group, molecule_type) {
            print!("{}", record.content);
        }
    }
    Ok(ExitCode::SUCCESS)
}
