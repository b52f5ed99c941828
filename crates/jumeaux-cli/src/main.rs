//! jumeaux
//!
//! Sends the same requests to two endpoints and reports where they differ.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use jumeaux_addons::{Pipeline, StageRegistry};
use jumeaux_challenge::{replay_requests, Challenge};
use jumeaux_config::{
    load_documents, report_key, resolve, resolve_from_report, ConfigDocument, InputSource,
};
use jumeaux_core::{Report, Request, RunConfig};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jumeaux", version, about = "Compare the responses of two API endpoints")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Challenge both endpoints with the requests of the input files
    Run(RunArgs),
    /// Replay the requests of a previous report
    Retry(RetryArgs),
}

#[derive(Debug, Args)]
struct Overrides {
    /// Configuration files, merged in order
    #[arg(short, long = "config")]
    config: Vec<PathBuf>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Report tag, repeatable
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Drop every stage carrying one of these tags
    #[arg(long = "skip-addon-tag")]
    skip_addon_tags: Vec<String>,

    #[arg(long, conflicts_with = "processes")]
    threads: Option<usize>,

    #[arg(long)]
    processes: Option<usize>,

    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Request input files; the configured input_files are used when omitted
    files: Vec<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Debug, Args)]
struct RetryArgs {
    /// Report written by a previous run
    report: PathBuf,

    #[command(flatten)]
    overrides: Overrides,
}

impl Overrides {
    /// Command-line values as the last configuration layer
    fn document(&self, files: &[PathBuf]) -> ConfigDocument {
        ConfigDocument {
            threads: self.threads,
            processes: self.processes,
            max_retries: self.max_retries,
            title: self.title.clone(),
            description: self.description.clone(),
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
            input_files: (!files.is_empty()).then(|| files.to_vec()),
            ..Default::default()
        }
    }

    fn skip_tags(&self) -> BTreeSet<String> {
        self.skip_addon_tags.iter().cloned().collect()
    }
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let report = match cli.command {
        Command::Run(args) => run(args).await?,
        Command::Retry(args) => retry(args).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(args: RunArgs) -> Result<Report> {
    let mut layers =
        load_documents(&args.overrides.config).context("Failed to load configuration")?;
    layers.push(args.overrides.document(&args.files));
    let config = resolve(&layers).context("Failed to resolve configuration")?;

    if config.input_files.is_empty() {
        bail!("no input files given on the command line or in input_files");
    }
    let inputs = config
        .input_files
        .iter()
        .map(InputSource::read)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read input files")?;

    execute(config, &inputs, &args.overrides.skip_tags()).await
}

async fn retry(args: RetryArgs) -> Result<Report> {
    let input = InputSource::read(&args.report).context("Failed to read report")?;
    let previous: Report = serde_json::from_slice(&input.content)
        .with_context(|| format!("Failed to parse report {:?}", args.report))?;

    let mut overrides =
        load_documents(&args.overrides.config).context("Failed to load configuration")?;
    overrides.push(args.overrides.document(&[]));
    let config = resolve_from_report(&previous, &overrides)
        .context("Failed to resolve configuration from report")?;

    info!(previous = %previous.key, trials = previous.trials.len(), "Retrying report");
    let skip_tags = args.overrides.skip_tags();
    let requests = replay_requests(&previous);
    let pipeline = StageRegistry::with_builtins()
        .load(&config.pipeline, &skip_tags)
        .context("Failed to load pipeline")?;
    let key = report_key(&config, std::slice::from_ref(&input));

    challenge(config, pipeline, requests, key, Some(previous.key)).await
}

async fn execute(
    config: RunConfig,
    inputs: &[InputSource],
    skip_tags: &BTreeSet<String>,
) -> Result<Report> {
    let pipeline = StageRegistry::with_builtins()
        .load(&config.pipeline, skip_tags)
        .context("Failed to load pipeline")?;
    let requests = pipeline
        .produce_requests(inputs)
        .context("Failed to read requests")?;
    let key = report_key(&config, inputs);

    challenge(config, pipeline, requests, key, None).await
}

async fn challenge(
    config: RunConfig,
    pipeline: Pipeline,
    requests: Vec<Request>,
    key: String,
    retry_hash: Option<String>,
) -> Result<Report> {
    let challenge = Challenge::new(config, pipeline).context("Failed to build HTTP clients")?;

    tokio::select! {
        report = challenge.run(requests, &key, retry_hash) => Ok(report),
        _ = tokio::signal::ctrl_c() => {
            warn!(key = %key, "Interrupted, no report was produced");
            bail!("interrupted")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments_become_last_layer() {
        let cli = Cli::try_parse_from([
            "jumeaux",
            "run",
            "a.txt",
            "b.txt",
            "--config",
            "base.yml",
            "-c",
            "local.yml",
            "--threads",
            "4",
            "--tag",
            "nightly",
            "--skip-addon-tag",
            "slow",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(
            args.overrides.config,
            vec![PathBuf::from("base.yml"), PathBuf::from("local.yml")]
        );

        let document = args.overrides.document(&args.files);
        assert_eq!(document.threads, Some(4));
        assert_eq!(document.processes, None);
        assert_eq!(document.tags, Some(vec!["nightly".to_string()]));
        assert_eq!(
            document.input_files,
            Some(vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")])
        );
        assert!(args.overrides.skip_tags().contains("slow"));
    }

    #[test]
    fn test_absent_arguments_leave_earlier_layers() {
        let cli = Cli::try_parse_from(["jumeaux", "run"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.overrides.document(&args.files), ConfigDocument::default());
    }

    #[test]
    fn test_threads_and_processes_conflict() {
        let parsed =
            Cli::try_parse_from(["jumeaux", "run", "--threads", "2", "--processes", "2"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_retry_arguments() {
        let cli = Cli::try_parse_from(["jumeaux", "-vv", "retry", "report.json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Retry(args) = cli.command else {
            panic!("expected retry");
        };
        assert_eq!(args.report, PathBuf::from("report.json"));
    }

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(1), "info");
        assert_eq!(default_filter(2), "debug");
        assert_eq!(default_filter(5), "trace");
    }

    #[tokio::test]
    async fn test_run_without_inputs_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("config.yml");
        std::fs::write(
            &config,
            "one:\n  host: http://127.0.0.1:1\nother:\n  host: http://127.0.0.1:1\n\
             pipeline:\n  request_source:\n    name: request_source/plain\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from(["jumeaux", "run", "-c", config.to_str().unwrap()]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let error = run(args).await.unwrap_err();
        assert!(error.to_string().contains("no input files"));
    }
}
