//! Command-line interface
//!
//! Two subcommands: `extract` pulls a template out of an instance,
//! `apply` pushes one into an instance. Both share the connection and
//! category-selection arguments. Stage failures are reported and leave
//! the exit code at zero; only fatal errors (bad arguments, failed
//! authentication, unusable template directory) exit non-zero.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::warn;

use crate::api::{DirectusClient, ResilienceConfig};
use crate::auth::{Credentials, TokenCache};
use crate::engine::flags::{self, RawFlags};
use crate::engine::report::{RunLog, RunReport, StageOutcome};
use crate::engine::{Extractor, Loader};
use crate::template::TemplateStore;

#[derive(Parser)]
#[command(
    name = "template-cli",
    version,
    about = "Transfer Directus project templates between instances"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a template from an instance into a directory
    Extract(ExtractArgs),
    /// Apply a template directory to an instance
    Apply(TransferArgs),
}

#[derive(Args)]
struct ExtractArgs {
    #[command(flatten)]
    common: TransferArgs,

    /// Template name written into package.json
    #[arg(long, default_value = "directus-template")]
    name: String,
}

#[derive(Args)]
struct TransferArgs {
    /// Instance base URL, e.g. http://localhost:8055
    #[arg(long)]
    url: String,

    /// Static API token (wins over email/password)
    #[arg(long)]
    token: Option<String>,

    /// Admin email for session login
    #[arg(long)]
    email: Option<String>,

    /// Admin password for session login
    #[arg(long)]
    password: Option<String>,

    /// Template directory
    #[arg(long, default_value = "template")]
    dir: PathBuf,

    /// Interpret the category flags below as a selection instead of
    /// transferring everything
    #[arg(long)]
    partial: bool,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    schema: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    permissions: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    users: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    files: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    content: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    flows: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    dashboards: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    settings: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    extensions: Option<bool>,
}

impl TransferArgs {
    fn raw_flags(&self) -> RawFlags {
        RawFlags {
            partial: self.partial,
            schema: self.schema,
            permissions: self.permissions,
            users: self.users,
            files: self.files,
            content: self.content,
            flows: self.flows,
            dashboards: self.dashboards,
            settings: self.settings,
            extensions: self.extensions,
        }
    }

    /// Build an authenticated client for this instance
    async fn connect(&self) -> Result<DirectusClient> {
        let client = DirectusClient::new(&self.url, ResilienceConfig::default())?;
        let credentials = Credentials::from_args(
            self.token.clone(),
            self.email.clone(),
            self.password.clone(),
        )?;

        let mut cache = TokenCache::load();
        credentials.apply(&client, &mut cache).await?;
        cache.save();
        Ok(client)
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Extract(args) => extract(args).await,
        Command::Apply(args) => apply(args).await,
    }
}

async fn extract(args: ExtractArgs) -> Result<()> {
    let resolved = flags::resolve(&args.common.raw_flags())?;
    for warning in &resolved.warnings {
        warn!("{}", warning);
    }

    let client = args.common.connect().await?;
    let store = TemplateStore::new(&args.common.dir);
    let log = RunLog::create(std::path::Path::new("."))?;

    let report = Extractor::new(&client, &store, &resolved.set, &log)
        .run(&args.name)
        .await?;
    render(&report, &log);
    Ok(())
}

async fn apply(args: TransferArgs) -> Result<()> {
    let resolved = flags::resolve(&args.raw_flags())?;
    for warning in &resolved.warnings {
        warn!("{}", warning);
    }

    let store = TemplateStore::new(&args.dir);
    let client = args.connect().await?;
    let log = RunLog::create(std::path::Path::new("."))?;

    let report = Loader::new(&client, &store, &resolved.set, &log)
        .run()
        .await?;
    render(&report, &log);
    Ok(())
}

fn render(report: &RunReport, log: &RunLog) {
    for stage in &report.stages {
        let line = match &stage.outcome {
            StageOutcome::Ok => format!("  ok      {}", stage.name),
            StageOutcome::Skipped(reason) => format!("  skipped {} ({})", stage.name, reason),
            StageOutcome::Failed(reason) => format!("  FAILED  {} ({})", stage.name, reason),
        };
        println!("{}", line);
    }

    if report.has_failures() {
        println!(
            "\n{} stage(s) failed; details in {}",
            report.failed_stages().len(),
            log.path().display()
        );
    } else {
        println!("\nAll stages completed; log at {}", log.path().display());
    }
}
