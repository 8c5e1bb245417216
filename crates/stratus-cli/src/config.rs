use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::LazyLock;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown");
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "stratus")]
#[command(
    author,
    version = version_info(),
    about = "Idempotent batched upserts of keyed records into a document store"
)]
#[command(after_help = "Examples:
  stratus migrate
  stratus ingest --input anomalies.jsonl
  stratus ingest --config ~/jobs/invoices.toml --input exports/ --prune
  stratus check

Job files live in ~/.config/stratus/job.toml by default. Environment
variables such as STORE_COLLECTION or MAX_BATCH_SIZE override their values.")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Custom path to the job configuration file
    #[arg(short, long, global = true, env = "STRATUS_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the job file.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read records and upsert them into the configured collection
    #[command(after_help = "Examples:
  stratus ingest --input anomalies.jsonl     # One file, one unit
  stratus ingest --input exports/            # Every .jsonl file in the directory
  stratus ingest --prune                     # Delete documents not seen in this run
  stratus ingest --fail-on-errors            # Exit non-zero if any record failed")]
    Ingest {
        /// A .jsonl file or a directory of them (overrides source.path)
        #[arg(short, long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Delete documents whose keys were not produced by this run
        #[arg(long)]
        prune: bool,

        /// Do not write the run metadata document
        #[arg(long)]
        no_metadata: bool,

        /// Exit with an error when any unit or record failed
        #[arg(long)]
        fail_on_errors: bool,
    },
    /// Create the documents table if it does not exist
    Migrate,
    /// Validate the job file and check database connectivity
    Check,
}
