use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stratus_cli::{Command, Config};
use stratus_core::{
    CollectionSideTable, DbConfig, Enricher, IngestConfig, IngestService, IngestSummary,
    JobConfig, JsonLinesSource, TracingReporter, UpsertEngine, load_job_config,
};
use stratus_db::DocumentRepository;

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::parse();

    // The job file may set the log level, so it is loaded before logging starts.
    let job = match config.command {
        Command::Ingest { .. } | Command::Check => Some(load_job(&config)?),
        Command::Migrate => None,
    };
    let level = config
        .log_level
        .as_deref()
        .or(job.as_ref().map(|j| j.log_level.as_str()))
        .unwrap_or(DEFAULT_LOG_LEVEL);
    init_tracing(level)?;

    info!("Connecting to database...");
    let db_config = DbConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let database = job
        .as_ref()
        .map(|j| j.store.database.clone())
        .unwrap_or_else(|| stratus_db::DEFAULT_DATABASE.to_string());
    let repo = DocumentRepository::new(pool, database);

    match (config.command, job) {
        (Command::Migrate, _) => {
            repo.migrate().await.map_err(|e| anyhow!(e.user_message()))?;
            info!("Schema is up to date");
        }
        (Command::Check, Some(job)) => {
            check(&repo, &job).await?;
        }
        (
            Command::Ingest {
                input,
                prune,
                no_metadata,
                fail_on_errors,
            },
            Some(job),
        ) => {
            let input = resolve_input(input, job.source.path.clone())?;
            let mut ingest_config = IngestConfig::from(&job);
            if prune {
                ingest_config.prune_stale = true;
            }
            if no_metadata {
                ingest_config.write_metadata = false;
            }

            let summary = ingest(&repo, &job, input, ingest_config).await?;
            print_ingest_summary(job.store.collection.as_str(), &summary);
            exit_status(&summary, fail_on_errors)?;
        }
        (_, None) => unreachable!("job config is loaded for ingest and check"),
    }

    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    // RUST_LOG, when set and valid, wins over the configured level.
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level '{}'", level))?,
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set the default tracing subscriber")
}

/// Loads the job file, applies environment overrides and validates it.
fn load_job(config: &Config) -> anyhow::Result<JobConfig> {
    let mut job = load_job_config(config.config.clone())
        .map_err(|e| anyhow!(e.user_message()))?;
    job.apply_env_overrides()
        .map_err(|e| anyhow!(e.user_message()))?;
    job.validate().map_err(|e| anyhow!(e.user_message()))?;
    Ok(job)
}

/// Picks the input path: `--input` wins over `source.path`.
fn resolve_input(cli: Option<PathBuf>, job: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    cli.or(job).ok_or_else(|| {
        anyhow!("No input given. Use --input <PATH> or set source.path in the job file")
    })
}

async fn ingest(
    repo: &DocumentRepository,
    job: &JobConfig,
    input: PathBuf,
    ingest_config: IngestConfig,
) -> anyhow::Result<IngestSummary> {
    repo.health_check()
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    let engine = UpsertEngine::with_config(
        repo.clone(),
        job.store.upsert_config(),
        job.store.retry_policy(),
    );

    let side_table = CollectionSideTable::new(
        repo.with_database(job.enrichment_database()),
        job.enrichment.collection.clone().unwrap_or_default(),
    );
    let enricher = Enricher::new(
        side_table,
        job.enrichment.join_field.clone(),
        job.enrichment.fields.clone(),
    );

    info!("Reading records from {}", input.display());
    let source = JsonLinesSource::new(input, job.key.clone());
    let service = IngestService::with_config(engine, source, enricher, ingest_config);

    info!("═══════════════════════════════════════════════════════");
    info!(
        "Ingesting into {}/{}",
        job.store.database, job.store.collection
    );
    info!("═══════════════════════════════════════════════════════");

    Ok(service.run_with_progress(&TracingReporter).await)
}

async fn check(repo: &DocumentRepository, job: &JobConfig) -> anyhow::Result<()> {
    repo.health_check()
        .await
        .map_err(|e| anyhow!(e.user_message()))?;
    info!("Database connection OK");

    let documents = repo
        .count(&job.store.collection)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    info!("Job configuration OK");
    info!("  Collection:          {}/{}", job.store.database, job.store.collection);
    info!("  Documents:           {}", documents);
    info!("  Key fields:          {}", job.key.fields.join(", "));
    info!("  Batch size:          {}", job.store.max_batch_size);
    info!("  Attempts per batch:  {}", job.store.max_retries);
    if job.enrichment.is_enabled() {
        info!(
            "  Enrichment:          {} from {}",
            job.enrichment.fields.join(", "),
            job.enrichment.collection.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Print a summary of the ingest run.
fn print_ingest_summary(collection: &str, summary: &IngestSummary) {
    info!("");
    info!("═══════════════════════════════════════════════════════");
    info!("INGEST COMPLETE: {}", collection);
    info!("═══════════════════════════════════════════════════════");
    info!("  Units processed:     {}", summary.total_units());
    info!("  Successful:          {}", summary.successful_count());
    info!("  Failed:              {}", summary.failed_count());
    info!("  Records fetched:     {}", summary.total_fetched());
    info!("─────────────────────────────────────────────────────────");
    info!("  ✓ Saved:             {}", summary.totals.saved);
    info!("  ✗ Errors:            {}", summary.totals.errors);
    if let Some(pruned) = &summary.pruned {
        info!("  - Pruned:            {}", pruned.saved);
    }
    info!("  Metadata written:    {}", summary.metadata_written);

    if summary.failed_count() > 0 {
        info!("─────────────────────────────────────────────────────────");
        info!("Failed units:");
        for result in summary.results.iter().filter(|r| !r.is_success()) {
            if let Some(err) = &result.error {
                error!("  - {}: {}", result.unit, err);
            }
        }
    }
    info!("═══════════════════════════════════════════════════════");

    if summary.is_clean() {
        info!("All records saved successfully!");
    }
}

/// Maps the summary onto the process outcome.
fn exit_status(summary: &IngestSummary, fail_on_errors: bool) -> anyhow::Result<()> {
    if let Some(err) = &summary.source_error {
        bail!("Could not list input units: {}", err);
    }
    if !summary.is_clean() {
        if fail_on_errors {
            bail!(
                "{} unit(s) failed and {} record(s) were not saved",
                summary.failed_count(),
                summary.totals.errors
            );
        }
        warn!("Run finished with errors; re-run to retry failed records");
    }
    Ok(())
}
