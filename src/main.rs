use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use funnel_analytics::db;
use funnel_analytics::models::CanonicalStage;
use funnel_analytics::report;
use funnel_analytics::stages::{auto_suggest_mappings, extract_all_stages, StageMapping};
use funnel_analytics::{run_pipeline, DateRange, EngineConfig, Filters};

#[derive(Parser)]
#[command(name = "funnel-analytics")]
#[command(about = "Recruiting funnel analytics and data hygiene reports", long_about = None)]
struct Cli {
    /// Engine configuration (TOML); defaults apply when the file is absent
    #[arg(long, global = true, default_value = "funnel-analytics.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Requisitions,
    Candidates,
    Events,
    Users,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small sample dataset
    Seed,
    /// Import one record kind from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show observed stage labels and their mapping; --apply stores suggestions
    Stages {
        #[arg(long)]
        apply: bool,
    },
    /// Map a raw stage label to a canonical stage
    MapStage { raw: String, stage: String },
    /// Exclude a requisition from true time-to-fill
    Exclude {
        req_id: String,
        #[arg(long)]
        remove: bool,
    },
    /// Generate a metrics report
    #[command(group(
        ArgGroup::new("window")
            .args(["from", "since_days"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
        #[arg(long)]
        since_days: Option<i64>,
        #[arg(long)]
        recruiter: Vec<String>,
        #[arg(long)]
        function: Vec<String>,
        #[arg(long)]
        region: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

const DEFAULT_WINDOW_DAYS: i64 = 90;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let (written, label) = match kind {
                ImportKind::Requisitions => (db::import_requisitions(&pool, &csv).await?, "requisitions"),
                ImportKind::Candidates => (db::import_candidates(&pool, &csv).await?, "candidates"),
                ImportKind::Events => (db::import_events(&pool, &csv).await?, "events"),
                ImportKind::Users => (db::import_users(&pool, &csv).await?, "users"),
            };
            println!("Imported {written} {label} from {}.", csv.display());
        }
        Commands::Stages { apply } => {
            let dataset = db::fetch_dataset(&pool).await?;
            let existing = db::load_stage_mapping(&pool, &dataset).await?;
            let observed = extract_all_stages(&dataset.candidates, &dataset.events);
            let unresolved: Vec<&String> = observed
                .iter()
                .filter(|raw| existing.resolve(raw).is_none())
                .collect();
            let suggestions = auto_suggest_mappings(&unresolved);
            let rebuilt = StageMapping::rebuild(observed, &existing, &dataset.events);

            for raw in &rebuilt.observed {
                match existing.resolve(raw) {
                    Some(stage) => println!("- {raw} → {stage}"),
                    None => {
                        let suggested = suggestions
                            .iter()
                            .find(|s| &s.raw_stage == raw)
                            .and_then(|s| s.suggested);
                        match suggested {
                            Some(stage) => println!("- {raw} → {stage} (suggested)"),
                            None => println!("- {raw} → unmapped"),
                        }
                    }
                }
            }

            if apply {
                let saved = db::save_stage_mapping(&pool, &rebuilt).await?;
                println!("Stored {saved} stage mappings (complete: {}).", rebuilt.is_complete);
            } else if !suggestions.is_empty() {
                println!("Run with --apply to store the suggested mappings.");
            }
        }
        Commands::MapStage { raw, stage } => {
            let stage: CanonicalStage = stage.parse().map_err(anyhow::Error::msg)?;
            let dataset = db::fetch_dataset(&pool).await?;
            let mut mapping = db::load_stage_mapping(&pool, &dataset).await?;
            mapping.set(&raw, stage, &dataset.events);
            db::save_stage_mapping(&pool, &mapping).await?;
            println!("Mapped '{raw}' to {stage} (complete: {}).", mapping.is_complete);
        }
        Commands::Exclude { req_id, remove } => {
            if remove {
                let removed = db::remove_exclusion(&pool, &req_id).await?;
                println!("{req_id}: {}", if removed { "exclusion removed" } else { "was not excluded" });
            } else {
                let added = db::add_exclusion(&pool, &req_id).await?;
                println!("{req_id}: {}", if added { "excluded from true TTF" } else { "already excluded" });
            }
        }
        Commands::Report {
            from,
            to,
            since_days,
            recruiter,
            function,
            region,
            format,
            out,
        } => {
            let as_of = Utc::now();
            let date_range = match from {
                Some(from) => DateRange::new(from, to.unwrap_or_else(|| as_of.date_naive())),
                None => DateRange::trailing(as_of, since_days.unwrap_or(DEFAULT_WINDOW_DAYS)),
            };
            let filters = Filters {
                date_range: Some(date_range),
                recruiter_ids: recruiter.into_iter().collect(),
                functions: function.into_iter().collect(),
                regions: region.into_iter().collect(),
            };

            let mut config = EngineConfig::load(&cli.config)?;
            let dataset = db::fetch_dataset(&pool).await?;
            config.stage_mapping = db::load_stage_mapping(&pool, &dataset).await?;
            let stored: BTreeSet<String> = db::load_exclusions(&pool).await?;
            config.exclusions.excluded_req_ids.extend(stored);

            let metrics = run_pipeline(&dataset, &filters, &config, as_of);
            let rendered = match format {
                OutputFormat::Markdown => report::build_report(&metrics),
                OutputFormat::Json => {
                    serde_json::to_string_pretty(&metrics).context("failed to serialize metrics")?
                }
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "report written");
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
    }

    Ok(())
}
