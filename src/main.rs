//! # Topic Readiness CLI (`trs`)
//!
//! ```bash
//! trs --config ./config/trs.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trs init` | Create the SQLite database and run schema migrations |
//! | `trs sources` | List literature sources and whether they are enabled |
//! | `trs stats` | Corpus and topic counts |
//! | `trs ingest "<query>"` | Search sources and store the results |
//! | `trs score "<topic>"` | Compute a readiness score |
//! | `trs catalogue add/list` | Manage the procedure catalogue |
//! | `trs topic ...` | Propose, approve, reject, defer, edit and delete topics |
//! | `trs learn <id>` | Run learning iterations until ready or stagnated |
//! | `trs learn-batch <id>...` | Learn several topics concurrently |
//! | `trs embed pending/rebuild` | Backfill or regenerate chunk vectors |
//!
//! Logs go to stderr and follow `RUST_LOG`; results go to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use topic_readiness::app::App;
use topic_readiness::config::{self, Config};
use topic_readiness::driver::{run_until_terminal, trigger_learning};
use topic_readiness::jobs::JobRegistry;
use topic_readiness::models::{TopicRecord, TopicStatus};
use topic_readiness::{embed_cmd, ingest, migrate, sources, stats, topics};
use topic_readiness_core::models::CatalogueEntry;
use topic_readiness_core::readiness::ReadinessReport;

/// Topic Readiness: score how well a corpus supports a topic, and grow the
/// corpus until it is ready.
#[derive(Parser)]
#[command(name = "trs", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/trs.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List literature sources and their status.
    Sources,

    /// Show corpus and topic counts.
    Stats,

    /// Search literature sources and store the results.
    Ingest {
        query: String,

        /// Only search this source (`pubmed`, `semantic_scholar`).
        #[arg(long)]
        source: Option<String>,

        /// Show record and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Compute the readiness score of a topic.
    ///
    /// With `--topic-id` the stored topic is scored against its saved state
    /// and the new state is persisted. Otherwise the text is scored from
    /// scratch and nothing is written.
    Score {
        #[arg(required_unless_present = "topic_id")]
        topic: Option<String>,

        #[arg(long, conflicts_with = "topic")]
        topic_id: Option<String>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage the procedure catalogue.
    Catalogue {
        #[command(subcommand)]
        action: CatalogueAction,
    },

    /// Manage topics.
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },

    /// Iterate a topic until it is ready or stagnated.
    Learn {
        id: String,

        /// Run a single iteration.
        #[arg(long)]
        once: bool,

        /// Start a fresh learning run first (manual trigger).
        #[arg(long, conflicts_with = "once")]
        reset: bool,
    },

    /// Learn several topics concurrently and print the job record.
    LearnBatch {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

#[derive(Subcommand)]
enum CatalogueAction {
    /// Add or replace an entry.
    Add {
        name: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    List,
}

#[derive(Subcommand)]
enum TopicAction {
    /// Propose a new topic.
    Add {
        title: String,
        #[arg(long = "query")]
        queries: Vec<String>,
    },
    List {
        #[arg(long)]
        status: Option<TopicStatus>,
    },
    /// Print a topic record as JSON.
    Show { id: String },
    /// Approve a topic. Goes straight to `ready` if the corpus already suffices.
    Approve { id: String },
    Reject { id: String },
    /// Send a topic back to `proposed`.
    Defer { id: String },
    Delete { id: String },
    /// Replace the base search queries.
    Queries {
        id: String,
        #[arg(long = "query", required = true)]
        queries: Vec<String>,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that have no vector yet.
    Pending {
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Delete and regenerate all vectors.
    Rebuild {
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    })
}

fn init_tracing(verbose: bool) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(build_env_filter(verbose))
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Ingest {
            query,
            source,
            dry_run,
        } => {
            ingest::run_ingest(&cfg, source.as_deref(), &query, dry_run).await?;
        }
        Commands::Score {
            topic,
            topic_id,
            json,
        } => {
            run_score(&cfg, topic, topic_id, json).await?;
        }
        Commands::Catalogue { action } => {
            run_catalogue(&cfg, action).await?;
        }
        Commands::Topic { action } => {
            run_topic(&cfg, action).await?;
        }
        Commands::Learn { id, once, reset } => {
            let app = App::open(&cfg).await?;
            let controller = app.controller.clone();
            let out = if once {
                serde_json::to_string_pretty(&controller.run_one_iteration(&id).await?)?
            } else if reset {
                serde_json::to_string_pretty(&trigger_learning(&controller, &id).await?)?
            } else {
                serde_json::to_string_pretty(&run_until_terminal(&controller, &id).await?)?
            };
            println!("{}", out);
            app.close().await;
        }
        Commands::LearnBatch { ids } => {
            let app = App::open(&cfg).await?;
            let jobs = JobRegistry::new(app.controller.clone());
            if let Some(record) = jobs.run(ids).await {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            app.close().await;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
    }

    Ok(())
}

async fn run_score(
    cfg: &Config,
    topic: Option<String>,
    topic_id: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let app = App::open(cfg).await?;
    let report = match (topic_id, topic) {
        (Some(id), _) => app.controller.score_topic(&id).await?,
        (None, Some(text)) => app.controller.compute(&text, None).await,
        (None, None) => anyhow::bail!("Provide a topic or --topic-id"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    app.close().await;
    Ok(())
}

fn print_report(report: &ReadinessReport) {
    let d = &report.details;
    println!("Topic: {}", report.topic);
    println!("Score: {:.1} ({})", report.score, report.status);
    println!("Ready for generation: {}", report.ready_for_generation);
    println!();
    println!("  {:<12} {:>5} {:>5}  DETAIL", "DIMENSION", "SCORE", "MAX");
    println!(
        "  {:<12} {:>5} {:>5}  {} documents",
        "documents", d.documents.score, d.documents.max, d.documents.count
    );
    println!(
        "  {:<12} {:>5} {:>5}  {} chunks",
        "chunks", d.chunks.score, d.chunks.max, d.chunks.count
    );
    println!(
        "  {:<12} {:>5} {:>5}  {}",
        "diversity",
        d.diversity.score,
        d.diversity.max,
        serde_json::to_string(&d.diversity.flags).unwrap_or_default()
    );
    println!(
        "  {:<12} {:>5} {:>5}  {} recent chunks",
        "recency", d.recency.score, d.recency.max, d.recency.count
    );
    println!(
        "  {:<12} {:>5} {:>5}  {}",
        "coverage",
        d.coverage.score,
        d.coverage.max,
        serde_json::to_string(&d.coverage.flags).unwrap_or_default()
    );
    println!(
        "  {:<12} {:>5} {:>5}  match: {}",
        "atlas", d.atlas.score, d.atlas.max, d.atlas.match_found
    );
    if !report.degraded.is_empty() {
        println!();
        println!("Degraded: {}", report.degraded.join("; "));
    }
}

async fn run_catalogue(cfg: &Config, action: CatalogueAction) -> anyhow::Result<()> {
    let app = App::open(cfg).await?;
    match action {
        CatalogueAction::Add { name, tags } => {
            app.catalogue.add(&CatalogueEntry::new(name.clone(), tags)).await?;
            println!("Added catalogue entry: {}", name);
        }
        CatalogueAction::List => {
            let entries = app.catalogue.list().await?;
            if entries.is_empty() {
                println!("No catalogue entries.");
            }
            for entry in entries {
                if entry.tags.is_empty() {
                    println!("{}", entry.name);
                } else {
                    println!("{}  [{}]", entry.name, entry.tags.join(", "));
                }
            }
        }
    }
    app.close().await;
    Ok(())
}

async fn run_topic(cfg: &Config, action: TopicAction) -> anyhow::Result<()> {
    let app = App::open(cfg).await?;
    let store = app.topics();

    match action {
        TopicAction::Add { title, queries } => {
            let topic = topics::create_topic(store, &title, queries).await?;
            println!("{}", topic.id);
        }
        TopicAction::List { status } => {
            let list = store.list(status).await?;
            if list.is_empty() {
                println!("No topics.");
            } else {
                println!("{:<36}  {:<10} {:>6} {:>5}  TITLE", "ID", "STATUS", "SCORE", "ITER");
                for t in &list {
                    println!(
                        "{:<36}  {:<10} {:>6.1} {:>5}  {}",
                        t.id, t.status, t.score, t.iteration_count, t.title
                    );
                }
            }
        }
        TopicAction::Show { id } => {
            let topic = topics::load_topic(store, &id).await?;
            println!("{}", serde_json::to_string_pretty(&topic)?);
        }
        TopicAction::Approve { id } => {
            let topic = app.controller.approve_topic(&id).await?;
            print_transition(&topic);
        }
        TopicAction::Reject { id } => {
            print_transition(&app.controller.reject_topic(&id).await?);
        }
        TopicAction::Defer { id } => {
            print_transition(&app.controller.defer_topic(&id).await?);
        }
        TopicAction::Delete { id } => {
            app.controller.delete_topic(&id).await?;
            println!("Deleted topic {}", id);
        }
        TopicAction::Queries { id, queries } => {
            let topic = app.controller.update_queries(&id, queries).await?;
            for q in &topic.search_queries {
                println!("{}", q);
            }
        }
    }

    app.close().await;
    Ok(())
}

fn print_transition(topic: &TopicRecord) {
    println!("{} -> {} (score {:.1})", topic.id, topic.status, topic.score);
}
