use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use seometa_core::{
    BatchOutcome, Config, CronTable, HeadFooterOptions, ImportOptions, MigrationEngine,
    MigrationWorker, Settings, SqliteStorage, StorageBackend, head_footer, import, keys, purge,
    stats,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "seometa", about = "SEO metadata migration tooling")]
struct Cli {
    /// SQLite database holding the content and option stores
    #[arg(long, env = "SEOMETA_DB", default_value = "seometa.db")]
    db: String,
    /// Optional TOML configuration file
    #[arg(long, env = "SEOMETA_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Control the background migration
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Import every post at once (foreground)
    Import {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Posts fetched per page
        #[arg(long)]
        batch: Option<usize>,
    },
    /// Import per-post head/footer code from the header/footer plugin
    HeadFooter {
        #[arg(long)]
        dry_run: bool,
        /// Replace code that is already set locally
        #[arg(long)]
        overwrite: bool,
        /// Delete the foreign keys after copying
        #[arg(long)]
        cleanup: bool,
    },
    /// Print metadata coverage counts
    Recalc,
    /// Print the settings blob as JSON
    ExportSettings,
    /// Delete all stored options and per-post keys
    Purge {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Start (or restart) a background migration
    Start {
        #[arg(long)]
        batch: Option<u32>,
    },
    /// Stop the background migration
    Stop,
    /// Show the migration status line
    Status,
    /// Run one batch now
    Step,
    /// Run the worker until the migration finishes (Ctrl-C to detach)
    Run,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    let storage: Arc<dyn StorageBackend> = Arc::new(
        SqliteStorage::new(&cli.db)
            .await
            .with_context(|| format!("opening {}", cli.db))?,
    );
    tracing::debug!(db = %cli.db, "store opened");

    match cli.command {
        Command::Migrate { action } => migrate(action, storage, config).await,
        Command::Import { dry_run, batch } => {
            let options = ImportOptions {
                dry_run,
                page_size: batch.unwrap_or(config.import.page_size),
            };
            let report = import::import_all(
                &*storage,
                &config.migration,
                &options,
                Some(|p: import::ImportProgress| {
                    if !p.changes.is_empty() {
                        let fields: Vec<&str> = p.changes.iter().map(|c| c.as_str()).collect();
                        println!("Post {}: {}", p.post_id, fields.join(", "));
                    }
                }),
            )
            .await
            .context("one-time import failed")?;
            println!(
                "{} {} of {} scanned posts.{}",
                if report.dry_run { "Would update" } else { "Updated" },
                report.changed_posts(),
                report.scanned,
                if report.settings_updated { " Site options imported." } else { "" },
            );
            Ok(())
        }
        Command::HeadFooter {
            dry_run,
            overwrite,
            cleanup,
        } => {
            let options = HeadFooterOptions {
                dry_run,
                overwrite,
                cleanup,
                page_size: config.import.page_size,
                report_limit: config.import.report_limit,
            };
            let report = head_footer::import_head_footer(&*storage, &config.migration, &options)
                .await
                .context("head/footer import failed")?;
            print!("{report}");
            Ok(())
        }
        Command::Recalc => {
            let coverage = stats::coverage(&*storage, &config.migration).await?;
            println!("{coverage}");
            Ok(())
        }
        Command::ExportSettings => {
            let settings = Settings::load(&*storage).await?;
            println!("{}", settings.to_pretty_json()?);
            Ok(())
        }
        Command::Purge { yes } => {
            if !yes {
                bail!("refusing to purge without --yes");
            }
            let report = purge::purge(&*storage).await?;
            println!(
                "Deleted {} options and {} meta rows.",
                report.options_deleted, report.meta_rows_deleted
            );
            Ok(())
        }
    }
}

async fn migrate(action: MigrateAction, storage: Arc<dyn StorageBackend>, config: Config) -> Result<()> {
    let cron = CronTable::new(storage.clone(), keys::options::CRON);
    let engine = Arc::new(MigrationEngine::new(
        storage,
        Arc::new(cron.clone()),
        config.migration.clone(),
    ));

    match action {
        MigrateAction::Start { batch } => {
            let state = engine
                .start(batch.unwrap_or(config.migration.batch_default))
                .await
                .context("starting migration")?;
            println!("{state}");
        }
        MigrateAction::Stop => {
            let state = engine.stop().await.context("stopping migration")?;
            println!("{state}");
        }
        MigrateAction::Status => {
            let state = engine.state().await?;
            println!("{state}");
            match cron.next_due(engine.hook()).await? {
                Some(at) => println!("Next batch due at {at}."),
                None if state.in_progress => {
                    println!("No batch is scheduled. Run `migrate start` again to resume.")
                }
                None => {}
            }
        }
        MigrateAction::Step => {
            let outcome = engine.run_one_batch().await.context("running batch")?;
            match &outcome {
                BatchOutcome::Skipped => println!("Not running."),
                BatchOutcome::Finished(r) => println!("Finished. {}", r.state),
                BatchOutcome::Continued(r) | BatchOutcome::Stopped(r) | BatchOutcome::Superseded(r) => {
                    println!("Processed {} (modified {}). {}", r.processed, r.modified, r.state)
                }
            }
        }
        MigrateAction::Run => {
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal.cancel();
                }
            });
            let worker = MigrationWorker::new(engine, cron, config.worker.clone());
            let state = worker.run_until_idle(shutdown).await?;
            println!("{state}");
        }
    }
    Ok(())
}
