use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitestack::config::StackConfig;
use sitestack::db::Database;
use sitestack::engine::{Engine, RefreshChange};
use sitestack::models::ResourceKind;
use sitestack::provider::{Providers, SimulatedCloud, SwagProvider};
use sitestack::{policy, render, stack};

#[derive(Parser)]
#[command(name = "sitestack")]
#[command(about = "Declarative hosting stack for a static website")]
struct Cli {
    /// Config file (default: ./sitestack.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State database (default: the user data directory)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what `up` would change
    Preview,
    /// Create or update the stack
    Up,
    /// Re-read recorded resources from their providers
    Refresh,
    /// Print the recorded stack outputs as JSON
    Outputs,
    /// Delete every recorded resource
    Destroy,
    /// Print the public-read policy document for a bucket
    Policy {
        /// Bucket name
        bucket: String,
    },
}

/// Logs go to stderr so stdout only carries command output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "sitestack=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_state(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    tracing::debug!(version = ?db.schema_version()?, "State store ready");
    Ok(db)
}

fn build_engine(db: Database, config: &StackConfig) -> Engine {
    let mut providers = Providers::new().with_cloud(Arc::new(SimulatedCloud::default()));
    if let Some(url) = &config.webhook_url {
        providers = providers.register(ResourceKind::SwagRequest, Arc::new(SwagProvider::new(url)));
    }
    Engine::new(db, providers)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Policy { bucket } = &cli.command {
        println!("{}", policy::public_read_policy(bucket));
        return Ok(());
    }

    let config = StackConfig::load(cli.config.as_deref())?.with_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    tracing::debug!(stack = %config.stack, site = %config.site_name, "Loaded configuration");

    let db = open_state(cli.state)?;
    let engine = build_engine(db, &config);

    match cli.command {
        Commands::Preview => {
            let decl = stack::build_stack(&config)?;
            let plan = engine.preview(&decl)?;
            print!("{}", render::render_plan(&plan));
        }
        Commands::Up => {
            let decl = stack::build_stack(&config)?;
            let report = engine.apply(&decl).await?;
            print!("{}", render::render_report(&report));
            if !report.exports.is_empty() {
                println!();
                print!("{}", render::render_exports(&report.exports));
            }
            if !report.is_success() {
                anyhow::bail!(
                    "Apply of stack '{}' finished with {} failed and {} skipped resources",
                    report.stack,
                    report.failed().len(),
                    report.skipped().len()
                );
            }
        }
        Commands::Refresh => {
            let outcomes = engine.refresh(&config.stack).await?;
            for outcome in &outcomes {
                let change = match &outcome.change {
                    RefreshChange::Unchanged => "unchanged".to_string(),
                    RefreshChange::Updated => "updated".to_string(),
                    RefreshChange::Removed => "removed".to_string(),
                    RefreshChange::Kept => "kept".to_string(),
                    RefreshChange::Failed { reason } => format!("failed: {}", reason),
                };
                println!("{} ({}): {}", outcome.name, outcome.kind, change);
            }
        }
        Commands::Outputs => {
            let exports = engine.database().get_exports(&config.stack)?;
            let json = serde_json::to_string_pretty(&exports)
                .context("Failed to serialize stack outputs")?;
            println!("{}", json);
        }
        Commands::Destroy => {
            let report = engine.destroy(&config.stack).await?;
            print!("{}", render::render_report(&report));
            if !report.is_success() {
                anyhow::bail!("Destroy of stack '{}' left resources behind", report.stack);
            }
        }
        Commands::Policy { .. } => {}
    }

    Ok(())
}
