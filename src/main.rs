// ABOUTME: CLI entry point for pg-dev-tools
// ABOUTME: Parses commands, applies config overrides and routes to handlers

use clap::{Parser, Subcommand};
use pg_dev_tools::config::{Config, FailurePolicy};
use pg_dev_tools::process::SystemRunner;
use pg_dev_tools::{commands, utils};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pg-dev-tools")]
#[command(about = "Schema dumps and test database resets for local PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to pg-dev-tools.toml (defaults to ./pg-dev-tools.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Name of the running PostgreSQL container
    #[arg(long, global = true)]
    container: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the schema into a normalized, deterministically ordered SQL file
    DumpSchema {
        /// Output file (defaults to schema.sql next to the config file)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Schema qualifier stripped from table names
        #[arg(long)]
        schema: Option<String>,
        /// Fail if the schema file is out of date instead of writing it
        #[arg(long)]
        check: bool,
    },
    /// Drop and rebuild every isolated test database
    ResetTestDatabases {
        /// Number of test databases
        #[arg(long)]
        slots: Option<u32>,
        /// Test databases reset concurrently
        #[arg(long)]
        jobs: Option<usize>,
        /// Directory holding the *up.sh migration scripts
        #[arg(long)]
        migrations_dir: Option<PathBuf>,
        /// What to do when a migration fails
        #[arg(long, value_enum)]
        on_failure: Option<FailurePolicy>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(container) = cli.container {
        config.docker.container = container;
    }

    match cli.command {
        Commands::DumpSchema {
            output,
            schema,
            check,
        } => {
            if let Some(output) = output {
                // Paths given on the command line are relative to where we run
                config.dump.output_path = std::env::current_dir()?.join(output);
            }
            if let Some(schema) = schema {
                config.dump.schema = schema;
            }
            config.validate()?;

            utils::check_docker(&config.docker.binary)?;
            commands::dump_schema(&SystemRunner, &config, check).await
        }
        Commands::ResetTestDatabases {
            slots,
            jobs,
            migrations_dir,
            on_failure,
            yes,
        } => {
            if let Some(slots) = slots {
                config.reset.slot_count = slots;
            }
            if let Some(jobs) = jobs {
                config.reset.parallelism = jobs;
            }
            if let Some(dir) = migrations_dir {
                config.reset.migrations_dir = std::env::current_dir()?.join(dir);
            }
            if let Some(policy) = on_failure {
                config.reset.on_failure = policy;
            }
            config.validate()?;

            // Missing docker shows up as failed drop commands; don't stop here
            if let Err(e) = utils::check_docker(&config.docker.binary) {
                tracing::warn!("⚠ {}", e);
            }
            commands::reset(&SystemRunner, &config, yes).await?;
            Ok(())
        }
    }
}
