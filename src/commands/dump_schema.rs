// ABOUTME: Schema export command - dump, normalize and write schema.sql
// ABOUTME: Refuses to write anything when pg_dump fails or emits unknown statements

use crate::config::Config;
use crate::process::CommandRunner;
use crate::schema;
use anyhow::{bail, Context, Result};

/// Dump the database schema into a normalized, deterministically ordered file
///
/// Steps:
/// 1. Runs pg_dump inside the configured container
/// 2. Groups table, primary key and index statements per table
/// 3. Writes them in table-name order to the configured output path
///
/// With `check` set, the rendered schema is compared with the existing file
/// instead of being written.
///
/// # Errors
///
/// This function will return an error if:
/// - pg_dump cannot be executed, reports an error, or exits unsuccessfully
/// - The dump contains a statement block of an unknown shape
/// - The output file cannot be written
/// - `check` is set and the file is missing or out of date
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use pg_dev_tools::commands::dump_schema;
/// # use pg_dev_tools::config::Config;
/// # use pg_dev_tools::process::SystemRunner;
/// # async fn example() -> Result<()> {
/// let config = Config::load(None)?;
/// dump_schema(&SystemRunner, &config, false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn dump_schema<R: CommandRunner>(runner: &R, config: &Config, check: bool) -> Result<()> {
    let output_path = config.output_path();

    tracing::info!(
        "Step 1/3: Dumping schema of database '{}'...",
        config.dump.database
    );
    let dump = schema::dump_schema_text(runner, config).await?;

    tracing::info!("Step 2/3: Normalizing schema...");
    let definitions = schema::parse_definitions(&dump, &config.dump.schema)?;
    tracing::info!("✓ Found {} table(s)", definitions.len());
    let rendered = schema::render(&definitions);

    if check {
        tracing::info!("Step 3/3: Comparing with {}...", output_path.display());
        let existing = match std::fs::read_to_string(&output_path) {
            Ok(existing) => existing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!("Schema file {} does not exist", output_path.display())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", output_path.display()))
            }
        };
        if existing != rendered {
            bail!(
                "Schema file {} is out of date. Run dump-schema to regenerate it.",
                output_path.display()
            );
        }
        tracing::info!("✓ Schema file is up to date");
        return Ok(());
    }

    tracing::info!("Step 3/3: Writing schema...");
    schema::write_atomic(&output_path, &rendered)?;

    tracing::info!("✅ Database schema written to: {}", output_path.display());
    Ok(())
}
