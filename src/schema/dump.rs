// ABOUTME: Runs pg_dump inside the database container to capture the schema
// ABOUTME: Detects dump failures from the error marker and the exit status

use crate::config::Config;
use crate::error::SchemaError;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use anyhow::{Context, Result};

/// `docker exec -i <container> pg_dump -U <user> -d <database> --schema-only`
pub fn dump_command(config: &Config) -> CommandSpec {
    CommandSpec::docker_exec(
        &config.docker.binary,
        &config.docker.container,
        [
            "pg_dump",
            "-U",
            config.dump.user.as_str(),
            "-d",
            config.dump.database.as_str(),
            "--schema-only",
        ],
    )
}

/// Check a finished dump for failure.
///
/// The dump failed when `marker` appears in either stream or the process
/// exited unsuccessfully; the error then carries everything it printed.
pub fn check_dump_output(output: &CommandOutput, marker: &str) -> Result<(), SchemaError> {
    let reported_error = output.stderr.contains(marker) || output.stdout.contains(marker);
    if !reported_error && output.success() {
        return Ok(());
    }

    let mut captured = String::new();
    for stream in [output.stdout.trim_end(), output.stderr.trim_end()] {
        if !stream.is_empty() {
            captured.push_str(stream);
            captured.push('\n');
        }
    }
    if !reported_error {
        let status = output
            .code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        captured.push_str(&format!("(pg_dump exited with status {})", status));
    }

    Err(SchemaError::DumpFailed { output: captured })
}

/// Dump the configured database's schema and return pg_dump's stdout
pub async fn dump_schema_text<R: CommandRunner>(runner: &R, config: &Config) -> Result<String> {
    tracing::info!(
        "Dumping schema for database '{}' in container '{}'...",
        config.dump.database,
        config.docker.container
    );

    let command = dump_command(config);
    let output = runner
        .run(&command)
        .await
        .context("Failed to run pg_dump. Is docker installed and the container running?")?;

    check_dump_output(&output, &config.dump.error_marker)?;

    tracing::debug!("pg_dump produced {} bytes", output.stdout.len());
    Ok(output.stdout)
}
