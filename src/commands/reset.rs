// ABOUTME: Test database reset command - drop and rebuild every test slot
// ABOUTME: Confirms the destructive operation, then reports per-slot failures

use crate::config::{Config, FailurePolicy};
use crate::process::CommandRunner;
use crate::reset::{self, ResetSummary};
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::io::IsTerminal;

/// Drop and rebuild the isolated test databases
///
/// For every slot `1..=reset.slot_count` the slot's database and role are
/// dropped, then every up migration is replayed against it with the slot
/// suffix (e.g. `_test3`) as its only argument.
///
/// Unless `skip_confirmation` is set the user is asked to confirm first.
///
/// # Errors
///
/// This function will return an error if:
/// - The user declines, or no terminal is available to ask
/// - The migrations directory cannot be read
/// - A migration fails while `reset.on_failure` is `abort-all`
///
/// Failed commands under the other policies are logged, not returned.
pub async fn reset<R: CommandRunner>(
    runner: &R,
    config: &Config,
    skip_confirmation: bool,
) -> Result<ResetSummary> {
    let migrations_dir = config.migrations_dir();
    let migrations = reset::discover_up_migrations(&migrations_dir, &config.reset.up_suffix)?;
    if migrations.is_empty() {
        tracing::warn!(
            "⚠ No migrations ending in '{}' found in {}",
            config.reset.up_suffix,
            migrations_dir.display()
        );
    } else {
        tracing::info!(
            "Found {} migration(s) in {}",
            migrations.len(),
            migrations_dir.display()
        );
    }

    if !skip_confirmation && !confirm_reset(config)? {
        bail!("Reset cancelled by user");
    }

    let summary = reset::reset_test_databases(runner, config, &migrations).await?;
    log_summary(&summary, config.reset.on_failure);
    Ok(summary)
}

fn confirm_reset(config: &Config) -> Result<bool> {
    let first = config.reset.slot_database(1);
    let last = config.reset.slot_database(config.reset.slot_count.max(1));

    if !std::io::stdin().is_terminal() {
        bail!(
            "Refusing to drop test databases {}..{} without confirmation.\n\
             Re-run with --yes to skip the prompt.",
            first,
            last
        );
    }

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Drop and rebuild test databases {}..{} in container '{}'?",
            first, last, config.docker.container
        ))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn log_summary(summary: &ResetSummary, policy: FailurePolicy) {
    for report in &summary.reports {
        for failure in &report.failures {
            tracing::debug!(
                "[{}] {} step failed: {} ({})",
                report.database,
                failure.phase,
                failure.command,
                failure.reason
            );
        }
        if report.aborted {
            tracing::warn!("⚠ {} was left partially migrated", report.database);
        }
    }

    let failed_drops = summary.failed_drops();
    if failed_drops > 0 {
        tracing::info!(
            "{} drop command(s) failed (expected when a test database did not exist yet)",
            failed_drops
        );
    }

    let failed_migrations = summary.failed_migrations();
    if failed_migrations > 0 {
        tracing::warn!(
            "⚠ {} migration command(s) failed (on-failure policy: {:?})",
            failed_migrations,
            policy
        );
    }

    tracing::info!("== Done! ==");
}
