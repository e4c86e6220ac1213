// ABOUTME: Drops and rebuilds the isolated test databases slot by slot
// ABOUTME: Runs drop commands through psql in the container, then replays up migrations

use crate::config::{Config, FailurePolicy};
use crate::process::{CommandRunner, CommandSpec};
use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Drop,
    Migrate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Drop => write!(f, "drop"),
            Phase::Migrate => write!(f, "migrate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub phase: Phase,
    pub command: String,
    pub reason: String,
}

/// Outcome of resetting one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReport {
    pub slot: u32,
    pub database: String,
    pub commands_run: usize,
    pub failures: Vec<StepFailure>,
    /// Remaining migrations were skipped because of [`FailurePolicy::AbortSlot`]
    pub aborted: bool,
}

impl SlotReport {
    pub fn failures_in(&self, phase: Phase) -> usize {
        self.failures.iter().filter(|f| f.phase == phase).count()
    }
}

/// Reports for every slot, ordered by slot number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub reports: Vec<SlotReport>,
}

impl ResetSummary {
    pub fn failed_migrations(&self) -> usize {
        self.reports
            .iter()
            .map(|r| r.failures_in(Phase::Migrate))
            .sum()
    }

    pub fn failed_drops(&self) -> usize {
        self.reports.iter().map(|r| r.failures_in(Phase::Drop)).sum()
    }
}

/// `DROP DATABASE` and `DROP ROLE` for a slot, run one at a time since
/// neither can share a transaction block
pub fn drop_commands(config: &Config, slot: u32) -> Vec<CommandSpec> {
    let name = config.reset.slot_database(slot);
    [
        format!("DROP DATABASE {}", name),
        format!("DROP ROLE {}", name),
    ]
    .into_iter()
    .map(|query| {
        CommandSpec::docker_exec(
            &config.docker.binary,
            &config.docker.container,
            [
                "psql".to_string(),
                "-U".to_string(),
                config.reset.admin_user.clone(),
                "-c".to_string(),
                query,
            ],
        )
    })
    .collect()
}

pub fn migration_command(config: &Config, migration: &Path, slot: u32) -> CommandSpec {
    CommandSpec::new(migration.display().to_string()).arg(config.reset.slot_argument(slot))
}

/// Run one command, log what it printed, and return why it failed, if it did
async fn run_step<R: CommandRunner>(
    runner: &R,
    label: &str,
    command: &CommandSpec,
) -> Option<String> {
    tracing::info!("[{}] command: {}", label, command);

    match runner.run(command).await {
        Ok(output) => {
            let stdout = output.stdout.trim();
            let stderr = output.stderr.trim();
            if !stdout.is_empty() {
                tracing::info!("[{}] output: {}", label, stdout);
            }
            if output.success() {
                if !stderr.is_empty() {
                    tracing::info!("[{}] errs: {}", label, stderr);
                }
                None
            } else {
                if !stderr.is_empty() {
                    tracing::warn!("[{}] errs: {}", label, stderr);
                }
                Some(match output.code {
                    Some(code) => format!("exited with status {}", code),
                    None => "terminated by signal".to_string(),
                })
            }
        }
        Err(e) => {
            tracing::warn!("[{}] {:#}", label, e);
            Some(format!("{:#}", e))
        }
    }
}

/// Drop and rebuild a single slot.
///
/// Drop failures are recorded but never stop the slot: dropping a database
/// that does not exist yet is expected. Migration failures are handled
/// according to `reset.on_failure`; only [`FailurePolicy::AbortAll`] turns
/// them into an error.
pub async fn reset_slot<R: CommandRunner>(
    runner: &R,
    config: &Config,
    migrations: &[PathBuf],
    slot: u32,
) -> Result<SlotReport> {
    let database = config.reset.slot_database(slot);
    let mut report = SlotReport {
        slot,
        database: database.clone(),
        commands_run: 0,
        failures: Vec::new(),
        aborted: false,
    };

    tracing::info!("== Clearing test database: {} ==", database);
    for command in drop_commands(config, slot) {
        report.commands_run += 1;
        if let Some(reason) = run_step(runner, &database, &command).await {
            report.failures.push(StepFailure {
                phase: Phase::Drop,
                command: command.to_string(),
                reason,
            });
        }
    }

    tracing::info!("== [{}] Running all migrations ==", database);
    for migration in migrations {
        let file_name = migration
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!("== [{}] Running migration {} ==", database, file_name);

        let command = migration_command(config, migration, slot);
        report.commands_run += 1;
        let Some(reason) = run_step(runner, &database, &command).await else {
            continue;
        };

        report.failures.push(StepFailure {
            phase: Phase::Migrate,
            command: command.to_string(),
            reason: reason.clone(),
        });
        match config.reset.on_failure {
            FailurePolicy::Continue => {}
            FailurePolicy::AbortSlot => {
                tracing::warn!(
                    "⚠ [{}] Migration {} failed ({}), skipping remaining migrations",
                    database,
                    file_name,
                    reason
                );
                report.aborted = true;
                break;
            }
            FailurePolicy::AbortAll => {
                bail!(
                    "Migration {} failed for test database {}: {}",
                    file_name,
                    database,
                    reason
                );
            }
        }
    }

    Ok(report)
}

/// Reset every configured slot.
///
/// Slots are independent, so up to `reset.parallelism` of them run at once;
/// within a slot every command finishes before the next one starts. With
/// [`FailurePolicy::AbortAll`] the first failed migration stops scheduling
/// new slots; slots already in flight run to completion, then the error of
/// the lowest failing slot is returned.
pub async fn reset_test_databases<R: CommandRunner>(
    runner: &R,
    config: &Config,
    migrations: &[PathBuf],
) -> Result<ResetSummary> {
    let slot_count = config.reset.slot_count;
    if slot_count == 0 {
        tracing::warn!("⚠ No test database slots configured");
        return Ok(ResetSummary::default());
    }

    let parallelism = config.reset.parallelism.max(1);
    tracing::info!(
        "Resetting {} test database(s) with {} migration(s) each (concurrency: {})",
        slot_count,
        migrations.len(),
        parallelism
    );

    let progress = ProgressBar::new(u64::from(slot_count));
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    // Set by the first slot that fails under abort-all; slots already running
    // finish, slots not yet started are skipped
    let aborted = AtomicBool::new(false);
    let pb = progress.clone();
    let results: Vec<(u32, Option<Result<SlotReport>>)> = stream::iter(1..=slot_count)
        .map(|slot| {
            let pb = pb.clone();
            let aborted = &aborted;
            async move {
                if aborted.load(Ordering::SeqCst) {
                    tracing::warn!(
                        "⚠ Skipping {} after an earlier failure",
                        config.reset.slot_database(slot)
                    );
                    return (slot, None);
                }
                let report = reset_slot(runner, config, migrations, slot).await;
                if report.is_err() {
                    aborted.store(true, Ordering::SeqCst);
                }
                pb.inc(1);
                pb.set_message(format!("Reset {}", config.reset.slot_database(slot)));
                (slot, Some(report))
            }
        })
        .buffer_unordered(parallelism)
        .collect()
        .await;

    let mut reports = Vec::new();
    let mut first_error: Option<(u32, anyhow::Error)> = None;
    for (slot, result) in results {
        match result {
            Some(Ok(report)) => reports.push(report),
            Some(Err(e)) => {
                tracing::warn!("⚠ {:#}", e);
                if first_error.as_ref().map_or(true, |(first, _)| slot < *first) {
                    first_error = Some((slot, e));
                }
            }
            None => {}
        }
    }

    if let Some((_, e)) = first_error {
        progress.abandon_with_message("Reset aborted");
        return Err(e);
    }
    progress.finish_with_message("Reset complete");

    reports.sort_by_key(|r| r.slot);
    Ok(ResetSummary { reports })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use std::sync::Mutex;

    /// Records every command; commands containing one of `failing` exit 1
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        failing: Vec<&'static str>,
    }

    impl RecordingRunner {
        fn failing(patterns: &[&'static str]) -> Self {
            Self {
                failing: patterns.to_vec(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
            let line = command.to_string();
            self.calls.lock().unwrap().push(line.clone());
            if self.failing.iter().any(|p| line.contains(p)) {
                return Ok(CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "ERROR: something went wrong".to_string(),
                });
            }
            Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            })
        }
    }

    fn config(slots: u32, policy: FailurePolicy) -> Config {
        let mut config = Config::default();
        config.reset.slot_count = slots;
        config.reset.on_failure = policy;
        config
    }

    fn migrations() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/m/0001_users_up.sh"),
            PathBuf::from("/m/0002_posts_up.sh"),
        ]
    }

    #[test]
    fn test_drop_commands() {
        let commands: Vec<String> = drop_commands(&Config::default(), 4)
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            commands,
            vec![
                "docker exec -i writing_postgres psql -U postgres -c DROP DATABASE app_test4",
                "docker exec -i writing_postgres psql -U postgres -c DROP ROLE app_test4",
            ]
        );
    }

    #[tokio::test]
    async fn test_each_slot_drops_then_migrates_in_order() {
        let runner = RecordingRunner::default();
        let summary = reset_test_databases(
            &runner,
            &config(2, FailurePolicy::Continue),
            &migrations(),
        )
        .await
        .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "docker exec -i writing_postgres psql -U postgres -c DROP DATABASE app_test1",
                "docker exec -i writing_postgres psql -U postgres -c DROP ROLE app_test1",
                "/m/0001_users_up.sh _test1",
                "/m/0002_posts_up.sh _test1",
                "docker exec -i writing_postgres psql -U postgres -c DROP DATABASE app_test2",
                "docker exec -i writing_postgres psql -U postgres -c DROP ROLE app_test2",
                "/m/0001_users_up.sh _test2",
                "/m/0002_posts_up.sh _test2",
            ]
        );
        assert_eq!(summary.reports.len(), 2);
        assert!(summary.reports.iter().all(|r| r.commands_run == 4));
        assert_eq!(summary.failed_migrations(), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop_by_default() {
        let runner = RecordingRunner::failing(&["DROP DATABASE", "0001_users_up.sh"]);
        let summary = reset_test_databases(
            &runner,
            &config(3, FailurePolicy::Continue),
            &migrations(),
        )
        .await
        .unwrap();

        assert_eq!(runner.calls().len(), 3 * 4);
        assert_eq!(summary.failed_drops(), 3);
        assert_eq!(summary.failed_migrations(), 3);
        assert!(summary.reports.iter().all(|r| !r.aborted));
    }

    #[tokio::test]
    async fn test_abort_slot_skips_remaining_migrations_only() {
        let runner = RecordingRunner::failing(&["0001_users_up.sh _test1"]);
        let summary = reset_test_databases(
            &runner,
            &config(2, FailurePolicy::AbortSlot),
            &migrations(),
        )
        .await
        .unwrap();

        let calls = runner.calls();
        assert!(!calls.contains(&"/m/0002_posts_up.sh _test1".to_string()));
        assert!(calls.contains(&"/m/0002_posts_up.sh _test2".to_string()));
        assert!(summary.reports[0].aborted);
        assert!(!summary.reports[1].aborted);
    }

    #[tokio::test]
    async fn test_abort_all_stops_at_first_failed_migration() {
        let runner = RecordingRunner::failing(&["0002_posts_up.sh _test1"]);
        let err = reset_test_databases(
            &runner,
            &config(3, FailurePolicy::AbortAll),
            &migrations(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("app_test1"));
        assert!(!runner.calls().iter().any(|c| c.contains("_test2")));
    }

    /// Like [`RecordingRunner`] but every command takes a moment, so
    /// concurrent slots interleave
    struct SlowRunner(RecordingRunner);

    impl CommandRunner for SlowRunner {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.0.run(command).await
        }
    }

    #[tokio::test]
    async fn test_abort_all_lets_running_slots_finish() {
        let mut config = config(3, FailurePolicy::AbortAll);
        config.reset.parallelism = 2;
        let runner = SlowRunner(RecordingRunner::failing(&["0001_users_up.sh _test1"]));

        let err = reset_test_databases(&runner, &config, &migrations())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("app_test1"));
        let calls = runner.0.calls();
        // Slot 2 was already dropped when slot 1 failed, so it is rebuilt
        assert!(calls.contains(&"/m/0001_users_up.sh _test2".to_string()));
        assert!(calls.contains(&"/m/0002_posts_up.sh _test2".to_string()));
        // Slot 3 had not started and is left alone
        assert!(!calls.iter().any(|c| c.contains("test3")));
    }

    #[tokio::test]
    async fn test_drop_failures_never_abort() {
        let runner = RecordingRunner::failing(&["DROP ROLE"]);
        let summary = reset_test_databases(
            &runner,
            &config(1, FailurePolicy::AbortAll),
            &migrations(),
        )
        .await
        .unwrap();

        assert_eq!(runner.calls().len(), 4);
        assert_eq!(summary.failed_drops(), 1);
    }

    #[tokio::test]
    async fn test_parallel_slots_run_every_command() {
        let mut config = config(5, FailurePolicy::Continue);
        config.reset.parallelism = 3;
        let runner = RecordingRunner::default();

        let summary = reset_test_databases(&runner, &config, &migrations())
            .await
            .unwrap();

        assert_eq!(runner.calls().len(), 5 * 4);
        let slots: Vec<u32> = summary.reports.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_zero_slots_runs_nothing() {
        let runner = RecordingRunner::default();
        let summary = reset_test_databases(
            &runner,
            &config(0, FailurePolicy::Continue),
            &migrations(),
        )
        .await
        .unwrap();
        assert!(summary.reports.is_empty());
        assert!(runner.calls().is_empty());
    }
}
