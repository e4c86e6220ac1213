// ABOUTME: External process execution behind a swappable runner trait
// ABOUTME: Captures exit status and output streams of docker, pg_dump and migration scripts

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use std::process::Stdio;

/// One external command: a program and its positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build `<docker> exec -i <container> <args...>`
    pub fn docker_exec<I, S>(docker: &Path, container: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(docker.display().to_string())
            .arg("exec")
            .arg("-i")
            .arg(container);
        spec.args.extend(args.into_iter().map(Into::into));
        spec
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands to completion and captures their output.
///
/// The real implementation is [`SystemRunner`]; tests substitute fakes that
/// record invocations and return canned output.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Spawns real child processes through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("Spawning: {}", command);

        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute '{}'", command.program))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_docker_exec_builds_argument_list() {
        let spec = CommandSpec::docker_exec(
            &PathBuf::from("/usr/bin/docker"),
            "writing_postgres",
            ["psql", "-U", "postgres", "-c", "DROP ROLE app_test1"],
        );

        assert_eq!(spec.program, "/usr/bin/docker");
        assert_eq!(
            spec.args,
            vec![
                "exec",
                "-i",
                "writing_postgres",
                "psql",
                "-U",
                "postgres",
                "-c",
                "DROP ROLE app_test1"
            ]
        );
    }

    #[test]
    fn test_display_joins_program_and_args() {
        let spec = CommandSpec::new("./migrations/001_up.sh").arg("_test2");
        assert_eq!(spec.to_string(), "./migrations/001_up.sh _test2");
    }

    #[test]
    fn test_success_requires_zero_exit_code() {
        let mut output = CommandOutput {
            code: Some(0),
            ..Default::default()
        };
        assert!(output.success());

        output.code = Some(1);
        assert!(!output.success());

        output.code = None;
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_streams() {
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3");

        let output = SystemRunner.run(&spec).await.unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_system_runner_reports_missing_program() {
        let spec = CommandSpec::new("definitely-not-a-real-binary-pg-dev-tools");
        let err = SystemRunner.run(&spec).await.unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }
}
