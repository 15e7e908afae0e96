//! Command execution abstraction for testability.
//!
//! Backends never spawn processes directly. They go through a
//! [`CommandExecutor`], which lets unit tests replay recorded firewall tool
//! output without touching the host.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

/// Default bound on a single firewall tool invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

impl CommandOutput {
    /// One-line rendering of what the tool printed, for the activity log.
    pub fn summary(&self) -> String {
        let text = if self.stdout.trim().is_empty() {
            self.stderr.trim()
        } else {
            self.stdout.trim()
        };

        let joined = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if joined.is_empty() {
            match self.code {
                Some(code) => format!("exit code {}", code),
                None => "no output".to_string(),
            }
        } else {
            joined
        }
    }
}

/// Trait for command execution, allowing dependency injection for testing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `cmd` with `args` and wait for it to exit.
    ///
    /// A non-zero exit is reported through [`CommandOutput::success`]; an
    /// `Err` means the process could not be run or did not finish in time.
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Real implementation that runs system commands with a time bound.
#[derive(Debug, Clone)]
pub struct RealCommandExecutor {
    timeout: Duration,
}

impl RealCommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the future on timeout kills the child.
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                anyhow::anyhow!("{} timed out after {}s", cmd, self.timeout.as_secs())
            })?
            .with_context(|| format!("Failed to execute {}", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// mockall has trouble with lifetimes in `&[&str]`, so the trait takes
/// `&[String]` instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Compare recorded arguments against expected literals.
#[cfg(test)]
pub fn args_eq(args: &[String], expected: &[&str]) -> bool {
    args.len() == expected.len() && args.iter().zip(expected).all(|(a, e)| a == e)
}
