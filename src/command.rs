//! Privileged command execution channel.
//!
//! Everything the monitor knows about the host comes back as captured
//! stdout text from commands run with the server's privileges. The trait
//! keeps that seam narrow so tests can substitute a scripted runner.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to launch command: {0}")]
    Launch(#[from] std::io::Error),
    #[error("command exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
}

/// Runs external commands and returns their stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a shell pipeline and return its stdout.
    async fn script(&self, script: &str) -> Result<String, CommandError>;

    /// Run a single command with arguments and return its stdout.
    async fn spawn(&self, argv: &[&str]) -> Result<String, CommandError>;
}

/// Executes commands directly on the local host. Process tables and the
/// connection table of the server are only fully visible to root, so dsmon
/// is expected to run with the same privileges as the server.
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn script(&self, script: &str) -> Result<String, CommandError> {
        let output = Command::new("sh").arg("-c").arg(script).output().await?;
        collect_stdout(output)
    }

    async fn spawn(&self, argv: &[&str]) -> Result<String, CommandError> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            CommandError::Launch(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argv",
            ))
        })?;
        let output = Command::new(program).args(args).output().await?;
        collect_stdout(output)
    }
}

fn collect_stdout(output: std::process::Output) -> Result<String, CommandError> {
    if !output.status.success() {
        return Err(CommandError::Failed {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
