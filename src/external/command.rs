//! Remote command execution abstraction
//!
//! Provides the traits for opening a remote session, pushing a file to it and
//! running a command there, enabling dependency injection for testing.

use async_trait::async_trait;
use std::path::Path;

use crate::error::ConversionError;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_status: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl CommandOutput {
    pub fn from_streams(exit_status: Option<i32>, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_status,
            stdout_lines: stdout.lines().map(str::to_string).collect(),
            stderr_lines: stderr.lines().map(str::to_string).collect(),
        }
    }

    /// Any stderr output counts as failure. The exit status is not consulted.
    pub fn has_errors(&self) -> bool {
        !self.stderr_lines.is_empty()
    }
}

/// Trait for opening remote sessions by profile name
#[async_trait]
pub trait RemoteExecutionGateway: Send + Sync {
    async fn connect(&self, profile_name: &str) -> Result<Box<dyn RemoteSession>, ConversionError>;
}

/// A live remote session, exclusively owned by whoever opened it
#[async_trait]
pub trait RemoteSession: Send {
    /// Transfer a local file to the remote host. Attempted once.
    async fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<(), ConversionError>;

    /// Run a shell command and collect both output streams to completion
    async fn execute_command(&mut self, command: &str) -> Result<CommandOutput, ConversionError>;

    /// Close the transfer channel, if any, and the session
    async fn close(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_output_is_failure_regardless_of_exit_status() {
        let output = CommandOutput::from_streams(Some(0), "done\n", "warning: disk low\n");
        assert!(output.has_errors());
        assert_eq!(output.stdout_lines, vec!["done"]);
    }

    #[test]
    fn test_non_zero_exit_without_stderr_is_not_failure() {
        let output = CommandOutput::from_streams(Some(3), "partial\n", "");
        assert!(!output.has_errors());
    }

    #[test]
    fn test_blank_stderr_line_still_counts() {
        let output = CommandOutput::from_streams(None, "", "\n");
        assert!(output.has_errors());
    }
}
