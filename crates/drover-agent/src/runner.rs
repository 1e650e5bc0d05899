//! Shell command execution

use async_trait::async_trait;
use tokio::process::Command;

/// Executes dispatched commands and returns their combined output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion. Ok carries the combined output of a
    /// successful run; Err carries a description of the failure, with any
    /// output the command produced before failing.
    async fn run(&self, command: &str) -> Result<String, String>;
}

/// Runs commands through `sh -c`
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<String, String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| format!("failed to spawn shell: {e}"))?;

        // Stdout and stderr are reported together, in that order
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(format!("exit status {}: {}", output.status, combined))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_returns_output() {
        let runner = ShellRunner;
        let output = runner.run("echo hello").await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_failing_command_reports_status() {
        let runner = ShellRunner;
        let err = runner.run("exit 3").await.unwrap_err();
        assert!(err.contains("exit status"));
    }

    #[tokio::test]
    async fn test_stderr_included_in_output() {
        let runner = ShellRunner;
        let output = runner.run("echo out; echo err >&2").await.unwrap();
        assert!(output.contains("out"));
        assert!(output.contains("err"));
    }

    #[tokio::test]
    async fn test_shell_features_available() {
        let runner = ShellRunner;
        let output = runner.run("echo a && echo b | tr 'b' 'c'").await.unwrap();
        assert!(output.contains('a'));
        assert!(output.contains('c'));
    }
}
