use std::io;
use std::process::{Command, Output, Stdio};

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// Exit code; None when killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    #[cfg(test)]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            code: Some(code),
            ..Default::default()
        }
    }

    /// stderr if present, else stdout, trimmed
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Runs external commands; swapped for a script in tests
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. Err only when the command could
    /// not be spawned.
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Runs commands on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<CommandOutput> {
        log::debug!("Running: {} {}", cmd, args.join(" "));
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .env("LC_ALL", "C")
            .output()?;
        let output = CommandOutput::from(output);
        if !output.success {
            log::debug!(
                "{} exited with {:?}: {}",
                cmd,
                output.code,
                output.diagnostic()
            );
        }
        Ok(output)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_runner_captures_output() {
        let output = SystemRunner.run("sh", &["-c", "echo out; echo err >&2; exit 3"]).unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.diagnostic(), "err");
    }

    #[test]
    fn test_spawn_failure_is_err() {
        assert!(SystemRunner.run("nodeup-no-such-binary-xyz", &[]).is_err());
    }

    #[test]
    fn test_diagnostic_falls_back_to_stdout() {
        let output = CommandOutput {
            stdout: " inactive \n".to_string(),
            ..Default::default()
        };
        assert_eq!(output.diagnostic(), "inactive");
    }
}
