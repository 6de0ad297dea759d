//! External command execution
//!
//! Every external tool the pipeline touches (git, the configure script, make,
//! the universal-binary merge tool) is invoked through [`CommandRunner`].
//! [`SystemRunner`] is the real implementation; tests substitute a runner that
//! simulates the tools on the filesystem.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Creates a command for the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Sets the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited successfully.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout and stderr in one block, for error reports.
    pub fn combined(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status: {}", code),
            None => "terminated by signal".to_string(),
        };
        format!(
            "{}\n\nStdout:\n{}\n\nStderr:\n{}",
            status,
            self.stdout.trim_end(),
            self.stderr.trim_end()
        )
    }
}

/// Runs external tools on behalf of the pipeline.
///
/// Implementations must be shareable across threads because per-architecture
/// builds may run concurrently.
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion, capturing its output.
    ///
    /// An `Err` means the process could not be started at all.
    fn run(&self, cmd: &ToolCommand) -> io::Result<CommandOutput>;

    /// Resolves a tool name to an executable path, if installed.
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> io::Result<CommandOutput> {
        debug!(command = %cmd, dir = ?cmd.dir(), "spawning process");

        let mut command = Command::new(cmd.program());
        command.args(cmd.get_args());
        if let Some(dir) = cmd.dir() {
            command.current_dir(dir);
        }

        let output = command.output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_command_display_quotes_spaces() {
        let cmd = ToolCommand::new("sh")
            .arg("-c")
            .arg("./configure --cc=clang")
            .current_dir("/tmp");
        assert_eq!(cmd.to_string(), "sh -c './configure --cc=clang'");
        assert_eq!(cmd.dir(), Some(Path::new("/tmp")));
    }

    #[test]
    fn test_system_runner_spawn_failure() {
        let cmd = ToolCommand::new("nonexistent-command-12345");
        assert!(SystemRunner.run(&cmd).is_err());
        assert!(SystemRunner.locate("nonexistent-command-12345").is_none());
    }

    #[test]
    fn test_combined_output_includes_both_streams() {
        let output = CommandOutput {
            success: false,
            code: Some(2),
            stdout: "checking for clang...".into(),
            stderr: "error: no working compiler".into(),
        };
        let combined = output.combined();
        assert!(combined.contains("exit status: 2"));
        assert!(combined.contains("checking for clang"));
        assert!(combined.contains("no working compiler"));
    }
}
