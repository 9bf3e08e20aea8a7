use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::output::Reporter;

/// Default test command for a Leiningen project.
pub const DEFAULT_COMMAND: &str = "lein test";

/// The external test command, run through the platform shell from the project root.
///
/// Standard error is folded into standard output inside the shell, so the
/// reporter sees one stream in the order the command wrote it.
#[derive(Debug, Clone)]
pub struct TestCommand {
    command: String,
    cwd: PathBuf,
}

impl TestCommand {
    pub fn new(command: impl Into<String>, cwd: &Path) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    #[cfg(unix)]
    fn shell(&self) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(format!("exec 2>&1; {}", self.command));
        cmd
    }

    #[cfg(windows)]
    fn shell(&self) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(format!("{} 2>&1", self.command));
        cmd
    }

    /// Run the command once, feeding each output line to `reporter` as it
    /// arrives, then print the separator.
    ///
    /// Exit status is not interpreted: a failing or missing command shows up
    /// only through the text it (or the shell) printed. If the shell itself
    /// cannot be spawned, the spawn error is reported as a single line.
    /// Errors are returned only when writing the report fails.
    pub async fn run<W: Write>(&self, reporter: &mut Reporter<'_, W>) -> anyhow::Result<()> {
        let spawned = self
            .shell()
            .current_dir(&self.cwd)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %self.command, error = %err, "failed to spawn shell");
                reporter
                    .line(&format!("autotest: failed to run `{}`: {err}", self.command))
                    .context("writing report")?;
                reporter.finish().context("writing report")?;
                return Ok(());
            }
        };

        if let Some(stdout) = child.stdout.take() {
            let mut segments = BufReader::new(stdout).split(b'\n');
            while let Some(segment) = segments
                .next_segment()
                .await
                .context("reading test command output")?
            {
                reporter
                    .line(&decode_line(&segment))
                    .context("writing report")?;
            }
        }

        match child.wait().await {
            Ok(status) => debug!(command = %self.command, %status, "test command finished"),
            Err(err) => warn!(command = %self.command, error = %err, "failed to reap test command"),
        }

        reporter.finish().context("writing report")?;
        Ok(())
    }
}

/// Lossy UTF-8 decode of one output line with any trailing `\r` removed.
fn decode_line(segment: &[u8]) -> String {
    let segment = segment.strip_suffix(b"\r").unwrap_or(segment);
    String::from_utf8_lossy(segment).into_owned()
}
