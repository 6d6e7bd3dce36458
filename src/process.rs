//! Blocking external tool invocation with a timeout
//!
//! Every call takes an explicit working directory. Nothing here changes the
//! process-wide current directory.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::ToolError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured output of a tool that exited successfully
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args...` in `cwd`, killing it after `timeout`
///
/// A non-zero exit, a timeout, or a spawn failure are all returned as
/// [`ToolError`] so callers can treat them as a failure of this one step.
pub fn run_tool(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let tool = describe(program, args);
    debug!(tool = %tool, cwd = %cwd.display(), "running");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::SpawnFailed {
            tool: tool.clone(),
            reason: if e.kind() == std::io::ErrorKind::NotFound {
                format!("{} not found on PATH", program)
            } else {
                e.to_string()
            },
        })?;

    // Drain both pipes on their own threads so a chatty child cannot block
    // on a full pipe while we poll for exit.
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(tool = %tool, "timed out after {}s", timeout.as_secs());
            return Err(ToolError::TimedOut { tool, timeout });
        }
        Err(e) => {
            let _ = child.kill();
            return Err(ToolError::SpawnFailed {
                tool,
                reason: format!("failed to wait: {}", e),
            });
        }
    };

    let output = ToolOutput {
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    };

    if status.success() {
        Ok(output)
    } else {
        Err(ToolError::ProcessFailed {
            tool,
            code: status.code().unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn describe(program: &str, args: &[&str]) -> String {
    match args.first() {
        Some(sub) => format!("{} {}", program, sub),
        None => program.to_string(),
    }
}
