//! External tool invocation with log passthrough
//!
//! stdout and stderr are read by two concurrent tasks that forward every
//! line to `tracing`. Both readers are joined before the exit status is
//! reported.

use crate::error::ExecutionError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Identifies an invocation in the forwarded log lines
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tool: String,
    pub cluster: String,
    pub action: &'static str,
}

/// Lines forwarded from each stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

/// Run `command` to completion, streaming its output into the log.
///
/// A non-zero exit is an error. With a timeout, the child is killed once the
/// deadline passes.
pub async fn run_logged(
    mut command: Command,
    ctx: &ToolContext,
    timeout: Option<Duration>,
) -> Result<ToolOutput, ExecutionError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout also reaches the tool's children
    #[cfg(unix)]
    command.process_group(0);

    debug!(tool = %ctx.tool, cluster = %ctx.cluster, action = ctx.action, "Starting tool");

    let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
        tool: ctx.tool.clone(),
        source,
    })?;

    let stdout = tokio::spawn(forward_lines(child.stdout.take(), ctx.clone(), "stdout"));
    let stderr = tokio::spawn(forward_lines(child.stderr.take(), ctx.clone(), "stderr"));

    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => result,
            Err(_) => {
                kill_process_group(&mut child).await;
                // Orphans that escaped the group may still hold the pipes
                stdout.abort();
                stderr.abort();
                let _ = tokio::join!(stdout, stderr);
                return Err(ExecutionError::Timeout {
                    tool: ctx.tool.clone(),
                    timeout: limit,
                });
            }
        },
        None => child.wait().await,
    };

    let (stdout_lines, stderr_lines) = tokio::join!(stdout, stderr);
    let output = ToolOutput {
        stdout_lines: stdout_lines.unwrap_or_default(),
        stderr_lines: stderr_lines.unwrap_or_default(),
    };

    let status = waited.map_err(|source| ExecutionError::Spawn {
        tool: ctx.tool.clone(),
        source,
    })?;

    if !status.success() {
        return Err(ExecutionError::ToolFailed {
            tool: ctx.tool.clone(),
            status: status.to_string(),
        });
    }

    Ok(output)
}

async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill(2) takes no pointers; a negative pid targets the group
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    let _ = child.kill().await;
}

/// Forward `reader` line by line until EOF. Invalid UTF-8 is replaced
/// rather than ending the read, which would close the pipe under the tool.
async fn forward_lines<R>(reader: Option<R>, ctx: ToolContext, stream: &'static str) -> usize
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return 0;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(tool = %ctx.tool, stream = stream, error = %e, "Output stream closed");
                break;
            }
        }

        count += 1;
        let line = String::from_utf8_lossy(&buf);
        info!(
            tool = %ctx.tool,
            cluster = %ctx.cluster,
            action = ctx.action,
            stream = stream,
            "{}",
            line.trim_end_matches(['\n', '\r'])
        );
    }
    count
}
