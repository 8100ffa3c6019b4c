// capture.rs — Run one child process with bounded capture and a deadline.
//
// Shared by the process and docker backends. Both pipes are drained
// concurrently so a chatty child cannot block on a full pipe; bytes beyond
// the capture limit are read and discarded. On timeout the child is killed
// and no output is returned.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::backend::RawOutput;
use crate::error::{LimitKind, SandboxError};
use crate::limits::{LimitedBuffer, ResourceLimits};

/// Linux SIGXCPU: the CPU-time rlimit was hit.
const SIGXCPU: i32 = 24;

pub(crate) async fn run_child(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    limits: &ResourceLimits,
) -> Result<RawOutput, SandboxError> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| SandboxError::crash(format!("failed to spawn process: {e}")))?;

    if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let bytes = bytes.to_vec();
        tokio::spawn(async move {
            // A child that exits without reading stdin is not an error.
            let _ = pipe.write_all(&bytes).await;
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SandboxError::crash("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SandboxError::crash("stderr was not captured"))?;

    let limit = limits.max_output_bytes;
    let work = async {
        tokio::join!(drain(stdout, limit), drain(stderr, limit), child.wait())
    };
    let finished = tokio::time::timeout(limits.timeout, work).await;

    let (out, err, status) = match finished {
        Ok(parts) => parts,
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(SandboxError::ResourceLimitExceeded {
                limit: LimitKind::WallClock,
                detail: format!("killed after {} ms", limits.timeout.as_millis()),
            });
        }
    };

    let status = status.map_err(|e| SandboxError::crash(format!("failed to wait for process: {e}")))?;
    let out = out.map_err(|e| SandboxError::crash(format!("failed to read stdout: {e}")))?;
    let err = err.map_err(|e| SandboxError::crash(format!("failed to read stderr: {e}")))?;

    let signal = exit_signal(&status);
    if signal == Some(SIGXCPU) {
        return Err(SandboxError::ResourceLimitExceeded {
            limit: LimitKind::Cpu,
            detail: format!("cpu time exceeded {} s", limits.cpu_seconds()),
        });
    }

    Ok(RawOutput {
        exit_code: status.code(),
        signal,
        truncated: out.was_truncated() || err.was_truncated(),
        stdout: out.into_bytes(),
        stderr: err.into_bytes(),
        elapsed: started.elapsed(),
    })
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<LimitedBuffer> {
    let mut buf = LimitedBuffer::new(limit);
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buf);
        }
        buf.write(&chunk[..n]);
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
