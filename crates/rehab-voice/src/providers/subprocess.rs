//! Bounded execution of local engine binaries.

use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Why a piped engine run did not produce output.
#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("process timed out after {} seconds", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("Failed to wait for process: {0}")]
    Wait(io::Error),
    #[error("process exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Failed to write to stdin: {0}")]
    Stdin(io::Error),
}

/// Runs `command` with `input` on stdin and returns its stdout.
///
/// The stdin write and the wait share one deadline, and the child is killed
/// if the deadline passes or the returned future is dropped.
pub(crate) async fn run_piped(
    mut command: Command,
    input: Vec<u8>,
    limit: Duration,
) -> Result<Vec<u8>, RunError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|source| RunError::Spawn { program, source })?;
    let stdin = child.stdin.take();

    // Writing concurrently with the wait keeps a full stdout pipe from
    // stalling the write.
    let feed = async move {
        let Some(mut pipe) = stdin else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin not captured"));
        };
        let written = pipe.write_all(&input).await;
        drop(pipe); // EOF
        written
    };

    let (written, output) =
        match tokio::time::timeout(limit, async { tokio::join!(feed, child.wait_with_output()) })
            .await
        {
            Ok(pair) => pair,
            Err(_) => return Err(RunError::Timeout(limit)),
        };

    let output = output.map_err(RunError::Wait)?;
    if !output.status.success() {
        return Err(RunError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    written.map_err(RunError::Stdin)?;
    Ok(output.stdout)
}
