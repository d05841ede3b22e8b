//! Exposes the command processing logic to the dispatcher.

use crate::utils::errors::BellesubError;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

// Shell used to interpret job command lines
const SHELL: &str = "/bin/sh";

// Upper limit on size of chunks sent down output channel
const OUTPUT_CHUNK_SIZE_BYTES: usize = 1024;

/// Final state of a job's process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Process finished with exit code
    ExitCode(i32),

    /// Process finished with signal
    Signal(i32),

    /// Process overran the per-job timeout and was terminated
    TimedOut,

    /// Process could not be started
    LaunchFailed(String),
}

impl JobStatus {
    /// Only a zero exit code counts as success
    pub fn success(&self) -> bool {
        matches!(self, JobStatus::ExitCode(0))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::ExitCode(c) => write!(f, "exit code {}", c),
            JobStatus::Signal(s) => write!(f, "terminated by signal {}", s),
            JobStatus::TimedOut => f.write_str("timed out"),
            JobStatus::LaunchFailed(e) => write!(f, "failed to launch: {}", e),
        }
    }
}

/// Status and combined stdout/stderr of a finished command
pub(crate) struct ProcessOutput {
    pub status: JobStatus,
    pub output: Vec<u8>,
}

/// Executes a shell command line and waits for it to finish.
///
/// The command runs in its own process group so that a timeout terminates the whole
/// pipeline the shell started, not just the shell. The timeout covers both the shell and
/// any process still holding its stdout or stderr open.
///
/// # Arguments
///
/// * `command`    - Shell command line, passed to `/bin/sh -c`.
/// * `timeout`    - Optional limit on the run time. On expiry the process group gets SIGTERM.
/// * `kill_grace` - Time between SIGTERM and SIGKILL for a process that ignores SIGTERM.
pub(crate) async fn execute_command(
    command: &str,
    timeout: Option<Duration>,
    kill_grace: Duration,
) -> Result<ProcessOutput, BellesubError> {
    // Start process
    let mut child = Command::new(SHELL)
        .arg("-c")
        .arg(command)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let pid = child.id();

    // Setup stream readers
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BellesubError::Worker("Unable to read from stdout stream".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BellesubError::Worker("Unable to read from stderr stream".to_string()))?;
    let (tx_output, mut rx_output) = mpsc::unbounded_channel();
    let stdout_reader = tokio::spawn(forward_stream(stdout, tx_output.clone()));
    let stderr_reader = tokio::spawn(forward_stream(stderr, tx_output));

    let mut output = Vec::new();
    let finished = match timeout {
        None => Some(wait_and_drain(&mut child, &mut rx_output, &mut output).await?),
        Some(limit) => tokio::time::timeout(
            limit,
            wait_and_drain(&mut child, &mut rx_output, &mut output),
        )
        .await
        .ok()
        .transpose()?,
    };

    let status = match finished {
        Some(status) => exit_status(status)?,
        None => {
            log::debug!("Command timed out: {}", command);
            terminate(pid, Signal::SIGTERM)?;
            let drained = tokio::time::timeout(
                kill_grace,
                wait_and_drain(&mut child, &mut rx_output, &mut output),
            )
            .await;
            match drained {
                Ok(res) => {
                    res?;
                }
                Err(_) => {
                    terminate(pid, Signal::SIGKILL)?;
                    child.wait().await?;
                }
            }
            JobStatus::TimedOut
        }
    };

    // Readers are finished unless a process escaped the group and still holds a pipe
    stdout_reader.abort();
    stderr_reader.abort();
    Ok(ProcessOutput { status, output })
}

// Wait for the shell, then collect output until every writer has closed its end
async fn wait_and_drain(
    child: &mut Child,
    rx_output: &mut UnboundedReceiver<Vec<u8>>,
    output: &mut Vec<u8>,
) -> Result<ExitStatus, BellesubError> {
    let status = child.wait().await?;
    while let Some(chunk) = rx_output.recv().await {
        output.extend(chunk);
    }
    Ok(status)
}

/// Read from a process stream and send the output down the channel in chunks
async fn forward_stream<R: AsyncRead + Unpin>(
    mut reader: R,
    tx_output: UnboundedSender<Vec<u8>>,
) -> Result<(), BellesubError> {
    let mut buf = [0u8; OUTPUT_CHUNK_SIZE_BYTES];
    loop {
        let size = reader.read(&mut buf).await?;
        // End of stream
        if size == 0 {
            return Ok(());
        }
        if tx_output.send(buf[..size].to_vec()).is_err() {
            // Nobody is collecting output any more
            return Ok(());
        }
    }
}

// Return exit code or terminating signal
fn exit_status(status: ExitStatus) -> Result<JobStatus, BellesubError> {
    if let Some(s) = status.signal() {
        return Ok(JobStatus::Signal(s));
    }
    if let Some(c) = status.code() {
        return Ok(JobStatus::ExitCode(c));
    }
    Err(BellesubError::Worker(
        "Process finished without an exit code or signal".to_string(),
    ))
}

/// Send `signal` to the process group led by `pid`. A group that already exited is not an error.
fn terminate(pid: Option<u32>, signal: Signal) -> Result<(), BellesubError> {
    let Some(pid) = pid else {
        return Ok(());
    };
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(BellesubError::Worker(format!(
            "Error sending {:?} signal: {:?}",
            signal, e
        ))),
    }
}
