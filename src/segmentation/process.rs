//! Running the external Cellpose process.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::settings::{CommandLine, ValidatedSegmentationConfig};
use super::SegmentationBackend;
use crate::error::QuantError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the output drain may lag behind the process exit.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Runs Cellpose from a Python environment on disk.
#[derive(Clone, Debug)]
pub struct CellposeCli {
    config: ValidatedSegmentationConfig,
}

impl CellposeCli {
    pub fn new(config: ValidatedSegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatedSegmentationConfig {
        &self.config
    }
}

impl SegmentationBackend for CellposeCli {
    fn run(&self, dir: &Path) -> Result<(), QuantError> {
        let command = self.config.command(dir);
        let timeout = self.config.config().timeout_secs.map(Duration::from_secs);
        run_command(&command, timeout)
    }
}

/// Spawns `command`, logs its output and waits for it to finish.
///
/// Standard output and error share one pipe, drained by a single logging
/// thread. Only the process exit is waited for: a drain still blocked after
/// [`DRAIN_GRACE`] (say, on a grandchild holding the pipe) is left behind.
///
/// A non-zero exit status is logged and otherwise ignored; the caller finds
/// out through the missing output file.
///
/// # Errors
/// Returns [`QuantError::ExternalProcess`] if the process cannot be started
/// or outlives `timeout`.
pub fn run_command(command: &CommandLine, timeout: Option<Duration>) -> Result<(), QuantError> {
    let program = command.program_name();
    info!(command = %command, "starting segmenter");

    let start_error = |e: std::io::Error| QuantError::ExternalProcess {
        program: program.clone(),
        message: format!("failed to start: {}", e),
    };

    let (output, writer) = std::io::pipe().map_err(start_error)?;
    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(writer.try_clone().map_err(start_error)?)
        .stderr(writer);
    let spawned = process.spawn();
    // the parent's copies of the write end must close for the drain to see EOF
    drop(process);
    let mut child = spawned.map_err(start_error)?;

    let drain = drain(output);

    let status = wait(&mut child, timeout).map_err(|message| QuantError::ExternalProcess {
        program: program.clone(),
        message,
    })?;

    let settle = Instant::now();
    while !drain.is_finished() && settle.elapsed() < DRAIN_GRACE {
        thread::sleep(DRAIN_POLL);
    }
    if drain.is_finished() {
        let _ = drain.join();
    } else {
        debug!(program = %program, "output pipe still open after exit, not waiting for it");
    }

    if status.success() {
        debug!(program = %program, "segmenter finished");
    } else {
        warn!(program = %program, status = %status, "segmenter exited unsuccessfully");
    }
    Ok(())
}

/// Waits for `child`, killing it once `timeout` has elapsed.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, String> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(|e| format!("failed to wait: {}", e));
    };

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    warn!(?timeout, "segmenter timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("timed out after {}s", timeout.as_secs()));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(format!("failed to wait: {}", e)),
        }
    }
}

/// Forwards every line of `stream` to the log until it closes.
fn drain<R: Read + Send + 'static>(stream: R) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.split(b'\n') {
            match line {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let text = text.trim_end_matches('\r');
                    if !text.is_empty() {
                        debug!(target: "roiquant::segmenter", "{}", text);
                    }
                }
                Err(_) => break,
            }
        }
    })
}
