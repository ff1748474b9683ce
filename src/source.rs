use std::{
    io::{self, Read},
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::status::StatusSnapshot;

// How often a running `apcaccess` is checked for completion.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("ups status unavailable: {0}")]
    Unavailable(String),
    #[error("ups status timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed ups status: {0}")]
    Protocol(String),
}

impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> SourceError {
        SourceError::Unavailable(err.to_string())
    }
}

/// Anything able to produce a [`StatusSnapshot`] on demand.
pub trait StatusSource {
    fn status(&self) -> Result<StatusSnapshot, SourceError>;
}

/// Reads the UPS status through the `apcaccess` tool shipped with apcupsd.
///
/// A new process, and so a new connection to the apcupsd network information
/// server, is used for every call.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    address: String,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(
        program: impl Into<String>,
        address: impl Into<String>,
        timeout: Duration,
    ) -> CommandSource {
        CommandSource {
            program: program.into(),
            address: address.into(),
            timeout,
        }
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, SourceError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }

            if Instant::now() >= deadline {
                // The child may have exited in the meantime, nothing to do then.
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::Timeout(self.timeout));
            }

            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

// Pipes are drained while the child runs, otherwise a report larger than the
// pipe buffer blocks the child until the timeout kills it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect_output(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>, SourceError> {
    reader
        .join()
        .map_err(|_| SourceError::Unavailable("output reader panicked".to_string()))?
        .map_err(SourceError::from)
}

impl StatusSource for CommandSource {
    fn status(&self) -> Result<StatusSnapshot, SourceError> {
        tracing::debug!(program = %self.program, address = %self.address, "querying apcupsd");

        let mut child = Command::new(&self.program)
            .arg("-h")
            .arg(&self.address)
            .arg("status")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SourceError::Unavailable(format!("cannot run {}: {}", self.program, e))
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // On timeout the readers are left behind; they finish once the killed
        // child's pipes close.
        let exit = self.wait(&mut child)?;

        let stdout = collect_output(stdout)?;
        let stderr = collect_output(stderr)?;

        if !exit.success() {
            return Err(SourceError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                exit,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let report = String::from_utf8(stdout)
            .map_err(|e| SourceError::Protocol(format!("report is not utf-8: {}", e)))?;

        StatusSnapshot::parse(&report)
    }
}
