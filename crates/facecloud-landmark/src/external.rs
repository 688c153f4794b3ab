use std::io::{BufWriter, Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use facecloud_3d::io::xyz::{format_xyz, XyzError};
use facecloud_3d::pointcloud::PointCloud;

use crate::parser::parse_locator_output;
use crate::{Landmark, LandmarkLocator, LocatorError};

/// Default time a locator program may run before it is killed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of runs before a failing program is given up on.
const MAX_ATTEMPTS: usize = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Locates the landmark by running an external program.
///
/// The cloud is written to a temporary file whose path is passed as the last argument of the
/// program. The standard output of the program is parsed with [`parse_locator_output`].
///
/// Spawn failures, I/O errors and timeouts are retried once. If the second run fails too, the
/// landmark is reported as not found. A program exiting with a non-zero status, or printing
/// something that cannot be parsed, is not retried.
#[derive(Debug, Clone)]
pub struct ExternalLocator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

/// Kills and reaps the child when dropped.
///
/// On unix the child leads its own process group and the whole group is killed, so that
/// background processes it started cannot keep its stdout open.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    #[cfg(unix)]
    fn drop(&mut self) {
        // the child leads its own group, see `process_group(0)` in `run_once`
        let pgid = self.0.id() as libc::pid_t;
        // SAFETY: kill only sends a signal and has no memory safety requirements
        let ret = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if ret != 0 {
            let e = std::io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::ESRCH) {
                log::warn!("failed to kill locator process group {pgid}: {e}");
            }
        }
        // reap to avoid zombies
        let _ = self.0.wait();
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            if let Err(e) = self.0.kill() {
                log::warn!("failed to kill locator process {}: {e}", self.0.id());
            }
        }
        let _ = self.0.wait();
    }
}

/// Outcome of a single run of the program.
enum RunOutcome {
    Output(String),
    Failed(ExitStatus),
}

impl ExternalLocator {
    /// Create a locator running `program <cloud file>`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the arguments passed before the cloud file.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the time the program may run before it is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the program run by the locator.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Get the timeout of a single run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn run_once(&self, pointcloud: &PointCloud) -> Result<RunOutcome, LocatorError> {
        let mut file = tempfile::Builder::new()
            .prefix("facecloud-")
            .suffix(".xyz")
            .tempfile()?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            format_xyz(&mut writer, pointcloud).map_err(|e| match e {
                XyzError::Io(e) => LocatorError::Io(e),
                other => LocatorError::Io(std::io::Error::other(other)),
            })?;
            writer.flush()?;
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| LocatorError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;
        let mut guard = ChildGuard(child);

        let mut stdout = guard
            .0
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("locator stdout was not captured"))?;

        // drain stdout concurrently so that a verbose program cannot block on a full pipe
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut output = String::new();
            let res = stdout.read_to_string(&mut output).map(|_| output);
            // the receiver is gone once the run timed out
            let _ = tx.send(res);
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = guard.0.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                return Err(LocatorError::Timeout(self.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        // stdout may outlive the child when it is inherited by a background process
        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = match rx.recv_timeout(remaining) {
            Ok(res) => res?,
            Err(RecvTimeoutError::Timeout) => return Err(LocatorError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(std::io::Error::other("locator stdout reader panicked").into())
            }
        };

        if !status.success() {
            return Ok(RunOutcome::Failed(status));
        }

        Ok(RunOutcome::Output(output))
    }
}

impl LandmarkLocator for ExternalLocator {
    fn locate(&self, pointcloud: &PointCloud) -> Result<Option<Landmark>, LocatorError> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.run_once(pointcloud) {
                Ok(RunOutcome::Output(output)) => {
                    let landmark = parse_locator_output(&output);
                    if landmark.is_none() {
                        log::warn!(
                            "could not parse the output of {}: {:?}",
                            self.program.display(),
                            output
                        );
                    }
                    return Ok(landmark);
                }
                Ok(RunOutcome::Failed(status)) => {
                    log::warn!("{} exited with {status}", self.program.display());
                    return Ok(None);
                }
                Err(e) => {
                    log::warn!(
                        "locator run {attempt}/{MAX_ATTEMPTS} of {} failed: {e}",
                        self.program.display()
                    );
                }
            }
        }

        log::warn!(
            "giving up on {} after {MAX_ATTEMPTS} attempts",
            self.program.display()
        );
        Ok(None)
    }
}
