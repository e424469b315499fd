//! External process stage
//!
//! Runs one executable under a hard wall-clock limit. The child gets its own
//! process group so that a timeout kills everything it spawned. Stdout and
//! stderr are drained on helper threads, which are joined before returning.
//!
//! The expected artifact is deleted before spawning, so a leftover file from
//! an earlier run never counts as output. Once the child exits, whatever is
//! still running in its group is killed, and pipe draining is bounded by the
//! deadline.
//!
//! A run is classified in this order:
//! 1. spawn failure: `Failed`
//! 2. deadline passed: `TimedOut`
//! 3. success marker configured but absent from stdout: `TimedOut`
//! 4. non-zero exit: `Failed`
//! 5. expected artifact absent: `Failed`
//! 6. otherwise `Completed`
//!
//! Stages never retry.

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use std::{fs, io};

/// Lines of stderr kept in failure diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// Pipe draining may run this long past the deadline after the group is killed
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Predicate over captured stdout
pub type SuccessMarker = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Output of a stage that finished cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub artifact: Option<PathBuf>,
    pub elapsed: Duration,
    pub stdout: String,
    pub stderr: String,
}

/// Why a stage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A stale artifact could not be removed
    Setup,
    Spawn,
    ExitStatus,
    MissingArtifact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed(StageReport),
    TimedOut { elapsed: Duration },
    Failed { kind: FailureKind, diagnostic: String },
}

/// One external executable with its arguments and limits
pub struct ProcessStage {
    name: String,
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
    artifact: Option<PathBuf>,
    marker: Option<SuccessMarker>,
    poll_interval: Duration,
}

impl fmt::Debug for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessStage")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .field("artifact", &self.artifact)
            .field("marker", &self.marker.is_some())
            .finish()
    }
}

impl ProcessStage {
    /// Creates a stage with a one hour default limit
    pub fn new(name: impl Into<String>, program: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(3600),
            artifact: None,
            marker: None,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// File that must exist after a clean exit
    pub fn expect_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact = Some(path.into());
        self
    }

    /// Stdout predicate that must hold after a clean exit
    pub fn success_marker(mut self, marker: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.marker = Some(Box::new(marker));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// Runs the process to completion or timeout
    pub fn run(&self) -> StageOutcome {
        tracing::debug!(
            stage = %self.name,
            program = ?self.program,
            args = ?self.args,
            timeout_secs = self.timeout.as_secs(),
            "Starting stage"
        );

        if let Some(path) = &self.artifact {
            if let Err(e) = remove_stale(path) {
                return StageOutcome::Failed {
                    kind: FailureKind::Setup,
                    diagnostic: format!("Cannot remove stale {}: {}", path.display(), e),
                };
            }
        }

        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return StageOutcome::Failed {
                    kind: FailureKind::Spawn,
                    diagnostic: format!(
                        "Failed to spawn {}: {}",
                        self.program.to_string_lossy(),
                        e
                    ),
                }
            }
        };

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let deadline = start + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    kill_group(child.id());
                    break Ok(Some(status));
                }
                Ok(None) if Instant::now() >= deadline => {
                    kill_child(&mut child);
                    break Ok(None);
                }
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => {
                    kill_child(&mut child);
                    break Err(e);
                }
            }
        };

        let drain_deadline = deadline.max(Instant::now()) + DRAIN_GRACE;
        let stdout = self.collect(stdout_reader, drain_deadline);
        let stderr = self.collect(stderr_reader, drain_deadline);
        let elapsed = start.elapsed();

        let outcome = match status {
            Err(e) => StageOutcome::Failed {
                kind: FailureKind::ExitStatus,
                diagnostic: format!("Failed to wait for {}: {}", self.name, e),
            },
            Ok(None) => StageOutcome::TimedOut { elapsed },
            Ok(Some(_)) if self.marker.as_ref().is_some_and(|m| !m(stdout.as_str())) => {
                StageOutcome::TimedOut { elapsed }
            }
            Ok(Some(status)) if !status.success() => StageOutcome::Failed {
                kind: FailureKind::ExitStatus,
                diagnostic: format!("{} exited with {}: {}", self.name, status, tail(&stderr)),
            },
            Ok(Some(_)) => match &self.artifact {
                Some(path) if !path.exists() => StageOutcome::Failed {
                    kind: FailureKind::MissingArtifact,
                    diagnostic: format!(
                        "{} exited cleanly but did not produce {}",
                        self.name,
                        path.display()
                    ),
                },
                artifact => StageOutcome::Completed(StageReport {
                    artifact: artifact.clone(),
                    elapsed,
                    stdout,
                    stderr,
                }),
            },
        };

        match &outcome {
            StageOutcome::Completed(_) => {
                tracing::debug!(
                    stage = %self.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Stage completed"
                )
            }
            StageOutcome::TimedOut { .. } => {
                tracing::warn!(
                    stage = %self.name,
                    elapsed_secs = elapsed.as_secs(),
                    "Stage timed out"
                )
            }
            StageOutcome::Failed { diagnostic, .. } => {
                tracing::debug!(stage = %self.name, %diagnostic, "Stage failed")
            }
        }

        outcome
    }

    /// Waits for a drain thread until `deadline`; output still pending after
    /// that is dropped
    fn collect(&self, reader: Option<Receiver<String>>, deadline: Instant) -> String {
        let reader = match reader {
            Some(reader) => reader,
            None => return String::new(),
        };

        let wait = deadline.saturating_duration_since(Instant::now());
        match reader.recv_timeout(wait) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(stage = %self.name, "Output pipe still open past the deadline");
                String::new()
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Sends SIGKILL to the process group led by `pgid`
fn kill_group(pgid: u32) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", pgid)])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    #[cfg(not(unix))]
    let _ = pgid;
}

/// Kills the child's whole group, then the child, then reaps it
fn kill_child(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
