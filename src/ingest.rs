//! Ingestion executor
//!
//! Runs the external ingestion command with the local tarball path as its
//! last argument. Exit code zero is success; anything else, a kill on
//! timeout, or a failure to spawn is a failed ingestion.
//!
//! On unix the command runs in its own process group. On timeout the whole
//! group gets SIGTERM, then SIGKILL after a grace period, so forked helpers
//! holding the output pipes cannot outlive the deadline.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TERMINATION_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// What the ingestion command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Full argv, tarball path included
    pub command: Vec<String>,
    /// `None` if the process was killed or never started
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl IngestOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Exit code as shown in reports
    pub fn return_code(&self) -> String {
        match (self.exit_code, self.timed_out) {
            (_, true) => "killed after timeout".to_string(),
            (Some(code), false) => code.to_string(),
            (None, false) => "none (process did not exit normally)".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestCommand {
    argv: Vec<String>,
    timeout: Duration,
}

impl IngestCommand {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    /// Run the command on `tarball`, capturing both output streams
    pub fn run(&self, tarball: &Path) -> IngestOutcome {
        let mut command = self.argv.clone();
        command.push(tarball.display().to_string());

        let mut outcome = IngestOutcome {
            command,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
        };

        let Some((program, args)) = outcome.command.split_first() else {
            outcome.stderr = "ingestion command is empty".to_string();
            return outcome;
        };

        let start = Instant::now();
        let mut command = Command::new(program);
        command
            .args(args)
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
                tracing::error!(program = %program, error = %e, "cannot spawn ingestion command");
                outcome.stderr = format!("failed to spawn {}: {}", program, e);
                return outcome;
            }
        };

        let (tx, rx) = mpsc::channel();
        let mut readers = 0;
        if let Some(out) = child.stdout.take() {
            spawn_reader(out, Stream::Stdout, tx.clone());
            readers += 1;
        }
        if let Some(err) = child.stderr.take() {
            spawn_reader(err, Stream::Stderr, tx.clone());
            readers += 1;
        }
        drop(tx);

        let deadline = start + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    outcome.exit_code = status.code();
                    break;
                }
                Ok(None) if Instant::now() >= deadline => {
                    tracing::warn!(
                        timeout_seconds = self.timeout.as_secs(),
                        "ingestion command timed out, terminating"
                    );
                    terminate(&mut child);
                    outcome.timed_out = true;
                    break;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    tracing::error!(error = %e, "cannot wait for ingestion command");
                    terminate(&mut child);
                    break;
                }
            }
        }

        // Helpers left behind by the command may still hold the pipes
        let mut killed = outcome.timed_out;
        while readers > 0 {
            let now = Instant::now();
            let wait = if killed {
                TERMINATION_GRACE
            } else {
                deadline.saturating_duration_since(now)
            };
            match rx.recv_timeout(wait) {
                Ok((Stream::Stdout, text)) => {
                    outcome.stdout = text;
                    readers -= 1;
                }
                Ok((Stream::Stderr, text)) => {
                    outcome.stderr = text;
                    readers -= 1;
                }
                Err(RecvTimeoutError::Timeout) if !killed => {
                    tracing::warn!(
                        timeout_seconds = self.timeout.as_secs(),
                        "ingestion command left processes holding its output, killing them"
                    );
                    kill_group(&child);
                    outcome.timed_out = true;
                    killed = true;
                }
                Err(_) => {
                    tracing::warn!("output of ingestion command not collected completely");
                    break;
                }
            }
        }

        tracing::info!(
            exit_code = ?outcome.exit_code,
            timed_out = outcome.timed_out,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ingestion command finished"
        );
        outcome
    }
}

fn spawn_reader(reader: impl Read + Send + 'static, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let _ = tx.send((stream, drain(reader)));
    });
}

/// SIGTERM the command's group, then SIGKILL whatever is left after the grace period
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        signal_group(child, libc::SIGTERM);
        let start = Instant::now();
        while start.elapsed() < TERMINATION_GRACE {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }
    }
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

fn kill_group(child: &Child) {
    #[cfg(unix)]
    signal_group(child, libc::SIGKILL);
    #[cfg(not(unix))]
    let _ = child;
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) {
    // The group id equals the child's pid because of `process_group(0)`
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; a stale group id fails with ESRCH
    unsafe {
        libc::killpg(pgid, signal);
    }
}

fn drain(mut reader: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
