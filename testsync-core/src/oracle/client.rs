//! Oracle Client Module
//!
//! Invokes the external oracle as a subprocess: the prompt is written to
//! the child's stdin and the reply is read from its stdout. Each call is
//! stateless and must embed all context needed for that decision.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during oracle calls
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle executable not found at {0}")]
    NotFound(PathBuf),

    #[error("Oracle execution failed: {0}")]
    ExecFailed(String),

    #[error("Empty reply from oracle")]
    EmptyReply,

    #[error("Invalid reply from oracle: {0}")]
    InvalidReply(String),

    #[error("Oracle call timed out after {0} seconds")]
    TimedOut(u64),

    #[error("Oracle integration not available")]
    NotAvailable,
}

/// A stateless text-to-text analysis function.
///
/// The engine only ever validates the *structure* of a reply, never its
/// content; implementations may be a model CLI, a network call, or a
/// scripted test double.
pub trait Oracle {
    fn invoke(&self, prompt: &str) -> Result<String, OracleError>;
}

/// How the oracle is reached
#[derive(Debug, Clone)]
pub enum OracleMode {
    /// Run an executable, prompt on stdin, reply on stdout
    CommandLine { path: PathBuf },
    /// Oracle disabled; every call fails with `NotAvailable`
    Disabled,
}

impl Default for OracleMode {
    fn default() -> Self {
        OracleMode::Disabled
    }
}

/// Oracle client with a bounded call duration
#[derive(Debug, Clone)]
pub struct OracleClient {
    mode: OracleMode,
    timeout: Duration,
}

impl OracleClient {
    /// Create a client with an auto-detected mode and the given timeout
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            mode: Self::detect_mode(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Create a client with a specific mode
    pub fn with_mode(mode: OracleMode, timeout_secs: u64) -> Self {
        Self {
            mode,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Build a client from the config's mode string:
    /// "auto", "disabled", or an explicit executable path
    pub fn from_mode_str(mode: &str, timeout_secs: u64) -> Self {
        let mode = match mode {
            "auto" => Self::detect_mode(),
            "disabled" => OracleMode::Disabled,
            path => OracleMode::CommandLine {
                path: PathBuf::from(path),
            },
        };
        Self::with_mode(mode, timeout_secs)
    }

    /// Detect the best available oracle mode
    fn detect_mode() -> OracleMode {
        if let Ok(cmd) = std::env::var("TESTSYNC_ORACLE_CMD") {
            if !cmd.is_empty() {
                return OracleMode::CommandLine {
                    path: PathBuf::from(cmd),
                };
            }
        }

        if let Some(path) = Self::find_on_path("testsync-oracle") {
            return OracleMode::CommandLine { path };
        }

        OracleMode::Disabled
    }

    /// Find an executable on the PATH
    fn find_on_path(name: &str) -> Option<PathBuf> {
        if let Ok(output) = Command::new("which").arg(name).output() {
            if output.status.success() {
                let path_str = String::from_utf8_lossy(&output.stdout);
                let path = PathBuf::from(path_str.trim());
                if path.exists() {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Check if the oracle is reachable
    pub fn is_available(&self) -> bool {
        match &self.mode {
            OracleMode::CommandLine { path } => path.exists(),
            OracleMode::Disabled => false,
        }
    }

    /// Get a description of the current mode
    pub fn mode_description(&self) -> String {
        match &self.mode {
            OracleMode::CommandLine { path } => format!("Command line ({})", path.display()),
            OracleMode::Disabled => "Disabled".to_string(),
        }
    }

    fn invoke_command(&self, path: &PathBuf, prompt: &str) -> Result<String, OracleError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OracleError::ExecFailed(e.to_string()))?;

        // Write the prompt on a separate thread: a child that fills its
        // stdout before draining stdin would otherwise block this write past
        // the pipe buffer, and the deadline below could never fire
        let stdin = child.stdin.take();
        let prompt_bytes = prompt.as_bytes().to_vec();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // A child that exits without reading gets EPIPE; that is
                // judged by its exit status, not here
                let _ = stdin.write_all(&prompt_bytes);
                // Drop closes the pipe so the child sees EOF
            }
        });

        // Read stdout on a separate thread so a large reply cannot fill the
        // pipe buffer and block the child forever
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| OracleError::ExecFailed("No stdout handle".to_string()))?;
        let reader = thread::spawn(move || {
            let mut reply = String::new();
            stdout.read_to_string(&mut reply).map(|_| reply)
        });

        // Poll for exit with a deadline
        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        // Killing the child closes its pipes, unblocking
                        // the writer
                        let _ = writer.join();
                        return Err(OracleError::TimedOut(self.timeout.as_secs()));
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(OracleError::ExecFailed(e.to_string())),
            }
        };

        let _ = writer.join();

        let reply = reader
            .join()
            .map_err(|_| OracleError::ExecFailed("Reply reader panicked".to_string()))?
            .map_err(|e| OracleError::ExecFailed(e.to_string()))?;

        if !status.success() {
            let mut stderr_text = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                let _ = stderr.read_to_string(&mut stderr_text);
            }
            return Err(OracleError::ExecFailed(format!(
                "Exit code: {:?}, stderr: {}",
                status.code(),
                stderr_text.trim()
            )));
        }

        if reply.trim().is_empty() {
            return Err(OracleError::EmptyReply);
        }

        Ok(reply)
    }
}

impl Oracle for OracleClient {
    fn invoke(&self, prompt: &str) -> Result<String, OracleError> {
        match &self.mode {
            OracleMode::CommandLine { path } => {
                if !path.exists() {
                    return Err(OracleError::NotFound(path.clone()));
                }
                self.invoke_command(path, prompt)
            }
            OracleMode::Disabled => Err(OracleError::NotAvailable),
        }
    }
}
