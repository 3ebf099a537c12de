//! Error types for the assistant session and automation bridge.

/// Top-level error type for the assistant runtime.
#[derive(Debug, thiserror::Error)]
pub enum GhostwireError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Session controller error (actor stopped, invalid command).
    #[error("session error: {0}")]
    Session(String),

    /// Inference process error.
    #[error("runner error: {0}")]
    Runner(#[from] RunError),

    /// State file watcher error.
    #[error("watcher error: {0}")]
    Watcher(String),

    /// Host protocol error.
    #[error("host error: {0}")]
    Host(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<notify::Error> for GhostwireError {
    fn from(e: notify::Error) -> Self {
        Self::Watcher(e.to_string())
    }
}

/// Failure of one inference subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// The executable or script could not be found or started.
    #[error("unable to launch inference process: {0}")]
    LaunchFailed(String),

    /// The process ran but exited unsuccessfully.
    #[error("{}", describe_exit(*.code, .stderr))]
    NonZeroExit {
        /// Exit status code (`-1` when terminated by a signal).
        code: i32,
        /// Trimmed stderr output, possibly empty.
        stderr: String,
    },
}

impl RunError {
    /// Text shown to the user in an inline error bubble.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Stderr is surfaced verbatim when present, otherwise the bare status.
fn describe_exit(code: i32, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        format!("inference process exited with status {code}")
    } else {
        stderr.trim().to_owned()
    }
}

/// Non-fatal failure of one UI action; recorded in the automation history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The click target lies inside the assistant's own footprint.
    #[error("refused: {0} targets the assistant's own area")]
    Refused(String),

    /// A click was requested without a position.
    #[error("{0} needs a position")]
    MissingPosition(String),

    /// Text entry was requested without a value.
    #[error("{0} needs a value")]
    MissingValue(String),

    /// The action kind is not supported.
    #[error("unsupported action {0}")]
    Unsupported(String),

    /// The input driver reported an error.
    #[error("input driver failed: {0}")]
    Driver(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GhostwireError>;
