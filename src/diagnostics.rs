//! Progress and warning reports pushed to whoever drives a compile.
//!
//! Sends never block: the sink is an unbounded channel and a dropped
//! receiver is ignored. Every message is also mirrored into `tracing`.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Progress information.
    Info,
    /// Something was skipped or rewritten; the compile continues.
    Warn,
    /// A module failed.
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
        })
    }
}

/// One report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub level: Level,
    /// Project or module the report concerns.
    pub origin: String,
    /// Human-readable text.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.origin, self.message)
    }
}

/// Cloneable handle used to push diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    origin: String,
    tx: Option<mpsc::UnboundedSender<Diagnostic>>,
}

impl Diagnostics {
    /// A sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Diagnostic>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                origin: String::new(),
                tx: Some(tx),
            },
            rx,
        )
    }

    /// A sink that only logs.
    pub fn silent() -> Self {
        Self::default()
    }

    /// The same sink, attributing reports to `origin`.
    pub fn for_origin(&self, origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            tx: self.tx.clone(),
        }
    }

    /// Report progress.
    pub fn info(&self, message: impl Into<String>) {
        self.emit(Level::Info, message.into());
    }

    /// Report a non-fatal problem.
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Level::Warn, message.into());
    }

    /// Report a failure.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(Level::Error, message.into());
    }

    fn emit(&self, level: Level, message: String) {
        match level {
            Level::Info => info!(origin = %self.origin, "{message}"),
            Level::Warn => warn!(origin = %self.origin, "{message}"),
            Level::Error => error!(origin = %self.origin, "{message}"),
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(Diagnostic {
                level,
                origin: self.origin.clone(),
                message,
            });
        }
    }
}
