//! Error taxonomy for policy compilation.
//!
//! Every stage returns a [`CompileError`]. Stages wrap inner failures with
//! [`Scope::scoped`] so the message names the resource, rule, or module
//! that failed, while [`CompileError::root`] still exposes the original
//! category to callers that need to branch on it.

use std::path::PathBuf;

/// Result alias used across the compiler.
pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Errors raised while compiling a project into policy modules.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Malformed config document, conflicting resource options, or an
    /// invalid type/domain/module name.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A permission or application names something the project never declared.
    #[error("undefined {kind} {name}")]
    UndefinedReference {
        /// What kind of thing was referenced (resource, application).
        kind: &'static str,
        /// The name or path that could not be resolved.
        name: String,
    },

    /// The live security database or file-context files are unusable.
    #[error("system policy state unavailable: {0}")]
    SystemState(String),

    /// A rule references a class or permission unknown to the system.
    #[error("invalid rule `{rule}`: {reason}")]
    InvalidRule {
        /// Serialized form of the offending rule.
        rule: String,
        /// Why the rule was rejected.
        reason: String,
    },

    /// A permission declaration is empty or uses an unknown action keyword.
    #[error("invalid permission: {0}")]
    InvalidPermission(String),

    /// The external module-compilation toolchain failed.
    #[error("{tool} failed: {output}")]
    Toolchain {
        /// Toolchain binary that failed.
        tool: String,
        /// Combined diagnostic output of the tool.
        output: String,
    },

    /// Filesystem failure while reading inputs or writing artifacts.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An inner error tagged with the stage or item that produced it.
    #[error("{scope}: {source}")]
    Scoped {
        /// Human-readable description of where the failure happened.
        scope: String,
        /// The wrapped error.
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Build an [`CompileError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, skipping every [`CompileError::Scoped`] layer.
    pub fn root(&self) -> &CompileError {
        let mut current = self;
        while let Self::Scoped { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether this error must abort every module of the build, not just
    /// the one being compiled.
    pub fn is_fatal_for_all_modules(&self) -> bool {
        matches!(self.root(), Self::SystemState(_))
    }
}

/// Attach a scope description to an error as it propagates.
pub trait Scope<T> {
    /// Wrap the error (if any) in [`CompileError::Scoped`] with the given scope.
    fn scoped<F>(self, scope: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> Scope<T> for Result<T> {
    fn scoped<F>(self, scope: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| CompileError::Scoped {
            scope: scope(),
            source: Box::new(source),
        })
    }
}
