//! Error taxonomy for the serialization engine.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Fatal failures surfaced by [`read`](crate::SyncReader::read) and
/// [`read`](crate::AsyncReader::read). The engine never retries: recovery
/// policy belongs to the caller.
#[derive(Debug)]
pub enum EngineError {
    /// The resolver reported an unrecoverable node.
    Resolution(String),
    /// The synchronous reader hit a pending value with no enclosing boundary.
    UnhandledSuspension,
    /// Scope push/pop mismatch or session-id misuse. Indicates an internal
    /// bug in the engine or a collaborator, never user data.
    Protocol(String),
    /// The external value behind a pending resolution itself failed.
    External(anyhow::Error),
}

impl Display for EngineError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Resolution(message) => write!(formatter, "resolution failed: {message}"),
            Self::UnhandledSuspension => {
                write!(formatter, "suspended with no enclosing boundary fallback")
            }
            Self::Protocol(message) => write!(formatter, "protocol violation: {message}"),
            Self::External(cause) => write!(formatter, "external value failed: {cause}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::External(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}
