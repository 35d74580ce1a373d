//! Error kinds for lifecycle and configuration operations.
//!
//! The logging fast path (`TraceLog::log_event`) never returns or reports
//! errors; it silently drops events when tracing is off, a master eviction
//! is in progress, or no chunk can be obtained. These variants cover the
//! synchronous lifecycle/configuration surface only.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum PhosphorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PhosphorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            PhosphorError::InvalidArgument("bad mode".into()).to_string(),
            "invalid argument: bad mode"
        );
        assert_eq!(
            PhosphorError::IllegalState("enabled".into()).to_string(),
            "illegal state: enabled"
        );
        assert_eq!(
            PhosphorError::ResourceExhausted("fixed buffer full".into()).to_string(),
            "resource exhausted: fixed buffer full"
        );
    }
}
