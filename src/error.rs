//! Error types for the ground-station link.
//!
//! All fallible operations in the crate return [`LinkError`]. Errors carry enough
//! context to attribute a failure to a specific command, sequence or
//! configuration field.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: opening the link, writes and reads on it
//! - **Protocol Validation Errors**: invalid color digits, unknown filter letters,
//!   malformed or overlong timed sequences. These are raised before any byte is
//!   written to the link.
//! - **Sequencing Errors**: a second sequence requested while one is running,
//!   a single command cancelled before it was sent
//! - **Configuration Errors**: invalid values or unreadable YAML
//!
//! Telemetry frame rejections are deliberately *not* errors: the decoder returns a
//! [`Rejection`](crate::decoder::Rejection) value and the pipeline keeps going.
//!
//! ## Recovery
//!
//! ```rust
//! use groundlink::LinkError;
//!
//! let error = LinkError::connection_failed("port busy");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::sequence::SequenceRejection;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link and command operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Failed to open link: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Link I/O failed during {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Link is not connected")]
    NotConnected,

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("Invalid color digit {digit}: expected 0-3")]
    InvalidColorDigit { digit: u8 },

    #[error("Unknown filter code '{code}'")]
    InvalidFilterCode { code: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Invalid timed sequence '{input}': {reason}")]
    InvalidSequence { input: String, reason: SequenceRejection },

    #[error("A timed sequence is already running")]
    AlreadyRunning,

    #[error("Command cancelled before it was sent")]
    Cancelled,

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration YAML error")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl LinkError {
    /// Returns whether retrying the whole command or connection may succeed.
    ///
    /// Validation failures never become valid by retrying; transport problems might.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Connection { .. } => true,
            LinkError::Io { .. } => true,
            LinkError::NotConnected => true,
            LinkError::Timeout { .. } => true,
            LinkError::AlreadyRunning => true,
            LinkError::Cancelled => true,
            LinkError::InvalidColorDigit { .. } => false,
            LinkError::InvalidFilterCode { .. } => false,
            LinkError::InvalidCommand { .. } => false,
            LinkError::InvalidSequence { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::ConfigFile { .. } => false,
            LinkError::Yaml(_) => false,
        }
    }

    /// Returns true for errors raised before anything was written to the link.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidColorDigit { .. }
                | LinkError::InvalidFilterCode { .. }
                | LinkError::InvalidCommand { .. }
                | LinkError::InvalidSequence { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Connection { .. } => vec![
                "Check the device is powered and the cable is attached",
                "Verify the port name and baud rate",
                "Close other programs holding the port",
            ],
            LinkError::Io { .. } => vec![
                "Reconnect the link",
                "Check the cable and the device power supply",
            ],
            LinkError::NotConnected => vec!["Connect the link before sending commands"],
            LinkError::Timeout { .. } => vec![
                "Check the device is still responding",
                "Increase the write timeout in the link configuration",
            ],
            LinkError::InvalidColorDigit { .. } => {
                vec!["Use color digits 0 (clear), 1 (red), 2 (green) or 3 (blue)"]
            }
            LinkError::InvalidFilterCode { .. } => vec![
                "Use one of the filter letters N, R, G, B, M, F, P, Y, C",
                "Or use a two-digit color pair such as 13",
            ],
            LinkError::InvalidCommand { .. } => {
                vec!["Send a single non-empty line without embedded line breaks"]
            }
            LinkError::InvalidSequence { .. } => vec![
                "Write sequences as duration+letter pairs, for example 3g5r2b1n",
                "Keep the total duration under the configured limit",
            ],
            LinkError::AlreadyRunning => vec![
                "Wait for the running sequence to finish",
                "Cancel the running sequence first",
            ],
            LinkError::Cancelled => vec!["Issue the command again if it is still wanted"],
            LinkError::Config { .. } | LinkError::Yaml(_) => {
                vec!["Fix the configuration value and reload", "Remove the key to use the default"]
            }
            LinkError::ConfigFile { .. } => {
                vec!["Check the configuration file exists and is readable"]
            }
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        LinkError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for I/O errors with an operation context.
    pub fn io_error(context: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::Io { context: context.into(), source }
    }

    /// Helper constructor for timeouts.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        LinkError::Timeout { operation: operation.into(), duration }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        LinkError::Config { reason: reason.into() }
    }

    /// Helper constructor for rejected raw commands.
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        LinkError::InvalidCommand { reason: reason.into() }
    }

    /// Helper constructor for sequence rejections.
    pub fn invalid_sequence(input: impl Into<String>, reason: SequenceRejection) -> Self {
        LinkError::InvalidSequence { input: input.into(), reason }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io { context: "link".to_string(), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn messages_carry_their_context(
                reason in ".*",
                code in "[A-Za-z0-9]{1,4}",
                digit in 4u8..=255u8,
                millis in 1u64..60_000u64,
            ) {
                let connection = LinkError::connection_failed(reason.clone());
                prop_assert!(connection.to_string().contains(&reason));

                let filter = LinkError::InvalidFilterCode { code: code.clone() };
                prop_assert!(filter.to_string().contains(&code));

                let digit_err = LinkError::InvalidColorDigit { digit };
                prop_assert!(digit_err.to_string().contains(&digit.to_string()));

                let timeout = LinkError::timeout("write", Duration::from_millis(millis));
                prop_assert!(timeout.to_string().starts_with("write timed out"));
            }

            #[test]
            fn source_chain_preserves_the_root_cause(
                base_message in "[a-z ]{1,32}",
                depth in 1usize..5usize,
            ) {
                let mut current: Box<dyn std::error::Error + Send + Sync> =
                    Box::new(std::io::Error::other(base_message.clone()));
                for level in 0..depth {
                    current = Box::new(LinkError::connection_failed_with_source(
                        format!("level {}", level),
                        current,
                    ));
                }

                let mut traversed = 0;
                let mut found = false;
                let mut cursor = std::error::Error::source(current.as_ref());
                while let Some(source) = cursor {
                    traversed += 1;
                    found |= source.to_string().contains(&base_message);
                    cursor = source.source();
                }

                prop_assert_eq!(traversed, depth);
                prop_assert!(found);
            }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LinkError>();

        let error = LinkError::NotConnected;
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let digit = LinkError::InvalidColorDigit { digit: 7 };
        let sequence = LinkError::invalid_sequence("", SequenceRejection::Empty);

        assert!(digit.is_validation());
        assert!(sequence.is_validation());
        assert!(!digit.is_retryable());
        assert!(!sequence.is_retryable());

        assert!(LinkError::connection_failed("busy").is_retryable());
        assert!(!LinkError::NotConnected.is_validation());
    }

    #[test]
    fn every_error_has_suggestions() {
        let errors = [
            LinkError::connection_failed("x"),
            LinkError::NotConnected,
            LinkError::AlreadyRunning,
            LinkError::Cancelled,
            LinkError::config("bad baud"),
            LinkError::InvalidColorDigit { digit: 9 },
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "no suggestions for {error}");
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn io_errors_convert_with_context() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        match LinkError::from(io) {
            LinkError::Io { context, source } => {
                assert_eq!(context, "link");
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("Expected Io error, got {other:?}"),
        }
    }
}
