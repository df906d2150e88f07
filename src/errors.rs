// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Session Layer
//!
//! This module provides the error taxonomy for publish and consume operations.
//! Message-level failures (`Validation`, `PublishReturned`) never tear down a
//! connection; `Connection` is only raised after the owning session has been
//! reset to a null-or-usable state.

use thiserror::Error;

/// Represents errors surfaced by the publisher and consumer sessions.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A malformed broker URL or malformed topology specification
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The message body does not conform to its declared schema
    #[error("message failed validation against schema `{schema}`: {reason}")]
    Validation { schema: String, reason: String },

    /// The broker rejected or could not route a published message.
    ///
    /// The session's connection and channel remain usable; the caller may
    /// resend or discard the message.
    #[error("broker returned the message (reply code {reply_code}): {reply_text}")]
    PublishReturned { reply_code: u16, reply_text: String },

    /// The transport was severed or could not be recovered after a single
    /// reconnect attempt. The connection has been closed and discarded.
    #[error("connection error: {reason}")]
    Connection { reason: String },

    /// The consumer loop was halted, either on request from the message
    /// handler or because the handler failed in an unexpected way.
    ///
    /// `exit_code` is intended for process-level reporting; unexpected
    /// handler failures are wrapped with exit code 1.
    #[error("consumer halted with exit code {exit_code}")]
    Halt {
        exit_code: i32,
        reason: Option<String>,
    },
}

impl Error {
    /// Builds a `Connection` error out of any transport-level failure.
    pub(crate) fn connection(err: impl ToString) -> Self {
        Error::Connection {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_wraps_reason() {
        let err = Error::connection("broken pipe");
        assert_eq!(
            err,
            Error::Connection {
                reason: "broken pipe".to_owned()
            }
        );
        assert_eq!(err.to_string(), "connection error: broken pipe");
    }

    #[test]
    fn halt_display_carries_exit_code() {
        let err = Error::Halt {
            exit_code: 1,
            reason: Some("boom".to_owned()),
        };
        assert_eq!(err.to_string(), "consumer halted with exit code 1");
    }
}
