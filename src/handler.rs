// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handler Seam
//!
//! Application code consumes messages through the [`ConsumerHandler`] trait.
//! The handler reports its outcome as a tagged result instead of signalling
//! through panics: returning `Ok(())` acknowledges the message, the
//! [`HandlerError`] variants request a requeue, a discard, or a consumer
//! halt. Failures the handler did not anticipate travel as
//! [`HandlerError::Unexpected`] and are escalated to a halt at the dispatch
//! boundary.

use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of handling one message.
pub type HandlerResult = Result<(), HandlerError>;

/// Negative outcomes a handler can report.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The message was not processed and should be redelivered later
    #[error("message processing failed, requeue requested")]
    Requeue,

    /// The message was not processed and should be discarded
    #[error("message processing failed, message dropped")]
    Discard,

    /// The consumer should stop after this message.
    ///
    /// The message itself is requeued for another consumer.
    #[error("consumer halt requested (exit code {exit_code})")]
    Halt {
        exit_code: i32,
        reason: Option<String>,
    },

    /// The handler failed in a way it did not anticipate.
    ///
    /// The dispatch boundary escalates this to a halt with exit code 1,
    /// because the consumer's internal state is no longer trustworthy.
    #[error("unexpected handler failure: {0}")]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps an arbitrary error as an unexpected handler failure.
    pub fn unexpected(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HandlerError::Unexpected(err.into())
    }
}

/// Processes messages delivered to a consumer session.
///
/// Handlers are invoked one message at a time on the session's event loop;
/// an in-flight invocation is never interrupted and never runs concurrently
/// with another.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    /// Handles one message and reports the acknowledgment outcome.
    async fn handle(&self, message: Message) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> ConsumerHandler for FnHandler<F>
where
    F: Fn(Message) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, message: Message) -> HandlerResult {
        (self.0)(message)
    }
}

/// Normalizes a plain function into a [`ConsumerHandler`].
///
/// Lets callers register a closure where a full handler type would be
/// overkill.
pub fn handler_fn<F>(f: F) -> Arc<dyn ConsumerHandler>
where
    F: Fn(Message) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageSchema;
    use serde_json::json;

    #[tokio::test]
    async fn handler_fn_invokes_closure() {
        let handler = handler_fn(|message| {
            if message.topic() == "bad.topic" {
                Err(HandlerError::Discard)
            } else {
                Ok(())
            }
        });

        let schema = Arc::new(MessageSchema::base());
        let good = Message::new("good.topic", json!(null), schema.clone());
        let bad = Message::new("bad.topic", json!(null), schema);

        assert!(handler.handle(good).await.is_ok());
        assert!(matches!(
            handler.handle(bad).await,
            Err(HandlerError::Discard)
        ));
    }

    #[test]
    fn unexpected_wraps_any_error() {
        let err = HandlerError::unexpected("database exploded");
        assert!(err.to_string().contains("database exploded"));
    }
}
