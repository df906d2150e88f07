// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Per-Delivery Message Processing
//!
//! This module turns one raw delivery into a typed [`Message`], hands it to
//! the application handler, and maps the outcome to an acknowledgment
//! decision.
//!
//! Deliveries that cannot be decoded, parsed, or validated are poison: they
//! are rejected without requeue and without ever reaching the handler, since
//! a structurally invalid message fails identically on redelivery. Retention
//! of poison messages is the broker's job via a dead-letter exchange.

use crate::{
    errors::Error,
    fields,
    handler::{ConsumerHandler, HandlerError, HandlerResult},
    message::{Message, SchemaRegistry, SCHEMA_HEADER, SCHEMA_VERSION_HEADER},
    otel,
};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    protocol::basic::AMQPProperties,
    Channel,
};
use opentelemetry::{
    global,
    trace::{Span, Status},
};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What the consume loop should do after a delivery was processed.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Keep consuming
    Continue,
    /// Stop the loop and close the connection
    Halt {
        exit_code: i32,
        reason: Option<String>,
    },
}

/// Acknowledgment decision for one delivery.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decision {
    Ack,
    Nack { requeue: bool },
    /// Negatively acknowledge every unacknowledged delivery on the channel,
    /// this one included
    NackAll,
}

/// Maps a handler outcome to an acknowledgment decision and a loop
/// disposition.
///
/// An unexpected handler failure bulk-nacks everything unacknowledged on the
/// channel and halts with exit code 1: once the handler misbehaved, none of
/// the in-flight work can be trusted to have been tracked correctly.
pub(crate) fn decide(outcome: HandlerResult) -> (Decision, Disposition) {
    match outcome {
        Ok(()) => (Decision::Ack, Disposition::Continue),
        Err(HandlerError::Requeue) => (Decision::Nack { requeue: true }, Disposition::Continue),
        Err(HandlerError::Discard) => (Decision::Nack { requeue: false }, Disposition::Continue),
        Err(HandlerError::Halt { exit_code, reason }) => (
            Decision::Nack { requeue: true },
            Disposition::Halt { exit_code, reason },
        ),
        Err(HandlerError::Unexpected(err)) => (
            Decision::NackAll,
            Disposition::Halt {
                exit_code: 1,
                reason: Some(err.to_string()),
            },
        ),
    }
}

/// Decodes a raw body using the declared content encoding.
///
/// UTF-8 is the canonical encoding and the default when none is declared;
/// ASCII is accepted as its subset. Anything else, or bytes that do not
/// match the declaration, is poison.
pub(crate) fn decode_body(data: &[u8], content_encoding: Option<&str>) -> Result<String, String> {
    let encoding = content_encoding.unwrap_or("utf-8");

    if encoding.eq_ignore_ascii_case("ascii") || encoding.eq_ignore_ascii_case("us-ascii") {
        if !data.is_ascii() {
            return Err("body is not valid ascii".to_owned());
        }
    } else if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
        return Err(format!("unsupported content encoding `{encoding}`"));
    }

    String::from_utf8(data.to_vec()).map_err(|err| format!("body is not valid utf-8: {err}"))
}

/// Builds a validated [`Message`] out of the parts of a delivery.
///
/// The returned error is a poison reason: the frame must be rejected without
/// requeue and the handler must not run.
pub(crate) fn build_message(
    routing_key: &str,
    properties: &AMQPProperties,
    data: &[u8],
    registry: &SchemaRegistry,
) -> Result<Message, String> {
    let encoding = properties.content_encoding().as_ref().map(|s| s.as_str());
    let text = decode_body(data, encoding)?;

    let body: Value =
        serde_json::from_str(&text).map_err(|err| format!("body is not valid json: {err}"))?;

    let headers = properties
        .headers()
        .as_ref()
        .map(fields::json_map)
        .unwrap_or_default();

    // Unknown or missing schema names fall back to the base schema
    let schema = match headers.get(SCHEMA_HEADER).and_then(Value::as_str) {
        Some(name) => registry.lookup(name),
        None => registry.base(),
    };
    let schema_version = headers.get(SCHEMA_VERSION_HEADER).and_then(Value::as_i64);

    let mut message = Message::new(routing_key, body, schema).with_headers(headers);
    if let Some(version) = schema_version {
        message = message.with_schema_version(version);
    }

    message
        .validate()
        .map_err(|err| format!("message failed validation: {err}"))?;

    Ok(message)
}

/// Processes one delivery end to end and acknowledges it.
///
/// # Parameters
/// * `channel` - The channel the delivery arrived on, used for bulk nacks
/// * `delivery` - The raw delivery
/// * `handler` - The application handler
/// * `registry` - Schema registry for resolving the schema header
///
/// # Returns
/// The loop disposition, or `Error::Connection` when an acknowledgment could
/// not be sent.
pub(crate) async fn dispatch(
    channel: &Channel,
    delivery: Delivery,
    handler: &Arc<dyn ConsumerHandler>,
    registry: &SchemaRegistry,
) -> Result<Disposition, Error> {
    let topic = delivery.routing_key.to_string();

    let message = match build_message(&topic, &delivery.properties, &delivery.data, registry) {
        Ok(message) => message,
        Err(reason) => {
            warn!(
                topic = topic.as_str(),
                reason = reason.as_str(),
                "poison message rejected without requeue"
            );
            delivery
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: false,
                })
                .await
                .map_err(ack_failure)?;
            return Ok(Disposition::Continue);
        }
    };

    debug!(topic = topic.as_str(), "received message");
    let tracer = global::tracer("amqp consumer");
    let mut span = otel::consumer_span(&tracer, &delivery.properties, &topic);

    let outcome = handler.handle(message).await;
    let (decision, disposition) = decide(outcome);

    match &disposition {
        Disposition::Continue => span.set_status(Status::Ok),
        Disposition::Halt { reason, .. } => {
            error!(
                topic = topic.as_str(),
                reason = reason.as_deref().unwrap_or("requested by handler"),
                "handler halted the consumer"
            );
            span.set_status(Status::Error {
                description: Cow::from("consumer halted"),
            });
        }
    }

    match decision {
        Decision::Ack => delivery
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(ack_failure)?,
        Decision::Nack { requeue } => delivery
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(ack_failure)?,
        Decision::NackAll => channel
            .basic_nack(
                0,
                BasicNackOptions {
                    multiple: true,
                    requeue: true,
                },
            )
            .await
            .map_err(ack_failure)?,
    }

    Ok(disposition)
}

fn ack_failure(err: lapin::Error) -> Error {
    error!(error = err.to_string(), "error acknowledging message");
    Error::connection(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockConsumerHandler;
    use crate::message::MessageSchema;
    use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
    use lapin::BasicProperties;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn registry_with_string_schema() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry.register(MessageSchema::new("test.string", 1, |body| {
            body.as_str()
                .map(|_| ())
                .ok_or_else(|| "body must be a string".to_owned())
        }));
        registry
    }

    fn properties_with_schema(name: &str) -> BasicProperties {
        let mut headers = BTreeMap::<ShortString, AMQPValue>::default();
        headers.insert(
            ShortString::from(SCHEMA_HEADER),
            AMQPValue::LongString(LongString::from(name)),
        );
        headers.insert(
            ShortString::from(SCHEMA_VERSION_HEADER),
            AMQPValue::LongLongInt(3),
        );
        BasicProperties::default()
            .with_content_encoding(ShortString::from("utf-8"))
            .with_headers(FieldTable::from(headers))
    }

    #[test]
    fn decode_defaults_to_utf8() {
        let text = decode_body("\"test body unicode é à ç\"".as_bytes(), None).unwrap();
        assert_eq!(text, "\"test body unicode é à ç\"");
    }

    #[test]
    fn decode_rejects_declared_ascii_with_non_ascii_bytes() {
        let err = decode_body("\"é\"".as_bytes(), Some("ascii")).unwrap_err();
        assert!(err.contains("ascii"));
    }

    #[test]
    fn decode_rejects_unknown_encodings() {
        let err = decode_body(b"\"body\"", Some("utf-16")).unwrap_err();
        assert!(err.contains("unsupported content encoding"));
    }

    #[test]
    fn build_message_resolves_schema_and_version() {
        let registry = registry_with_string_schema();
        let message = build_message(
            "test.topic",
            &properties_with_schema("test.string"),
            b"\"test body\"",
            &registry,
        )
        .unwrap();

        assert_eq!(message.topic(), "test.topic");
        assert_eq!(message.body(), &json!("test body"));
        assert_eq!(message.schema().name(), "test.string");
        assert_eq!(message.schema_version(), 3);
    }

    #[test]
    fn build_message_falls_back_to_base_schema() {
        let registry = SchemaRegistry::new();
        let message = build_message(
            "test.topic",
            &properties_with_schema("never.registered"),
            b"\"test body\"",
            &registry,
        )
        .unwrap();
        assert_eq!(message.schema().name(), "base.message");
    }

    #[test]
    fn non_json_body_is_poison() {
        let registry = SchemaRegistry::new();
        let err = build_message(
            "test.topic",
            &properties_with_schema("test.string"),
            b"plain string",
            &registry,
        )
        .unwrap_err();
        assert!(err.contains("not valid json"));
    }

    #[test]
    fn validation_failure_is_poison() {
        let registry = registry_with_string_schema();
        let err = build_message(
            "test.topic",
            &properties_with_schema("test.string"),
            b"42",
            &registry,
        )
        .unwrap_err();
        assert!(err.contains("failed validation"));
    }

    #[test]
    fn success_acks_and_continues() {
        let (decision, disposition) = decide(Ok(()));
        assert_eq!(decision, Decision::Ack);
        assert_eq!(disposition, Disposition::Continue);
    }

    #[test]
    fn requeue_and_discard_map_to_single_nacks() {
        let (decision, disposition) = decide(Err(HandlerError::Requeue));
        assert_eq!(decision, Decision::Nack { requeue: true });
        assert_eq!(disposition, Disposition::Continue);

        let (decision, disposition) = decide(Err(HandlerError::Discard));
        assert_eq!(decision, Decision::Nack { requeue: false });
        assert_eq!(disposition, Disposition::Continue);
    }

    #[test]
    fn halt_requeues_and_stops() {
        let (decision, disposition) = decide(Err(HandlerError::Halt {
            exit_code: 0,
            reason: None,
        }));
        assert_eq!(decision, Decision::Nack { requeue: true });
        assert_eq!(
            disposition,
            Disposition::Halt {
                exit_code: 0,
                reason: None
            }
        );
    }

    #[test]
    fn unexpected_error_bulk_nacks_and_halts_with_exit_code_one() {
        let (decision, disposition) = decide(Err(HandlerError::unexpected("database exploded")));
        assert_eq!(decision, Decision::NackAll);
        match disposition {
            Disposition::Halt { exit_code, reason } => {
                assert_eq!(exit_code, 1);
                assert!(reason.unwrap().contains("database exploded"));
            }
            other => panic!("expected halt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_handler_outcome_drives_the_decision() {
        let mut handler = MockConsumerHandler::new();
        handler
            .expect_handle()
            .returning(|_| Err(HandlerError::Requeue));

        let registry = registry_with_string_schema();
        let message = build_message(
            "test.topic",
            &properties_with_schema("test.string"),
            b"\"test body\"",
            &registry,
        )
        .unwrap();

        let outcome = handler.handle(message).await;
        let (decision, _) = decide(outcome);
        assert_eq!(decision, Decision::Nack { requeue: true });
    }
}
