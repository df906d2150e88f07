// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Declaration
//!
//! Declares the exchanges, queues, and bindings a consumer session relies on,
//! in that order: every exchange exists before any queue is bound to it, and
//! every binding exists before consuming starts. There are no backward
//! transitions; a failed declaration surfaces as a transport-level failure.

use crate::{
    errors::Error,
    exchange::ExchangeSpec,
    fields,
    queue::{Binding, QueueSpec},
};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel,
};
use std::collections::HashMap;
use tracing::{debug, error};

/// Declares the given topology on the channel.
///
/// # Parameters
/// * `channel` - The channel the consumer session owns
/// * `exchanges` - Exchange specifications keyed by exchange name
/// * `queues` - Queue specifications keyed by queue name
/// * `bindings` - Bindings to set up once their queue and exchange exist
///
/// # Returns
/// Ok(()) once every declaration was confirmed, or `Error::Connection` on
/// the first failed declaration.
pub async fn declare(
    channel: &Channel,
    exchanges: &HashMap<String, ExchangeSpec>,
    queues: &HashMap<String, QueueSpec>,
    bindings: &[Binding],
) -> Result<(), Error> {
    declare_exchanges(channel, exchanges).await?;
    declare_queues(channel, queues).await?;
    bind_queues(channel, bindings).await
}

async fn declare_exchanges(
    channel: &Channel,
    exchanges: &HashMap<String, ExchangeSpec>,
) -> Result<(), Error> {
    for (name, spec) in exchanges {
        debug!("declaring exchange: {}", name);

        channel
            .exchange_declare(
                name,
                spec.kind.lapin_kind(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: spec.durable,
                    auto_delete: spec.auto_delete,
                    internal: false,
                    nowait: false,
                },
                fields::field_table(&spec.arguments),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = name.as_str(),
                    "error to declare the exchange"
                );
                Error::connection(format!("failed to declare exchange `{name}`: {err}"))
            })?;

        debug!("exchange: {} was declared", name);
    }

    Ok(())
}

async fn declare_queues(
    channel: &Channel,
    queues: &HashMap<String, QueueSpec>,
) -> Result<(), Error> {
    for (name, spec) in queues {
        debug!("declaring queue: {}", name);

        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    passive: false,
                    durable: spec.durable,
                    exclusive: spec.exclusive,
                    auto_delete: spec.auto_delete,
                    nowait: false,
                },
                fields::field_table(&spec.arguments),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = name.as_str(),
                    "error to declare the queue"
                );
                Error::connection(format!("failed to declare queue `{name}`: {err}"))
            })?;

        debug!("queue: {} was declared", name);
    }

    Ok(())
}

async fn bind_queues(channel: &Channel, bindings: &[Binding]) -> Result<(), Error> {
    for binding in bindings {
        for routing_key in &binding.routing_keys {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue, binding.exchange, routing_key
            );

            channel
                .queue_bind(
                    &binding.queue,
                    &binding.exchange,
                    routing_key,
                    QueueBindOptions { nowait: false },
                    FieldTable::default(),
                )
                .await
                .map_err(|err| {
                    error!(error = err.to_string(), "error to bind queue to exchange");
                    Error::connection(format!(
                        "failed to bind queue `{}` to exchange `{}`: {err}",
                        binding.queue, binding.exchange
                    ))
                })?;
        }
    }

    Ok(())
}
