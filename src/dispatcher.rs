// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Session
//!
//! This module provides the consumer session: a single-owner wrapper around
//! one connection and one channel that declares messaging topology and drives
//! a serialized consume loop.
//!
//! `consume` blocks the calling task for the lifetime of the loop. Every
//! delivery is processed to completion before the next one is looked at; the
//! application handler is never invoked concurrently. The loop ends when the
//! consumers are cancelled, the transport fails, or a handler outcome halts
//! the session.

use crate::{
    channel,
    channel::ConnectionParameters,
    config,
    consumer::{self, Disposition},
    errors::Error,
    exchange::ExchangeSpec,
    handler::ConsumerHandler,
    message::SchemaRegistry,
    queue::{Binding, QueueSpec},
    topology,
};
use futures_util::stream::{self, StreamExt};
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

const REPLY_SUCCESS: u16 = 200;

/// Per-call topology overrides for [`ConsumerSession::consume`].
///
/// Each field that is left `None` falls back to the corresponding
/// process-wide configuration default, independently of the others.
#[derive(Debug, Clone, Default)]
pub struct ConsumeOptions {
    pub exchanges: Option<HashMap<String, ExchangeSpec>>,
    pub queues: Option<HashMap<String, QueueSpec>>,
    pub bindings: Option<Vec<Binding>>,
}

/// A session for consuming messages from declared queues.
///
/// Single-owner and single-threaded by contract; callers that want several
/// consumers run one session per task.
pub struct ConsumerSession {
    url: String,
    parameters: ConnectionParameters,
    connection: Option<Connection>,
    channel: Option<Channel>,
    running: bool,
    registry: Arc<SchemaRegistry>,
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueSpec>,
    bindings: Vec<Binding>,
}

impl ConsumerSession {
    /// Creates a consumer session.
    ///
    /// # Parameters
    /// * `url` - Broker URL; the configured default is used when omitted
    ///
    /// # Returns
    /// A disconnected session, or `Error::Configuration` for a malformed URL.
    pub fn new(url: Option<&str>) -> Result<ConsumerSession, Error> {
        let url = url
            .map(str::to_owned)
            .unwrap_or_else(|| config::get().amqp_url.clone());
        // The parameters never retain credentials; the URL itself is handed
        // to the transport whole at connect time
        let parameters = ConnectionParameters::from_url(&url)?;

        Ok(ConsumerSession {
            url,
            parameters,
            connection: None,
            channel: None,
            running: false,
            registry: SchemaRegistry::global(),
            exchanges: HashMap::default(),
            queues: HashMap::default(),
            bindings: vec![],
        })
    }

    /// Replaces the schema registry, mainly so tests can isolate themselves
    /// from the process-wide one.
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The resolved connection parameters.
    pub fn parameters(&self) -> &ConnectionParameters {
        &self.parameters
    }

    /// Declares topology and consumes messages until stopped or halted.
    ///
    /// Connects, applies the configured prefetch, declares exchanges before
    /// queues before bindings, starts one broker consumer per queue, and then
    /// processes deliveries one at a time through `handler`.
    ///
    /// # Returns
    /// Ok(()) when the loop ended normally. `Error::Halt` when a handler
    /// outcome stopped the session, `Error::Connection` when the transport
    /// failed.
    pub async fn consume(
        &mut self,
        handler: Arc<dyn ConsumerHandler>,
        options: ConsumeOptions,
    ) -> Result<(), Error> {
        let defaults = config::get();
        self.exchanges = options
            .exchanges
            .unwrap_or_else(|| defaults.exchanges.clone());
        self.queues = options.queues.unwrap_or_else(|| defaults.queues.clone());
        self.bindings = options
            .bindings
            .unwrap_or_else(|| defaults.bindings.clone());

        let (connection, channel) = channel::connect(&self.url).await?;
        // Stored up front so that setup failures below tear down through
        // `shutdown` instead of leaking the connection
        self.connection = Some(connection);
        self.channel = Some(channel.clone());

        if let Err(err) = channel
            .basic_qos(defaults.prefetch_count, BasicQosOptions { global: false })
            .await
        {
            error!(error = err.to_string(), "error to apply the prefetch");
            return Err(self.abort(Error::connection(err)).await);
        }

        if let Err(err) =
            topology::declare(&channel, &self.exchanges, &self.queues, &self.bindings).await
        {
            return Err(self.abort(err).await);
        }

        let queues: Vec<String> = self.queues.keys().cloned().collect();
        let mut consumers = Vec::with_capacity(queues.len());
        for queue in &queues {
            debug!("starting consumer on queue: {}", queue);
            let consumer = match channel
                .basic_consume(
                    queue,
                    &format!("{queue}.{}", Uuid::new_v4()),
                    BasicConsumeOptions {
                        no_local: false,
                        no_ack: false,
                        exclusive: false,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await
            {
                Ok(consumer) => consumer,
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        queue = queue.as_str(),
                        "error to create the consumer"
                    );
                    return Err(self.abort(Error::connection(err)).await);
                }
            };
            consumers.push(consumer);
        }

        self.running = true;

        let mut deliveries = stream::select_all(consumers);

        while self.running {
            let Some(next) = deliveries.next().await else {
                debug!("all consumers cancelled, stopping");
                break;
            };

            match next {
                Ok(delivery) => {
                    let outcome =
                        consumer::dispatch(&channel, delivery, &handler, &self.registry).await;
                    match outcome {
                        Ok(Disposition::Continue) => {}
                        Ok(Disposition::Halt { exit_code, reason }) => {
                            return Err(self.abort(Error::Halt { exit_code, reason }).await);
                        }
                        Err(err) => {
                            return Err(self.abort(err).await);
                        }
                    }
                }
                Err(err) => {
                    error!(error = err.to_string(), "error receiving delivery");
                    return Err(self.abort(Error::connection(err)).await);
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Tears the session down and hands the error back to the caller.
    async fn abort(&mut self, error: Error) -> Error {
        self.shutdown().await;
        error
    }

    /// Tears the session down.
    ///
    /// Closes the channel and connection if they are open. Idempotent: safe
    /// to call repeatedly and safe to call on a session that never consumed.
    pub async fn shutdown(&mut self) {
        self.running = false;

        if let Some(channel) = self.channel.take() {
            if let Err(err) = channel.close(REPLY_SUCCESS, "consumer shutdown").await {
                debug!(error = err.to_string(), "channel was already closed");
            }
        }

        if let Some(connection) = self.connection.take() {
            if connection.status().connected() {
                if let Err(err) = connection.close(REPLY_SUCCESS, "consumer shutdown").await {
                    debug!(error = err.to_string(), "connection was already closed");
                }
            }
        }
    }
}
