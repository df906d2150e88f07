// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Process-Wide Configuration
//!
//! Default broker URL, prefetch, and topology used by sessions when a
//! `consume` call does not supply its own. The configuration cell is
//! populated once at startup with [`configure`] and is read-only afterwards;
//! loading it from a file or the environment is up to the embedding
//! application.

use crate::errors::Error;
use crate::exchange::ExchangeSpec;
use crate::queue::{Binding, QueueSpec};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

static CONFIG: OnceLock<Configuration> = OnceLock::new();

/// Process-wide defaults for broker sessions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Broker URL used when a session is created without one
    pub amqp_url: String,
    /// Name reported to the broker for connections from this process
    pub app_name: String,
    /// Exchange published to when a publisher session omits one
    pub publish_exchange: String,
    /// Per-channel unacknowledged delivery limit for consumers
    pub prefetch_count: u16,
    /// Default exchanges declared by consumers, keyed by exchange name
    pub exchanges: HashMap<String, ExchangeSpec>,
    /// Default queues declared by consumers, keyed by queue name
    pub queues: HashMap<String, QueueSpec>,
    /// Default bindings declared by consumers
    pub bindings: Vec<Binding>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            amqp_url: "amqp://localhost".to_owned(),
            app_name: "rabbitmq-session".to_owned(),
            publish_exchange: "amq.topic".to_owned(),
            prefetch_count: 10,
            exchanges: HashMap::default(),
            queues: HashMap::default(),
            bindings: vec![],
        }
    }
}

/// Installs the process-wide configuration.
///
/// Must be called before any session is created; calling it a second time is
/// a configuration error.
pub fn configure(configuration: Configuration) -> Result<(), Error> {
    CONFIG.set(configuration).map_err(|_| {
        Error::Configuration("process configuration is already initialized".to_owned())
    })
}

/// Returns the process-wide configuration, falling back to compiled defaults
/// if [`configure`] was never called.
pub fn get() -> &'static Configuration {
    CONFIG.get_or_init(Configuration::default)
}
