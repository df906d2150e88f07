// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Specifications
//!
//! This module provides the exchange specification consumed at topology
//! declaration time. Specifications come either from process-wide
//! configuration or are built programmatically with the builder methods.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Represents the types of exchanges available on the broker.
///
/// - Direct: routes messages on an exact routing-key match
/// - Fanout: broadcasts messages to all bound queues
/// - Topic: routes messages on wildcard routing-key patterns
/// - Headers: routes messages on header values instead of routing keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Fanout,
    #[default]
    Topic,
    Headers,
}

impl ExchangeKind {
    /// Maps this kind to the lapin exchange kind used on the wire.
    pub(crate) fn lapin_kind(&self) -> lapin::ExchangeKind {
        match self {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
        }
    }
}

/// Specification of a broker exchange.
///
/// The exchange name is the key under which the specification is stored in
/// configuration, so it is not repeated here. Defaults to a durable topic
/// exchange with no extra arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExchangeSpec {
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
    pub(crate) auto_delete: bool,
    pub(crate) arguments: BTreeMap<String, Value>,
}

impl Default for ExchangeSpec {
    fn default() -> Self {
        ExchangeSpec {
            kind: ExchangeKind::Topic,
            durable: true,
            auto_delete: false,
            arguments: BTreeMap::default(),
        }
    }
}

impl ExchangeSpec {
    /// Creates a new exchange specification with default settings.
    pub fn new() -> ExchangeSpec {
        ExchangeSpec::default()
    }

    /// Sets the exchange type.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Makes the exchange transient instead of the durable default.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Adds a single declaration argument.
    pub fn argument(mut self, key: &str, value: Value) -> Self {
        self.arguments.insert(key.to_owned(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_overrides_defaults() {
        let spec = ExchangeSpec::new()
            .kind(ExchangeKind::Fanout)
            .transient()
            .auto_delete()
            .argument("alternate-exchange", json!("amq.fanout"));

        assert_eq!(spec.kind, ExchangeKind::Fanout);
        assert!(!spec.durable);
        assert!(spec.auto_delete);
        assert_eq!(
            spec.arguments.get("alternate-exchange"),
            Some(&json!("amq.fanout"))
        );
    }

    #[test]
    fn deserializes_from_configuration_fragment() {
        let spec: ExchangeSpec = serde_json::from_value(json!({
            "kind": "direct",
            "durable": false,
        }))
        .unwrap();

        assert_eq!(spec.kind, ExchangeKind::Direct);
        assert!(!spec.durable);
        assert!(!spec.auto_delete);
    }

    #[test]
    fn defaults_to_durable_topic() {
        let spec = ExchangeSpec::default();
        assert_eq!(spec.kind, ExchangeKind::Topic);
        assert!(spec.durable);
    }
}
