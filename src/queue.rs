// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue and Binding Specifications
//!
//! Queue specifications and queue-to-exchange bindings consumed at topology
//! declaration time. A binding associates one queue with one exchange under
//! one or more routing keys.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Specification of a broker queue.
///
/// The queue name is the key under which the specification is stored in
/// configuration. Defaults to a durable, non-exclusive queue.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueueSpec {
    pub(crate) durable: bool,
    pub(crate) auto_delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) arguments: BTreeMap<String, Value>,
}

impl Default for QueueSpec {
    fn default() -> Self {
        QueueSpec {
            durable: true,
            auto_delete: false,
            exclusive: false,
            arguments: BTreeMap::default(),
        }
    }
}

impl QueueSpec {
    /// Creates a new queue specification with default settings.
    pub fn new() -> QueueSpec {
        QueueSpec::default()
    }

    /// Makes the queue transient instead of the durable default.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Sets the queue to auto-delete when the last consumer disconnects.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the queue exclusive to the declaring connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Adds a single declaration argument, e.g. a dead-letter exchange.
    ///
    /// Operators that want poison messages retained should point
    /// `x-dead-letter-exchange` somewhere; rejected messages are otherwise
    /// discarded by the broker.
    pub fn argument(mut self, key: &str, value: Value) -> Self {
        self.arguments.insert(key.to_owned(), value);
        self
    }
}

/// A routing rule associating a queue, an exchange, and routing keys.
///
/// Bindings are declared after their exchange and queue exist; the declare
/// order is guaranteed by [`topology::declare`](crate::topology::declare).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Binding {
    pub(crate) queue: String,
    pub(crate) exchange: String,
    pub(crate) routing_keys: Vec<String>,
}

impl Binding {
    /// Creates a binding between the given queue and exchange with no
    /// routing keys yet.
    pub fn new(queue: &str, exchange: &str) -> Binding {
        Binding {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_keys: vec![],
        }
    }

    /// Adds a routing key to the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_keys.push(key.to_owned());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_builder_overrides_defaults() {
        let spec = QueueSpec::new()
            .transient()
            .exclusive()
            .argument("x-dead-letter-exchange", json!("dead-letters"));

        assert!(!spec.durable);
        assert!(spec.exclusive);
        assert!(!spec.auto_delete);
        assert_eq!(
            spec.arguments.get("x-dead-letter-exchange"),
            Some(&json!("dead-letters"))
        );
    }

    #[test]
    fn binding_collects_routing_keys() {
        let binding = Binding::new("updates", "amq.topic")
            .routing_key("package.update")
            .routing_key("package.remove");

        assert_eq!(binding.queue, "updates");
        assert_eq!(binding.exchange, "amq.topic");
        assert_eq!(binding.routing_keys, vec!["package.update", "package.remove"]);
    }

    #[test]
    fn binding_deserializes_from_configuration_fragment() {
        let binding: Binding = serde_json::from_value(json!({
            "queue": "updates",
            "exchange": "amq.topic",
            "routing_keys": ["#"],
        }))
        .unwrap();

        assert_eq!(binding.routing_keys, vec!["#"]);
    }
}
