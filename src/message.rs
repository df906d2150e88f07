// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Entity and Schema Registry
//!
//! A [`Message`] is one unit of application payload plus routing and schema
//! metadata. Every message carries a reference to its [`MessageSchema`];
//! validation delegates to the validator injected into the schema, so no
//! schema engine lives in this crate.
//!
//! The [`SchemaRegistry`] resolves the schema name carried in the
//! `fedora_messaging_schema` header of an incoming message to a schema.
//! Unknown names resolve to the permissive base schema, never to an error.

use crate::errors::Error;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use uuid::Uuid;

/// Reserved header carrying the fully-qualified schema name
pub const SCHEMA_HEADER: &str = "fedora_messaging_schema";
/// Reserved header carrying the schema revision
pub const SCHEMA_VERSION_HEADER: &str = "fedora_messaging_schema_version";
/// Schema name used when a message declares no schema at all
pub const BASE_SCHEMA_NAME: &str = "base.message";

type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

static REGISTRY: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();

/// A named, versioned schema with an injected body validator.
#[derive(Clone)]
pub struct MessageSchema {
    name: String,
    version: i64,
    validator: Validator,
}

impl MessageSchema {
    /// Creates a schema with the given name, revision, and validator.
    ///
    /// The validator receives the decoded message body and reports
    /// non-conformance as a human-readable reason.
    pub fn new<F>(name: &str, version: i64, validator: F) -> MessageSchema
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        MessageSchema {
            name: name.to_owned(),
            version,
            validator: Arc::new(validator),
        }
    }

    /// The permissive fallback schema: any body validates.
    pub fn base() -> MessageSchema {
        MessageSchema::new(BASE_SCHEMA_NAME, 1, |_| Ok(()))
    }

    /// The fully-qualified schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema revision.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Checks a body against this schema.
    pub fn check(&self, body: &Value) -> Result<(), Error> {
        (self.validator)(body).map_err(|reason| Error::Validation {
            schema: self.name.clone(),
            reason,
        })
    }
}

impl fmt::Debug for MessageSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSchema")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

/// Maps schema names to schemas for incoming messages.
///
/// Populated at startup and read-only during session operation. Sessions
/// hold an `Arc` to a registry rather than reaching into global state, which
/// keeps them testable in isolation; [`SchemaRegistry::global`] provides the
/// shared process-wide instance.
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<MessageSchema>>>,
    base: Arc<MessageSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry that resolves everything to the base schema.
    pub fn new() -> SchemaRegistry {
        SchemaRegistry {
            schemas: RwLock::new(HashMap::default()),
            base: Arc::new(MessageSchema::base()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<SchemaRegistry> {
        REGISTRY
            .get_or_init(|| Arc::new(SchemaRegistry::new()))
            .clone()
    }

    /// Registers a schema under its own name.
    pub fn register(&self, schema: MessageSchema) {
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        schemas.insert(schema.name().to_owned(), Arc::new(schema));
    }

    /// Looks up a schema by name.
    ///
    /// Unknown names fall back to the base schema; an unparseable message
    /// header must never bring a consumer down.
    pub fn lookup(&self, name: &str) -> Arc<MessageSchema> {
        let schemas = self.schemas.read().unwrap_or_else(|e| e.into_inner());
        schemas.get(name).cloned().unwrap_or_else(|| self.base.clone())
    }

    /// The fallback schema used for unknown names.
    pub fn base(&self) -> Arc<MessageSchema> {
        self.base.clone()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry::new()
    }
}

/// One unit of application payload plus routing and schema metadata.
///
/// A message owns its body and headers exclusively; hand it to a session by
/// value and it is gone.
#[derive(Debug)]
pub struct Message {
    id: Uuid,
    topic: String,
    body: Value,
    headers: BTreeMap<String, Value>,
    schema: Arc<MessageSchema>,
    schema_version: i64,
}

impl Message {
    /// Creates a message on the given topic.
    ///
    /// The topic is used verbatim as the routing key at publish time and must
    /// be a non-empty token.
    pub fn new(topic: &str, body: Value, schema: Arc<MessageSchema>) -> Message {
        let schema_version = schema.version();
        Message {
            id: Uuid::new_v4(),
            topic: topic.to_owned(),
            body,
            headers: BTreeMap::default(),
            schema,
            schema_version,
        }
    }

    /// Replaces the application headers.
    ///
    /// Reserved schema headers are stamped by the publisher session and win
    /// over application-supplied values of the same name.
    pub fn with_headers(mut self, headers: BTreeMap<String, Value>) -> Self {
        self.headers = headers;
        self
    }

    /// Adds a single application header.
    pub fn header(mut self, key: &str, value: Value) -> Self {
        self.headers.insert(key.to_owned(), value);
        self
    }

    /// Overrides the schema revision, e.g. from an incoming header.
    pub fn with_schema_version(mut self, version: i64) -> Self {
        self.schema_version = version;
        self
    }

    /// The message id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The routing topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The application payload.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The application headers.
    pub fn headers(&self) -> &BTreeMap<String, Value> {
        &self.headers
    }

    /// The message schema.
    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }

    /// The schema revision this message claims to conform to.
    pub fn schema_version(&self) -> i64 {
        self.schema_version
    }

    /// Checks the body against the message schema.
    pub fn validate(&self) -> Result<(), Error> {
        self.schema.check(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn string_schema() -> MessageSchema {
        MessageSchema::new("test.string", 2, |body| {
            body.as_str()
                .map(|_| ())
                .ok_or_else(|| "body must be a string".to_owned())
        })
    }

    #[test]
    fn validate_accepts_conforming_body() {
        let message = Message::new("test.topic", json!("test body"), Arc::new(string_schema()));
        assert!(message.validate().is_ok());
        assert_eq!(message.schema_version(), 2);
    }

    #[test]
    fn validate_rejects_nonconforming_body() {
        let message = Message::new("test.topic", json!(42), Arc::new(string_schema()));
        let err = message.validate().unwrap_err();
        assert_eq!(
            err,
            Error::Validation {
                schema: "test.string".to_owned(),
                reason: "body must be a string".to_owned(),
            }
        );
    }

    #[test]
    fn registry_resolves_registered_schema() {
        let registry = SchemaRegistry::new();
        registry.register(string_schema());
        assert_eq!(registry.lookup("test.string").name(), "test.string");
    }

    #[test]
    fn registry_falls_back_to_base_schema() {
        let registry = SchemaRegistry::new();
        let schema = registry.lookup("no.such.schema");
        assert_eq!(schema.name(), BASE_SCHEMA_NAME);
        assert!(schema.check(&json!({"anything": true})).is_ok());
    }

    #[test]
    fn header_builder_accumulates() {
        let message = Message::new("t", json!(null), Arc::new(MessageSchema::base()))
            .header("origin", json!("unit-test"))
            .header("attempt", json!(1));
        assert_eq!(message.headers().len(), 2);
        assert_eq!(message.headers()["origin"], json!("unit-test"));
    }
}
