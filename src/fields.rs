// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Field Value Conversions
//!
//! Conversions between JSON values and the AMQP field-table types used on the
//! wire. Message headers and topology arguments are JSON maps on the
//! application side and `FieldTable`s on the broker side; both directions go
//! through here.

use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use serde_json::Value;
use std::collections::BTreeMap;

/// Converts a JSON value to its closest AMQP field value.
///
/// Integers map to 64-bit signed integers, all other numbers to doubles.
/// Nested arrays and objects are converted recursively.
pub(crate) fn amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AMQPValue::LongLongInt(i),
            None => n
                .as_f64()
                .map(AMQPValue::Double)
                .unwrap_or(AMQPValue::Void),
        },
        Value::String(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        Value::Array(items) => {
            AMQPValue::FieldArray(FieldArray::from(items.iter().map(amqp_value).collect::<Vec<_>>()))
        }
        Value::Object(map) => {
            let mut table = BTreeMap::<ShortString, AMQPValue>::default();
            for (key, item) in map {
                table.insert(ShortString::from(key.as_str()), amqp_value(item));
            }
            AMQPValue::FieldTable(FieldTable::from(table))
        }
    }
}

/// Builds a `FieldTable` from a JSON map.
pub(crate) fn field_table(map: &BTreeMap<String, Value>) -> FieldTable {
    let mut table = BTreeMap::<ShortString, AMQPValue>::default();
    for (key, value) in map {
        table.insert(ShortString::from(key.as_str()), amqp_value(value));
    }
    FieldTable::from(table)
}

/// Converts an AMQP field value back to JSON.
///
/// Byte arrays and strings that are not valid UTF-8 are decoded lossily; the
/// header keys this crate cares about are always plain ASCII.
pub(crate) fn json_value(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(b) => Value::Bool(*b),
        AMQPValue::ShortShortInt(v) => Value::from(*v),
        AMQPValue::ShortShortUInt(v) => Value::from(*v),
        AMQPValue::ShortInt(v) => Value::from(*v),
        AMQPValue::ShortUInt(v) => Value::from(*v),
        AMQPValue::LongInt(v) => Value::from(*v),
        AMQPValue::LongUInt(v) => Value::from(*v),
        AMQPValue::LongLongInt(v) => Value::from(*v),
        AMQPValue::Float(v) => Value::from(*v),
        AMQPValue::Double(v) => Value::from(*v),
        AMQPValue::DecimalValue(d) => {
            Value::from(f64::from(d.value) / 10f64.powi(i32::from(d.scale)))
        }
        AMQPValue::ShortString(s) => Value::from(s.as_str()),
        AMQPValue::LongString(s) => {
            Value::from(String::from_utf8_lossy(s.as_bytes()).into_owned())
        }
        AMQPValue::FieldArray(items) => {
            Value::Array(items.as_slice().iter().map(json_value).collect())
        }
        AMQPValue::FieldTable(table) => Value::Object(
            table
                .inner()
                .iter()
                .map(|(key, item)| (key.to_string(), json_value(item)))
                .collect(),
        ),
        AMQPValue::ByteArray(bytes) => {
            Value::from(String::from_utf8_lossy(bytes.as_slice()).into_owned())
        }
        AMQPValue::Timestamp(t) => Value::from(*t),
        AMQPValue::Void => Value::Null,
    }
}

/// Converts a `FieldTable` to a JSON map keyed by header name.
pub(crate) fn json_map(table: &FieldTable) -> BTreeMap<String, Value> {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.to_string(), json_value(value)))
        .collect()
}
