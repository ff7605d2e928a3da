// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Event Wire Model
//!
//! The unit of work that flows through the broker. The body of every AMQP message
//! published by this crate is the JSON encoding of an [`Event`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An application event addressed to a topic.
///
/// `name` is the topic (queue and routing key), `key` identifies the event within the
/// topic and is what the status reporter records outcomes against. When
/// `effect_time` lies in the future the event is delivered through the delayed exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event<T = serde_json::Value> {
    pub name: String,
    pub key: String,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_time: Option<DateTime<Utc>>,
}

impl<T> Event<T> {
    pub fn new(name: impl Into<String>, key: impl Into<String>, data: T) -> Self {
        Event {
            name: name.into(),
            key: key.into(),
            data,
            effect_time: None,
        }
    }

    /// Schedules the event for delivery at `at`.
    pub fn effective_at(mut self, at: DateTime<Utc>) -> Self {
        self.effect_time = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_is_camel_case() {
        let at = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let event = Event::new("orders", "42", json!({"total": 10})).effective_at(at);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["name"], "orders");
        assert_eq!(value["key"], "42");
        assert_eq!(value["data"]["total"], 10);
        assert!(value.get("effectTime").is_some());
    }

    #[test]
    fn test_immediate_event_omits_effect_time() {
        let event = Event::new("orders", "42", "payload".to_owned());
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("effectTime").is_none());

        let decoded: Event<String> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, event);
    }
}
