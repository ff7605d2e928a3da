// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Listener Registry
//!
//! Maps each topic to the handler processing its events. The registry is filled at
//! startup and only read afterwards: its topics decide which queues are declared and
//! consumed, and each delivery is dispatched through it by event name.

use crate::event::Event;
use async_trait::async_trait;
use opentelemetry::Context;
use std::{collections::BTreeMap, error::Error, sync::Arc};

/// Error returned by an application handler.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Application callback for the events of one topic.
///
/// `ctx` is the trace context the publisher propagated with the message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: &Context, event: &Event) -> Result<(), HandlerError>;
}

/// Topic to handler table.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: BTreeMap<String, Arc<dyn EventHandler>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `topic`. A later registration for the same topic replaces
    /// the earlier one.
    pub fn register(mut self, topic: &str, handler: Arc<dyn EventHandler>) -> Self {
        self.listeners.insert(topic.to_owned(), handler);
        self
    }

    /// Topics whose queues must exist before consumption starts, in sorted order.
    pub fn all_topics(&self) -> Vec<String> {
        self.listeners.keys().cloned().collect()
    }

    pub fn handler(&self, topic: &str) -> Option<Arc<dyn EventHandler>> {
        self.listeners.get(topic).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = ListenerRegistry::new()
            .register("orders", Arc::new(MockEventHandler::new()))
            .register("invoices", Arc::new(MockEventHandler::new()));

        assert_eq!(registry.all_topics(), vec!["invoices", "orders"]);
        assert!(registry.handler("orders").is_some());
        assert!(registry.handler("payments").is_none());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ListenerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.all_topics().is_empty());
    }

    #[test]
    fn test_duplicate_topic_listed_once() {
        let registry = ListenerRegistry::new()
            .register("orders", Arc::new(MockEventHandler::new()))
            .register("orders", Arc::new(MockEventHandler::new()));

        assert_eq!(registry.all_topics(), vec!["orders"]);
    }
}
