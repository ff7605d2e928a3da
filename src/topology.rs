// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! Exchanges are declared once at startup. Topic queues and their bindings are
//! declared lazily, the first time a topic is published to or listened on, and the
//! topic is then remembered in the [`TopologyCache`] so that later publishes skip the
//! broker round-trip.
//!
//! The declare-and-remember sequence for a topic runs under the cache's write lock,
//! so concurrent publishers of a new topic cause a single declaration and a failed
//! declaration leaves the topic undeclared for the next caller to retry.

use crate::{
    errors::BrokerError,
    exchange::{ExchangeDefinition, DELAYED_EXCHANGE, PRIMARY_EXCHANGE},
    queue::{QueueBinding, QueueDefinition},
    transport::Transport,
};
use std::{collections::HashSet, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Topics whose queue and bindings have been declared successfully.
#[derive(Debug, Default)]
pub struct TopologyCache {
    declared: RwLock<HashSet<String>>,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.declared.read().await.contains(topic)
    }

    pub async fn len(&self) -> usize {
        self.declared.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.declared.read().await.is_empty()
    }
}

/// Declares exchanges, topic queues and bindings through a [`Transport`].
pub struct TopologyManager {
    transport: Arc<dyn Transport>,
    cache: TopologyCache,
    delayed: bool,
}

impl TopologyManager {
    /// Creates a manager. With `delayed` every topic queue is also bound to the
    /// delayed exchange.
    pub fn new(transport: Arc<dyn Transport>, delayed: bool) -> Arc<TopologyManager> {
        Arc::new(TopologyManager {
            transport,
            cache: TopologyCache::new(),
            delayed,
        })
    }

    pub fn cache(&self) -> &TopologyCache {
        &self.cache
    }

    pub fn delayed_enabled(&self) -> bool {
        self.delayed
    }

    pub async fn declare_primary_exchange(&self) -> Result<(), BrokerError> {
        self.transport
            .declare_exchange(&ExchangeDefinition::primary())
            .await
    }

    /// No-op unless delayed delivery is enabled.
    pub async fn declare_delayed_exchange(&self) -> Result<(), BrokerError> {
        if !self.delayed {
            return Ok(());
        }

        self.transport
            .declare_exchange(&ExchangeDefinition::delayed())
            .await
    }

    /// Declares every exchange the layer publishes through.
    pub async fn declare_exchanges(&self) -> Result<(), BrokerError> {
        self.declare_primary_exchange().await?;
        self.declare_delayed_exchange().await
    }

    /// Makes sure the queue and bindings of `topic` exist.
    pub async fn ensure_topic_declared(&self, topic: &str) -> Result<(), BrokerError> {
        if self.cache.contains(topic).await {
            return Ok(());
        }

        let mut declared = self.cache.declared.write().await;
        if declared.contains(topic) {
            return Ok(());
        }

        debug!(topic, "declaring topic topology");
        if let Err(err) = self.declare_topic(topic).await {
            error!(error = err.to_string(), topic, "failure to declare topic");
            return Err(err);
        }

        declared.insert(topic.to_owned());
        Ok(())
    }

    async fn declare_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.transport
            .declare_queue(&QueueDefinition::for_topic(topic))
            .await?;

        self.transport
            .declare_binding(
                &QueueBinding::new(topic)
                    .exchange(PRIMARY_EXCHANGE)
                    .routing_key(topic),
            )
            .await?;

        if self.delayed {
            self.transport
                .declare_binding(
                    &QueueBinding::new(topic)
                        .exchange(DELAYED_EXCHANGE)
                        .routing_key(topic),
                )
                .await?;
        }

        Ok(())
    }
}
