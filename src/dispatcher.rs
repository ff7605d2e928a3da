// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Dispatcher
//!
//! Starts the consumer workers. For every registered topic the queue topology is
//! declared first, then `concurrent_consumers` consumers are opened on the topic queue,
//! each driven by its own task that feeds deliveries one at a time through the
//! [`ConsumerBridge`].

use crate::{
    consumer::ConsumerBridge, errors::BrokerError, topology::TopologyManager,
    transport::Transport,
};
use futures_util::{future::join_all, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct ConsumerDispatcher {
    transport: Arc<dyn Transport>,
    topology: Arc<TopologyManager>,
    bridge: Arc<ConsumerBridge>,
    workers: u16,
}

impl ConsumerDispatcher {
    /// Creates a dispatcher running `workers` consumers per topic.
    pub fn new(
        transport: Arc<dyn Transport>,
        topology: Arc<TopologyManager>,
        bridge: Arc<ConsumerBridge>,
        workers: u16,
    ) -> ConsumerDispatcher {
        ConsumerDispatcher {
            transport,
            topology,
            bridge,
            workers: workers.max(1),
        }
    }

    /// Declares the queue and bindings of every registered topic.
    pub async fn declare_queues(&self) -> Result<(), BrokerError> {
        for topic in self.bridge.registry().all_topics() {
            self.topology.ensure_topic_declared(&topic).await?;
        }

        Ok(())
    }

    /// Consumes every registered topic until all consumer streams end.
    pub async fn consume_blocking(&self) -> Result<(), BrokerError> {
        let topics = self.bridge.registry().all_topics();
        if topics.is_empty() {
            warn!("no listener registered, nothing to consume");
            return Ok(());
        }

        self.declare_queues().await?;

        let no_ack = self.bridge.ack_mode().no_ack();
        let mut spawns = vec![];

        for topic in &topics {
            for worker in 0..self.workers {
                let consumer_tag = format!("{}-{}", topic, worker);
                let mut deliveries = self
                    .transport
                    .consume(topic, &consumer_tag, no_ack)
                    .await?;

                debug!(
                    topic = topic.as_str(),
                    consumer_tag = consumer_tag.as_str(),
                    "consumer started"
                );

                let bridge = self.bridge.clone();
                spawns.push(tokio::spawn(async move {
                    while let Some(result) = deliveries.next().await {
                        match result {
                            Ok(delivery) => {
                                bridge.handle(&delivery).await;
                            }
                            Err(err) => error!(error = err.to_string(), "errors consume msg"),
                        }
                    }
                }));
            }
        }

        let spawned = join_all(spawns).await;
        for res in spawned {
            if let Err(err) = res {
                error!(error = err.to_string(), "tokio process error");
                return Err(BrokerError::InternalError);
            }
        }

        Ok(())
    }
}
