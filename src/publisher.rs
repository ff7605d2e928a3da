// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Event Producer
//!
//! Publishes [`Event`]s to RabbitMQ. Each publish makes sure the topic topology
//! exists, picks the immediate or delayed exchange from the event's effective time and
//! attaches a correlation token so the broker's confirm can be traced back to the event.
//!
//! `accept` returns as soon as the transport took the message. Whether the broker
//! actually accepted it is reported later through the [`crate::confirm::ConfirmDispatcher`].

use crate::{
    correlation::CorrelationToken,
    errors::BrokerError,
    event::Event,
    exchange::{DELAYED_EXCHANGE, PRIMARY_EXCHANGE},
    topology::TopologyManager,
    transport::{OutboundMessage, Transport},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Route of a single publish, derived from the event's effective time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayDecision {
    Immediate,
    /// Deliver after the given number of milliseconds
    Delayed(i64),
}

impl DelayDecision {
    pub fn compute(effect_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DelayDecision {
        match effect_time.map(|at| (at - now).num_milliseconds()) {
            Some(millis) if millis > 0 => DelayDecision::Delayed(millis),
            _ => DelayDecision::Immediate,
        }
    }
}

/// Producer publishing events through a [`Transport`].
pub struct RabbitMQProducer {
    transport: Arc<dyn Transport>,
    topology: Arc<TopologyManager>,
    publisher_callbacks: bool,
}

impl RabbitMQProducer {
    /// Creates a producer.
    ///
    /// `publisher_callbacks` states whether the transport emits both confirms and
    /// returns; it is reported by [`Self::supports_delivery_confirmation`].
    pub fn new(
        transport: Arc<dyn Transport>,
        topology: Arc<TopologyManager>,
        publisher_callbacks: bool,
    ) -> Arc<RabbitMQProducer> {
        Arc::new(RabbitMQProducer {
            transport,
            topology,
            publisher_callbacks,
        })
    }

    /// True when delivery outcomes will be reported asynchronously.
    pub fn supports_delivery_confirmation(&self) -> bool {
        self.publisher_callbacks
    }

    /// Publishes `event` to its topic.
    pub async fn accept<T>(&self, event: &Event<T>) -> Result<(), BrokerError>
    where
        T: Serialize + Sync,
    {
        self.accept_at(event, Utc::now()).await
    }

    pub(crate) async fn accept_at<T>(
        &self,
        event: &Event<T>,
        now: DateTime<Utc>,
    ) -> Result<(), BrokerError>
    where
        T: Serialize + Sync,
    {
        let token = CorrelationToken::encode(&event.name, &event.key)?;

        self.topology.ensure_topic_declared(&event.name).await?;

        let body = serde_json::to_vec(event).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize event");
            BrokerError::SerializationError(err.to_string())
        })?;

        let (exchange, delay_millis) = match DelayDecision::compute(event.effect_time, now) {
            DelayDecision::Delayed(millis) if self.topology.delayed_enabled() => {
                (DELAYED_EXCHANGE, Some(millis))
            }
            DelayDecision::Delayed(millis) => {
                warn!(
                    topic = %event.name,
                    delay = millis,
                    "delayed delivery is disabled, publishing immediately"
                );
                (PRIMARY_EXCHANGE, None)
            }
            DelayDecision::Immediate => (PRIMARY_EXCHANGE, None),
        };

        debug!(
            topic = %event.name,
            code = %event.key,
            exchange,
            "publishing event"
        );

        self.transport
            .publish(OutboundMessage {
                exchange: exchange.to_owned(),
                routing_key: event.name.clone(),
                body,
                correlation_id: token,
                delay_millis,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use chrono::Duration;
    use serde_json::json;

    fn transport_with_topology(delayed: bool) -> MockTransport {
        let mut transport = MockTransport::new();
        transport
            .expect_declare_queue()
            .times(1)
            .returning(|_| Ok(()));
        transport
            .expect_declare_binding()
            .times(if delayed { 2 } else { 1 })
            .returning(|_| Ok(()));
        transport
    }

    fn producer(transport: MockTransport, delayed: bool) -> Arc<RabbitMQProducer> {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let topology = TopologyManager::new(transport.clone(), delayed);
        RabbitMQProducer::new(transport, topology, true)
    }

    #[test]
    fn test_delay_for_future_effect_time() {
        let now = Utc::now();
        assert_eq!(
            DelayDecision::compute(Some(now + Duration::milliseconds(5000)), now),
            DelayDecision::Delayed(5000)
        );
    }

    #[test]
    fn test_immediate_for_past_or_absent_effect_time() {
        let now = Utc::now();
        assert_eq!(
            DelayDecision::compute(Some(now - Duration::milliseconds(1000)), now),
            DelayDecision::Immediate
        );
        assert_eq!(DelayDecision::compute(Some(now), now), DelayDecision::Immediate);
        assert_eq!(DelayDecision::compute(None, now), DelayDecision::Immediate);
    }

    #[tokio::test]
    async fn test_immediate_publish_to_primary_exchange() {
        let mut transport = transport_with_topology(false);
        transport
            .expect_publish()
            .withf(|msg| {
                msg.exchange == PRIMARY_EXCHANGE
                    && msg.routing_key == "orders"
                    && msg.correlation_id == "orders,42"
                    && msg.delay_millis.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));

        let producer = producer(transport, false);
        producer
            .accept(&Event::new("orders", "42", json!({"total": 10})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_future_event_goes_through_delayed_exchange() {
        let mut transport = transport_with_topology(true);
        transport
            .expect_publish()
            .withf(|msg| {
                msg.exchange == DELAYED_EXCHANGE
                    && msg.routing_key == "orders"
                    && msg.correlation_id == "orders,42"
                    && msg.delay_millis == Some(5000)
            })
            .times(1)
            .returning(|_| Ok(()));

        let producer = producer(transport, true);
        let now = Utc::now();
        let event = Event::new("orders", "42", json!({})).effective_at(now + Duration::seconds(5));
        producer.accept_at(&event, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_future_event_without_delayed_support_goes_immediate() {
        let mut transport = transport_with_topology(false);
        transport
            .expect_publish()
            .withf(|msg| msg.exchange == PRIMARY_EXCHANGE && msg.delay_millis.is_none())
            .times(1)
            .returning(|_| Ok(()));

        let producer = producer(transport, false);
        let now = Utc::now();
        let event = Event::new("orders", "42", json!({})).effective_at(now + Duration::seconds(5));
        producer.accept_at(&event, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_body_is_the_json_event() {
        let mut transport = transport_with_topology(false);
        transport
            .expect_publish()
            .withf(|msg| {
                let decoded: Event = serde_json::from_slice(&msg.body).unwrap();
                decoded.name == "orders" && decoded.key == "42" && decoded.data["total"] == 10
            })
            .times(1)
            .returning(|_| Ok(()));

        let producer = producer(transport, false);
        producer
            .accept(&Event::new("orders", "42", json!({"total": 10})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_topology_declared_once_across_publishes() {
        let mut transport = transport_with_topology(false);
        transport.expect_publish().times(3).returning(|_| Ok(()));

        let producer = producer(transport, false);
        for key in ["1", "2", "3"] {
            producer
                .accept(&Event::new("orders", key, json!(null)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_network() {
        let producer = producer(MockTransport::new(), false);
        let result = producer.accept(&Event::new("orders", "4,2", json!(null))).await;
        assert!(matches!(result, Err(BrokerError::InvalidInputError(_))));
    }

    #[tokio::test]
    async fn test_topology_failure_fails_publish() {
        let mut transport = MockTransport::new();
        transport
            .expect_declare_queue()
            .times(1)
            .returning(|_| Err(BrokerError::TopologyDeclarationError("queue `orders`".to_owned())));
        transport.expect_publish().never();

        let producer = producer(transport, false);
        let result = producer.accept(&Event::new("orders", "42", json!(null))).await;
        assert!(matches!(result, Err(BrokerError::TopologyDeclarationError(_))));
    }

    #[test]
    fn test_supports_delivery_confirmation() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let topology = TopologyManager::new(transport.clone(), false);
        assert!(!RabbitMQProducer::new(transport.clone(), topology.clone(), false)
            .supports_delivery_confirmation());
        assert!(RabbitMQProducer::new(transport, topology, true).supports_delivery_confirmation());
    }
}
