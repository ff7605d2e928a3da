// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Bootstrap
//!
//! Wires the layer together from a [`MqBrokerConfigs`]: connection and channel,
//! transport, confirm dispatcher loop, startup exchange declaration, producer and
//! consumer dispatcher.
//!
//! ```ignore
//! let configs = MqBrokerConfigs::load()?;
//! configs.validate()?;
//!
//! let broker = MqBroker::connect(configs, Arc::new(TracingStatusReporter)).await?;
//! broker.producer().accept(&Event::new("orders", "42", payload)).await?;
//!
//! let registry = ListenerRegistry::new().register("orders", Arc::new(OrdersHandler));
//! broker.consume_blocking(registry).await?;
//! ```

use crate::{
    channel::new_amqp_channel,
    configs::MqBrokerConfigs,
    confirm::ConfirmDispatcher,
    consumer::{AckMode, ConsumerBridge},
    dispatcher::ConsumerDispatcher,
    errors::BrokerError,
    listener::ListenerRegistry,
    publisher::RabbitMQProducer,
    rabbitmq::RabbitMQTransport,
    status::SendStatusReporter,
    topology::TopologyManager,
    transport::Transport,
};
use lapin::Connection;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub struct MqBroker {
    configs: MqBrokerConfigs,
    connection: Option<Arc<Connection>>,
    transport: Arc<dyn Transport>,
    topology: Arc<TopologyManager>,
    producer: Arc<RabbitMQProducer>,
}

impl MqBroker {
    /// Connects to RabbitMQ and declares the exchanges.
    ///
    /// Delivery outcomes are forwarded to `reporter` when the configuration enables
    /// both publisher confirms and returns.
    pub async fn connect(
        configs: MqBrokerConfigs,
        reporter: Arc<dyn SendStatusReporter>,
    ) -> Result<MqBroker, BrokerError> {
        let (connection, channel) = new_amqp_channel(&configs).await?;

        let confirms = if configs.publisher_callbacks() {
            let (sender, receiver) = mpsc::unbounded_channel();
            tokio::spawn(ConfirmDispatcher::new(reporter).run(receiver));
            debug!("confirm dispatcher started");
            Some(sender)
        } else {
            None
        };

        let transport = RabbitMQTransport::new(channel, configs.publisher_callbacks(), confirms);

        let mut broker = Self::with_transport(configs, transport).await?;
        broker.connection = Some(connection);
        Ok(broker)
    }

    /// Builds the layer over an already established transport.
    pub async fn with_transport(
        configs: MqBrokerConfigs,
        transport: Arc<dyn Transport>,
    ) -> Result<MqBroker, BrokerError> {
        let topology =
            TopologyManager::new(transport.clone(), configs.mq_broker.enabled_delayed_message);
        topology.declare_exchanges().await?;

        let producer = RabbitMQProducer::new(
            transport.clone(),
            topology.clone(),
            configs.publisher_callbacks(),
        );

        Ok(MqBroker {
            configs,
            connection: None,
            transport,
            topology,
            producer,
        })
    }

    pub fn producer(&self) -> Arc<RabbitMQProducer> {
        self.producer.clone()
    }

    pub fn topology(&self) -> Arc<TopologyManager> {
        self.topology.clone()
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.clone()
    }

    /// Builds the consumer side for `registry` with the configured ack mode and workers.
    pub fn dispatcher(&self, registry: ListenerRegistry) -> ConsumerDispatcher {
        let ack_mode = AckMode::new(
            self.configs.mq_broker.manual_acknowledge,
            self.configs.mq_broker.requeue_rejected,
        );
        let bridge = ConsumerBridge::new(Arc::new(registry), self.transport.clone(), ack_mode);

        ConsumerDispatcher::new(
            self.transport.clone(),
            self.topology.clone(),
            bridge,
            self.configs.mq_broker.concurrent_consumers,
        )
    }

    /// Consumes the topics of `registry` until the consumers stop.
    pub async fn consume_blocking(&self, registry: ListenerRegistry) -> Result<(), BrokerError> {
        self.dispatcher(registry).consume_blocking().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::Event,
        exchange::{DELAYED_EXCHANGE, PRIMARY_EXCHANGE},
        listener::MockEventHandler,
        transport::{InboundDelivery, MockTransport},
    };
    use futures_util::{stream, StreamExt};
    use serde_json::json;

    fn configs(manual: bool, delayed: bool) -> MqBrokerConfigs {
        let mut configs = MqBrokerConfigs::default();
        configs.mq_broker.manual_acknowledge = manual;
        configs.mq_broker.enabled_delayed_message = delayed;
        configs
    }

    #[tokio::test]
    async fn test_startup_declares_exchanges() {
        let mut transport = MockTransport::new();
        transport
            .expect_declare_exchange()
            .withf(|def| def.name() == PRIMARY_EXCHANGE)
            .times(1)
            .returning(|_| Ok(()));
        transport
            .expect_declare_exchange()
            .withf(|def| def.name() == DELAYED_EXCHANGE)
            .times(1)
            .returning(|_| Ok(()));

        let broker = MqBroker::with_transport(configs(false, true), Arc::new(transport))
            .await
            .unwrap();

        assert!(broker.producer().supports_delivery_confirmation());
        assert!(broker.topology().delayed_enabled());
        assert!(broker.connection().is_none());
    }

    #[tokio::test]
    async fn test_exchange_failure_fails_startup() {
        let mut transport = MockTransport::new();
        transport.expect_declare_exchange().returning(|_| {
            Err(BrokerError::TopologyDeclarationError(
                "exchange `mqBrokerRabbit.exchange`".to_owned(),
            ))
        });

        let result = MqBroker::with_transport(configs(false, false), Arc::new(transport)).await;
        assert!(matches!(result, Err(BrokerError::TopologyDeclarationError(_))));
    }

    #[tokio::test]
    async fn test_publish_then_consume_manual() {
        let mut transport = MockTransport::new();
        transport
            .expect_declare_exchange()
            .times(1)
            .returning(|_| Ok(()));
        transport
            .expect_declare_queue()
            .times(1)
            .returning(|_| Ok(()));
        transport
            .expect_declare_binding()
            .times(1)
            .returning(|_| Ok(()));
        transport.expect_publish().times(1).returning(|_| Ok(()));
        transport
            .expect_consume()
            .withf(|queue, _, no_ack| queue == "orders" && !*no_ack)
            .times(1)
            .returning(|_, _, _| {
                let body = serde_json::to_vec(&Event::new("orders", "42", json!({}))).unwrap();
                Ok(stream::iter(vec![Ok(InboundDelivery::new(9, "orders", body))]).boxed())
            });
        transport
            .expect_ack()
            .withf(|tag| *tag == 9)
            .times(1)
            .returning(|_| Ok(()));

        let broker = MqBroker::with_transport(configs(true, false), Arc::new(transport))
            .await
            .unwrap();

        broker
            .producer()
            .accept(&Event::new("orders", "42", json!({})))
            .await
            .unwrap();

        let mut handler = MockEventHandler::new();
        handler
            .expect_handle()
            .withf(|_, event| event.key == "42")
            .times(1)
            .returning(|_, _| Ok(()));

        broker
            .consume_blocking(ListenerRegistry::new().register("orders", Arc::new(handler)))
            .await
            .unwrap();
    }
}
