// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Transport Seam
//!
//! The [`Transport`] trait is everything the reliability layer needs from a broker
//! client: topology declaration, publishing, consuming and settling deliveries.
//! [`crate::rabbitmq::RabbitMQTransport`] implements it on top of lapin.
//!
//! Delivery outcomes travel the other way as [`ConfirmSignal`]s on a channel, so
//! publishing never waits for the broker's confirmation.

use crate::{
    errors::BrokerError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use opentelemetry::Context;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Header carrying the delay in milliseconds for the delayed exchange.
pub const AMQP_HEADERS_DELAY: &str = "x-delay";

/// Content type of every message body published by this crate.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Encoded correlation token
    pub correlation_id: String,
    /// Value of the `x-delay` header, only set on the delayed path
    pub delay_millis: Option<i64>,
}

/// A message delivered to one of our consumers.
#[derive(Debug, Clone)]
pub struct InboundDelivery {
    pub delivery_tag: u64,
    pub queue: String,
    pub redelivered: bool,
    pub data: Vec<u8>,
    /// Trace context extracted from the message headers
    pub context: Context,
}

impl InboundDelivery {
    pub fn new(delivery_tag: u64, queue: &str, data: Vec<u8>) -> Self {
        InboundDelivery {
            delivery_tag,
            queue: queue.to_owned(),
            redelivered: false,
            data,
            context: Context::new(),
        }
    }
}

/// A published message the broker could not route to any queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnedMessage {
    pub body: Vec<u8>,
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}

/// Asynchronous delivery outcome emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmSignal {
    /// Publisher confirm (`acknowledged`) or nack for the message carrying `token`
    Confirm {
        token: String,
        acknowledged: bool,
        cause: Option<String>,
    },
    Returned(ReturnedMessage),
}

pub type ConfirmSender = UnboundedSender<ConfirmSignal>;
pub type ConfirmReceiver = UnboundedReceiver<ConfirmSignal>;

/// Stream of deliveries from a single consumer.
pub type DeliveryStream = BoxStream<'static, Result<InboundDelivery, BrokerError>>;

/// Operations the layer consumes from the broker client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), BrokerError>;

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), BrokerError>;

    async fn declare_binding(&self, binding: &QueueBinding) -> Result<(), BrokerError>;

    /// Hands the message to the broker. Returns once the broker client accepted it,
    /// without waiting for a publisher confirm.
    async fn publish(&self, msg: OutboundMessage) -> Result<(), BrokerError>;

    /// Starts a consumer on `queue`. With `no_ack` the broker considers every delivery
    /// acknowledged as soon as it is sent.
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        no_ack: bool,
    ) -> Result<DeliveryStream, BrokerError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;
}
