// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Transport
//!
//! lapin implementation of [`Transport`]. Besides mapping each operation onto the
//! channel, it watches the publisher confirm of every message on a spawned task and
//! forwards the outcome as a [`ConfirmSignal`].

use crate::{
    errors::BrokerError,
    exchange::ExchangeDefinition,
    otel,
    queue::{QueueBinding, QueueDefinition},
    transport::{
        ConfirmSender, ConfirmSignal, DeliveryStream, InboundDelivery, OutboundMessage,
        ReturnedMessage, Transport, AMQP_HEADERS_DELAY, JSON_CONTENT_TYPE,
    },
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    message::BasicReturnMessage,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    publisher_confirm::{Confirmation, PublisherConfirm},
    types::{AMQPValue, FieldTable, LongLongInt, LongString, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::Context;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Persistent delivery mode
const PERSISTENT: u8 = 2;

/// lapin-backed [`Transport`].
pub struct RabbitMQTransport {
    channel: Arc<Channel>,
    mandatory: bool,
    confirms: Option<ConfirmSender>,
}

impl RabbitMQTransport {
    /// Creates a transport over `channel`.
    ///
    /// `mandatory` makes the broker return unroutable messages published for immediate
    /// delivery. Confirm outcomes are only forwarded when a `confirms` sender is given.
    pub fn new(
        channel: Arc<Channel>,
        mandatory: bool,
        confirms: Option<ConfirmSender>,
    ) -> Arc<RabbitMQTransport> {
        Arc::new(RabbitMQTransport {
            channel,
            mandatory,
            confirms,
        })
    }

    fn headers(msg: &OutboundMessage) -> BTreeMap<ShortString, AMQPValue> {
        let mut btree = BTreeMap::<ShortString, AMQPValue>::default();

        otel::inject_context(&Context::current(), &mut btree);

        if let Some(delay) = msg.delay_millis {
            btree.insert(
                ShortString::from(AMQP_HEADERS_DELAY),
                AMQPValue::LongLongInt(LongLongInt::from(delay)),
            );
        }

        btree
    }
}

#[async_trait]
impl Transport for RabbitMQTransport {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), BrokerError> {
        debug!("creating exchange: {}", def.name());

        let params = def
            .params()
            .iter()
            .map(|(key, value)| {
                (
                    ShortString::from(key.clone()),
                    AMQPValue::LongString(LongString::from(value.clone())),
                )
            })
            .collect::<BTreeMap<_, _>>();

        match self
            .channel
            .exchange_declare(
                def.name(),
                def.kind().into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.is_durable(),
                    auto_delete: def.is_auto_delete(),
                    internal: false,
                    nowait: false,
                },
                FieldTable::from(params),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name(),
                    "error to declare the exchange"
                );
                Err(BrokerError::TopologyDeclarationError(format!(
                    "exchange `{}`: {}",
                    def.name(),
                    err
                )))
            }
            _ => {
                debug!("exchange: {} was created", def.name());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), BrokerError> {
        debug!("creating queue: {}", def.name());

        match self
            .channel
            .queue_declare(
                def.name(),
                QueueDeclareOptions {
                    passive: false,
                    durable: def.is_durable(),
                    exclusive: def.is_exclusive(),
                    auto_delete: def.is_auto_delete(),
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name(),
                    "error to declare the queue"
                );
                Err(BrokerError::TopologyDeclarationError(format!(
                    "queue `{}`: {}",
                    def.name(),
                    err
                )))
            }
            _ => {
                debug!("queue: {} was created", def.name());
                Ok(())
            }
        }
    }

    async fn declare_binding(&self, binding: &QueueBinding) -> Result<(), BrokerError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue_name(),
            binding.exchange_name(),
            binding.routing_key_name()
        );

        match self
            .channel
            .queue_bind(
                binding.queue_name(),
                binding.exchange_name(),
                binding.routing_key_name(),
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(BrokerError::TopologyDeclarationError(format!(
                    "binding `{}` -> `{}`: {}",
                    binding.exchange_name(),
                    binding.queue_name(),
                    err
                )))
            }
            _ => Ok(()),
        }
    }

    async fn publish(&self, msg: OutboundMessage) -> Result<(), BrokerError> {
        let headers = Self::headers(&msg);

        let confirm = match self
            .channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                publish_options(self.mandatory, &msg),
                &msg.body,
                BasicProperties::default()
                    .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
                    .with_delivery_mode(PERSISTENT)
                    .with_correlation_id(ShortString::from(msg.correlation_id.clone()))
                    .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
                    .with_headers(FieldTable::from(headers)),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(BrokerError::PublishingError(err.to_string()))
            }
            Ok(confirm) => Ok(confirm),
        }?;

        if let Some(signals) = self.confirms.clone() {
            tokio::spawn(watch_confirmation(confirm, msg.correlation_id, signals));
        }

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        no_ack: bool,
    ) -> Result<DeliveryStream, BrokerError> {
        let consumer = match self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "failure to create the consumer");
                Err(BrokerError::ConsumerDeclarationError(queue.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        let queue = queue.to_owned();
        let stream = consumer.map(move |result| match result {
            Ok(delivery) => Ok(InboundDelivery {
                delivery_tag: delivery.delivery_tag,
                queue: queue.clone(),
                redelivered: delivery.redelivered,
                context: otel::extract_context(&delivery.properties),
                data: delivery.data,
            }),
            Err(err) => Err(BrokerError::ConsumerError(err.to_string())),
        });

        Ok(stream.boxed())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        match self
            .channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error whiling ack msg");
                Err(BrokerError::AckMessageError)
            }
            _ => Ok(()),
        }
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        match self
            .channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error whiling reject msg");
                Err(BrokerError::RejectMessageError)
            }
            _ => Ok(()),
        }
    }
}

/// Publish flags for `msg`.
///
/// The delayed-message exchange cannot route at publish time and returns every
/// mandatory message as unroutable, so delayed messages never carry the flag.
fn publish_options(mandatory: bool, msg: &OutboundMessage) -> BasicPublishOptions {
    BasicPublishOptions {
        mandatory: mandatory && msg.delay_millis.is_none(),
        immediate: false,
    }
}

/// Waits for the broker's verdict on one message and forwards it.
async fn watch_confirmation(confirm: PublisherConfirm, token: String, signals: ConfirmSender) {
    let Some(signal) = confirm_signal(confirm.await, token) else {
        return;
    };

    if signals.send(signal).is_err() {
        error!("confirm dispatcher is gone, dropping delivery outcome");
    }
}

/// Maps a publisher confirm outcome to the signal reported for it.
///
/// A returned message yields only [`ConfirmSignal::Returned`], whatever the ack flag.
fn confirm_signal(
    outcome: Result<Confirmation, lapin::Error>,
    token: String,
) -> Option<ConfirmSignal> {
    match outcome {
        Ok(Confirmation::Ack(Some(returned))) | Ok(Confirmation::Nack(Some(returned))) => {
            Some(ConfirmSignal::Returned(returned_message(*returned)))
        }
        Ok(Confirmation::Ack(None)) => Some(ConfirmSignal::Confirm {
            token,
            acknowledged: true,
            cause: None,
        }),
        Ok(Confirmation::Nack(None)) => Some(ConfirmSignal::Confirm {
            token,
            acknowledged: false,
            cause: None,
        }),
        Ok(Confirmation::NotRequested) => {
            warn!(token = token.as_str(), "channel is not in confirm mode");
            None
        }
        Err(err) => Some(ConfirmSignal::Confirm {
            token,
            acknowledged: false,
            cause: Some(err.to_string()),
        }),
    }
}

fn returned_message(returned: BasicReturnMessage) -> ReturnedMessage {
    ReturnedMessage {
        body: returned.delivery.data,
        reply_code: returned.reply_code,
        reply_text: returned.reply_text.as_str().to_owned(),
        exchange: returned.delivery.exchange.as_str().to_owned(),
        routing_key: returned.delivery.routing_key.as_str().to_owned(),
    }
}
