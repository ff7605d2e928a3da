// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Bridge
//!
//! Runs one delivery through its handler under the configured acknowledgement mode:
//!
//! - `Automatic`: the broker settled the delivery when it sent it. The handler
//!   outcome is only logged and traced.
//! - `Manual`: the delivery is acknowledged once the handler returned successfully,
//!   never before. A failed handler gets no acknowledgement; the delivery is rejected
//!   with the configured requeue policy instead.
//!
//! A failing or panicking handler only affects its own delivery.

use crate::{
    errors::BrokerError,
    event::Event,
    listener::ListenerRegistry,
    otel,
    transport::{InboundDelivery, Transport},
};
use futures_util::FutureExt;
use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    trace::{Span, Status},
};
use std::{borrow::Cow, panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, error, warn};

/// Acknowledgement discipline, chosen once when the bridge is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Automatic,
    Manual { requeue_rejected: bool },
}

impl AckMode {
    pub fn new(manual_acknowledge: bool, requeue_rejected: bool) -> AckMode {
        if manual_acknowledge {
            AckMode::Manual { requeue_rejected }
        } else {
            AckMode::Automatic
        }
    }

    /// Whether consumers should be started in broker auto-ack mode.
    pub fn no_ack(&self) -> bool {
        matches!(self, AckMode::Automatic)
    }
}

/// Where a delivery ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    HandlerRunning,
    Acked,
    Failed,
}

pub struct ConsumerBridge {
    registry: Arc<ListenerRegistry>,
    transport: Arc<dyn Transport>,
    ack_mode: AckMode,
    tracer: BoxedTracer,
}

impl ConsumerBridge {
    pub fn new(
        registry: Arc<ListenerRegistry>,
        transport: Arc<dyn Transport>,
        ack_mode: AckMode,
    ) -> Arc<ConsumerBridge> {
        Arc::new(ConsumerBridge {
            registry,
            transport,
            ack_mode,
            tracer: global::tracer("mqbroker consumer"),
        })
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Processes one delivery and returns the state it settled in.
    pub async fn handle(&self, delivery: &InboundDelivery) -> DeliveryState {
        let mut span = otel::new_span(&self.tracer, &delivery.context, &delivery.queue);

        debug!(
            queue = delivery.queue.as_str(),
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            "received"
        );

        let event: Event = match serde_json::from_slice(&delivery.data) {
            Ok(event) => event,
            Err(err) => {
                let err = BrokerError::ParsePayloadError(err.to_string());
                error!(error = err.to_string(), "failure to decode delivery");
                record_failure(&mut span, &err);
                return self.settle_failure(delivery).await;
            }
        };

        let Some(handler) = self.registry.handler(&event.name) else {
            warn!(
                topic = %event.name,
                "removing message from queue - reason: no handler for topic"
            );
            return self.settle_success(delivery, &mut span).await;
        };

        debug!(
            topic = %event.name,
            code = %event.key,
            state = ?DeliveryState::HandlerRunning,
            "invoking handler"
        );

        let result = AssertUnwindSafe(handler.handle(&delivery.context, &event))
            .catch_unwind()
            .await;

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some("handler panicked".to_owned()),
        };

        match failure {
            None => {
                debug!(topic = %event.name, code = %event.key, "message successfully processed");
                self.settle_success(delivery, &mut span).await
            }
            Some(cause) => {
                let err = BrokerError::HandlerExecutionError(cause);
                error!(
                    error = err.to_string(),
                    topic = %event.name,
                    code = %event.key,
                    "error whiling handling msg"
                );
                record_failure(&mut span, &err);
                self.settle_failure(delivery).await
            }
        }
    }

    async fn settle_success(
        &self,
        delivery: &InboundDelivery,
        span: &mut BoxedSpan,
    ) -> DeliveryState {
        match self.ack_mode {
            AckMode::Automatic => {
                span.set_status(Status::Ok);
                DeliveryState::Idle
            }
            AckMode::Manual { .. } => match self.transport.ack(delivery.delivery_tag).await {
                Ok(()) => {
                    span.set_status(Status::Ok);
                    DeliveryState::Acked
                }
                Err(err) => {
                    record_failure(span, &err);
                    DeliveryState::Failed
                }
            },
        }
    }

    async fn settle_failure(&self, delivery: &InboundDelivery) -> DeliveryState {
        match self.ack_mode {
            AckMode::Automatic => DeliveryState::Idle,
            AckMode::Manual { requeue_rejected } => {
                if let Err(err) = self
                    .transport
                    .reject(delivery.delivery_tag, requeue_rejected)
                    .await
                {
                    error!(error = err.to_string(), "error whiling reject msg");
                }
                DeliveryState::Failed
            }
        }
    }
}

fn record_failure(span: &mut BoxedSpan, err: &BrokerError) {
    span.record_error(err);
    span.set_status(Status::Error {
        description: Cow::from(err.to_string()),
    });
}
