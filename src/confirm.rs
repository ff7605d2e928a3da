// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Confirm Dispatcher
//!
//! Turns the broker's asynchronous publisher confirms and returns into success and
//! failure reports for the originating `(topic, code)`.
//!
//! Signals that cannot be traced back to an event (an undecodable correlation token or
//! returned body) are logged and dropped: there is nothing to report them against.

use crate::{
    correlation::CorrelationToken,
    errors::BrokerError,
    event::Event,
    status::SendStatusReporter,
    transport::{ConfirmReceiver, ConfirmSignal, ReturnedMessage},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Cause reported when the broker nacks without giving a reason.
pub const DEFAULT_NACK_CAUSE: &str = "nack";

pub struct ConfirmDispatcher {
    reporter: Arc<dyn SendStatusReporter>,
}

impl ConfirmDispatcher {
    pub fn new(reporter: Arc<dyn SendStatusReporter>) -> Arc<ConfirmDispatcher> {
        Arc::new(ConfirmDispatcher { reporter })
    }

    /// Handles a publisher confirm (`acknowledged`) or nack.
    pub async fn on_confirm(&self, token: &str, acknowledged: bool, cause: Option<&str>) {
        let token = match CorrelationToken::decode(token) {
            Ok(token) => token,
            Err(err) => {
                error!(error = err.to_string(), "dropping confirm");
                return;
            }
        };

        if acknowledged {
            debug!(topic = %token.topic, code = %token.code, "publish confirmed");
            self.reporter.success(&token.topic, &token.code).await;
            return;
        }

        self.report_failure(
            token.topic,
            token.code,
            cause.unwrap_or(DEFAULT_NACK_CAUSE).to_owned(),
        )
        .await;
    }

    /// Handles a message the broker could not route.
    pub async fn on_return(&self, returned: &ReturnedMessage) {
        let event: Event = match serde_json::from_slice(&returned.body) {
            Ok(event) => event,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    routing_key = returned.routing_key.as_str(),
                    "dropping returned message with undecodable body"
                );
                return;
            }
        };

        let cause = format!(
            "replyCode: {}, replyText: {}, exchange: {}",
            returned.reply_code, returned.reply_text, returned.exchange
        );

        self.report_failure(returned.routing_key.clone(), event.key, cause)
            .await;
    }

    /// Consumes signals until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut signals: ConfirmReceiver) {
        while let Some(signal) = signals.recv().await {
            match signal {
                ConfirmSignal::Confirm {
                    token,
                    acknowledged,
                    cause,
                } => self.on_confirm(&token, acknowledged, cause.as_deref()).await,
                ConfirmSignal::Returned(returned) => self.on_return(&returned).await,
            }
        }

        debug!("confirm channel closed");
    }

    async fn report_failure(&self, topic: String, code: String, cause: String) {
        self.reporter.failure(&topic, &code, &cause).await;

        let err = BrokerError::DeliveryNotAcknowledgedError { topic, code, cause };
        warn!(error = err.to_string(), "delivery failure reported");
    }
}
