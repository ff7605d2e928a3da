// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! The layer publishes through at most two exchanges: a durable direct exchange for
//! immediate delivery and, when delayed delivery is enabled, a durable
//! `x-delayed-message` exchange that holds messages for their `x-delay` before routing
//! them with direct semantics.

use std::collections::BTreeMap;

/// Name of the exchange every topic queue is bound to.
pub const PRIMARY_EXCHANGE: &str = "mqBrokerRabbit.exchange";
/// Name of the delayed-delivery exchange.
pub const DELAYED_EXCHANGE: &str = "mqBrokerRabbit.delayed.exchange";

/// Constant for the argument used to specify the routing type of a delayed exchange
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";
/// Custom exchange type provided by the delayed message exchange plugin
pub const X_DELAYED_MESSAGE: &str = "x-delayed-message";

/// Exchange types used by the layer.
///
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    XMessageDelayed,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom(X_DELAYED_MESSAGE.to_owned())
            }
        }
    }
}

/// Definition of an exchange with its declaration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) params: BTreeMap<String, String>,
}

impl ExchangeDefinition {
    /// Creates a non-durable direct exchange definition with the given name.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            durable: false,
            delete: false,
            params: BTreeMap::default(),
        }
    }

    /// The durable direct exchange used for immediate delivery.
    pub fn primary() -> ExchangeDefinition {
        ExchangeDefinition::new(PRIMARY_EXCHANGE).direct().durable()
    }

    /// The durable delayed exchange, routing with direct semantics once the delay elapses.
    pub fn delayed() -> ExchangeDefinition {
        ExchangeDefinition::new(DELAYED_EXCHANGE)
            .direct_delayed()
            .durable()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ExchangeKind {
        &self.kind
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.delete
    }

    /// Sets the exchange type to Direct.
    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Creates a delayed direct exchange.
    ///
    /// This requires the x-delayed-message plugin to be installed on the RabbitMQ server.
    pub fn direct_delayed(mut self) -> Self {
        self.kind = ExchangeKind::XMessageDelayed;
        self.params.insert(
            AMQP_HEADERS_DELAYED_EXCHANGE_TYPE.to_owned(),
            "direct".to_owned(),
        );
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}
