// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Message Broker Layer
//!
//! This module provides the error taxonomy shared by every component of the crate.
//! Synchronous failures (bad input, topology declaration, publishing) are returned to
//! the caller, while delivery outcome failures are only ever reported through the
//! status reporter.

use thiserror::Error;

/// Represents errors that can occur while declaring topology, publishing, confirming
/// or consuming messages.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BrokerError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error switching the channel to publisher confirm mode
    #[error("failure to enable publisher confirms")]
    ConfirmSelectError,

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// A topic or code that cannot be carried by a correlation token
    #[error("invalid input `{0}`")]
    InvalidInputError(String),

    /// A correlation token that does not split into a topic and a code
    #[error("malformed correlation token `{0}`")]
    MalformedTokenError(String),

    /// The broker rejected an exchange, queue or binding declaration
    #[error("failure to declare topology: {0}")]
    TopologyDeclarationError(String),

    /// Error serializing an outbound event body
    #[error("failure to serialize event `{0}`")]
    SerializationError(String),

    /// Error parsing an inbound message payload
    #[error("failure to parse payload `{0}`")]
    ParsePayloadError(String),

    /// Error handing a message to the transport
    #[error("failure to publish `{0}`")]
    PublishingError(String),

    /// Error declaring a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    ConsumerDeclarationError(String),

    /// Error receiving a delivery from a consumer stream
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error rejecting a message
    #[error("failure to reject message")]
    RejectMessageError,

    /// A registered handler failed while processing a delivery
    #[error("handler failure `{0}`")]
    HandlerExecutionError(String),

    /// The broker nacked or returned a published message
    #[error("delivery of `{topic}`/`{code}` was not acknowledged: {cause}")]
    DeliveryNotAcknowledgedError {
        topic: String,
        code: String,
        cause: String,
    },
}
