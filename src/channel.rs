// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the creation of the AMQP connection and channel used by the
//! layer. The channel is put in publisher confirm mode when confirms are enabled and
//! its prefetch is bounded so that workers do not hoard deliveries.

use crate::{configs::MqBrokerConfigs, errors::BrokerError};
use lapin::{
    options::{BasicQosOptions, ConfirmSelectOptions},
    types::LongString,
    Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Creates a new AMQP channel for communication with RabbitMQ.
///
/// # Example
/// ```ignore
/// let (conn, channel) = new_amqp_channel(&configs).await?;
/// ```
pub async fn new_amqp_channel(
    cfg: &MqBrokerConfigs,
) -> Result<(Arc<Connection>, Arc<Channel>), BrokerError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app.name.clone()));

    let conn = match Connection::connect(&cfg.amqp_uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(BrokerError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    let channel = match conn.create_channel().await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(BrokerError::ChannelError)
        }
    }?;

    if cfg.rabbitmq.publisher_confirms {
        if let Err(err) = channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
        {
            error!(error = err.to_string(), "error to enable publisher confirms");
            return Err(BrokerError::ConfirmSelectError);
        }
        debug!("publisher confirms enabled");
    }

    if let Err(err) = channel
        .basic_qos(
            cfg.mq_broker.prefetch_count,
            BasicQosOptions { global: false },
        )
        .await
    {
        error!(error = err.to_string(), "error to configure qos");
        return Err(BrokerError::QoSDeclarationError(err.to_string()));
    }

    debug!("channel created");
    Ok((Arc::new(conn), Arc::new(channel)))
}
