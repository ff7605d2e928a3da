// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod broker;
pub mod channel;
pub mod configs;
pub mod confirm;
pub mod consumer;
pub mod correlation;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod exchange;
pub mod listener;
pub mod publisher;
pub mod queue;
pub mod rabbitmq;
pub mod status;
pub mod topology;
pub mod transport;
