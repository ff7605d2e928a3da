// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Send Status Reporting
//!
//! The persisted send-status store lives outside this crate. The layer only tells it
//! whether the broker accepted each `(topic, code)`.

use async_trait::async_trait;
use tracing::{info, warn};

/// Receives the delivery outcome of published events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SendStatusReporter: Send + Sync {
    async fn success(&self, topic: &str, code: &str);

    async fn failure(&self, topic: &str, code: &str, cause: &str);
}

/// Reporter that only logs outcomes, for applications without a status store.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusReporter;

#[async_trait]
impl SendStatusReporter for TracingStatusReporter {
    async fn success(&self, topic: &str, code: &str) {
        info!(topic, code, "event delivered");
    }

    async fn failure(&self, topic: &str, code: &str, cause: &str) {
        warn!(topic, code, cause, "event not delivered");
    }
}
