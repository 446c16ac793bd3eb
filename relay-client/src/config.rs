//! Client configuration for call deadlines and streaming behavior
use relay_bridge::{Endpoint, DEFAULT_BROKER_CAPACITY, DEFAULT_POLL_INTERVAL};
use std::time::Duration;

pub const DEFAULT_FINISH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Target store node.
    pub endpoint: Endpoint,

    /// Upper bound for every blocking wait a call performs.
    pub finish_timeout: Duration,

    /// Capacity of upload and iteration brokers. Larger buffers delay
    /// backpressure signaling; smaller ones cause more blocking round-trips.
    pub broker_capacity: usize,

    /// Bounded idle wait of the upload loop.
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given endpoint with default values
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            finish_timeout: DEFAULT_FINISH_TIMEOUT,
            broker_capacity: DEFAULT_BROKER_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the per-call finish timeout
    pub fn with_finish_timeout(mut self, timeout: Duration) -> Self {
        self.finish_timeout = timeout;
        self
    }

    /// Set the broker capacity used for uploads and iteration
    pub fn with_broker_capacity(mut self, capacity: usize) -> Self {
        self.broker_capacity = capacity;
        self
    }

    /// Set the upload loop's bounded idle wait
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
