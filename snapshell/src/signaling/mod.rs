mod backoff;
mod client;

pub use backoff::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_RETRIES, RetryPolicy, calculate_backoff,
};
pub use client::{Joined, SignalStream, SignalingClient, SignalingConfig};

#[cfg(test)]
pub(crate) use client::Outbound;
