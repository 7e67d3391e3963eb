//! Reliable request/response over a lossy channel.
//!
//! A request is resent with a doubling wait until a reply arrives or the wait
//! would exceed the policy maximum. Nothing is deduplicated: the first datagram
//! from the target after a send is the answer. Only idempotent requests may go
//! through here.
use std::net::SocketAddr;
use std::time::Duration;

use tracing::debug;

use super::traits::RequestChannel;
use crate::config_error;
use crate::error::{RingJoinError, Result};
use crate::node::messages::Message;

pub const DEFAULT_INITIAL_WAIT: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Backoff timing for [`exchange`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_wait: Duration,
    pub max_wait: Duration,
}

impl RetryPolicy {
    /// A zero initial wait never doubles past `max_wait`, so it is rejected.
    pub fn new(initial_wait: Duration, max_wait: Duration) -> Result<Self> {
        if initial_wait.is_zero() {
            return Err(config_error!("Initial wait must be greater than zero"));
        }
        if max_wait < initial_wait {
            return Err(config_error!(
                "Max wait {:?} is shorter than the initial wait {:?}",
                max_wait,
                initial_wait
            ));
        }
        Ok(Self {
            initial_wait,
            max_wait,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_wait: DEFAULT_INITIAL_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Send `payload` to `target` until a reply arrives, doubling the wait after each timeout.
pub async fn exchange<C>(
    channel: &C,
    target: SocketAddr,
    payload: &[u8],
    policy: &RetryPolicy,
) -> Result<Vec<u8>>
where
    C: RequestChannel + ?Sized,
{
    let mut delay = policy.initial_wait;
    let mut waited = Duration::ZERO;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        debug!(
            "[{}] attempt {}: waiting up to {:?} for a reply",
            target, attempts, delay
        );
        if let Some(reply) = channel.send_and_wait(target, payload, delay).await? {
            return Ok(reply);
        }
        waited += delay;
        delay *= 2;
        if delay > policy.max_wait {
            return Err(RingJoinError::PeerUnreachable {
                peer: target,
                attempts,
                waited,
            });
        }
    }
}

/// Exchange a [`Message`] and decode the reply.
pub async fn request<C>(
    channel: &C,
    target: SocketAddr,
    message: &Message,
    policy: &RetryPolicy,
) -> Result<Message>
where
    C: RequestChannel + ?Sized,
{
    let reply = exchange(channel, target, &message.encode(), policy).await?;
    Message::decode(&reply)
}
