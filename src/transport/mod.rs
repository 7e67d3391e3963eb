//! UDP Transport Module
//!
//! One socket per process. Requests go out through [`exchange`], which
//! retries with exponential backoff; replies are routed back to the waiting
//! exchange by source address and everything else lands on the inbound queue.

pub mod channel;
pub mod exchange;
pub mod receiver;
#[cfg(test)]
pub(crate) mod scripted;
pub mod traits;

pub use channel::UdpChannel;
pub use exchange::{exchange, request, RetryPolicy};
pub use receiver::{Inbound, ReceiverStats, UdpReceiver};
pub use traits::RequestChannel;
