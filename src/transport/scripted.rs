//! In-memory channel that answers from a fixed script, for unit tests.
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::traits::RequestChannel;
use crate::error::{RingJoinError, Result};

/// Answers each `send_and_wait` with the next scripted reply, whoever the target.
pub struct ScriptedChannel {
    local: SocketAddr,
    replies: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<(SocketAddr, String)>>,
}

impl ScriptedChannel {
    pub fn new(local: SocketAddr, replies: &[&str]) -> Self {
        Self {
            local,
            replies: Mutex::new(replies.iter().map(|r| r.as_bytes().to_vec()).collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, as `(target, text)`
    pub fn sent(&self) -> Vec<(SocketAddr, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestChannel for ScriptedChannel {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn send_to(&self, target: SocketAddr, data: &[u8]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((target, String::from_utf8_lossy(data).into_owned()));
        Ok(())
    }

    async fn send_and_wait(
        &self,
        target: SocketAddr,
        data: &[u8],
        _wait: Duration,
    ) -> Result<Option<Vec<u8>>> {
        self.send_to(target, data).await?;
        let reply = self.replies.lock().unwrap().pop_front();
        reply
            .map(Some)
            .ok_or_else(|| RingJoinError::Transport("Script exhausted".to_string()))
    }
}
