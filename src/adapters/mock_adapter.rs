//! In-memory adapter that records commands and plays back scripted replies.

use super::{AdapterError, HardwareAdapter};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Shared {
    commands: Vec<String>,
    replies: VecDeque<Reply>,
}

/// A scripted reply for the next query.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Reply with this text
    Text(String),
    /// Let the query time out
    Timeout,
}

/// Mock adapter for driver tests and the simulated rig.
///
/// Cloning shares the command log and reply script, so a test can keep one
/// handle while the driver owns the other. Queries with no scripted reply
/// answer with `default_reply`.
#[derive(Clone)]
pub struct MockAdapter {
    shared: Arc<Mutex<Shared>>,
    default_reply: String,
    connected: bool,
}

impl MockAdapter {
    /// New adapter answering unscripted queries with `%` (SCL acknowledge).
    pub fn new() -> Self {
        Self::with_default_reply("%")
    }

    /// New adapter answering unscripted queries with `reply`.
    pub fn with_default_reply(reply: &str) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            default_reply: reply.to_string(),
            connected: false,
        }
    }

    /// Queue a reply for a future query.
    pub fn push_reply(&self, reply: Reply) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.replies.push_back(reply);
        }
    }

    /// Every command written so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.shared
            .lock()
            .map(|shared| shared.commands.clone())
            .unwrap_or_default()
    }

    fn record(&self, command: &str) -> Result<()> {
        if !self.connected {
            return Err(AdapterError::NotConnected.into());
        }
        if let Ok(mut shared) = self.shared.lock() {
            shared.commands.push(command.to_string());
        }
        Ok(())
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        self.record(command)
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.record(command)?;
        let next = self
            .shared
            .lock()
            .ok()
            .and_then(|mut shared| shared.replies.pop_front());
        match next {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Timeout) => Err(AdapterError::Timeout(Duration::from_millis(0)).into()),
            None => Ok(self.default_reply.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_replies() {
        let mut adapter = MockAdapter::new();
        let link = adapter.clone();
        adapter.connect().await.unwrap();

        link.push_reply(Reply::Text("*".to_string()));
        link.push_reply(Reply::Timeout);

        assert_eq!(adapter.query("FP").await.unwrap(), "*");
        let err = adapter.query("FP").await.unwrap_err();
        assert!(AdapterError::is_timeout(&err));
        assert_eq!(adapter.query("ME").await.unwrap(), "%");
        assert_eq!(link.commands(), vec!["FP", "FP", "ME"]);
    }

    #[tokio::test]
    async fn test_rejects_when_disconnected() {
        let mut adapter = MockAdapter::new();
        assert!(adapter.send("SP0").await.is_err());
    }
}
