//! Hardware adapter implementations
//!
//! Adapters own the byte-level link to an instrument. Drivers in
//! [`crate::hardware`] build command strings and hand them to an adapter,
//! which appends the line terminator and collects the reply.

pub mod mock_adapter;
pub mod serial_adapter;

pub use mock_adapter::MockAdapter;
pub use serial_adapter::SerialAdapter;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures raised by adapters.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AdapterError {
    #[error("Adapter not connected")]
    NotConnected,

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl AdapterError {
    /// True when the error is a read timeout rather than a broken link.
    pub fn is_timeout(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<AdapterError>(), Some(AdapterError::Timeout(_)))
    }
}

/// Low-level command/response link to one instrument.
#[async_trait]
pub trait HardwareAdapter: Send {
    /// Short adapter name for logs.
    fn name(&self) -> &str;

    /// Open the underlying link.
    async fn connect(&mut self) -> Result<()>;

    /// Close the underlying link. Closing twice is not an error.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether `connect` has succeeded and `disconnect` has not been called since.
    fn is_connected(&self) -> bool;

    /// Write a command without reading a reply.
    async fn send(&mut self, command: &str) -> Result<()>;

    /// Write a command and read one delimited reply, trimmed.
    async fn query(&mut self, command: &str) -> Result<String>;
}
