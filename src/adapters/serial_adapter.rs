use super::{AdapterError, HardwareAdapter};
#[cfg(not(feature = "instrument_serial"))]
use crate::error::DaqError;
use anyhow::{anyhow, Result};
#[cfg(feature = "instrument_serial")]
use anyhow::Context;
use async_trait::async_trait;
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;
#[cfg(feature = "instrument_serial")]
use tracing::debug;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;

/// Serial adapter for RS-232 communication
///
/// This adapter wraps the serialport crate and provides async I/O
/// using Tokio's blocking task executor for synchronous serial operations.
/// The port is opened 8N1 with no flow control.
#[derive(Clone)]
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Longest silence tolerated while a reply is arriving
    timeout: Duration,

    /// Line terminator appended to commands (e.g., "\r")
    line_terminator: String,

    /// Response line ending character (e.g., '\r')
    response_delimiter: char,

    /// The actual serial port (behind Arc<Mutex> for async access)
    #[cfg(feature = "instrument_serial")]
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl SerialAdapter {
    /// Create a new serial adapter with `\r\n` commands, `\n` replies and a 2 s timeout
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 9600, 115200)
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_secs(2),
            line_terminator: "\r\n".to_string(),
            response_delimiter: '\n',
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Set the longest silence tolerated before and between reply bytes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the command terminator and the reply delimiter.
    pub fn with_framing(mut self, line_terminator: &str, response_delimiter: char) -> Self {
        self.line_terminator = line_terminator.to_string();
        self.response_delimiter = response_delimiter;
        self
    }

    /// Port this adapter talks to.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Read one reply up to `delimiter`, trimmed.
///
/// `timeout` bounds the silence before the first byte and between bytes, so a
/// long reply that keeps streaming is never cut off. Reads that time out at
/// the port level are retried until that silence runs out.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
fn read_reply<R: Read + ?Sized>(
    reader: &mut R,
    delimiter: char,
    timeout: Duration,
) -> Result<String> {
    let mut response = String::new();
    let mut buffer = [0u8; 1];
    let mut last_byte = Instant::now();

    loop {
        if last_byte.elapsed() > timeout {
            return Err(AdapterError::Timeout(timeout).into());
        }

        match reader.read(&mut buffer) {
            Ok(1) => {
                last_byte = Instant::now();
                let ch = buffer[0] as char;
                if ch == delimiter {
                    break;
                }
                response.push(ch);
            }
            Ok(0) => {
                return Err(AdapterError::ConnectionFailed("Unexpected EOF".to_string()).into());
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => {
                return Err(anyhow!("Serial read error: {}", e));
            }
            Ok(_) => {
                return Err(anyhow!("Read into single-byte buffer returned >1"));
            }
        }
    }

    Ok(response.trim().to_string())
}

#[async_trait]
impl HardwareAdapter for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    async fn connect(&mut self) -> Result<()> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = serialport::new(&self.port_name, self.baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(Duration::from_millis(100)) // Internal read timeout
                .open()
                .with_context(|| {
                    format!(
                        "Failed to open serial port '{}' at {} baud",
                        self.port_name, self.baud_rate
                    )
                })?;

            self.port = Some(Arc::new(Mutex::new(port)));

            debug!(
                "Serial port '{}' opened at {} baud",
                self.port_name, self.baud_rate
            );
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            Err(DaqError::SerialFeatureDisabled.into())
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.take().is_some() {
                debug!("Serial port '{}' closed", self.port_name);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_serial")]
        {
            self.port.is_some()
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            false
        }
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = self.port.as_ref().ok_or(AdapterError::NotConnected)?;

            let command_str = format!("{}{}", command, self.line_terminator);
            let port_clone = port.clone();
            let command_clone = command.to_string();

            // Execute blocking serial I/O on dedicated thread
            tokio::task::spawn_blocking(move || -> Result<()> {
                use std::io::Write;

                let mut port_guard = port_clone.blocking_lock();

                port_guard
                    .write_all(command_str.as_bytes())
                    .context("Failed to write to serial port")?;

                port_guard.flush().context("Failed to flush serial port")?;

                debug!("Sent serial command: {}", command_clone.trim());
                Ok(())
            })
            .await
            .context("Serial I/O task panicked")?
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = command;
            Err(DaqError::SerialFeatureDisabled.into())
        }
    }

    async fn query(&mut self, query: &str) -> Result<String> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = self.port.as_ref().ok_or(AdapterError::NotConnected)?;

            let command_str = format!("{}{}", query, self.line_terminator);
            let command_for_log = query.to_string();
            let delimiter = self.response_delimiter;
            let timeout = self.timeout;
            let port_clone = port.clone();

            tokio::task::spawn_blocking(move || -> Result<String> {
                use std::io::Write;

                let mut port_guard = port_clone.blocking_lock();

                // Stale bytes from an earlier unanswered command would be read as this reply
                let _ = port_guard.clear(serialport::ClearBuffer::Input);

                port_guard
                    .write_all(command_str.as_bytes())
                    .context("Failed to write to serial port")?;

                port_guard.flush().context("Failed to flush serial port")?;

                debug!("Sent serial command: {}", command_for_log.trim());

                let response = read_reply(&mut **port_guard, delimiter, timeout)?;
                debug!("Received serial response: {}", response);
                Ok(response)
            })
            .await
            .context("Serial I/O task panicked")?
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = query;
            Err(DaqError::SerialFeatureDisabled.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reply that trickles in one byte per `gap`, port-level timeouts in between.
    struct SlowReply {
        bytes: std::vec::IntoIter<u8>,
        gap: Duration,
        waiting: bool,
    }

    impl SlowReply {
        fn new(reply: &str, gap: Duration) -> Self {
            Self {
                bytes: reply.as_bytes().to_vec().into_iter(),
                gap,
                waiting: true,
            }
        }
    }

    impl Read for SlowReply {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(self.gap / 2);
            self.waiting = !self.waiting;
            if !self.waiting {
                return Err(ErrorKind::TimedOut.into());
            }
            match self.bytes.next() {
                Some(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                // Nothing more to send: stay silent
                None => Err(ErrorKind::TimedOut.into()),
            }
        }
    }

    #[test]
    fn test_long_reply_outlasts_timeout() {
        let reply = "+1.0E-01,+2.0E-01,+3.0E-01\n";
        let mut port = SlowReply::new(reply, Duration::from_millis(10));
        let started = Instant::now();
        let text = read_reply(&mut port, '\n', Duration::from_millis(60)).unwrap();
        assert_eq!(text, "+1.0E-01,+2.0E-01,+3.0E-01");
        // Whole reply took several times the timeout
        assert!(started.elapsed() > Duration::from_millis(120));
    }

    #[test]
    fn test_silence_times_out() {
        let mut port = SlowReply::new("partial", Duration::from_millis(10));
        let err = read_reply(&mut port, '\n', Duration::from_millis(50)).unwrap_err();
        assert!(AdapterError::is_timeout(&err));
    }

    #[test]
    fn test_closed_port_is_not_a_timeout() {
        let mut port: &[u8] = b"VE3";
        let err = read_reply(&mut port, '\r', Duration::from_millis(50)).unwrap_err();
        assert!(!AdapterError::is_timeout(&err));
        assert!(err.to_string().contains("EOF"));
    }

    #[test]
    fn test_serial_adapter_creation() {
        let adapter = SerialAdapter::new("/dev/ttyUSB0", 9600);
        assert_eq!(adapter.name(), "serial");
        assert_eq!(adapter.port_name(), "/dev/ttyUSB0");
        assert_eq!(adapter.baud_rate, 9600);
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_framing_builder() {
        let adapter = SerialAdapter::new("COM12", 9600)
            .with_framing("\r", '\r')
            .with_timeout(Duration::from_millis(500));
        assert_eq!(adapter.line_terminator, "\r");
        assert_eq!(adapter.response_delimiter, '\r');
        assert_eq!(adapter.timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_query_before_connect_fails() {
        let mut adapter = SerialAdapter::new("COM12", 9600);
        assert!(adapter.query("VE3").await.is_err());
    }
}
