//! SCPI voltmeter used as the analog input
//!
//! Any serial SCPI instrument that can return a list of DC voltage readings
//! works. Command strings come from configuration with `{channel}`,
//! `{count}` and `{rate}` placeholders, e.g.
//!
//! ```toml
//! [daq.scpi]
//! single = "MEAS:VOLT:DC? (@{channel})"
//! burst_setup = ["CONF:VOLT:DC (@{channel})", "SAMP:COUN {count}"]
//! burst_query = "READ?"
//! ```

use crate::adapters::{AdapterError, HardwareAdapter, SerialAdapter};
use crate::config::{DaqSettings, ScpiCommands};
use crate::error::DaqError;
use crate::hardware::capabilities::AnalogInput;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Fill `{channel}`, `{count}` and `{rate}` in a command template.
fn render(template: &str, channel: u8, count: usize, rate_hz: u32) -> Result<String> {
    let mut vars = HashMap::new();
    vars.insert("channel".to_string(), channel.to_string());
    vars.insert("count".to_string(), count.to_string());
    vars.insert("rate".to_string(), rate_hz.to_string());
    strfmt::strfmt(template, &vars)
        .map_err(|e| DaqError::Configuration(format!("bad SCPI template '{}': {}", template, e)))
        .map_err(anyhow::Error::from)
}

/// Parse one reply holding comma-separated voltages.
fn parse_readings(reply: &str) -> Result<Vec<f64>> {
    reply
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|_| {
                    anyhow::Error::from(DaqError::Instrument(format!(
                        "unparseable reading '{}'",
                        field
                    )))
                })
        })
        .collect()
}

/// Query the meter; a meter that stays silent is a [`DaqError::SerialTimeout`].
async fn query_meter(
    adapter: &mut (dyn HardwareAdapter + Send + Sync),
    query: &str,
) -> Result<String> {
    adapter.query(query).await.map_err(|err| {
        if let Some(AdapterError::Timeout(limit)) = err.downcast_ref::<AdapterError>() {
            let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            return DaqError::SerialTimeout(millis).into();
        }
        err
    })
}

/// Analog input backed by a SCPI voltmeter
pub struct ScpiVoltmeter {
    adapter: Mutex<Box<dyn HardwareAdapter + Send + Sync>>,
    commands: ScpiCommands,
}

impl ScpiVoltmeter {
    /// Wrap an already-connected adapter.
    pub fn new(adapter: Box<dyn HardwareAdapter + Send + Sync>, commands: ScpiCommands) -> Self {
        Self {
            adapter: Mutex::new(adapter),
            commands,
        }
    }

    /// Open the configured serial port and wrap it.
    pub async fn open(settings: &DaqSettings) -> Result<Self> {
        let mut adapter = SerialAdapter::new(settings.port.clone(), settings.baud_rate)
            .with_framing("\n", '\n')
            .with_timeout(Duration::from_millis(settings.timeout_ms));
        adapter
            .connect()
            .await
            .with_context(|| format!("Failed to open voltmeter on {}", settings.port))?;
        info!("SCPI voltmeter connected on {}", settings.port);
        Ok(Self::new(Box::new(adapter), settings.scpi.clone()))
    }
}

#[async_trait]
impl AnalogInput for ScpiVoltmeter {
    async fn read_voltage(&self, channel: u8) -> Result<f64> {
        let query = render(&self.commands.single, channel, 1, 0)?;
        let mut adapter = self.adapter.lock().await;
        let reply = query_meter(&mut **adapter, &query).await?;
        parse_readings(&reply)?
            .first()
            .copied()
            .ok_or_else(|| DaqError::Instrument("empty voltage reply".to_string()))
            .map_err(anyhow::Error::from)
    }

    async fn burst(&self, channel: u8, rate_hz: u32, count: usize) -> Result<Vec<f64>> {
        let mut adapter = self.adapter.lock().await;
        for template in &self.commands.burst_setup {
            adapter.send(&render(template, channel, count, rate_hz)?).await?;
        }
        let query = render(&self.commands.burst_query, channel, count, rate_hz)?;
        debug!("Burst of {} samples at {} Hz on channel {}", count, rate_hz, channel);
        let readings = parse_readings(&query_meter(&mut **adapter, &query).await?)?;
        if readings.len() < count {
            return Err(DaqError::Instrument(format!(
                "burst returned {} of {} samples",
                readings.len(),
                count
            ))
            .into());
        }
        Ok(readings)
    }
}
