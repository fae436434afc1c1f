//! # Serial Line Source
//!
//! The ingestion loop reads raw frames through the [`LineSource`] trait so the
//! loop can be driven by a scripted source in tests and by a real serial port
//! in production.
//!
//! `SerialPortLink` wraps a blocking `serialport` handle. Each read is moved to
//! the blocking pool with `spawn_blocking`, so the async runtime never stalls
//! on the port's read timeout.

use async_trait::async_trait;
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortType, StopBits};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the serial side.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("Serial read failed: {0}")]
    Read(#[from] io::Error),
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("No serial ports found")]
    NoPorts,
    #[error("Serial port is closed")]
    Closed,
}

/// # Line Source
///
/// A producer of raw, newline-terminated frames.
#[async_trait]
pub trait LineSource: Send {
    /// Returns the next frame if one is waiting, `None` when the link is idle.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SerialError>;

    /// Discards anything buffered on the input side.
    async fn flush_input(&mut self) -> Result<(), SerialError>;

    /// Releases the link. Calling it twice is harmless.
    async fn close(&mut self);
}

/// Port parameters. Framing is fixed at 8N1.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

/// A discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// Lists the serial ports visible to the OS.
pub fn list_ports() -> Result<Vec<PortInfo>, SerialError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(usb) => usb.product.unwrap_or_else(|| "USB serial".to_string()),
                SerialPortType::PciPort => "PCI serial".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
                SerialPortType::Unknown => "Unknown".to_string(),
            };
            PortInfo { name: p.port_name, description }
        })
        .collect())
}

/// Picks the first discovered port, used when no port is configured.
pub fn default_port() -> Result<String, SerialError> {
    list_ports()?
        .into_iter()
        .next()
        .map(|p| p.name)
        .ok_or(SerialError::NoPorts)
}

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// # Serial Port Link
///
/// A `LineSource` over a physical (or virtual) serial port.
pub struct SerialPortLink {
    settings: SerialSettings,
    port: Option<SharedPort>,
}

impl SerialPortLink {
    /// Opens the port as 8N1 with the configured baud rate and read timeout.
    pub fn open(settings: SerialSettings) -> Result<Self, SerialError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| SerialError::Open {
                port: settings.port.clone(),
                source,
            })?;

        info!(port = %settings.port, baud = settings.baud_rate, "Serial port opened");
        Ok(Self {
            settings,
            port: Some(Arc::new(Mutex::new(port))),
        })
    }

    fn shared(&self) -> Result<SharedPort, SerialError> {
        self.port.clone().ok_or(SerialError::Closed)
    }
}

#[async_trait]
impl LineSource for SerialPortLink {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SerialError> {
        let port = self.shared()?;
        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock().map_err(|_| SerialError::Closed)?;
            read_available_line(&mut **guard)
        })
        .await
        .map_err(|e| SerialError::Read(io::Error::other(e)))?
    }

    async fn flush_input(&mut self) -> Result<(), SerialError> {
        let port = self.shared()?;
        tokio::task::spawn_blocking(move || {
            let guard = port.lock().map_err(|_| SerialError::Closed)?;
            guard.clear(ClearBuffer::Input).map_err(SerialError::from)
        })
        .await
        .map_err(|e| SerialError::Read(io::Error::other(e)))?
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.settings.port, "Serial port closed");
        }
    }
}

/// Reads one line if bytes are waiting. A read timeout ends the line early,
/// so a partial line is returned rather than blocking for the rest.
fn read_available_line(port: &mut dyn SerialPort) -> Result<Option<Vec<u8>>, SerialError> {
    if port.bytes_to_read()? == 0 {
        return Ok(None);
    }

    let mut line = Vec::with_capacity(64);
    let mut byte = [0u8; 1];
    loop {
        match port.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                debug!(bytes = line.len(), "Serial read timed out mid-line");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SerialError::Read(e)),
        }
    }

    Ok((!line.is_empty()).then_some(line))
}
