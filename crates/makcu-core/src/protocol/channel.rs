//! Byte transport under a [`Session`](crate::session::Session)
//!
//! A channel knows how to open a named endpoint at a signaling rate and move
//! bytes. It knows nothing about commands, retries or the handshake.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

use super::serial::{clear_buffers, configure_port, open_port};
use super::{ProtocolError, DEFAULT_TIMEOUT_MS};

/// Abstraction over the raw byte link to the device
///
/// Implementations must tolerate calls while closed: `write`/`flush` return
/// [`ProtocolError::ChannelClosed`], `read` returns an empty buffer and
/// `available` returns 0.
pub trait Channel: Send {
    /// Open `port` at `baud_rate`. An already-open channel is closed first.
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ProtocolError>;

    /// Close the endpoint. No-op when already closed.
    fn close(&mut self);

    /// Whether the channel currently holds an open endpoint
    fn is_open(&self) -> bool;

    /// Name of the endpoint last opened
    fn port_name(&self) -> Option<&str>;

    /// Current signaling rate
    fn baud_rate(&self) -> u32;

    /// Write all bytes
    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError>;

    /// Read up to `max_bytes` currently buffered bytes
    fn read(&mut self, max_bytes: usize) -> Vec<u8>;

    /// Flush pending output
    fn flush(&mut self) -> Result<(), ProtocolError>;

    /// Number of bytes waiting to be read
    fn available(&mut self) -> usize;

    /// Set the read/write timeout
    fn set_timeout(&mut self, timeout: Duration);

    /// Change the signaling rate of the open endpoint
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ProtocolError>;

    /// Read a single byte if one is buffered
    fn read_byte(&mut self) -> Option<u8> {
        self.read(1).first().copied()
    }

    /// Read whatever is buffered (up to `max_bytes`) as lossy UTF-8
    fn read_string(&mut self, max_bytes: usize) -> String {
        String::from_utf8_lossy(&self.read(max_bytes)).into_owned()
    }
}

/// `serialport`-backed channel
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialChannel {
    /// Closed channel with the default timeout
    pub fn new() -> Self {
        Self {
            port: None,
            port_name: None,
            baud_rate: 0,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl Default for SerialChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for SerialChannel {
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ProtocolError> {
        if self.port.is_some() {
            tracing::debug!("SerialChannel: {:?} already open, closing first", self.port_name);
            self.close();
        }

        let mut handle = open_port(port, Some(baud_rate))?;
        configure_port(handle.as_mut())?;
        clear_buffers(handle.as_mut())?;
        handle
            .set_timeout(self.timeout)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

        tracing::debug!("SerialChannel: opened {} at {} baud", port, baud_rate);
        self.port = Some(handle);
        self.port_name = Some(port.to_string());
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::debug!("SerialChannel: closed {:?}", self.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let port = self.port.as_mut().ok_or(ProtocolError::ChannelClosed)?;
        port.write_all(data).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => ProtocolError::Timeout,
            _ => ProtocolError::IoError(e),
        })
    }

    fn read(&mut self, max_bytes: usize) -> Vec<u8> {
        let Some(port) = self.port.as_mut() else {
            return Vec::new();
        };

        let available = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                tracing::warn!("SerialChannel: bytes_to_read failed: {}", e);
                return Vec::new();
            }
        };
        let to_read = available.min(max_bytes);
        if to_read == 0 {
            return Vec::new();
        }

        let mut buffer = vec![0u8; to_read];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                buffer
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("SerialChannel: read failed: {}", e);
                Vec::new()
            }
        }
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        let port = self.port.as_mut().ok_or(ProtocolError::ChannelClosed)?;
        port.flush()?;
        Ok(())
    }

    fn available(&mut self) -> usize {
        self.port
            .as_mut()
            .and_then(|port| port.bytes_to_read().ok())
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.set_timeout(timeout) {
                tracing::warn!("SerialChannel: set_timeout failed: {}", e);
            }
        }
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        if baud_rate == 0 {
            return Err(ProtocolError::InvalidBaudRate(baud_rate));
        }
        let port = self.port.as_mut().ok_or(ProtocolError::ChannelClosed)?;
        port.set_baud_rate(baud_rate)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
        self.baud_rate = baud_rate;
        Ok(())
    }
}
