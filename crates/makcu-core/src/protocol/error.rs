//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the device
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The serial driver reported an error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Named port does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Discovery found no candidate port
    #[error("No MAKCU device found")]
    NoDeviceFound,

    /// Channel used while closed
    #[error("Channel is not open")]
    ChannelClosed,

    /// Rate outside the supported range
    #[error("Invalid baud rate: {0}")]
    InvalidBaudRate(u32),

    /// Rate-switch frame could not be sent
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Port could not be reopened at the high rate
    #[error("Failed to switch to {baud_rate} baud: {reason}")]
    RateSwitchFailed {
        /// Rate the reopen was attempted at
        baud_rate: u32,
        /// Driver message
        reason: String,
    },

    /// Button reporting could not be enabled
    #[error("Device initialization failed: {0}")]
    InitializationFailed(String),

    /// Command issued outside a connected session
    #[error("Not connected to device")]
    NotConnected,

    /// A command line could not be written
    #[error("Failed to write command {command:?}: {reason}")]
    WriteFailed {
        /// The line, without its terminator
        command: String,
        /// Channel error
        reason: String,
    },

    /// Command arguments rejected before sending
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Write did not complete within the channel timeout
    #[error("Write timed out")]
    Timeout,

    /// Other I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error belongs to the connection phase (as opposed to a
    /// failed command on an established session)
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::PortNotFound(_)
                | ProtocolError::NoDeviceFound
                | ProtocolError::InvalidBaudRate(_)
                | ProtocolError::HandshakeFailed(_)
                | ProtocolError::RateSwitchFailed { .. }
                | ProtocolError::InitializationFailed(_)
        )
    }
}
