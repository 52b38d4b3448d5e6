//! Serial Protocol Communication
//!
//! Implements the MAKCU ASCII command protocol (`km.verb(args)\r`) and the
//! byte transport it runs over.

mod channel;
pub mod commands;
pub mod discovery;
mod error;
pub mod keys;
pub mod serial;

pub use channel::{Channel, SerialChannel};
pub use commands::{decode_response, Command};
pub use discovery::{PortDiscovery, SerialPortDiscovery};
pub use error::ProtocolError;
pub use keys::{ButtonMask, KeyCode, MouseButton, MouseButtonStates, ParseNameError};
pub use serial::{list_ports, PortInfo};

/// Rate the device listens on after power-up
pub const INITIAL_BAUD_RATE: u32 = 115_200;

/// Operating rate after the rate-switch handshake
pub const HIGH_SPEED_BAUD_RATE: u32 = 4_000_000;

/// Magic frame that makes the firmware switch its UART to [`HIGH_SPEED_BAUD_RATE`]
pub const BAUD_CHANGE_COMMAND: [u8; 9] = [0xDE, 0xAD, 0x05, 0x00, 0xA5, 0x00, 0x09, 0x3D, 0x00];

/// Default read/write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Upper bound on bytes read for one query reply
pub const MAX_RESPONSE_SIZE: usize = 1024;

/// USB vendor id of the CH343 bridge
pub const MAKCU_VID: u16 = 0x1A86;

/// USB product id of the CH343 bridge
pub const MAKCU_PID: u16 = 0x55D3;

/// Description reported for MAKCU ports
pub const MAKCU_DESCRIPTION: &str = "USB-Enhanced-SERIAL CH343";
