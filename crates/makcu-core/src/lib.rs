//! # makcu-core
//!
//! Host-side driver for the MAKCU USB input-emulation device.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial transport and the 115200 → 4 Mbaud rate-switch handshake
//! - The `km.*` ASCII command protocol (keyboard, mouse, device queries)
//! - Background button monitoring with edge callbacks
//! - Macro recording, authoring, storage and paced replay
//! - Humanized timing and scripted input patterns
//!
//! ## Example
//!
//! ```rust,no_run
//! use makcu_core::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new();
//! session.connect(None)?;
//!
//! session.mouse_move(25, -10)?;
//! session.key_press(KeyCode::Enter, 0)?;
//! println!("firmware: {}", session.version()?);
//!
//! session.set_button_handler(|button, pressed| {
//!     println!("{} {}", button, if pressed { "down" } else { "up" });
//! });
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gaming;
pub mod macros;
pub mod protocol;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::macros::{Action, ActionKind, Macro, MacroConfig, MacroError, MacroRecorder};
    pub use crate::protocol::{Channel, Command, KeyCode, MouseButton, ProtocolError};
    pub use crate::session::{ConnectionStatus, DeviceInfo, Session};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
