//! Protocol commands
//!
//! Every device operation is a single ASCII line `km.verb(args)\r`. Encoding
//! here is pure; the [`Session`](crate::session::Session) does the I/O.

use std::fmt::Write as _;

use super::keys::{KeyCode, MouseButton};

/// Line terminator expected by the firmware
pub const COMMAND_TERMINATOR: char = '\r';

/// A typed device command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `km.down(code)`
    KeyDown(KeyCode),
    /// `km.up(code)`
    KeyUp(KeyCode),
    /// `km.press(code[,ms])`, duration 0 uses the firmware default
    KeyPress {
        /// Key to press
        key: KeyCode,
        /// Hold time in milliseconds
        duration_ms: u32,
    },
    /// `km.multidown(c1,c2,...)`
    MultiKeyDown(Vec<KeyCode>),
    /// `km.multiup(c1,c2,...)`
    MultiKeyUp(Vec<KeyCode>),
    /// `km.multipress(c1,c2,...[,ms])`
    MultiKeyPress {
        /// Keys in press order
        keys: Vec<KeyCode>,
        /// Hold time in milliseconds
        duration_ms: u32,
    },
    /// `km.string("text")`
    TypeString(String),
    /// `km.isdown(code)`
    IsKeyDown(KeyCode),
    /// `km.left(1)`, `km.side1(1)`...
    MouseDown(MouseButton),
    /// `km.left(0)`, `km.side1(0)`...
    MouseUp(MouseButton),
    /// `km.click(index,count)`
    MouseClick {
        /// Button to click
        button: MouseButton,
        /// Number of clicks
        count: u32,
    },
    /// `km.move(dx,dy)`
    MouseMove {
        /// Horizontal delta
        dx: i32,
        /// Vertical delta
        dy: i32,
    },
    /// `km.moveto(x,y)`
    MouseMoveTo {
        /// Target column
        x: i32,
        /// Target row
        y: i32,
    },
    /// `km.wheel(delta)`
    MouseWheel(i32),
    /// `km.zero()`
    Calibrate,
    /// `km.screen(width,height)`
    SetScreenBounds {
        /// Screen width in pixels
        width: i32,
        /// Screen height in pixels
        height: i32,
    },
    /// `km.buttons(1|0)`
    ButtonReporting(bool),
    /// `km.delay(ms)`, executed on the device
    Delay(u32),
    /// `km.version()`
    Version,
    /// `km.mac()`
    SerialNumber,
    /// `km.init()`
    Reset,
}

impl Command {
    /// Whether the command expects a textual reply
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            Command::Version | Command::SerialNumber | Command::IsKeyDown(_)
        )
    }

    /// Encode to the wire form, including the trailing `\r`
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(24);
        line.push_str("km.");
        // Writing to a String cannot fail
        let _ = match self {
            Command::KeyDown(key) => write!(line, "down({})", key.code()),
            Command::KeyUp(key) => write!(line, "up({})", key.code()),
            Command::KeyPress { key, duration_ms } => {
                if *duration_ms > 0 {
                    write!(line, "press({},{})", key.code(), duration_ms)
                } else {
                    write!(line, "press({})", key.code())
                }
            }
            Command::MultiKeyDown(keys) => write!(line, "multidown({})", join_codes(keys)),
            Command::MultiKeyUp(keys) => write!(line, "multiup({})", join_codes(keys)),
            Command::MultiKeyPress { keys, duration_ms } => {
                if *duration_ms > 0 {
                    write!(line, "multipress({},{})", join_codes(keys), duration_ms)
                } else {
                    write!(line, "multipress({})", join_codes(keys))
                }
            }
            Command::TypeString(text) => write!(line, "string(\"{}\")", text),
            Command::IsKeyDown(key) => write!(line, "isdown({})", key.code()),
            Command::MouseDown(button) => write!(line, "{}(1)", button.command_name()),
            Command::MouseUp(button) => write!(line, "{}(0)", button.command_name()),
            Command::MouseClick { button, count } => {
                write!(line, "click({},{})", button.index(), count)
            }
            Command::MouseMove { dx, dy } => write!(line, "move({},{})", dx, dy),
            Command::MouseMoveTo { x, y } => write!(line, "moveto({},{})", x, y),
            Command::MouseWheel(delta) => write!(line, "wheel({})", delta),
            Command::Calibrate => write!(line, "zero()"),
            Command::SetScreenBounds { width, height } => {
                write!(line, "screen({},{})", width, height)
            }
            Command::ButtonReporting(enable) => write!(line, "buttons({})", u8::from(*enable)),
            Command::Delay(ms) => write!(line, "delay({})", ms),
            Command::Version => write!(line, "version()"),
            Command::SerialNumber => write!(line, "mac()"),
            Command::Reset => write!(line, "init()"),
        };
        line.push(COMMAND_TERMINATOR);
        line
    }

    /// Check arguments the firmware would reject
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Command::MultiKeyDown(keys)
            | Command::MultiKeyUp(keys)
            | Command::MultiKeyPress { keys, .. }
                if keys.is_empty() =>
            {
                Err("multi-key command needs at least one key".to_string())
            }
            Command::TypeString(text) if text.is_empty() => {
                Err("cannot type an empty string".to_string())
            }
            Command::TypeString(text) if text.contains(['"', '\r', '\n']) => {
                Err("text may not contain quotes or line breaks".to_string())
            }
            _ => Ok(()),
        }
    }
}

fn join_codes(keys: &[KeyCode]) -> String {
    keys.iter()
        .map(|k| k.code().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a raw reply into its payload text.
///
/// The firmware echoes the command and may prefix replies with a `>>>`
/// prompt; both are removed, remaining lines are trimmed and joined with `\n`.
pub fn decode_response(raw: &[u8], sent: Option<&str>) -> String {
    let text = String::from_utf8_lossy(raw);
    let echo = sent.map(|s| s.trim_end_matches(['\r', '\n']).trim());

    text.split(['\r', '\n'])
        .map(|line| {
            let line = line.trim();
            line.strip_prefix(">>>").map(str::trim).unwrap_or(line)
        })
        .filter(|line| !line.is_empty())
        .filter(|line| Some(*line) != echo)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Interpret a decoded `km.isdown` reply
pub fn parse_key_state(reply: &str) -> bool {
    reply.contains('1') || reply.contains('3')
}
