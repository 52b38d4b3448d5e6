//! Macro actions
//!
//! One recorded or authored input operation. The set of operations is closed;
//! encoding and execution are a match over [`ActionKind`].

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::thread;
use std::time::Duration;

use crate::protocol::{KeyCode, MouseButton, ProtocolError};
use crate::session::Session;

/// Numeric type code used in macro files, one per [`ActionKind`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ActionType {
    KeyDown = 0,
    KeyUp = 1,
    KeyPress = 2,
    MultiKeyPress = 3,
    TypeString = 4,
    MouseDown = 5,
    MouseUp = 6,
    MouseClick = 7,
    MouseMove = 8,
    MouseMoveTo = 9,
    MouseWheel = 10,
    Delay = 11,
}

impl ActionType {
    const ALL: [ActionType; 12] = [
        ActionType::KeyDown,
        ActionType::KeyUp,
        ActionType::KeyPress,
        ActionType::MultiKeyPress,
        ActionType::TypeString,
        ActionType::MouseDown,
        ActionType::MouseUp,
        ActionType::MouseClick,
        ActionType::MouseMove,
        ActionType::MouseMoveTo,
        ActionType::MouseWheel,
        ActionType::Delay,
    ];

    /// File code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Type for a file code, `None` if unknown
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// What an action does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Hold a key
    KeyDown(KeyCode),
    /// Release a key
    KeyUp(KeyCode),
    /// Press and release; `duration_ms` 0 uses the firmware default
    KeyPress {
        /// Key to press
        key: KeyCode,
        /// Hold time in milliseconds
        duration_ms: u32,
    },
    /// Press a chord together
    MultiKeyPress {
        /// Keys in press order
        keys: Vec<KeyCode>,
        /// Hold time in milliseconds
        duration_ms: u32,
    },
    /// Type text on the device
    TypeString(String),
    /// Hold a mouse button
    MouseDown(MouseButton),
    /// Release a mouse button
    MouseUp(MouseButton),
    /// Click `count` times
    MouseClick {
        /// Button to click
        button: MouseButton,
        /// Number of clicks
        count: u32,
    },
    /// Relative pointer move
    MouseMove {
        /// Horizontal delta
        dx: i32,
        /// Vertical delta
        dy: i32,
    },
    /// Absolute pointer move
    MouseMoveTo {
        /// Target column
        x: i32,
        /// Target row
        y: i32,
    },
    /// Scroll by `delta` notches
    MouseWheel(i32),
    /// Host-side pause
    Delay(u32),
}

/// An action stamped with its offset from the start of recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Offset from the start of the macro
    pub timestamp: Duration,
    /// The operation
    pub kind: ActionKind,
}

impl Action {
    /// Action at `timestamp`
    pub fn new(timestamp: Duration, kind: ActionKind) -> Self {
        Self { timestamp, kind }
    }

    /// Timestamp in whole milliseconds, as stored in macro files
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp.as_millis() as u64
    }

    /// Run the action against a session
    pub fn execute(&self, session: &Session) -> Result<(), ProtocolError> {
        self.kind.execute(session)
    }
}

impl ActionKind {
    /// File type code for this kind
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::KeyDown(_) => ActionType::KeyDown,
            ActionKind::KeyUp(_) => ActionType::KeyUp,
            ActionKind::KeyPress { .. } => ActionType::KeyPress,
            ActionKind::MultiKeyPress { .. } => ActionType::MultiKeyPress,
            ActionKind::TypeString(_) => ActionType::TypeString,
            ActionKind::MouseDown(_) => ActionType::MouseDown,
            ActionKind::MouseUp(_) => ActionType::MouseUp,
            ActionKind::MouseClick { .. } => ActionType::MouseClick,
            ActionKind::MouseMove { .. } => ActionType::MouseMove,
            ActionKind::MouseMoveTo { .. } => ActionType::MouseMoveTo,
            ActionKind::MouseWheel(_) => ActionType::MouseWheel,
            ActionKind::Delay(_) => ActionType::Delay,
        }
    }

    /// Time the action itself occupies during playback
    pub fn duration(&self) -> Duration {
        match self {
            ActionKind::Delay(ms) => Duration::from_millis(u64::from(*ms)),
            _ => Duration::ZERO,
        }
    }

    /// Send to the device. `Delay` sleeps on the calling thread instead.
    pub fn execute(&self, session: &Session) -> Result<(), ProtocolError> {
        match self {
            ActionKind::KeyDown(key) => session.key_down(*key),
            ActionKind::KeyUp(key) => session.key_up(*key),
            ActionKind::KeyPress { key, duration_ms } => session.key_press(*key, *duration_ms),
            ActionKind::MultiKeyPress { keys, duration_ms } => {
                session.multi_key_press(keys, *duration_ms)
            }
            ActionKind::TypeString(text) => session.type_string(text),
            ActionKind::MouseDown(button) => session.mouse_down(*button),
            ActionKind::MouseUp(button) => session.mouse_up(*button),
            ActionKind::MouseClick { button, count } => session.mouse_click(*button, *count),
            ActionKind::MouseMove { dx, dy } => session.mouse_move(*dx, *dy),
            ActionKind::MouseMoveTo { x, y } => session.mouse_move_to(*x, *y),
            ActionKind::MouseWheel(delta) => session.mouse_wheel(*delta),
            ActionKind::Delay(_) => {
                thread::sleep(self.duration());
                Ok(())
            }
        }
    }

    /// Comma-joined argument list (everything after the type code)
    pub fn encode_args(&self) -> String {
        let mut out = String::new();
        let _ = match self {
            ActionKind::KeyDown(key) | ActionKind::KeyUp(key) => {
                write!(out, "{},0", key.code())
            }
            ActionKind::KeyPress { key, duration_ms } => {
                write!(out, "{},{}", key.code(), duration_ms)
            }
            ActionKind::MultiKeyPress { keys, duration_ms } => {
                let _ = write!(out, "{}", keys.len());
                for key in keys {
                    let _ = write!(out, ",{}", key.code());
                }
                write!(out, ",{}", duration_ms)
            }
            ActionKind::TypeString(text) => write!(out, "{},{}", text.len(), escape_text(text)),
            ActionKind::MouseDown(button) | ActionKind::MouseUp(button) => {
                write!(out, "{},1", button.index())
            }
            ActionKind::MouseClick { button, count } => {
                write!(out, "{},{}", button.index(), count)
            }
            ActionKind::MouseMove { dx, dy } => write!(out, "{},{}", dx, dy),
            ActionKind::MouseMoveTo { x, y } => write!(out, "{},{}", x, y),
            ActionKind::MouseWheel(delta) => write!(out, "{}", delta),
            ActionKind::Delay(ms) => write!(out, "{}", ms),
        };
        out
    }

    /// Inverse of [`encode_args`](Self::encode_args)
    pub fn decode(action_type: ActionType, args: &str) -> Result<Self, String> {
        if action_type == ActionType::TypeString {
            return decode_type_string(args);
        }

        let fields: Vec<&str> = args.split(',').map(str::trim).collect();
        let kind = match action_type {
            ActionType::KeyDown | ActionType::KeyUp | ActionType::KeyPress => {
                expect_fields(&fields, 2)?;
                let key = parse_key(fields[0])?;
                let duration_ms = parse_num(fields[1], "duration")?;
                match action_type {
                    ActionType::KeyDown => ActionKind::KeyDown(key),
                    ActionType::KeyUp => ActionKind::KeyUp(key),
                    _ => ActionKind::KeyPress { key, duration_ms },
                }
            }
            ActionType::MultiKeyPress => {
                let count: usize = parse_num(fields[0], "key count")?;
                expect_fields(&fields, count.saturating_add(2))?;
                let keys = fields[1..=count]
                    .iter()
                    .map(|f| parse_key(f))
                    .collect::<Result<Vec<_>, _>>()?;
                let duration_ms = parse_num(fields[count + 1], "duration")?;
                ActionKind::MultiKeyPress { keys, duration_ms }
            }
            ActionType::MouseDown | ActionType::MouseUp | ActionType::MouseClick => {
                expect_fields(&fields, 2)?;
                let button = parse_button(fields[0])?;
                let count = parse_num(fields[1], "count")?;
                match action_type {
                    ActionType::MouseDown => ActionKind::MouseDown(button),
                    ActionType::MouseUp => ActionKind::MouseUp(button),
                    _ => ActionKind::MouseClick { button, count },
                }
            }
            ActionType::MouseMove | ActionType::MouseMoveTo => {
                expect_fields(&fields, 2)?;
                let x = parse_num(fields[0], "x")?;
                let y = parse_num(fields[1], "y")?;
                if action_type == ActionType::MouseMove {
                    ActionKind::MouseMove { dx: x, dy: y }
                } else {
                    ActionKind::MouseMoveTo { x, y }
                }
            }
            ActionType::MouseWheel => {
                expect_fields(&fields, 1)?;
                ActionKind::MouseWheel(parse_num(fields[0], "delta")?)
            }
            ActionType::Delay => {
                expect_fields(&fields, 1)?;
                ActionKind::Delay(parse_num(fields[0], "delay")?)
            }
            ActionType::TypeString => unreachable!("handled above"),
        };
        Ok(kind)
    }
}

fn expect_fields(fields: &[&str], expected: usize) -> Result<(), String> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(format!("expected {} fields, got {}", expected, fields.len()))
    }
}

fn parse_num<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, String> {
    field
        .parse()
        .map_err(|_| format!("invalid {}: {:?}", what, field))
}

fn parse_key(field: &str) -> Result<KeyCode, String> {
    let code: u8 = parse_num(field, "key code")?;
    KeyCode::from_code(code).ok_or_else(|| format!("unknown key code {}", code))
}

fn parse_button(field: &str) -> Result<MouseButton, String> {
    let index: u8 = parse_num(field, "button")?;
    MouseButton::from_index(index).ok_or_else(|| format!("unknown button {}", index))
}

/// `len,text` where `len` is the unescaped byte length
fn decode_type_string(args: &str) -> Result<ActionKind, String> {
    let (len, escaped) = args
        .split_once(',')
        .ok_or_else(|| "missing text length".to_string())?;
    let len: usize = parse_num(len.trim(), "text length")?;
    let text = unescape_text(escaped)?;
    if text.len() != len {
        return Err(format!(
            "text length mismatch: header says {}, found {}",
            len,
            text.len()
        ));
    }
    Ok(ActionKind::TypeString(text))
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_text(escaped: &str) -> Result<String, String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => return Err(format!("invalid escape sequence \\{}", other.unwrap_or(' '))),
        }
    }
    Ok(out)
}
