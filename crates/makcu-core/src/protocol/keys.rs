//! Key codes, mouse buttons and the button status mask

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mouse buttons as indexed by the device (`km.click(index,count)`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    /// Primary button
    Left = 0,
    /// Secondary button
    Right = 1,
    /// Wheel button
    Middle = 2,
    /// Back side button (`side1` on the wire)
    Side4 = 3,
    /// Forward side button (`side2` on the wire)
    Side5 = 4,
}

impl MouseButton {
    /// All buttons in status-bit order
    pub const ALL: [MouseButton; 5] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::Side4,
        MouseButton::Side5,
    ];

    /// Device index (also the bit position in the status mask)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Look up a button by device index
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Name of the per-button command (`km.left(1)`, `km.side1(0)`...)
    pub fn command_name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
            MouseButton::Side4 => "side1",
            MouseButton::Side5 => "side2",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MouseButton::Left => "LEFT",
            MouseButton::Right => "RIGHT",
            MouseButton::Middle => "MIDDLE",
            MouseButton::Side4 => "SIDE4",
            MouseButton::Side5 => "SIDE5",
        };
        f.write_str(name)
    }
}

/// Error returned when a key or button name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} name: {name:?}")]
pub struct ParseNameError {
    kind: &'static str,
    name: String,
}

impl FromStr for MouseButton {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LEFT" => Ok(MouseButton::Left),
            "RIGHT" => Ok(MouseButton::Right),
            "MIDDLE" => Ok(MouseButton::Middle),
            "SIDE4" | "SIDE1" => Ok(MouseButton::Side4),
            "SIDE5" | "SIDE2" => Ok(MouseButton::Side5),
            _ => Err(ParseNameError {
                kind: "mouse button",
                name: s.to_string(),
            }),
        }
    }
}

macro_rules! key_codes {
    ($($variant:ident = $code:literal, $name:literal $(, $alias:literal)*;)*) => {
        /// HID keyboard usage codes understood by the device
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum KeyCode {
            $(
                #[doc = concat!("`", $name, "` (usage ", stringify!($code), ")")]
                $variant = $code,
            )*
        }

        impl KeyCode {
            /// Every supported key
            pub const ALL: &'static [KeyCode] = &[$(KeyCode::$variant,)*];

            /// Look up a key by its HID usage code
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(KeyCode::$variant),)*
                    _ => None,
                }
            }

            /// Canonical upper-case name
            pub fn name(self) -> &'static str {
                match self {
                    $(KeyCode::$variant => $name,)*
                }
            }
        }

        impl FromStr for KeyCode {
            type Err = ParseNameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($name $(| $alias)* => Ok(KeyCode::$variant),)*
                    _ => Err(ParseNameError {
                        kind: "key",
                        name: s.to_string(),
                    }),
                }
            }
        }
    };
}

key_codes! {
    A = 0x04, "A"; B = 0x05, "B"; C = 0x06, "C"; D = 0x07, "D";
    E = 0x08, "E"; F = 0x09, "F"; G = 0x0A, "G"; H = 0x0B, "H";
    I = 0x0C, "I"; J = 0x0D, "J"; K = 0x0E, "K"; L = 0x0F, "L";
    M = 0x10, "M"; N = 0x11, "N"; O = 0x12, "O"; P = 0x13, "P";
    Q = 0x14, "Q"; R = 0x15, "R"; S = 0x16, "S"; T = 0x17, "T";
    U = 0x18, "U"; V = 0x19, "V"; W = 0x1A, "W"; X = 0x1B, "X";
    Y = 0x1C, "Y"; Z = 0x1D, "Z";
    Num1 = 0x1E, "1"; Num2 = 0x1F, "2"; Num3 = 0x20, "3"; Num4 = 0x21, "4";
    Num5 = 0x22, "5"; Num6 = 0x23, "6"; Num7 = 0x24, "7"; Num8 = 0x25, "8";
    Num9 = 0x26, "9"; Num0 = 0x27, "0";
    Enter = 0x28, "ENTER", "RETURN";
    Escape = 0x29, "ESCAPE", "ESC";
    Backspace = 0x2A, "BACKSPACE";
    Tab = 0x2B, "TAB";
    Space = 0x2C, "SPACE", "SPACEBAR";
    LeftCtrl = 0xE0, "LCTRL", "LEFT_CTRL";
    LeftShift = 0xE1, "LSHIFT", "LEFT_SHIFT";
    LeftAlt = 0xE2, "LALT", "LEFT_ALT";
    LeftGui = 0xE3, "LGUI", "LEFT_GUI";
    RightCtrl = 0xE4, "RCTRL", "RIGHT_CTRL";
    RightShift = 0xE5, "RSHIFT", "RIGHT_SHIFT";
    RightAlt = 0xE6, "RALT", "RIGHT_ALT";
    RightGui = 0xE7, "RGUI", "RIGHT_GUI";
}

impl KeyCode {
    /// HID usage code sent on the wire
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw status byte reported by the device; the low 5 bits are the buttons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ButtonMask(pub u8);

impl ButtonMask {
    const BUTTON_BITS: u8 = 0x1F;

    /// Whether `button`'s bit is set
    pub fn is_pressed(self, button: MouseButton) -> bool {
        self.0 & (1 << button.index()) != 0
    }

    /// (button, pressed) for all 5 buttons in increasing bit order
    pub fn states(self) -> [(MouseButton, bool); 5] {
        MouseButton::ALL.map(|button| (button, self.is_pressed(button)))
    }

    /// Edge events for a new sample.
    ///
    /// Returns `None` when the byte is unchanged; otherwise the full state of
    /// every button, not only the ones that flipped.
    pub fn edges(previous: ButtonMask, current: ButtonMask) -> Option<[(MouseButton, bool); 5]> {
        (previous != current).then(|| current.states())
    }

    /// Only the button bits
    pub fn buttons(self) -> u8 {
        self.0 & Self::BUTTON_BITS
    }
}

/// Decoded view of a [`ButtonMask`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseButtonStates {
    /// [`MouseButton::Left`]
    pub left: bool,
    /// [`MouseButton::Right`]
    pub right: bool,
    /// [`MouseButton::Middle`]
    pub middle: bool,
    /// [`MouseButton::Side4`]
    pub side4: bool,
    /// [`MouseButton::Side5`]
    pub side5: bool,
}

impl MouseButtonStates {
    /// Whether `button` is held
    pub fn get(&self, button: MouseButton) -> bool {
        match button {
            MouseButton::Left => self.left,
            MouseButton::Right => self.right,
            MouseButton::Middle => self.middle,
            MouseButton::Side4 => self.side4,
            MouseButton::Side5 => self.side5,
        }
    }

    /// Record `button`'s state
    pub fn set(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.left = pressed,
            MouseButton::Right => self.right = pressed,
            MouseButton::Middle => self.middle = pressed,
            MouseButton::Side4 => self.side4 = pressed,
            MouseButton::Side5 => self.side5 = pressed,
        }
    }
}

impl From<ButtonMask> for MouseButtonStates {
    fn from(mask: ButtonMask) -> Self {
        let mut states = Self::default();
        for (button, pressed) in mask.states() {
            states.set(button, pressed);
        }
        states
    }
}
