//! Macro engine
//!
//! Records timestamped input actions (from live button events or manual
//! authoring), stores them in the `MAKCU_MACRO_V1` text format and replays
//! them against a [`Session`](crate::session::Session) with the recorded
//! pacing.

mod action;
pub mod format;
mod playback;
mod recorder;

pub use action::{Action, ActionKind, ActionType};
pub use format::{MacroFormatError, MACRO_FILE_HEADER};
pub use playback::Player;
pub use recorder::MacroRecorder;

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Macro engine errors
#[derive(Error, Debug)]
pub enum MacroError {
    /// Rejected because a recording is in progress
    #[error("operation not allowed while recording")]
    Recording,

    /// `start_recording` while recording
    #[error("already recording")]
    AlreadyRecording,

    /// `stop_recording` while idle
    #[error("not recording")]
    NotRecording,

    /// Rejected because a playback holds the player
    #[error("playback already in progress")]
    AlreadyPlaying,

    /// Playback of an empty action list
    #[error("macro has no actions")]
    Empty,

    /// Macro text could not be parsed
    #[error("malformed macro: {0}")]
    Format(#[from] MacroFormatError),

    /// Macro file could not be read or written
    #[error("macro file I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Recording and replay settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroConfig {
    /// Capture relative pointer motion while recording
    pub record_mouse_movement: bool,
    /// Gaps shorter than this are not slept during replay
    pub minimum_delay_ms: u32,
    /// Whether timestamps gate replay pacing at all
    pub use_timestamps: bool,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            record_mouse_movement: false,
            minimum_delay_ms: 10,
            use_timestamps: true,
        }
    }
}

impl MacroConfig {
    /// [`MacroConfig::minimum_delay_ms`] as a duration
    pub fn minimum_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.minimum_delay_ms))
    }
}

/// An ordered, timestamped action list plus its replay settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    /// Actions in replay order
    pub actions: Vec<Action>,
    /// Replay settings
    pub config: MacroConfig,
}

impl Macro {
    /// Macro from parts
    pub fn new(actions: Vec<Action>, config: MacroConfig) -> Self {
        Self { actions, config }
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether there are no actions
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Last timestamp plus the length of the final action (non-zero only
    /// for a trailing delay)
    pub fn total_duration(&self) -> Duration {
        total_duration(&self.actions)
    }

    /// Render in the macro file format
    pub fn to_text(&self) -> String {
        format::serialize_actions(&self.actions)
    }

    /// Parse macro file text with default settings
    pub fn parse(text: &str) -> Result<Self, MacroFormatError> {
        Ok(Self {
            actions: format::parse_actions(text)?,
            config: MacroConfig::default(),
        })
    }
}

pub(crate) fn total_duration(actions: &[Action]) -> Duration {
    actions
        .last()
        .map(|last| last.timestamp + last.kind.duration())
        .unwrap_or_default()
}
