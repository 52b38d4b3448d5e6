//! Macro file format
//!
//! ```text
//! MAKCU_MACRO_V1
//! 3
//! 0,2,4,0
//! 180,7,0,1
//! 420,11,500
//! ```
//!
//! Line 1 is the version tag, line 2 the action count, then one
//! `timestampMs,typeCode,args...` line per action.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::action::{Action, ActionKind, ActionType};
use super::MacroError;

/// Version tag on the first line of every macro file
pub const MACRO_FILE_HEADER: &str = "MAKCU_MACRO_V1";

/// Problems found while parsing macro text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacroFormatError {
    /// First line is not the version tag
    #[error("invalid macro header: {0:?}")]
    InvalidHeader(String),

    /// Second line is not a count
    #[error("invalid action count: {0:?}")]
    InvalidCount(String),

    /// Fewer action lines than declared
    #[error("macro declares {expected} actions but only {found} present")]
    Truncated {
        /// Declared count
        expected: usize,
        /// Action lines present
        found: usize,
    },

    /// Non-blank text after the declared actions
    #[error("macro declares {expected} actions but has extra data on line {line}")]
    TrailingData {
        /// Declared count
        expected: usize,
        /// First line past the declared actions
        line: usize,
    },

    /// Type code outside the known set
    #[error("line {line}: unknown action type {code}")]
    UnknownActionType {
        /// 1-based line number
        line: usize,
        /// The type field as written
        code: String,
    },

    /// Malformed action line
    #[error("line {line}: {reason}")]
    InvalidLine {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },
}

/// Render actions in the macro file format
pub fn serialize_actions(actions: &[Action]) -> String {
    let mut out = String::new();
    out.push_str(MACRO_FILE_HEADER);
    out.push('\n');
    out.push_str(&actions.len().to_string());
    out.push('\n');
    for action in actions {
        out.push_str(&serialize_action(action));
        out.push('\n');
    }
    out
}

/// One `timestampMs,typeCode,args` line, without terminator
pub fn serialize_action(action: &Action) -> String {
    format!(
        "{},{},{}",
        action.timestamp_ms(),
        action.kind.action_type().code(),
        action.kind.encode_args()
    )
}

/// Parse macro text. Either every declared action parses or nothing is returned.
pub fn parse_actions(text: &str) -> Result<Vec<Action>, MacroFormatError> {
    let mut lines = text.lines();

    let header = lines.next().unwrap_or_default();
    if header.trim_end() != MACRO_FILE_HEADER {
        return Err(MacroFormatError::InvalidHeader(header.to_string()));
    }

    let count_line = lines.next().unwrap_or_default();
    let expected: usize = count_line
        .trim()
        .parse()
        .map_err(|_| MacroFormatError::InvalidCount(count_line.to_string()))?;

    let mut actions = Vec::with_capacity(expected.min(4096));
    let mut previous = Duration::ZERO;
    for index in 0..expected {
        let line_no = index + 3;
        let line = lines.next().ok_or(MacroFormatError::Truncated {
            expected,
            found: index,
        })?;

        let action = parse_action_line(line, line_no)?;
        if action.timestamp < previous {
            return Err(MacroFormatError::InvalidLine {
                line: line_no,
                reason: "timestamp goes backwards".to_string(),
            });
        }
        previous = action.timestamp;
        actions.push(action);
    }

    if let Some(offset) = lines.position(|l| !l.trim().is_empty()) {
        return Err(MacroFormatError::TrailingData {
            expected,
            line: expected + 3 + offset,
        });
    }

    Ok(actions)
}

fn parse_action_line(line: &str, line_no: usize) -> Result<Action, MacroFormatError> {
    let invalid = |reason: String| MacroFormatError::InvalidLine {
        line: line_no,
        reason,
    };

    let mut parts = line.splitn(3, ',');
    let timestamp_field = parts.next().unwrap_or_default().trim();
    let type_field = parts
        .next()
        .ok_or_else(|| invalid("missing action type".to_string()))?
        .trim();
    let args = parts.next().unwrap_or_default();

    let timestamp_ms: u64 = timestamp_field
        .parse()
        .map_err(|_| invalid(format!("invalid timestamp {:?}", timestamp_field)))?;

    let action_type = type_field
        .parse::<u8>()
        .ok()
        .and_then(ActionType::from_code)
        .ok_or_else(|| MacroFormatError::UnknownActionType {
            line: line_no,
            code: type_field.to_string(),
        })?;

    let kind = ActionKind::decode(action_type, args).map_err(invalid)?;
    Ok(Action::new(Duration::from_millis(timestamp_ms), kind))
}

/// Write actions to a macro file
pub fn write_macro_file<P: AsRef<Path>>(path: P, actions: &[Action]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(serialize_actions(actions).as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read and parse a macro file
pub fn read_macro_file<P: AsRef<Path>>(path: P) -> Result<Vec<Action>, MacroError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_actions(&text)?)
}
