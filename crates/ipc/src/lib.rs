//! multiroot IPC Protocol
//!
//! Shared types for daemon-CLI communication over a Unix domain socket.
//! Each request and each response is a single line of JSON.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the daemon socket inside the runtime directory.
pub const SOCKET_NAME: &str = "multiroot.sock";

/// Upper bound for one request or response line, in bytes.
pub const MAX_IPC_MESSAGE_SIZE: usize = 64 * 1024;

/// Default socket location: the user runtime dir, else the temp dir.
pub fn default_socket_path() -> PathBuf {
    ProjectDirs::from("", "", "multiroot")
        .and_then(|dirs| dirs.runtime_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(std::env::temp_dir)
        .join(SOCKET_NAME)
}

/// Errors while framing or parsing protocol lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Message of {0} bytes exceeds the IPC size limit")]
    TooLarge(usize),

    #[error("Empty message")]
    Empty,

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(line.len()));
    }
    Ok(line)
}

/// Parse one JSON line, ignoring surrounding whitespace.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(line.len()));
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

/// Edge of the parent a display is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPosition {
    Top,
    Right,
    Bottom,
    Left,
}

/// Who asked for a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    #[default]
    User,
    Policy,
}

/// One display attached to a parent display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementSpec {
    pub display_id: i64,
    pub parent_id: i64,
    pub position: PlacementPosition,
    #[serde(default)]
    pub offset: i32,
}

/// Insets in DIPs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsetsSpec {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

/// Rectangle in DIPs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectSpec {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Commands that can be sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Replace the connected displays with a display spec list.
    UpdateDisplays {
        /// Comma-separated `[id:]WxH[*dsf][/opts][@ui_scale]` entries.
        spec: String,
    },

    /// Replace the whole layout of the connected set.
    SetLayout {
        placements: Vec<PlacementSpec>,
        default_position: PlacementPosition,
        #[serde(default)]
        default_offset: i32,
    },
    /// Set one placement of the current layout.
    SetPlacement { placement: PlacementSpec },
    /// Change the default placement.
    SetDefaultPlacement {
        position: PlacementPosition,
        #[serde(default)]
        offset: i32,
    },

    /// Make a display primary.
    SetPrimary { display_id: i64 },
    SetOverscan { display_id: i64, insets: InsetsSpec },
    SetRotation {
        display_id: i64,
        /// Degrees clockwise: 0, 90, 180 or 270.
        rotation: u16,
        #[serde(default)]
        source: RequestSource,
    },
    /// Zoom the internal display.
    SetUiScale { display_id: i64, scale: f32 },
    SetWorkAreaInsets { display_id: i64, insets: InsetsSpec },

    /// Warp the cursor to a host pixel of a display.
    MoveCursor { display_id: i64, x: i32, y: i32 },
    /// Convert a host pixel to root coordinates.
    HostToRoot { display_id: i64, x: i32, y: i32 },

    QueryDisplays,
    QueryLayout,
    QueryCursor,

    /// Reload configuration from file.
    Reload,
    /// Stop the daemon.
    Stop,
}

/// One display as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    pub id: i64,
    pub bounds: RectSpec,
    pub work_area: RectSpec,
    pub rotation: u16,
    pub device_scale_factor: f32,
    pub ui_scale: f32,
    pub is_internal: bool,
    pub is_primary: bool,
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// A configuration request was accepted.
    Applied {
        /// False when the request matched the current state.
        changed: bool,
    },
    Displays {
        displays: Vec<DisplayState>,
    },
    Layout {
        primary_id: Option<i64>,
        placements: Vec<PlacementSpec>,
        default_position: PlacementPosition,
        default_offset: i32,
    },
    Cursor {
        x: i32,
        y: i32,
        display_id: i64,
        device_scale_factor: f32,
        rotation: u16,
    },
    /// Result of a host to root conversion.
    RootPoint {
        display_id: i64,
        x: i32,
        y: i32,
    },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
