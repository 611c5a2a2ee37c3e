use thiserror::Error;

use crate::display::DisplayId;
use crate::geometry::Insets;
use crate::window::{ClientId, WindowId};

/// Errors that can occur while configuring displays.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DisplayError {
    #[error("Display {0} is not connected")]
    UnknownDisplay(DisplayId),

    #[error("Display list must contain at least one display")]
    NoDisplays,

    #[error("Display {0} appears more than once")]
    DuplicateDisplay(DisplayId),

    #[error("Invalid display spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("Scale factor {0} must be finite and positive")]
    InvalidScale(f32),

    #[error("Insets must not be negative: {0:?}")]
    NegativeInsets(Insets),
}

impl DisplayError {
    pub(crate) fn invalid_spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during window tree and capture operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("Window {0} does not exist")]
    UnknownWindow(WindowId),

    #[error("Client {0} is not connected")]
    UnknownClient(ClientId),
}

/// Errors from session operations that touch both displays and windows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Display(#[from] DisplayError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("Session has been shut down")]
    ShutDown,
}
