//! Core display and window-root engine for multiroot.
//!
//! This crate contains the platform-agnostic logic for running one window
//! root per connected display. It includes:
//! - Display descriptions and the registry of connected displays
//! - Relative layout resolution with the minimum-overlap offset clamp
//! - Primary display selection and root swapping
//! - Host pixel to root DIP coordinate transforms
//! - Capture and modality arbitration with event acknowledgement
//!
//! Everything is single-threaded. A [`Session`] is constructed explicitly
//! and owns all state; nothing here is global.

pub mod capture;
pub mod display;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod manager;
pub mod observer;
pub mod primary;
pub mod registry;
pub mod session;
pub mod transform;
pub mod window;

pub use capture::{Capture, CaptureArbiter, ClientChange};
pub use display::{parse_display_specs, Display, DisplayId, DisplayInfo, DisplayMetrics, Rotation, RotationSource};
pub use error::{DisplayError, SessionError, WindowError};
pub use geometry::{Insets, Point, PointF, Rect, Size};
pub use layout::{DefaultPlacement, DisplayLayout, LayoutStore, Placement, Position};
pub use manager::{CursorInfo, RootManager, RootState, WindowRoot};
pub use observer::{CaptureObserver, DisplayObserver, ObserverList};
pub use primary::PrimarySelector;
pub use registry::DisplayRegistry;
pub use session::{Session, SessionConfig, UserId};
pub use transform::{HostEvent, HostEventKind, LocatedEvent, RootTransform, ScrollOffsets, TouchRadius};
pub use window::{ClientId, ModalType, WindowId, WindowTree, WINDOW_MANAGER_CLIENT};
