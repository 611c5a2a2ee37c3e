//! The Primary Display Selector.

use tracing::info;

use crate::display::DisplayId;
use crate::error::DisplayError;

/// Outcome of a `SetPrimary` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryRequest {
    /// The primary changes from `from` to `to`.
    Swap { from: DisplayId, to: DisplayId },
    /// Nothing to do: already primary, or only one display.
    Unchanged,
}

/// Tracks the current primary and the last one explicitly requested.
#[derive(Debug, Clone, Default)]
pub struct PrimarySelector {
    current: Option<DisplayId>,
    desirable: Option<DisplayId>,
}

impl PrimarySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<DisplayId> {
        self.current
    }

    /// The last explicitly requested primary, kept across disconnects.
    pub fn desirable(&self) -> Option<DisplayId> {
        self.desirable
    }

    /// Pick the primary for a freshly connected set.
    ///
    /// `connected` must be sorted ascending. Order of preference: the
    /// desirable id, the current primary, then (on first selection) the
    /// internal display, then the lowest id.
    pub fn select(&mut self, connected: &[DisplayId], internal: Option<DisplayId>) -> Option<DisplayId> {
        let is_connected = |id: &DisplayId| connected.contains(id);

        let chosen = if let Some(desirable) = self.desirable.filter(is_connected) {
            Some(desirable)
        } else if let Some(current) = self.current.filter(is_connected) {
            Some(current)
        } else if self.current.is_none() {
            internal.filter(is_connected).or_else(|| connected.first().copied())
        } else {
            connected.first().copied()
        };

        if chosen != self.current {
            info!("Primary display: {:?} -> {:?}", self.current, chosen);
        }
        self.current = chosen;
        chosen
    }

    /// Validate and record an explicit primary request.
    ///
    /// Swaps only happen between exactly two connected displays.
    pub fn request(&mut self, id: DisplayId, connected: &[DisplayId]) -> Result<PrimaryRequest, DisplayError> {
        if !connected.contains(&id) {
            return Err(DisplayError::UnknownDisplay(id));
        }
        let Some(from) = self.current else {
            return Err(DisplayError::NoDisplays);
        };
        if from == id || connected.len() != 2 {
            return Ok(PrimaryRequest::Unchanged);
        }
        self.current = Some(id);
        self.desirable = Some(id);
        Ok(PrimaryRequest::Swap { from, to: id })
    }

    /// Forget everything, including the desirable id.
    pub fn reset(&mut self) {
        self.current = None;
        self.desirable = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_selection_prefers_internal() {
        let mut selector = PrimarySelector::new();
        assert_eq!(selector.select(&[1, 2, 3], Some(2)), Some(2));

        let mut selector = PrimarySelector::new();
        assert_eq!(selector.select(&[1, 2, 3], None), Some(1));
    }

    #[test]
    fn test_current_survives_unrelated_changes() {
        let mut selector = PrimarySelector::new();
        selector.select(&[5, 6], None);
        assert_eq!(selector.select(&[4, 5, 6], Some(4)), Some(5));
    }

    #[test]
    fn test_request_swap() {
        let mut selector = PrimarySelector::new();
        selector.select(&[1, 2], None);
        assert_eq!(selector.request(2, &[1, 2]), Ok(PrimaryRequest::Swap { from: 1, to: 2 }));
        assert_eq!(selector.current(), Some(2));
        assert_eq!(selector.desirable(), Some(2));
        assert_eq!(selector.request(2, &[1, 2]), Ok(PrimaryRequest::Unchanged));
    }

    #[test]
    fn test_request_rejected() {
        let mut selector = PrimarySelector::new();
        selector.select(&[1], None);
        assert_eq!(selector.request(1, &[1]), Ok(PrimaryRequest::Unchanged));
        assert_eq!(selector.request(7, &[1]), Err(DisplayError::UnknownDisplay(7)));
        assert_eq!(selector.desirable(), None);
    }

    #[test]
    fn test_primary_disconnect_falls_back_to_lowest() {
        let mut selector = PrimarySelector::new();
        selector.select(&[1, 3], None);
        selector.request(3, &[1, 3]).unwrap();
        assert_eq!(selector.select(&[1, 2], Some(2)), Some(1));
    }

    #[test]
    fn test_no_swap_with_three_displays() {
        let mut selector = PrimarySelector::new();
        selector.select(&[1, 2, 3], None);
        assert_eq!(selector.request(2, &[1, 2, 3]), Ok(PrimaryRequest::Unchanged));
        assert_eq!(selector.current(), Some(1));
        assert_eq!(selector.desirable(), None);
    }

    #[test]
    fn test_desirable_restored_on_reconnect() {
        let mut selector = PrimarySelector::new();
        selector.select(&[1, 2], None);
        selector.request(2, &[1, 2]).unwrap();

        assert_eq!(selector.select(&[1], None), Some(1));
        assert_eq!(selector.select(&[1, 3], None), Some(1));
        assert_eq!(selector.select(&[1, 2], None), Some(2));
    }
}
