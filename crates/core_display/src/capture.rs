//! The Input Capture & Modality Arbiter.
//!
//! Owns the single capture slot, the per-client event acknowledgement
//! queues and the interactive move loop. Client-visible effects are
//! recorded as [`ClientChange`] values and drained by the host.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, info};

use crate::error::WindowError;
use crate::geometry::Rect;
use crate::observer::{CaptureObserver, ObserverList};
use crate::transform::LocatedEvent;
use crate::window::{ClientId, WindowId, WindowTree, WINDOW_MANAGER_CLIENT};

/// Current capture holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub window: WindowId,
    /// The connection that set capture; it receives all captured input.
    pub client: ClientId,
}

/// A change reported to one client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientChange {
    CaptureChanged {
        new: Option<WindowId>,
        old: Option<WindowId>,
    },
    InputEvent {
        event_id: u32,
        window: WindowId,
        event: LocatedEvent,
    },
    ChangeCompleted {
        change_id: u32,
        success: bool,
    },
}

#[derive(Debug, Default)]
struct ClientState {
    changes: Vec<ClientChange>,
    outstanding: Option<u32>,
    queued: VecDeque<(WindowId, LocatedEvent)>,
}

#[derive(Debug, Clone, Copy)]
struct MoveLoop {
    client: ClientId,
    change_id: u32,
    window: WindowId,
    original_bounds: Rect,
}

/// Arbitrates capture, modality-driven release and event backpressure.
pub struct CaptureArbiter {
    capture: Option<Capture>,
    clients: BTreeMap<ClientId, ClientState>,
    next_client: ClientId,
    next_event_id: u32,
    move_loop: Option<MoveLoop>,
    observers: Rc<ObserverList<dyn CaptureObserver>>,
    session_active: bool,
    shutting_down: bool,
}

impl Default for CaptureArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureArbiter {
    /// The window manager connection is always registered.
    pub fn new() -> Self {
        let mut clients = BTreeMap::new();
        clients.insert(WINDOW_MANAGER_CLIENT, ClientState::default());
        Self {
            capture: None,
            clients,
            next_client: WINDOW_MANAGER_CLIENT + 1,
            next_event_id: 1,
            move_loop: None,
            observers: Rc::new(ObserverList::new()),
            session_active: false,
            shutting_down: false,
        }
    }

    pub fn capture(&self) -> Option<Capture> {
        self.capture
    }

    pub fn observers(&self) -> Rc<ObserverList<dyn CaptureObserver>> {
        self.observers.clone()
    }

    pub fn set_session_active(&mut self, active: bool) {
        self.session_active = active;
    }

    pub fn connect(&mut self) -> ClientId {
        let id = self.next_client;
        self.next_client += 1;
        self.clients.insert(id, ClientState::default());
        id
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    /// Drop a connection, releasing anything it holds.
    pub fn disconnect(&mut self, tree: &mut WindowTree, client: ClientId) -> bool {
        if client == WINDOW_MANAGER_CLIENT || self.clients.remove(&client).is_none() {
            return false;
        }
        if self.move_loop.is_some_and(|m| m.client == client) {
            self.finish_move(tree, false, false);
        }
        if let Some(capture) = self.capture.filter(|c| c.client == client) {
            self.change_capture(None, Some(capture.window), None);
        }
        true
    }

    fn check_client(&self, client: ClientId) -> Result<(), WindowError> {
        if self.is_connected(client) {
            Ok(())
        } else {
            Err(WindowError::UnknownClient(client))
        }
    }

    /// Give `window` capture on behalf of `client`.
    ///
    /// Fails (`Ok(false)`) when there is no active session, the window is
    /// not drawn, or a modal window blocks it.
    pub fn set_capture(&mut self, tree: &WindowTree, client: ClientId, window: WindowId) -> Result<bool, WindowError> {
        self.check_client(client)?;
        if !tree.exists(window) {
            return Err(WindowError::UnknownWindow(window));
        }
        if !self.session_active || self.shutting_down {
            return Ok(false);
        }
        if !tree.is_drawn(window) {
            debug!("Refusing capture for undrawn window {}", window);
            return Ok(false);
        }
        if let Some(modal) = tree.blocking_modal(window) {
            debug!("Refusing capture for window {} blocked by modal {}", window, modal);
            return Ok(false);
        }

        let new = Capture { window, client };
        if self.capture == Some(new) {
            return Ok(true);
        }
        let old = self.capture.map(|c| c.window);
        self.capture = Some(new);
        self.change_capture(Some(window), old, Some(client));
        Ok(true)
    }

    /// Release capture held by `window`. Only the holding client may do so.
    pub fn release_capture(&mut self, tree: &WindowTree, client: ClientId, window: WindowId) -> Result<bool, WindowError> {
        self.check_client(client)?;
        if !tree.exists(window) {
            return Err(WindowError::UnknownWindow(window));
        }
        match self.capture {
            Some(c) if c.window == window && c.client == client => {
                self.capture = None;
                self.change_capture(None, Some(window), Some(client));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Re-check the capture holder after a visibility, modality or
    /// hierarchy change. Returns whether capture was released.
    pub fn release_capture_blocked_by_modal(&mut self, tree: &WindowTree) -> bool {
        let Some(capture) = self.capture else {
            return false;
        };
        let Some(modal) = tree.blocking_modal(capture.window) else {
            return false;
        };
        info!("Modal window {} releases capture from {}", modal, capture.window);
        self.capture = None;
        self.change_capture(None, Some(capture.window), None);
        true
    }

    /// Release capture held by a window that is no longer drawn, and abort
    /// a move loop on such a window. Returns whether capture was released.
    pub fn release_capture_if_hidden(&mut self, tree: &mut WindowTree) -> bool {
        let before = self.capture;
        if self.move_loop.is_some_and(|m| !tree.is_drawn(m.window)) {
            self.finish_move(tree, false, true);
        }
        let Some(capture) = self.capture.filter(|c| !tree.is_drawn(c.window)) else {
            return before != self.capture;
        };
        info!("Hidden window {} loses capture", capture.window);
        self.capture = None;
        self.change_capture(None, Some(capture.window), None);
        true
    }

    /// Drop capture and any active move loop, notifying as usual.
    pub fn clear(&mut self, tree: &mut WindowTree) -> bool {
        self.finish_move(tree, false, false);
        let Some(capture) = self.capture.take() else {
            return false;
        };
        self.change_capture(None, Some(capture.window), None);
        true
    }

    /// Forget destroyed windows: capture, move loop and queued events.
    pub fn on_windows_destroyed(&mut self, tree: &mut WindowTree, destroyed: &[WindowId]) {
        if self.move_loop.is_some_and(|m| destroyed.contains(&m.window)) {
            self.finish_move(tree, false, false);
        }
        if let Some(capture) = self.capture.filter(|c| destroyed.contains(&c.window)) {
            self.capture = None;
            self.change_capture(None, Some(capture.window), None);
        }
        for state in self.clients.values_mut() {
            state.queued.retain(|(w, _)| !destroyed.contains(w));
        }
    }

    fn change_capture(&mut self, new: Option<WindowId>, old: Option<WindowId>, initiator: Option<ClientId>) {
        if self.shutting_down {
            return;
        }
        for (&id, state) in self.clients.iter_mut() {
            if Some(id) != initiator {
                state.changes.push(ClientChange::CaptureChanged { new, old });
            }
        }
        self.observers.for_each(|o| o.on_capture_changed(new, old));
    }

    /// Deliver `event` to `client`, or queue it behind an unacknowledged one.
    ///
    /// Returns the event id when delivered immediately.
    pub fn dispatch(&mut self, client: ClientId, window: WindowId, event: LocatedEvent) -> Result<Option<u32>, WindowError> {
        if self.shutting_down {
            return Ok(None);
        }
        let state = self
            .clients
            .get_mut(&client)
            .ok_or(WindowError::UnknownClient(client))?;
        if state.outstanding.is_some() {
            state.queued.push_back((window, event));
            return Ok(None);
        }
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        state.outstanding = Some(event_id);
        state.changes.push(ClientChange::InputEvent {
            event_id,
            window,
            event,
        });
        Ok(Some(event_id))
    }

    /// Acknowledge an event and release the next queued one.
    pub fn ack(&mut self, client: ClientId, event_id: u32) -> Result<bool, WindowError> {
        let state = self
            .clients
            .get_mut(&client)
            .ok_or(WindowError::UnknownClient(client))?;
        if state.outstanding != Some(event_id) {
            return Ok(false);
        }
        state.outstanding = None;
        if let Some((window, event)) = state.queued.pop_front() {
            self.dispatch(client, window, event)?;
        }
        Ok(true)
    }

    /// Events waiting behind an unacknowledged one.
    pub fn queued_events(&self, client: ClientId) -> usize {
        self.clients.get(&client).map_or(0, |s| s.queued.len())
    }

    /// Start an interactive move of `window`.
    ///
    /// Invalid requests complete immediately with failure.
    pub fn perform_window_move(
        &mut self,
        tree: &WindowTree,
        client: ClientId,
        change_id: u32,
        window: WindowId,
    ) -> Result<bool, WindowError> {
        self.check_client(client)?;
        let valid = client != WINDOW_MANAGER_CLIENT
            && self.move_loop.is_none()
            && tree.is_drawn(window)
            && tree.get(window).is_some_and(|w| w.owner() == client);
        if !valid || !self.set_capture(tree, client, window)? {
            self.complete(client, change_id, false);
            return Ok(false);
        }
        let original_bounds = tree.get(window).map(|w| w.bounds()).unwrap_or_default();
        self.move_loop = Some(MoveLoop {
            client,
            change_id,
            window,
            original_bounds,
        });
        Ok(true)
    }

    pub fn is_moving(&self) -> bool {
        self.move_loop.is_some()
    }

    /// The window manager's answer to the active move loop.
    ///
    /// Failure restores the original bounds. Either way capture is released
    /// and the requester is told. Returns `false` for a stale `change_id`.
    pub fn wm_response(&mut self, tree: &mut WindowTree, change_id: u32, success: bool) -> bool {
        if !self.move_loop.is_some_and(|m| m.change_id == change_id) {
            return false;
        }
        self.finish_move(tree, success, !success);
        true
    }

    /// Abort the move loop started by `client`.
    pub fn cancel_window_move(&mut self, tree: &mut WindowTree, client: ClientId) -> bool {
        if !self.move_loop.is_some_and(|m| m.client == client) {
            return false;
        }
        self.finish_move(tree, false, true);
        true
    }

    fn finish_move(&mut self, tree: &mut WindowTree, success: bool, revert: bool) {
        let Some(m) = self.move_loop.take() else {
            return;
        };
        if revert && tree.set_bounds(m.window, m.original_bounds).is_err() {
            debug!("Moving window {} vanished before revert", m.window);
        }
        if self.capture == Some(Capture { window: m.window, client: m.client }) {
            self.capture = None;
            self.change_capture(None, Some(m.window), None);
        }
        self.complete(m.client, m.change_id, success);
    }

    fn complete(&mut self, client: ClientId, change_id: u32, success: bool) {
        if self.shutting_down {
            return;
        }
        if let Some(state) = self.clients.get_mut(&client) {
            state.changes.push(ClientChange::ChangeCompleted { change_id, success });
        }
    }

    /// Drain the changes recorded for `client`.
    pub fn take_changes(&mut self, client: ClientId) -> Vec<ClientChange> {
        self.clients
            .get_mut(&client)
            .map(|s| std::mem::take(&mut s.changes))
            .unwrap_or_default()
    }

    /// Drop all state without notifying anyone.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
        self.capture = None;
        self.move_loop = None;
        for state in self.clients.values_mut() {
            *state = ClientState::default();
        }
        self.observers.clear();
    }
}
