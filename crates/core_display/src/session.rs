//! Explicitly constructed context tying the root manager and the capture
//! arbiter to one user session.

use std::rc::Rc;

use tracing::{debug, info};

use crate::capture::{CaptureArbiter, ClientChange};
use crate::display::{DisplayId, DisplayInfo};
use crate::error::{DisplayError, SessionError, WindowError};
use crate::geometry::Rect;
use crate::layout::{DefaultPlacement, LayoutStore};
use crate::manager::RootManager;
use crate::observer::{CaptureObserver, DisplayObserver, ObserverList};
use crate::transform::{HostEvent, HostEventKind};
use crate::window::{ClientId, ModalType, WindowId};

pub type UserId = u32;

/// Everything needed to bring up a session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub default_placement: DefaultPlacement,
    /// Applied immediately when non-empty.
    pub initial_displays: Vec<DisplayInfo>,
    /// Remembered layouts; `default_placement` is used when absent.
    pub layouts: Option<LayoutStore>,
}

pub struct Session {
    manager: RootManager,
    capture: CaptureArbiter,
    user: Option<UserId>,
    shut_down: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, DisplayError> {
        let mut manager = match config.layouts {
            Some(layouts) => RootManager::with_layouts(layouts),
            None => RootManager::new(config.default_placement),
        };
        if !config.initial_displays.is_empty() {
            manager.update_displays(config.initial_displays)?;
        }
        Ok(Self {
            manager,
            capture: CaptureArbiter::new(),
            user: None,
            shut_down: false,
        })
    }

    pub fn begin(&mut self, user: UserId) {
        info!("Session started for user {}", user);
        self.user = Some(user);
        self.capture.set_session_active(true);
    }

    /// End the user session. Capture does not survive it.
    pub fn end(&mut self) {
        if let Some(user) = self.user.take() {
            info!("Session ended for user {}", user);
        }
        self.capture.clear(self.manager.windows_mut());
        self.capture.set_session_active(false);
    }

    pub fn is_active(&self) -> bool {
        self.user.is_some() && !self.shut_down
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    pub fn manager(&self) -> &RootManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut RootManager {
        &mut self.manager
    }

    pub fn capture(&self) -> &CaptureArbiter {
        &self.capture
    }

    pub fn add_display_observer(&self, observer: Rc<dyn DisplayObserver>) {
        self.manager.add_observer(observer);
    }

    pub fn capture_observers(&self) -> Rc<ObserverList<dyn CaptureObserver>> {
        self.capture.observers()
    }

    fn check_running(&self) -> Result<(), SessionError> {
        if self.shut_down {
            Err(SessionError::ShutDown)
        } else {
            Ok(())
        }
    }

    // ---- displays ----

    pub fn update_displays(&mut self, infos: Vec<DisplayInfo>) -> Result<(), SessionError> {
        self.check_running()?;
        Ok(self.manager.update_displays(infos)?)
    }

    /// Run deferred root destruction and forget the destroyed windows.
    pub fn run_pending_tasks(&mut self) -> Vec<WindowId> {
        let destroyed = self.manager.run_pending_tasks();
        if !destroyed.is_empty() {
            self.capture
                .on_windows_destroyed(self.manager.windows_mut(), &destroyed);
        }
        destroyed
    }

    // ---- clients and windows ----

    pub fn connect_client(&mut self) -> ClientId {
        self.capture.connect()
    }

    /// Disconnect a client and destroy every window it owns.
    pub fn disconnect_client(&mut self, client: ClientId) -> bool {
        if !self.capture.disconnect(self.manager.windows_mut(), client) {
            return false;
        }
        let mut destroyed = Vec::new();
        for window in self.manager.windows().top_level_windows_of(client) {
            if let Ok(ids) = self.manager.windows_mut().destroy(window) {
                destroyed.extend(ids);
            }
        }
        debug!("Client {} disconnected, {} windows destroyed", client, destroyed.len());
        self.capture
            .on_windows_destroyed(self.manager.windows_mut(), &destroyed);
        self.capture
            .release_capture_blocked_by_modal(self.manager.windows());
        true
    }

    pub fn create_window(&mut self, client: ClientId) -> Result<WindowId, SessionError> {
        self.check_running()?;
        if !self.capture.is_connected(client) {
            return Err(WindowError::UnknownClient(client).into());
        }
        Ok(self.manager.windows_mut().create_window(client))
    }

    /// Parent `child` under `parent`.
    pub fn add_window(&mut self, parent: WindowId, child: WindowId) -> Result<bool, SessionError> {
        self.check_running()?;
        let added = self.manager.windows_mut().add_child(parent, child)?;
        self.capture.release_capture_if_hidden(self.manager.windows_mut());
        self.capture
            .release_capture_blocked_by_modal(self.manager.windows());
        Ok(added)
    }

    pub fn set_visible(&mut self, window: WindowId, visible: bool) -> Result<bool, SessionError> {
        self.check_running()?;
        let changed = self.manager.windows_mut().set_visible(window, visible)?;
        if !visible {
            self.capture.release_capture_if_hidden(self.manager.windows_mut());
        }
        self.capture
            .release_capture_blocked_by_modal(self.manager.windows());
        Ok(changed)
    }

    /// System modality needs a signed-in user; window modality needs a
    /// transient parent. Either precondition failing yields `Ok(false)`.
    pub fn set_modal(&mut self, window: WindowId, modal: ModalType) -> Result<bool, SessionError> {
        self.check_running()?;
        let has_transient_parent = self
            .manager
            .windows()
            .get(window)
            .ok_or(WindowError::UnknownWindow(window))?
            .transient_parent()
            .is_some();
        match modal {
            ModalType::System if self.user.is_none() => {
                debug!("System modal window {} needs an active session", window);
                return Ok(false);
            }
            ModalType::Window if !has_transient_parent => {
                debug!("Window modal {} has no transient parent", window);
                return Ok(false);
            }
            _ => {}
        }
        let changed = self.manager.windows_mut().set_modal(window, modal)?;
        self.capture
            .release_capture_blocked_by_modal(self.manager.windows());
        Ok(changed)
    }

    pub fn add_transient(&mut self, parent: WindowId, child: WindowId) -> Result<bool, SessionError> {
        self.check_running()?;
        let added = self.manager.windows_mut().add_transient(parent, child)?;
        self.capture
            .release_capture_blocked_by_modal(self.manager.windows());
        Ok(added)
    }

    pub fn set_opacity(&mut self, window: WindowId, opacity: f32) -> Result<(), SessionError> {
        self.check_running()?;
        Ok(self.manager.windows_mut().set_opacity(window, opacity)?)
    }

    pub fn set_bounds(&mut self, window: WindowId, bounds: Rect) -> Result<Rect, SessionError> {
        self.check_running()?;
        Ok(self.manager.windows_mut().set_bounds(window, bounds)?)
    }

    /// Destroy a window and its subtree. Display roots are not destroyable
    /// this way and yield an empty list.
    pub fn destroy_window(&mut self, window: WindowId) -> Result<Vec<WindowId>, SessionError> {
        self.check_running()?;
        let is_root = self
            .manager
            .windows()
            .get(window)
            .ok_or(WindowError::UnknownWindow(window))?
            .is_root();
        if is_root {
            return Ok(Vec::new());
        }
        let destroyed = self.manager.windows_mut().destroy(window)?;
        self.capture
            .on_windows_destroyed(self.manager.windows_mut(), &destroyed);
        self.capture
            .release_capture_blocked_by_modal(self.manager.windows());
        Ok(destroyed)
    }

    // ---- capture and input ----

    pub fn set_capture(&mut self, client: ClientId, window: WindowId) -> Result<bool, SessionError> {
        self.check_running()?;
        Ok(self.capture.set_capture(self.manager.windows(), client, window)?)
    }

    pub fn release_capture(&mut self, client: ClientId, window: WindowId) -> Result<bool, SessionError> {
        self.check_running()?;
        Ok(self
            .capture
            .release_capture(self.manager.windows(), client, window)?)
    }

    /// Route a raw input event to its target window.
    ///
    /// The capture holder gets everything; otherwise the deepest drawn
    /// window under the event on the root it lands on. Returns the target,
    /// or `None` when nothing can receive the event.
    pub fn dispatch_host_event(
        &mut self,
        display_id: DisplayId,
        event: HostEvent,
    ) -> Result<Option<(ClientId, WindowId)>, SessionError> {
        self.check_running()?;
        let located = self.manager.locate_event(display_id, event)?;
        if event.kind == HostEventKind::MouseMove {
            self.manager
                .set_cursor_screen_location(located.screen_location);
        }

        let target = match self.capture.capture() {
            Some(capture) => Some((capture.client, capture.window)),
            None => {
                let windows = self.manager.windows();
                self.manager
                    .root_for_display(located.display_id)
                    .and_then(|root| windows.hit_test(root.window(), located.root_location))
                    .filter(|&w| windows.blocking_modal(w).is_none())
                    .and_then(|w| windows.get(w).map(|window| (window.owner(), w)))
            }
        };

        let Some((client, window)) = target else {
            debug!("No target for event at {:?}", located.screen_location);
            return Ok(None);
        };
        self.capture.dispatch(client, window, located)?;
        Ok(Some((client, window)))
    }

    pub fn ack_event(&mut self, client: ClientId, event_id: u32) -> Result<bool, SessionError> {
        Ok(self.capture.ack(client, event_id)?)
    }

    pub fn perform_window_move(&mut self, client: ClientId, change_id: u32, window: WindowId) -> Result<bool, SessionError> {
        self.check_running()?;
        Ok(self
            .capture
            .perform_window_move(self.manager.windows(), client, change_id, window)?)
    }

    pub fn wm_response(&mut self, change_id: u32, success: bool) -> bool {
        self.capture
            .wm_response(self.manager.windows_mut(), change_id, success)
    }

    pub fn cancel_window_move(&mut self, client: ClientId) -> bool {
        self.capture
            .cancel_window_move(self.manager.windows_mut(), client)
    }

    pub fn take_changes(&mut self, client: ClientId) -> Vec<ClientChange> {
        self.capture.take_changes(client)
    }

    /// Tear everything down without notifying clients or observers.
    pub fn shutdown(&mut self) -> Vec<WindowId> {
        if self.shut_down {
            return Vec::new();
        }
        info!("Shutting down session");
        self.shut_down = true;
        self.capture.shutdown();
        self.manager.shutdown()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}
