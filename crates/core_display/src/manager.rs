//! The Window-Root Manager.
//!
//! Owns every display-derived piece of state: the registry, remembered
//! layouts, the primary selector, one [`WindowRoot`] per display and the
//! cursor. All configuration changes go through here so that observers see
//! each externally visible change exactly once, bracketed by a
//! changing/changed pair.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::display::{Display, DisplayId, DisplayInfo, Rotation, RotationSource};
use crate::error::{DisplayError, WindowError};
use crate::geometry::{Insets, Point, Rect, Size};
use crate::layout::{reroot, resolve, DefaultPlacement, DisplayLayout, LayoutStore, Placement, Position};
use crate::observer::{DisplayObserver, ObserverList};
use crate::primary::{PrimaryRequest, PrimarySelector};
use crate::registry::DisplayRegistry;
use crate::transform::{HostEvent, HostEventKind, LocatedEvent, RootTransform};
use crate::window::{WindowId, WindowTree};

pub type RootId = u32;

/// Lifecycle of a root. A display without a root is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootState {
    Active,
    PrimarySwapping,
    Removing,
}

/// The top-level window hierarchy attached to one display.
#[derive(Debug, Clone)]
pub struct WindowRoot {
    id: RootId,
    display_id: DisplayId,
    window: WindowId,
    transform: RootTransform,
    host_size: Size,
    state: RootState,
}

impl WindowRoot {
    pub fn id(&self) -> RootId {
        self.id
    }

    pub fn display_id(&self) -> DisplayId {
        self.display_id
    }

    /// The root window all top-level windows on this display hang off.
    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn transform(&self) -> &RootTransform {
        &self.transform
    }

    /// Pixel size of the host surface after overscan and rotation.
    pub fn host_size(&self) -> Size {
        self.host_size
    }

    pub fn state(&self) -> RootState {
        self.state
    }
}

/// Work deferred to a later turn of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    DestroyRoot(DisplayId),
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

/// Cursor position with the metrics of the display it is on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorInfo {
    /// Screen location in DIPs.
    pub location: Point,
    pub display_id: DisplayId,
    pub device_scale_factor: f32,
    pub rotation: Rotation,
}

pub struct RootManager {
    registry: DisplayRegistry,
    layouts: LayoutStore,
    primary: PrimarySelector,
    displays: BTreeMap<DisplayId, Display>,
    windows: WindowTree,
    /// Keyed by display id; includes roots pending destruction.
    roots: BTreeMap<DisplayId, WindowRoot>,
    next_root_id: RootId,
    tasks: TaskQueue,
    cursor: Option<Point>,
    observers: Rc<ObserverList<dyn DisplayObserver>>,
    initialized: bool,
}

impl RootManager {
    pub fn new(default_placement: DefaultPlacement) -> Self {
        Self::with_layouts(LayoutStore::new(default_placement))
    }

    /// Start from previously remembered layouts.
    pub fn with_layouts(layouts: LayoutStore) -> Self {
        Self {
            registry: DisplayRegistry::new(),
            layouts,
            primary: PrimarySelector::new(),
            displays: BTreeMap::new(),
            windows: WindowTree::new(),
            roots: BTreeMap::new(),
            next_root_id: 1,
            tasks: TaskQueue::default(),
            cursor: None,
            observers: Rc::new(ObserverList::new()),
            initialized: false,
        }
    }

    pub fn add_observer(&self, observer: Rc<dyn DisplayObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_observer(&self, observer: &Rc<dyn DisplayObserver>) -> bool {
        self.observers.remove(observer)
    }

    pub fn observers(&self) -> Rc<ObserverList<dyn DisplayObserver>> {
        self.observers.clone()
    }

    // ---- configuration ----

    /// Replace the connected display set.
    ///
    /// Always brackets the update with changing/changed, even when nothing
    /// moved. Finer notifications are only sent for real changes.
    pub fn update_displays(&mut self, infos: Vec<DisplayInfo>) -> Result<(), DisplayError> {
        let native_cursor = self.cursor_in_native();
        let previous_cursor = self.cursor;
        let diff = self.registry.apply(infos)?;

        self.notify_changing();
        let old_displays = self.displays.clone();
        let old_primary = self.primary.current();
        let ids = self.registry.ids();
        let new_primary = self.primary.select(&ids, self.registry.internal_id());

        for &id in &diff.added {
            self.attach_root(id);
        }
        if let (Some(from), Some(to)) = (old_primary, new_primary) {
            if from != to {
                self.swap_roots(from, to);
            }
        }
        for &id in &diff.removed {
            self.begin_root_removal(id);
        }

        self.relayout();
        self.restore_cursor(native_cursor, previous_cursor);
        self.publish(&old_displays);
        self.notify_changed();

        if !self.initialized {
            self.initialized = true;
            info!("Displays initialized: {} connected", self.displays.len());
            self.observers.for_each(|o| o.on_displays_initialized());
        }
        Ok(())
    }

    /// Replace the layout for the connected set.
    ///
    /// Returns `Ok(false)` without notifying anyone when the layout is
    /// already in effect.
    pub fn set_layout(&mut self, mut layout: DisplayLayout) -> Result<bool, DisplayError> {
        let ids = self.registry.ids();
        let primary = self.primary.current().ok_or(DisplayError::NoDisplays)?;

        layout.placements.sort_by_key(|p| p.display_id);
        if let Some(pair) = layout.placements.windows(2).find(|w| w[0].display_id == w[1].display_id) {
            return Err(DisplayError::DuplicateDisplay(pair[0].display_id));
        }
        layout.primary_id = Some(layout.primary_id.filter(|id| ids.contains(id)).unwrap_or(primary));
        let rooted = reroot(&layout, &ids, primary);
        if self.layouts.get(&ids) == Some(&rooted) {
            return Ok(false);
        }

        let native_cursor = self.cursor_in_native();
        let previous_cursor = self.cursor;
        self.notify_changing();
        let old_displays = self.displays.clone();
        self.layouts.register(&ids, rooted);
        self.relayout();
        self.restore_cursor(native_cursor, previous_cursor);
        self.publish(&old_displays);
        self.notify_changed();
        Ok(true)
    }

    /// Set or replace one placement of the current layout.
    ///
    /// A placement for the primary is stored inverted, attached to it.
    pub fn set_placement(&mut self, placement: Placement) -> Result<bool, DisplayError> {
        for id in [placement.display_id, placement.parent_id] {
            if !self.registry.contains(id) {
                return Err(DisplayError::UnknownDisplay(id));
            }
        }
        if placement.display_id == placement.parent_id {
            debug!("Ignoring placement of display {} relative to itself", placement.display_id);
            return Ok(false);
        }
        let placement = if Some(placement.display_id) == self.primary.current() {
            placement.inverted()
        } else {
            placement
        };
        let mut layout = self.current_layout();
        layout.set_placement(placement);
        self.set_layout(layout)
    }

    /// Change the default placement for new display sets and the current one.
    pub fn set_default_placement(&mut self, position: Position, offset: i32) -> Result<bool, DisplayError> {
        let placement = DefaultPlacement::new(position, offset);
        self.layouts.set_default_placement(placement);
        let mut layout = self.current_layout();
        layout.default_placement = placement;
        self.set_layout(layout)
    }

    /// Make `id` the primary display, moving the primary root along with it.
    pub fn set_primary(&mut self, id: DisplayId) -> Result<bool, DisplayError> {
        let ids = self.registry.ids();
        let PrimaryRequest::Swap { from, to } = self.primary.request(id, &ids)? else {
            return Ok(false);
        };
        info!("Swapping primary display {} -> {}", from, to);

        self.notify_changing();
        let old_displays = self.displays.clone();
        self.set_root_state(&[from, to], RootState::PrimarySwapping);
        self.swap_roots(from, to);
        self.relayout();
        self.set_root_state(&[from, to], RootState::Active);
        self.publish(&old_displays);
        self.notify_changed();
        Ok(true)
    }

    pub fn set_overscan(&mut self, id: DisplayId, insets: Insets) -> Result<bool, DisplayError> {
        self.apply_display_change(|registry| registry.set_overscan(id, insets))
    }

    pub fn set_rotation(&mut self, id: DisplayId, rotation: Rotation, source: RotationSource) -> Result<bool, DisplayError> {
        self.apply_display_change(|registry| registry.set_rotation(id, rotation, source))
    }

    /// Only the internal display accepts a ui scale.
    pub fn set_ui_scale(&mut self, id: DisplayId, scale: f32) -> Result<bool, DisplayError> {
        self.apply_display_change(|registry| registry.set_ui_scale(id, scale))
    }

    pub fn set_work_area_insets(&mut self, id: DisplayId, insets: Insets) -> Result<bool, DisplayError> {
        self.apply_display_change(|registry| registry.set_work_area_insets(id, insets))
    }

    fn apply_display_change(
        &mut self,
        change: impl FnOnce(&mut DisplayRegistry) -> Result<bool, DisplayError>,
    ) -> Result<bool, DisplayError> {
        let native_cursor = self.cursor_in_native();
        let previous_cursor = self.cursor;
        if !change(&mut self.registry)? {
            return Ok(false);
        }

        self.notify_changing();
        let old_displays = self.displays.clone();
        self.relayout();
        self.restore_cursor(native_cursor, previous_cursor);
        self.publish(&old_displays);
        self.notify_changed();
        Ok(true)
    }

    /// Run deferred work. Returns the windows destroyed along with roots.
    pub fn run_pending_tasks(&mut self) -> Vec<WindowId> {
        let mut destroyed = Vec::new();
        while let Some(task) = self.tasks.pop() {
            match task {
                Task::DestroyRoot(display_id) => {
                    let pending = self
                        .roots
                        .get(&display_id)
                        .is_some_and(|r| r.state == RootState::Removing);
                    if !pending {
                        debug!("Root for display {} is no longer pending removal", display_id);
                        continue;
                    }
                    let Some(root) = self.roots.remove(&display_id) else {
                        continue;
                    };
                    debug!("Destroying root {} of display {}", root.id, display_id);
                    match self.windows.destroy(root.window) {
                        Ok(ids) => destroyed.extend(ids),
                        Err(e) => warn!("Failed to destroy root window: {}", e),
                    }
                }
            }
        }
        destroyed
    }

    pub fn pending_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Destroy every root without notifying observers.
    pub fn shutdown(&mut self) -> Vec<WindowId> {
        self.observers.clear();
        self.tasks.clear();
        let mut destroyed = Vec::new();
        for (_, root) in std::mem::take(&mut self.roots) {
            if let Ok(ids) = self.windows.destroy(root.window) {
                destroyed.extend(ids);
            }
        }
        self.displays.clear();
        self.registry.clear();
        self.cursor = None;
        destroyed
    }

    // ---- roots ----

    fn attach_root(&mut self, display_id: DisplayId) {
        if let Some(root) = self.roots.get_mut(&display_id) {
            if root.state == RootState::Removing {
                debug!("Display {} returned before its root was destroyed", display_id);
                root.state = RootState::Active;
            }
            return;
        }
        let window = self.windows.create_root();
        let id = self.next_root_id;
        self.next_root_id += 1;
        debug!("Created root {} for display {}", id, display_id);
        self.roots.insert(
            display_id,
            WindowRoot {
                id,
                display_id,
                window,
                transform: RootTransform::default(),
                host_size: Size::default(),
                state: RootState::Active,
            },
        );
    }

    /// Exchange the roots bound to two displays.
    fn swap_roots(&mut self, from: DisplayId, to: DisplayId) {
        match (self.roots.remove(&from), self.roots.remove(&to)) {
            (Some(mut old_primary), Some(mut new_primary)) => {
                old_primary.display_id = to;
                new_primary.display_id = from;
                self.roots.insert(to, old_primary);
                self.roots.insert(from, new_primary);
            }
            (a, b) => {
                warn!("Cannot swap roots of displays {} and {}", from, to);
                if let Some(a) = a {
                    self.roots.insert(from, a);
                }
                if let Some(b) = b {
                    self.roots.insert(to, b);
                }
            }
        }
    }

    fn set_root_state(&mut self, ids: &[DisplayId], state: RootState) {
        for id in ids {
            if let Some(root) = self.roots.get_mut(id) {
                root.state = state;
            }
        }
    }

    /// Move the removed display's windows to the primary root and schedule
    /// the root's destruction.
    fn begin_root_removal(&mut self, display_id: DisplayId) {
        let target = self
            .primary
            .current()
            .and_then(|id| self.roots.get(&id))
            .map(|r| r.window);
        let Some(root) = self.roots.get_mut(&display_id) else {
            return;
        };
        root.state = RootState::Removing;
        let window = root.window;

        if let Some(target) = target {
            for child in self.windows.children(window) {
                if let Err(e) = self.windows.add_child(target, child) {
                    warn!("Failed to migrate window {}: {}", child, e);
                }
            }
        }
        self.tasks.push(Task::DestroyRoot(display_id));
    }

    fn relayout(&mut self) {
        let ids = self.registry.ids();
        let Some(primary) = self.primary.current() else {
            self.displays.clear();
            return;
        };
        let layout = reroot(&self.layouts.get_or_default(&ids), &ids, primary);
        self.layouts.register(&ids, layout.clone());

        let infos = self.registry.snapshot();
        let bounds = resolve(&infos, &layout, primary);

        let mut displays = BTreeMap::new();
        for info in &infos {
            let Some(&rect) = bounds.get(&info.id) else {
                continue;
            };
            displays.insert(
                info.id,
                Display {
                    id: info.id,
                    bounds: rect,
                    work_area: rect.inset(self.registry.work_area_insets(info.id)),
                    rotation: info.rotation,
                    rotation_source: info.rotation_source,
                    device_scale_factor: info.device_scale_factor,
                    ui_scale: info.effective_ui_scale(),
                    overscan: info.overscan,
                    is_internal: info.is_internal,
                    is_primary: info.id == primary,
                },
            );

            if let Some(root) = self.roots.get_mut(&info.id) {
                root.transform = RootTransform::for_display(info);
                root.host_size = info.size_in_pixel();
                let root_bounds = Rect::from_origin_size(Point::default(), info.size_in_dip());
                if let Err(e) = self.windows.set_bounds(root.window, root_bounds) {
                    warn!("Root window of display {} is gone: {}", info.id, e);
                }
            }
        }
        self.displays = displays;
    }

    // ---- notifications ----

    fn notify_changing(&self) {
        self.observers.for_each(|o| o.on_display_configuration_changing());
    }

    fn notify_changed(&self) {
        self.observers.for_each(|o| o.on_display_configuration_changed());
    }

    fn publish(&self, old: &BTreeMap<DisplayId, Display>) {
        for (id, display) in old {
            if !self.displays.contains_key(id) {
                self.observers.for_each(|o| o.on_display_removed(display));
            }
        }
        for (id, display) in &self.displays {
            match old.get(id) {
                None => self.observers.for_each(|o| o.on_display_added(display)),
                Some(previous) => {
                    let changed = previous.changed_metrics(display);
                    if !changed.is_empty() {
                        self.observers
                            .for_each(|o| o.on_display_metrics_changed(display, changed));
                    }
                }
            }
        }
    }

    // ---- cursor ----

    /// Cursor location in the shared native pixel space.
    fn cursor_in_native(&self) -> Option<Point> {
        let cursor = self.cursor?;
        let display = self.display_nearest_point(cursor)?;
        let info = self.registry.info(display.id)?;
        let root = self.roots.get(&display.id)?;
        let local = cursor.offset(-display.bounds.x, -display.bounds.y);
        let host = root.transform.root_to_host(local);
        Some(host.offset(info.native_bounds.x, info.native_bounds.y))
    }

    fn native_to_screen(&self, native: Point) -> Option<Point> {
        let info = self
            .registry
            .snapshot()
            .into_iter()
            .find(|i| i.native_bounds.contains(native))?;
        let root = self.roots.get(&info.id)?;
        let display = self.displays.get(&info.id)?;
        let host = native.offset(-info.native_bounds.x, -info.native_bounds.y);
        let local = root.transform.host_to_root(host);
        Some(local.offset(display.bounds.x, display.bounds.y))
    }

    /// Put the cursor back after a configuration change.
    ///
    /// The native location wins while some display still covers it;
    /// otherwise the cursor jumps to the centre of the display whose centre
    /// is closest to where it was.
    fn restore_cursor(&mut self, native: Option<Point>, previous: Option<Point>) {
        let restored = native.and_then(|n| self.native_to_screen(n)).or_else(|| match previous {
            Some(previous) => self
                .displays
                .values()
                .min_by_key(|d| d.bounds.center().distance_squared(previous))
                .map(|d| d.bounds.center()),
            None => self.primary_display().map(|d| d.bounds.center()),
        });
        if restored != self.cursor {
            debug!("Cursor moved from {:?} to {:?}", self.cursor, restored);
        }
        self.cursor = restored;
    }

    pub fn cursor(&self) -> Option<CursorInfo> {
        let location = self.cursor?;
        let display = self.display_nearest_point(location)?;
        Some(CursorInfo {
            location,
            display_id: display.id,
            device_scale_factor: display.device_scale_factor,
            rotation: display.rotation,
        })
    }

    pub fn set_cursor_screen_location(&mut self, location: Point) {
        self.cursor = Some(location);
    }

    /// Warp the cursor to a host pixel of `display_id`.
    pub fn move_cursor_to_host(&mut self, display_id: DisplayId, host: Point) -> Result<Point, DisplayError> {
        let local = self.host_to_root(display_id, host)?;
        let display = self.display(display_id).ok_or(DisplayError::UnknownDisplay(display_id))?;
        let screen = local.offset(display.bounds.x, display.bounds.y);
        self.cursor = Some(screen);
        Ok(screen)
    }

    // ---- queries ----

    /// Connected displays in id order.
    pub fn displays(&self) -> impl Iterator<Item = &Display> {
        self.displays.values()
    }

    pub fn display(&self, id: DisplayId) -> Option<&Display> {
        self.displays.get(&id)
    }

    pub fn display_count(&self) -> usize {
        self.displays.len()
    }

    pub fn primary_display(&self) -> Option<&Display> {
        self.primary.current().and_then(|id| self.displays.get(&id))
    }

    pub fn registry(&self) -> &DisplayRegistry {
        &self.registry
    }

    /// Layout in effect for the connected set, rooted at the primary.
    pub fn current_layout(&self) -> DisplayLayout {
        let ids = self.registry.ids();
        let layout = self.layouts.get_or_default(&ids);
        match self.primary.current() {
            Some(primary) => reroot(&layout, &ids, primary),
            None => layout,
        }
    }

    pub fn layout_store(&self) -> &LayoutStore {
        &self.layouts
    }

    /// Display containing `point`, else the one closest to it.
    pub fn display_nearest_point(&self, point: Point) -> Option<&Display> {
        self.displays
            .values()
            .find(|d| d.bounds.contains(point))
            .or_else(|| {
                self.displays
                    .values()
                    .min_by_key(|d| d.bounds.clamp_point(point).distance_squared(point))
            })
    }

    /// Display hosting `window`; `None` and detached windows map to the primary.
    pub fn display_nearest_window(&self, window: Option<WindowId>) -> Result<Option<&Display>, WindowError> {
        let Some(window) = window else {
            return Ok(self.primary_display());
        };
        if !self.windows.exists(window) {
            return Err(WindowError::UnknownWindow(window));
        }
        let display = self
            .windows
            .root_of(window)
            .and_then(|root_window| self.roots.values().find(|r| r.window == root_window))
            .and_then(|root| self.displays.get(&root.display_id));
        Ok(display.or_else(|| self.primary_display()))
    }

    pub fn root_for_display(&self, id: DisplayId) -> Option<&WindowRoot> {
        self.roots.get(&id)
    }

    pub fn primary_root(&self) -> Option<&WindowRoot> {
        self.primary.current().and_then(|id| self.roots.get(&id))
    }

    pub fn root_state(&self, id: DisplayId) -> Option<RootState> {
        self.roots.get(&id).map(|r| r.state)
    }

    fn active_root(&self, id: DisplayId) -> Result<&WindowRoot, DisplayError> {
        match self.roots.get(&id) {
            Some(root) if self.displays.contains_key(&id) => Ok(root),
            _ => Err(DisplayError::UnknownDisplay(id)),
        }
    }

    pub fn windows(&self) -> &WindowTree {
        &self.windows
    }

    pub fn windows_mut(&mut self) -> &mut WindowTree {
        &mut self.windows
    }

    // ---- coordinates ----

    pub fn host_to_root(&self, display_id: DisplayId, host: Point) -> Result<Point, DisplayError> {
        Ok(self.active_root(display_id)?.transform.host_to_root(host))
    }

    pub fn root_to_host(&self, display_id: DisplayId, root: Point) -> Result<Point, DisplayError> {
        Ok(self.active_root(display_id)?.transform.root_to_host(root))
    }

    /// Translate a host event into root and screen coordinates.
    ///
    /// An event that lands outside its root is retargeted to the display
    /// whose bounds contain its screen location.
    pub fn locate_event(&self, display_id: DisplayId, event: HostEvent) -> Result<LocatedEvent, DisplayError> {
        let root = self.active_root(display_id)?;
        let display = self.display(display_id).ok_or(DisplayError::UnknownDisplay(display_id))?;
        let local = root.transform.host_to_root(event.location);
        let screen = local.offset(display.bounds.x, display.bounds.y);

        let local_bounds = Rect::from_origin_size(Point::default(), display.bounds.size());
        let (target, root_location) = if local_bounds.contains(local) {
            (display_id, local)
        } else {
            match self.displays.values().find(|d| d.bounds.contains(screen)) {
                Some(other) => (other.id, screen.offset(-other.bounds.x, -other.bounds.y)),
                None => (display_id, local),
            }
        };

        let (touch, scroll) = match event.kind {
            HostEventKind::Touch { radius_x, radius_y } => (Some(root.transform.scale_touch(radius_x, radius_y)), None),
            HostEventKind::Scroll { x_offset, y_offset } => (None, Some(root.transform.scale_scroll(x_offset, y_offset))),
            _ => (None, None),
        };

        Ok(LocatedEvent {
            kind: event.kind,
            display_id: target,
            root_location,
            screen_location: screen,
            touch,
            scroll,
        })
    }

    /// Ids of displays that currently have a root pending destruction.
    pub fn removing_displays(&self) -> HashSet<DisplayId> {
        self.roots
            .values()
            .filter(|r| r.state == RootState::Removing)
            .map(|r| r.display_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::parse_display_specs;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl DisplayObserver for Recorder {
        fn on_display_configuration_changing(&self) {
            self.events.borrow_mut().push("changing".into());
        }
        fn on_display_configuration_changed(&self) {
            self.events.borrow_mut().push("changed".into());
        }
        fn on_display_added(&self, display: &Display) {
            self.events.borrow_mut().push(format!("added {}", display.id));
        }
        fn on_display_removed(&self, display: &Display) {
            self.events.borrow_mut().push(format!("removed {}", display.id));
        }
        fn on_display_metrics_changed(&self, display: &Display, _changed: crate::display::DisplayMetrics) {
            self.events.borrow_mut().push(format!("metrics {}", display.id));
        }
        fn on_displays_initialized(&self) {
            self.events.borrow_mut().push("initialized".into());
        }
    }

    fn manager(specs: &str) -> (RootManager, Rc<Recorder>) {
        let mut manager = RootManager::new(DefaultPlacement::default());
        let recorder = Rc::new(Recorder::default());
        manager.add_observer(recorder.clone());
        manager.update_displays(parse_display_specs(specs).unwrap()).unwrap();
        recorder.events.borrow_mut().clear();
        (manager, recorder)
    }

    fn ids(manager: &RootManager) -> Vec<DisplayId> {
        manager.displays().map(|d| d.id).collect()
    }

    #[test]
    fn test_initialized_fires_once() {
        let mut manager = RootManager::new(DefaultPlacement::default());
        let recorder = Rc::new(Recorder::default());
        manager.add_observer(recorder.clone());
        manager.update_displays(parse_display_specs("500x500").unwrap()).unwrap();
        manager.update_displays(parse_display_specs("500x500,400x400").unwrap()).unwrap();
        let count = recorder.events.borrow().iter().filter(|e| *e == "initialized").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_update_rejected_without_notifications() {
        let (mut manager, recorder) = manager("500x500");
        assert_eq!(manager.update_displays(Vec::new()), Err(DisplayError::NoDisplays));
        assert!(recorder.events.borrow().is_empty());
        assert_eq!(manager.display_count(), 1);
    }

    #[test]
    fn test_same_update_only_brackets() {
        let (mut manager, recorder) = manager("500x500,400x400");
        manager.update_displays(parse_display_specs("500x500,400x400").unwrap()).unwrap();
        assert_eq!(*recorder.events.borrow(), vec!["changing", "changed"]);
    }

    #[test]
    fn test_removed_display_defers_root_destruction() {
        let (mut manager, _) = manager("500x500,400x400");
        let secondary = ids(&manager)[1];
        let root_window = manager.root_for_display(secondary).unwrap().window();
        let w = manager.windows_mut().create_window(1);
        manager.windows_mut().add_child(root_window, w).unwrap();

        manager.update_displays(parse_display_specs("500x500").unwrap()).unwrap();
        assert_eq!(manager.root_state(secondary), Some(RootState::Removing));
        let primary_window = manager.primary_root().unwrap().window();
        assert_eq!(manager.windows().get(w).unwrap().parent(), Some(primary_window));
        assert_eq!(manager.pending_task_count(), 1);

        assert_eq!(manager.removing_displays(), HashSet::from([secondary]));

        let destroyed = manager.run_pending_tasks();
        assert_eq!(destroyed, vec![root_window]);
        assert_eq!(manager.root_state(secondary), None);
        assert!(manager.removing_displays().is_empty());
    }

    #[test]
    fn test_removed_observer_is_not_notified() {
        let (mut manager, recorder) = manager("500x500");
        let observer: Rc<dyn DisplayObserver> = recorder.clone();
        assert!(manager.remove_observer(&observer));
        assert!(!manager.remove_observer(&observer));

        manager.update_displays(parse_display_specs("500x500,400x400").unwrap()).unwrap();
        assert!(recorder.events.borrow().is_empty());
        assert_eq!(manager.display_count(), 2);
    }

    #[test]
    fn test_reconnect_before_destroy_resurrects_root() {
        let (mut manager, _) = manager("500x500,400x400");
        let secondary = ids(&manager)[1];
        let root_id = manager.root_for_display(secondary).unwrap().id();

        manager.update_displays(parse_display_specs("500x500").unwrap()).unwrap();
        manager.update_displays(parse_display_specs("500x500,400x400").unwrap()).unwrap();
        assert!(manager.run_pending_tasks().is_empty());
        assert_eq!(manager.root_for_display(secondary).unwrap().id(), root_id);
        assert_eq!(manager.root_state(secondary), Some(RootState::Active));
    }

    #[test]
    fn test_set_layout_rejects_duplicate_placements() {
        let (mut manager, recorder) = manager("500x500,400x400");
        let (first, second) = (ids(&manager)[0], ids(&manager)[1]);
        let before: Vec<Rect> = manager.displays().map(|d| d.bounds).collect();

        let mut layout = DisplayLayout::new(DefaultPlacement::default());
        layout.placements = vec![
            Placement::new(second, first, Position::Left, 0),
            Placement::new(second, first, Position::Bottom, 0),
        ];
        assert_eq!(manager.set_layout(layout), Err(DisplayError::DuplicateDisplay(second)));
        assert!(recorder.events.borrow().is_empty());
        assert_eq!(manager.displays().map(|d| d.bounds).collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_set_primary_swaps_roots() {
        let (mut manager, recorder) = manager("500x500,400x400");
        let (first, second) = (ids(&manager)[0], ids(&manager)[1]);
        let primary_root = manager.primary_root().unwrap().id();

        assert_eq!(manager.set_primary(second), Ok(true));
        assert_eq!(manager.primary_root().unwrap().id(), primary_root);
        assert_eq!(manager.primary_display().unwrap().id, second);
        assert_eq!(manager.display(second).unwrap().bounds, Rect::new(0, 0, 400, 400));
        assert_eq!(manager.display(first).unwrap().bounds, Rect::new(-500, 0, 500, 500));

        let events = recorder.events.borrow();
        assert_eq!(events.first().map(String::as_str), Some("changing"));
        assert_eq!(events.last().map(String::as_str), Some("changed"));
        assert_eq!(events.iter().filter(|e| *e == "changed").count(), 1);
    }

    #[test]
    fn test_set_primary_noop_cases() {
        let (mut manager, recorder) = manager("500x500");
        let only = ids(&manager)[0];
        assert_eq!(manager.set_primary(only), Ok(false));
        assert_eq!(manager.set_primary(42), Err(DisplayError::UnknownDisplay(42)));
        assert!(recorder.events.borrow().is_empty());
    }

    #[test]
    fn test_same_rotation_is_silent() {
        let (mut manager, recorder) = manager("500x500");
        let id = ids(&manager)[0];
        assert_eq!(manager.set_rotation(id, Rotation::Rotate0, RotationSource::User), Ok(false));
        assert!(recorder.events.borrow().is_empty());
        assert_eq!(manager.set_rotation(id, Rotation::Rotate90, RotationSource::User), Ok(true));
        assert!(recorder.events.borrow().contains(&format!("metrics {}", id)));
    }

    #[test]
    fn test_display_nearest_point() {
        let (manager, _) = manager("100x100,100x100");
        let (first, second) = (ids(&manager)[0], ids(&manager)[1]);
        assert_eq!(manager.display_nearest_point(Point::new(150, 50)).unwrap().id, second);
        assert_eq!(manager.display_nearest_point(Point::new(-20, 50)).unwrap().id, first);
        assert_eq!(manager.display_nearest_point(Point::new(130, 180)).unwrap().id, second);
        assert_eq!(manager.display_nearest_point(Point::new(40, -90)).unwrap().id, first);
    }

    #[test]
    fn test_display_nearest_window() {
        let (mut manager, _) = manager("500x500,400x400");
        let secondary = ids(&manager)[1];
        let root_window = manager.root_for_display(secondary).unwrap().window();
        let w = manager.windows_mut().create_window(1);
        let detached = manager.windows_mut().create_window(1);
        manager.windows_mut().add_child(root_window, w).unwrap();

        assert_eq!(manager.display_nearest_window(Some(w)).unwrap().unwrap().id, secondary);
        let primary = manager.primary_display().unwrap().id;
        assert_eq!(manager.display_nearest_window(None).unwrap().unwrap().id, primary);
        assert_eq!(manager.display_nearest_window(Some(detached)).unwrap().unwrap().id, primary);
        assert_eq!(manager.display_nearest_window(Some(999)), Err(WindowError::UnknownWindow(999)));
    }

    #[test]
    fn test_locate_event_retargets_outside_root() {
        let (manager, _) = manager("500x500,400x400");
        let (first, second) = (ids(&manager)[0], ids(&manager)[1]);
        let located = manager.locate_event(first, HostEvent::mouse_move(550, 20)).unwrap();
        assert_eq!(located.display_id, second);
        assert_eq!(located.root_location, Point::new(50, 20));
        assert_eq!(located.screen_location, Point::new(550, 20));
    }

    #[test]
    fn test_shutdown_destroys_roots_silently() {
        let (mut manager, recorder) = manager("500x500,400x400");
        let destroyed = manager.shutdown();
        assert_eq!(destroyed.len(), 2);
        assert_eq!(manager.display_count(), 0);
        assert!(recorder.events.borrow().is_empty());
    }
}
