//! Observer interfaces and the registry that dispatches to them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::display::{Display, DisplayMetrics};
use crate::window::WindowId;

/// Receives display configuration notifications.
///
/// Every change is bracketed by `changing`/`changed`; finer notifications
/// arrive in between.
pub trait DisplayObserver {
    fn on_display_configuration_changing(&self) {}
    fn on_display_configuration_changed(&self) {}
    fn on_display_added(&self, _display: &Display) {}
    fn on_display_removed(&self, _display: &Display) {}
    /// `changed` is never empty.
    fn on_display_metrics_changed(&self, _display: &Display, _changed: DisplayMetrics) {}
    /// Fired once, after the first display configuration.
    fn on_displays_initialized(&self) {}
}

/// Receives capture changes.
pub trait CaptureObserver {
    fn on_capture_changed(&self, new: Option<WindowId>, old: Option<WindowId>);
}

/// Ordered list of observers.
///
/// Dispatch iterates a snapshot, so observers may add or remove entries
/// (including themselves) while being notified.
pub struct ObserverList<T: ?Sized> {
    observers: RefCell<Vec<Rc<T>>>,
}

impl<T: ?Sized> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
        }
    }

    /// Register an observer. Adding the same one twice is a no-op.
    pub fn add(&self, observer: Rc<T>) {
        let mut observers = self.observers.borrow_mut();
        if !observers.iter().any(|o| Rc::ptr_eq(o, &observer)) {
            observers.push(observer);
        }
    }

    /// Returns whether the observer was registered.
    pub fn remove(&self, observer: &Rc<T>) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|o| !Rc::ptr_eq(o, observer));
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.observers.borrow_mut().clear();
    }

    /// Call `f` on every observer registered when dispatch started.
    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        let snapshot: Vec<Rc<T>> = self.observers.borrow().clone();
        for observer in &snapshot {
            f(observer);
        }
    }
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}
