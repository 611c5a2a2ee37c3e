//! Window arena shared by every display root.
//!
//! Windows form a forest; each display root is the top of one tree.
//! Transient (owner) links are kept separately from the parent hierarchy
//! and drive modality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::WindowError;
use crate::geometry::{Point, Rect};

/// Unique identifier for a window.
pub type WindowId = u64;

/// Identifier of one window-tree connection.
pub type ClientId = u32;

/// The connection that owns display roots and drives move loops.
pub const WINDOW_MANAGER_CLIENT: ClientId = 0;

/// How a window blocks interaction with others while drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalType {
    #[default]
    None,
    /// Blocks its transient parent's subtree.
    Window,
    /// Blocks every other window in the session.
    System,
}

/// A node in the window arena.
#[derive(Debug, Clone)]
pub struct Window {
    id: WindowId,
    owner: ClientId,
    parent: Option<WindowId>,
    children: Vec<WindowId>,
    visible: bool,
    /// Relative to the parent.
    bounds: Rect,
    opacity: f32,
    transient_parent: Option<WindowId>,
    transient_children: Vec<WindowId>,
    modal: ModalType,
    is_root: bool,
}

impl Window {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn owner(&self) -> ClientId {
        self.owner
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    /// Children in stacking order, topmost last.
    pub fn children(&self) -> &[WindowId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn transient_parent(&self) -> Option<WindowId> {
        self.transient_parent
    }

    pub fn transient_children(&self) -> &[WindowId] {
        &self.transient_children
    }

    pub fn modal(&self) -> ModalType {
        self.modal
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }
}

/// Owns every window.
#[derive(Debug)]
pub struct WindowTree {
    windows: BTreeMap<WindowId, Window>,
    next_id: WindowId,
}

impl Default for WindowTree {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowTree {
    pub fn new() -> Self {
        Self {
            windows: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Create a hidden, unparented window.
    pub fn create_window(&mut self, owner: ClientId) -> WindowId {
        self.insert(owner, false, false)
    }

    /// Create a visible root window for a display.
    pub(crate) fn create_root(&mut self) -> WindowId {
        self.insert(WINDOW_MANAGER_CLIENT, true, true)
    }

    fn insert(&mut self, owner: ClientId, visible: bool, is_root: bool) -> WindowId {
        let id = self.next_id;
        self.next_id += 1;
        self.windows.insert(
            id,
            Window {
                id,
                owner,
                parent: None,
                children: Vec::new(),
                visible,
                bounds: Rect::default(),
                opacity: 1.0,
                transient_parent: None,
                transient_children: Vec::new(),
                modal: ModalType::None,
                is_root,
            },
        );
        id
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn exists(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn window(&self, id: WindowId) -> Result<&Window, WindowError> {
        self.windows.get(&id).ok_or(WindowError::UnknownWindow(id))
    }

    fn window_mut(&mut self, id: WindowId) -> Result<&mut Window, WindowError> {
        self.windows.get_mut(&id).ok_or(WindowError::UnknownWindow(id))
    }

    /// Children of `id`, topmost last. Empty for unknown windows.
    pub fn children(&self, id: WindowId) -> Vec<WindowId> {
        self.windows
            .get(&id)
            .map(|w| w.children.clone())
            .unwrap_or_default()
    }

    /// Windows owned by `client` whose parent is not, in id order.
    pub fn top_level_windows_of(&self, client: ClientId) -> Vec<WindowId> {
        self.windows
            .values()
            .filter(|w| w.owner == client && !w.is_root)
            .filter(|w| {
                w.parent
                    .and_then(|p| self.windows.get(&p))
                    .map_or(true, |p| p.owner != client)
            })
            .map(|w| w.id)
            .collect()
    }

    /// Whether `descendant` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: WindowId, descendant: WindowId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.windows.get(&id).and_then(|w| w.parent);
        }
        false
    }

    /// Topmost ancestor, if it is a display root.
    pub fn root_of(&self, id: WindowId) -> Option<WindowId> {
        let mut current = self.windows.get(&id)?;
        while let Some(parent) = current.parent {
            current = self.windows.get(&parent)?;
        }
        current.is_root.then_some(current.id)
    }

    /// Visible all the way up to an attached display root.
    pub fn is_drawn(&self, id: WindowId) -> bool {
        let mut current = self.windows.get(&id);
        while let Some(window) = current {
            if !window.visible {
                return false;
            }
            if window.is_root {
                return true;
            }
            current = window.parent.and_then(|p| self.windows.get(&p));
        }
        false
    }

    /// Parent `child` under `parent`, moving it from its previous parent.
    ///
    /// Returns `Ok(false)` when `child` is already there, is a root, or
    /// contains `parent`.
    pub fn add_child(&mut self, parent: WindowId, child: WindowId) -> Result<bool, WindowError> {
        self.window(parent)?;
        let child_window = self.window(child)?;
        if child_window.parent == Some(parent) || child_window.is_root || self.contains(child, parent) {
            return Ok(false);
        }
        self.detach(child);
        self.window_mut(parent)?.children.push(child);
        self.window_mut(child)?.parent = Some(parent);
        Ok(true)
    }

    /// Returns `Ok(false)` when the window had no parent.
    pub fn remove_from_parent(&mut self, child: WindowId) -> Result<bool, WindowError> {
        if self.window(child)?.parent.is_none() {
            return Ok(false);
        }
        self.detach(child);
        Ok(true)
    }

    fn detach(&mut self, child: WindowId) {
        let parent = self.windows.get_mut(&child).and_then(|w| w.parent.take());
        if let Some(parent) = parent.and_then(|p| self.windows.get_mut(&p)) {
            parent.children.retain(|&c| c != child);
        }
    }

    /// Returns whether visibility changed.
    pub fn set_visible(&mut self, id: WindowId, visible: bool) -> Result<bool, WindowError> {
        let window = self.window_mut(id)?;
        if window.visible == visible {
            return Ok(false);
        }
        window.visible = visible;
        Ok(true)
    }

    /// Returns the previous bounds.
    pub fn set_bounds(&mut self, id: WindowId, bounds: Rect) -> Result<Rect, WindowError> {
        let window = self.window_mut(id)?;
        Ok(std::mem::replace(&mut window.bounds, bounds))
    }

    /// Opacity is clamped to `[0, 1]`. Setting the current value succeeds.
    pub fn set_opacity(&mut self, id: WindowId, opacity: f32) -> Result<(), WindowError> {
        self.window_mut(id)?.opacity = opacity.clamp(0.0, 1.0);
        Ok(())
    }

    /// Make `child` transient to `parent`.
    ///
    /// Returns `Ok(false)` when `child` contains `parent`.
    pub fn add_transient(&mut self, parent: WindowId, child: WindowId) -> Result<bool, WindowError> {
        self.window(parent)?;
        self.window(child)?;
        if self.contains(child, parent) {
            return Ok(false);
        }
        self.remove_transient(child)?;
        self.window_mut(parent)?.transient_children.push(child);
        self.window_mut(child)?.transient_parent = Some(parent);
        Ok(true)
    }

    /// Returns `Ok(false)` when the window had no transient parent.
    pub fn remove_transient(&mut self, child: WindowId) -> Result<bool, WindowError> {
        let Some(parent) = self.window_mut(child)?.transient_parent.take() else {
            return Ok(false);
        };
        if let Some(parent) = self.windows.get_mut(&parent) {
            parent.transient_children.retain(|&c| c != child);
        }
        Ok(true)
    }

    /// Returns whether the modal type changed.
    pub fn set_modal(&mut self, id: WindowId, modal: ModalType) -> Result<bool, WindowError> {
        let window = self.window_mut(id)?;
        if window.modal == modal {
            return Ok(false);
        }
        window.modal = modal;
        Ok(true)
    }

    /// Drawn modal window that blocks `id`, if any.
    ///
    /// A system modal blocks everything outside its own subtree. A window
    /// modal blocks its transient parent's subtree.
    pub fn blocking_modal(&self, id: WindowId) -> Option<WindowId> {
        self.windows
            .values()
            .filter(|m| m.modal != ModalType::None && m.id != id)
            .filter(|m| !self.contains(m.id, id) && self.is_drawn(m.id))
            .find(|m| match m.modal {
                ModalType::System => true,
                ModalType::Window => m
                    .transient_parent
                    .is_some_and(|parent| self.contains(parent, id)),
                ModalType::None => false,
            })
            .map(|m| m.id)
    }

    /// Destroy a window and its subtree. Returns every destroyed id.
    pub fn destroy(&mut self, id: WindowId) -> Result<Vec<WindowId>, WindowError> {
        self.window(id)?;
        self.detach(id);

        let mut destroyed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(window) = self.windows.remove(&current) else {
                continue;
            };
            stack.extend(window.children.iter().copied());
            if let Some(parent) = window.transient_parent.and_then(|p| self.windows.get_mut(&p)) {
                parent.transient_children.retain(|&c| c != current);
            }
            for transient in &window.transient_children {
                if let Some(child) = self.windows.get_mut(transient) {
                    child.transient_parent = None;
                }
            }
            destroyed.push(current);
        }
        Ok(destroyed)
    }

    /// Deepest drawn window under `point`, given in `id`'s coordinates.
    pub fn hit_test(&self, id: WindowId, point: Point) -> Option<WindowId> {
        let window = self.windows.get(&id)?;
        if !window.visible {
            return None;
        }
        for &child_id in window.children.iter().rev() {
            let Some(child) = self.windows.get(&child_id) else {
                continue;
            };
            if child.visible && child.bounds.contains(point) {
                let local = point.offset(-child.bounds.x, -child.bounds.y);
                if let Some(hit) = self.hit_test(child_id, local) {
                    return Some(hit);
                }
            }
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_root() -> (WindowTree, WindowId) {
        let mut tree = WindowTree::new();
        let root = tree.create_root();
        (tree, root)
    }

    fn shown_child(tree: &mut WindowTree, parent: WindowId) -> WindowId {
        let w = tree.create_window(1);
        tree.add_child(parent, w).unwrap();
        tree.set_visible(w, true).unwrap();
        w
    }

    #[test]
    fn test_add_child_rejects_cycles_and_duplicates() {
        let (mut tree, root) = tree_with_root();
        let a = shown_child(&mut tree, root);
        let b = shown_child(&mut tree, a);

        assert_eq!(tree.add_child(a, b), Ok(false));
        assert_eq!(tree.add_child(b, a), Ok(false));
        assert_eq!(tree.add_child(a, a), Ok(false));
        assert_eq!(tree.add_child(a, root), Ok(false));
        assert_eq!(tree.add_child(a, 999), Err(WindowError::UnknownWindow(999)));
    }

    #[test]
    fn test_reparent_moves_child() {
        let (mut tree, root) = tree_with_root();
        let a = shown_child(&mut tree, root);
        let b = shown_child(&mut tree, root);
        let c = shown_child(&mut tree, a);

        assert_eq!(tree.add_child(b, c), Ok(true));
        assert!(tree.children(a).is_empty());
        assert_eq!(tree.children(b), vec![c]);
        assert!(tree.contains(root, c));
    }

    #[test]
    fn test_is_drawn_requires_visible_chain_to_root() {
        let (mut tree, root) = tree_with_root();
        let a = shown_child(&mut tree, root);
        let b = shown_child(&mut tree, a);
        assert!(tree.is_drawn(b));

        tree.set_visible(a, false).unwrap();
        assert!(!tree.is_drawn(b));

        let orphan = tree.create_window(1);
        tree.set_visible(orphan, true).unwrap();
        assert!(!tree.is_drawn(orphan));
        assert_eq!(tree.root_of(orphan), None);
        assert_eq!(tree.root_of(b), Some(root));
    }

    #[test]
    fn test_add_transient_rejects_containing_child() {
        let (mut tree, root) = tree_with_root();
        let a = shown_child(&mut tree, root);
        let b = shown_child(&mut tree, a);
        assert_eq!(tree.add_transient(b, a), Ok(false));
        assert_eq!(tree.add_transient(a, b), Ok(true));
        assert_eq!(tree.get(b).unwrap().transient_parent(), Some(a));
    }

    #[test]
    fn test_window_modal_blocks_parent_subtree_only() {
        let (mut tree, root) = tree_with_root();
        let parent = shown_child(&mut tree, root);
        let inside = shown_child(&mut tree, parent);
        let outside = shown_child(&mut tree, root);
        let modal = shown_child(&mut tree, root);
        tree.add_transient(parent, modal).unwrap();
        tree.set_modal(modal, ModalType::Window).unwrap();

        assert_eq!(tree.blocking_modal(inside), Some(modal));
        assert_eq!(tree.blocking_modal(parent), Some(modal));
        assert_eq!(tree.blocking_modal(outside), None);
        assert_eq!(tree.blocking_modal(modal), None);

        tree.set_visible(modal, false).unwrap();
        assert_eq!(tree.blocking_modal(inside), None);
    }

    #[test]
    fn test_system_modal_blocks_everything_else() {
        let (mut tree, root) = tree_with_root();
        let a = shown_child(&mut tree, root);
        let modal = shown_child(&mut tree, root);
        let modal_child = shown_child(&mut tree, modal);
        tree.set_modal(modal, ModalType::System).unwrap();

        assert_eq!(tree.blocking_modal(a), Some(modal));
        assert_eq!(tree.blocking_modal(modal_child), None);
    }

    #[test]
    fn test_destroy_is_recursive_and_clears_links() {
        let (mut tree, root) = tree_with_root();
        let a = shown_child(&mut tree, root);
        let b = shown_child(&mut tree, a);
        let t = shown_child(&mut tree, root);
        tree.add_transient(b, t).unwrap();

        let mut destroyed = tree.destroy(a).unwrap();
        destroyed.sort();
        assert_eq!(destroyed, vec![a, b]);
        assert!(tree.children(root).iter().all(|&c| c != a));
        assert_eq!(tree.get(t).unwrap().transient_parent(), None);
    }

    #[test]
    fn test_hit_test_prefers_topmost_deepest() {
        let (mut tree, root) = tree_with_root();
        tree.set_bounds(root, Rect::new(0, 0, 500, 500)).unwrap();
        let bottom = shown_child(&mut tree, root);
        tree.set_bounds(bottom, Rect::new(0, 0, 200, 200)).unwrap();
        let top = shown_child(&mut tree, root);
        tree.set_bounds(top, Rect::new(100, 100, 200, 200)).unwrap();
        let nested = shown_child(&mut tree, top);
        tree.set_bounds(nested, Rect::new(0, 0, 50, 50)).unwrap();

        assert_eq!(tree.hit_test(root, Point::new(120, 120)), Some(nested));
        assert_eq!(tree.hit_test(root, Point::new(250, 250)), Some(top));
        assert_eq!(tree.hit_test(root, Point::new(10, 10)), Some(bottom));
        assert_eq!(tree.hit_test(root, Point::new(400, 10)), Some(root));
    }

    #[test]
    fn test_set_opacity() {
        let (mut tree, root) = tree_with_root();
        let a = shown_child(&mut tree, root);
        assert_eq!(tree.set_opacity(a, 0.5), Ok(()));
        assert_eq!(tree.set_opacity(a, 0.5), Ok(()));
        assert_eq!(tree.get(a).unwrap().opacity(), 0.5);
        assert_eq!(tree.set_opacity(12345, 0.5), Err(WindowError::UnknownWindow(12345)));
    }
}
