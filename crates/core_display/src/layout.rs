//! Display layout resolution.
//!
//! A [`DisplayLayout`] is a tree rooted at the primary display: every other
//! display is attached to a parent edge with an offset along that edge.
//! Layouts are remembered per set of connected display ids by [`LayoutStore`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::display::{DisplayId, DisplayInfo};
use crate::geometry::{Point, Rect, Size};

/// Minimum shared edge between two adjacent displays, in DIPs.
pub const MINIMUM_OVERLAP: i32 = 100;

/// Sorted list of display ids identifying one hardware configuration.
pub type DisplayIdList = Vec<DisplayId>;

/// Build the canonical id list for a set of displays.
pub fn display_id_list(ids: impl IntoIterator<Item = DisplayId>) -> DisplayIdList {
    let mut list: Vec<DisplayId> = ids.into_iter().collect();
    list.sort_unstable();
    list.dedup();
    list
}

/// Which edge of the parent a display is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Top,
    #[default]
    Right,
    Bottom,
    Left,
}

impl Position {
    pub fn opposite(self) -> Self {
        match self {
            Position::Top => Position::Bottom,
            Position::Right => Position::Left,
            Position::Bottom => Position::Top,
            Position::Left => Position::Right,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Position::Top => "top",
            Position::Right => "right",
            Position::Bottom => "bottom",
            Position::Left => "left",
        };
        f.write_str(name)
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "top" => Ok(Position::Top),
            "right" => Ok(Position::Right),
            "bottom" => Ok(Position::Bottom),
            "left" => Ok(Position::Left),
            other => Err(format!("unknown position '{}'", other)),
        }
    }
}

/// Attachment of one display to an edge of its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub display_id: DisplayId,
    pub parent_id: DisplayId,
    pub position: Position,
    /// Shift along the parent edge, in DIPs.
    pub offset: i32,
}

impl Placement {
    pub fn new(display_id: DisplayId, parent_id: DisplayId, position: Position, offset: i32) -> Self {
        Self {
            display_id,
            parent_id,
            position,
            offset,
        }
    }

    /// The same edge seen from the other side.
    pub fn inverted(&self) -> Self {
        Self::new(
            self.parent_id,
            self.display_id,
            self.position.opposite(),
            -self.offset,
        )
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={}, parent={}, {}, {}",
            self.display_id, self.parent_id, self.position, self.offset
        )
    }
}

/// Placement applied to displays without an explicit entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPlacement {
    pub position: Position,
    pub offset: i32,
}

impl DefaultPlacement {
    pub fn new(position: Position, offset: i32) -> Self {
        Self { position, offset }
    }
}

/// Relative arrangement of one set of displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayLayout {
    /// Explicit placements, one per non-primary display, sorted by display id.
    pub placements: Vec<Placement>,
    pub default_placement: DefaultPlacement,
    /// Display the placements are rooted at.
    pub primary_id: Option<DisplayId>,
}

impl DisplayLayout {
    pub fn new(default_placement: DefaultPlacement) -> Self {
        Self {
            placements: Vec::new(),
            default_placement,
            primary_id: None,
        }
    }

    /// Explicit placement for a display, if any.
    pub fn placement_for(&self, display_id: DisplayId) -> Option<&Placement> {
        self.placements.iter().find(|p| p.display_id == display_id)
    }

    /// Insert or replace the placement for `placement.display_id`.
    pub fn set_placement(&mut self, placement: Placement) {
        self.placements.retain(|p| p.display_id != placement.display_id);
        self.placements.push(placement);
        self.placements.sort_by_key(|p| p.display_id);
    }

    /// Placements actually used for `ids` with `primary` at the origin.
    ///
    /// Entries whose parent is missing fall back to the default placement,
    /// chained to the previous display in id order.
    pub fn effective_placements(&self, ids: &[DisplayId], primary: DisplayId) -> Vec<Placement> {
        let connected: HashSet<DisplayId> = ids.iter().copied().collect();
        let mut previous = primary;
        let mut effective = Vec::new();

        for &id in ids.iter().filter(|&&id| id != primary) {
            let placement = match self.placement_for(id) {
                Some(p) if p.parent_id != id && connected.contains(&p.parent_id) => *p,
                other => {
                    if let Some(stale) = other {
                        debug!("Ignoring placement with unknown parent: {}", stale);
                    }
                    Placement::new(
                        id,
                        previous,
                        self.default_placement.position,
                        self.default_placement.offset,
                    )
                }
            };
            effective.push(placement);
            previous = id;
        }

        effective
    }
}

/// Clamp `offset` so the child keeps a shared edge with its parent.
///
/// The allowed range is `[-(child - m_c), parent - m_p]` with
/// `m = min(MINIMUM_OVERLAP, extent)`. It always contains zero, so for
/// displays narrower than the minimum the offset collapses toward zero.
pub fn clamp_offset(offset: i32, parent_extent: i32, child_extent: i32) -> i32 {
    let upper = parent_extent - MINIMUM_OVERLAP.min(parent_extent);
    let lower = -(child_extent - MINIMUM_OVERLAP.min(child_extent));
    offset.clamp(lower.min(0), upper.max(0))
}

/// Bounds of a display of `size` attached to `parent`.
pub fn place(parent: Rect, size: Size, position: Position, offset: i32) -> Rect {
    match position {
        Position::Right | Position::Left => {
            let y = parent.y + clamp_offset(offset, parent.height, size.height);
            let x = if position == Position::Right {
                parent.right()
            } else {
                parent.x - size.width
            };
            Rect::new(x, y, size.width, size.height)
        }
        Position::Top | Position::Bottom => {
            let x = parent.x + clamp_offset(offset, parent.width, size.width);
            let y = if position == Position::Bottom {
                parent.bottom()
            } else {
                parent.y - size.height
            };
            Rect::new(x, y, size.width, size.height)
        }
    }
}

/// Compute absolute DIP bounds for every display in `infos`.
pub fn resolve(
    infos: &[DisplayInfo],
    layout: &DisplayLayout,
    primary: DisplayId,
) -> BTreeMap<DisplayId, Rect> {
    let sizes: BTreeMap<DisplayId, Size> = infos.iter().map(|i| (i.id, i.size_in_dip())).collect();
    let ids: Vec<DisplayId> = sizes.keys().copied().collect();
    let mut bounds = BTreeMap::new();

    let Some(&primary_size) = sizes.get(&primary) else {
        return bounds;
    };
    bounds.insert(primary, Rect::from_origin_size(Point::default(), primary_size));

    let rooted = reroot(layout, &ids, primary);
    let mut pending = rooted.effective_placements(&ids, primary);
    let mut last_placed = primary;

    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|p| bounds.contains_key(&p.parent_id));

        let (placement, parent) = match ready {
            Some(index) => {
                let placement = pending.remove(index);
                (placement, placement.parent_id)
            }
            None => {
                // Cycle among explicit placements; break it with the default.
                let stuck = pending.remove(0);
                warn!("Display {} is not reachable from the primary, using default placement", stuck.display_id);
                let fallback = Placement::new(
                    stuck.display_id,
                    last_placed,
                    rooted.default_placement.position,
                    rooted.default_placement.offset,
                );
                (fallback, last_placed)
            }
        };

        let (Some(&parent_bounds), Some(&size)) =
            (bounds.get(&parent), sizes.get(&placement.display_id))
        else {
            continue;
        };
        bounds.insert(
            placement.display_id,
            place(parent_bounds, size, placement.position, placement.offset),
        );
        last_placed = placement.display_id;
    }

    bounds
}

/// Re-express `layout` with `new_primary` as the root.
///
/// Edges on the parent path from the new primary to the old one are
/// inverted; every other placement is kept as-is.
pub fn reroot(layout: &DisplayLayout, ids: &[DisplayId], new_primary: DisplayId) -> DisplayLayout {
    let old_primary = match layout.primary_id {
        Some(old) if old != new_primary && ids.contains(&old) => old,
        _ => {
            let mut rooted = layout.clone();
            rooted.primary_id = Some(new_primary);
            return rooted;
        }
    };

    let mut placements = layout.effective_placements(ids, old_primary);
    let mut path = Vec::new();
    let mut visited = HashSet::new();
    let mut current = new_primary;

    while current != old_primary {
        if !visited.insert(current) {
            break;
        }
        let Some(index) = placements.iter().position(|p| p.display_id == current) else {
            break;
        };
        let edge = placements.remove(index);
        current = edge.parent_id;
        path.push(edge);
    }

    if current != old_primary {
        warn!(
            "No placement path from display {} to {}, resetting layout",
            new_primary, old_primary
        );
        let mut fresh = DisplayLayout::new(layout.default_placement);
        fresh.primary_id = Some(new_primary);
        return fresh;
    }

    placements.extend(path.iter().map(Placement::inverted));
    placements.sort_by_key(|p| p.display_id);

    DisplayLayout {
        placements,
        default_placement: layout.default_placement,
        primary_id: Some(new_primary),
    }
}

/// One remembered layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub display_ids: DisplayIdList,
    pub layout: DisplayLayout,
}

/// Layouts keyed by the set of connected displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutStore {
    default_placement: DefaultPlacement,
    entries: Vec<LayoutEntry>,
}

impl LayoutStore {
    pub fn new(default_placement: DefaultPlacement) -> Self {
        Self {
            default_placement,
            entries: Vec::new(),
        }
    }

    pub fn default_placement(&self) -> DefaultPlacement {
        self.default_placement
    }

    /// Default used for id sets seen for the first time.
    pub fn set_default_placement(&mut self, placement: DefaultPlacement) {
        self.default_placement = placement;
    }

    /// Stored layout for `ids`, or a fresh one built from the default.
    pub fn get_or_default(&self, ids: &[DisplayId]) -> DisplayLayout {
        self.get(ids)
            .cloned()
            .unwrap_or_else(|| DisplayLayout::new(self.default_placement))
    }

    pub fn get(&self, ids: &[DisplayId]) -> Option<&DisplayLayout> {
        self.entries
            .iter()
            .find(|e| e.display_ids == ids)
            .map(|e| &e.layout)
    }

    /// Remember `layout` for this id set, replacing any previous one.
    pub fn register(&mut self, ids: &[DisplayId], layout: DisplayLayout) {
        match self.entries.iter_mut().find(|e| e.display_ids == ids) {
            Some(entry) => entry.layout = layout,
            None => self.entries.push(LayoutEntry {
                display_ids: ids.to_vec(),
                layout,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
