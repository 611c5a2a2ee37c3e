//! The Display Registry: canonical hardware description of every connected display.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::display::{DisplayId, DisplayInfo, Rotation, RotationSource};
use crate::error::DisplayError;
use crate::geometry::Insets;

/// Per-display settings made by callers, restored when the display returns.
#[derive(Debug, Clone, Default)]
struct Preferences {
    rotation: Option<(Rotation, RotationSource)>,
    overscan: Option<Insets>,
    ui_scale: Option<f32>,
    work_area_insets: Option<Insets>,
}

/// Ids that appeared, disappeared or stayed in one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDiff {
    pub added: Vec<DisplayId>,
    pub removed: Vec<DisplayId>,
    pub retained: Vec<DisplayId>,
}

/// Holds the [`DisplayInfo`] of every connected display, ordered by id.
#[derive(Debug, Default)]
pub struct DisplayRegistry {
    infos: BTreeMap<DisplayId, DisplayInfo>,
    preferences: HashMap<DisplayId, Preferences>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the connected set with `infos`.
    ///
    /// Values the hardware reports at their default (unrotated, no overscan,
    /// 1x ui scale) are replaced by remembered preferences for that id.
    pub fn apply(&mut self, infos: Vec<DisplayInfo>) -> Result<RegistryDiff, DisplayError> {
        if infos.is_empty() {
            return Err(DisplayError::NoDisplays);
        }

        let mut seen = HashSet::new();
        for info in &infos {
            if !seen.insert(info.id) {
                return Err(DisplayError::DuplicateDisplay(info.id));
            }
            check_scale(info.device_scale_factor)?;
            check_scale(info.ui_scale)?;
            check_insets(info.overscan)?;
        }

        let internal_id = infos.iter().filter(|i| i.is_internal).map(|i| i.id).min();

        let mut next = BTreeMap::new();
        for mut info in infos {
            if info.is_internal && Some(info.id) != internal_id {
                warn!("Display {} reported as internal, but {:?} already is", info.id, internal_id);
                info.is_internal = false;
            }
            if let Some(prefs) = self.preferences.get(&info.id) {
                apply_preferences(&mut info, prefs);
            }
            if !info.is_internal {
                info.ui_scale = 1.0;
            }
            next.insert(info.id, info);
        }

        let diff = RegistryDiff {
            added: next.keys().filter(|id| !self.infos.contains_key(id)).copied().collect(),
            removed: self.infos.keys().filter(|id| !next.contains_key(id)).copied().collect(),
            retained: next.keys().filter(|id| self.infos.contains_key(id)).copied().collect(),
        };
        debug!(
            "Display registry update: added={:?} removed={:?}",
            diff.added, diff.removed
        );

        self.infos = next;
        Ok(diff)
    }

    pub fn info(&self, id: DisplayId) -> Option<&DisplayInfo> {
        self.infos.get(&id)
    }

    pub fn contains(&self, id: DisplayId) -> bool {
        self.infos.contains_key(&id)
    }

    /// Connected ids in ascending order.
    pub fn ids(&self) -> Vec<DisplayId> {
        self.infos.keys().copied().collect()
    }

    /// Owned copy of every connected display, in id order.
    pub fn snapshot(&self) -> Vec<DisplayInfo> {
        self.infos.values().cloned().collect()
    }

    pub fn internal_id(&self) -> Option<DisplayId> {
        self.infos.values().find(|i| i.is_internal).map(|i| i.id)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Caller-set work-area insets for a display.
    pub fn work_area_insets(&self, id: DisplayId) -> Insets {
        self.preferences
            .get(&id)
            .and_then(|p| p.work_area_insets)
            .unwrap_or_default()
    }

    /// Returns `Ok(false)` when the display already has this rotation.
    pub fn set_rotation(
        &mut self,
        id: DisplayId,
        rotation: Rotation,
        source: RotationSource,
    ) -> Result<bool, DisplayError> {
        let info = self.infos.get_mut(&id).ok_or(DisplayError::UnknownDisplay(id))?;
        if info.rotation == rotation {
            return Ok(false);
        }
        info.rotation = rotation;
        info.rotation_source = source;
        self.preferences.entry(id).or_default().rotation = Some((rotation, source));
        Ok(true)
    }

    pub fn set_overscan(&mut self, id: DisplayId, insets: Insets) -> Result<bool, DisplayError> {
        check_insets(insets)?;
        let info = self.infos.get_mut(&id).ok_or(DisplayError::UnknownDisplay(id))?;
        if info.overscan == insets {
            return Ok(false);
        }
        info.overscan = insets;
        self.preferences.entry(id).or_default().overscan = Some(insets);
        Ok(true)
    }

    /// Only the internal display accepts a ui scale; others return `Ok(false)`.
    pub fn set_ui_scale(&mut self, id: DisplayId, scale: f32) -> Result<bool, DisplayError> {
        check_scale(scale)?;
        let info = self.infos.get_mut(&id).ok_or(DisplayError::UnknownDisplay(id))?;
        if !info.is_internal {
            debug!("Ignoring ui scale for external display {}", id);
            return Ok(false);
        }
        if info.ui_scale == scale {
            return Ok(false);
        }
        info.ui_scale = scale;
        self.preferences.entry(id).or_default().ui_scale = Some(scale);
        Ok(true)
    }

    pub fn set_work_area_insets(&mut self, id: DisplayId, insets: Insets) -> Result<bool, DisplayError> {
        check_insets(insets)?;
        if !self.infos.contains_key(&id) {
            return Err(DisplayError::UnknownDisplay(id));
        }
        let prefs = self.preferences.entry(id).or_default();
        if prefs.work_area_insets.unwrap_or_default() == insets {
            return Ok(false);
        }
        prefs.work_area_insets = Some(insets);
        Ok(true)
    }

    /// Forget every connected display. Preferences are kept.
    pub fn clear(&mut self) {
        self.infos.clear();
    }
}

fn apply_preferences(info: &mut DisplayInfo, prefs: &Preferences) {
    if info.rotation == Rotation::Rotate0 {
        if let Some((rotation, source)) = prefs.rotation {
            info.rotation = rotation;
            info.rotation_source = source;
        }
    }
    if info.overscan.is_empty() {
        if let Some(overscan) = prefs.overscan {
            info.overscan = overscan;
        }
    }
    if info.ui_scale == 1.0 {
        if let Some(ui_scale) = prefs.ui_scale {
            info.ui_scale = ui_scale;
        }
    }
}

fn check_scale(scale: f32) -> Result<(), DisplayError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(DisplayError::InvalidScale(scale))
    }
}

fn check_insets(insets: Insets) -> Result<(), DisplayError> {
    if insets.top < 0 || insets.left < 0 || insets.bottom < 0 || insets.right < 0 {
        Err(DisplayError::NegativeInsets(insets))
    } else {
        Ok(())
    }
}
