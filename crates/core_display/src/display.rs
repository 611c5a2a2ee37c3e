//! Display descriptions.
//!
//! [`DisplayInfo`] is what the hardware reports: a native rectangle in host
//! pixels plus scale, rotation and overscan. [`Display`] is what the engine
//! publishes after layout: DIP bounds relative to the primary display.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::DisplayError;
use crate::geometry::{Insets, Rect, Size};

/// Stable identifier for a connected display.
pub type DisplayId = i64;

/// First id handed out by [`parse_display_specs`].
pub const SYNTHETIC_DISPLAY_ID_BASE: DisplayId = 2_200_000_000;

/// Fraction of each native dimension trimmed per side by the `o` spec option.
const DEFAULT_OVERSCAN_RATIO: f32 = 0.025;

/// Largest width or height accepted for one display, in pixels.
pub const MAX_DISPLAY_EXTENT: i32 = 65_536;

/// Clockwise rotation of a display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Rotate0),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// Whether width and height swap under this rotation.
    pub fn is_transposed(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// Who asked for the current rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationSource {
    #[default]
    User,
    Policy,
}

/// Hardware description of one connected output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: DisplayId,
    /// Rectangle in the shared native (host pixel) space.
    pub native_bounds: Rect,
    pub device_scale_factor: f32,
    pub rotation: Rotation,
    pub rotation_source: RotationSource,
    /// Zoom factor. Ignored unless `is_internal`.
    pub ui_scale: f32,
    /// Overscan in DIPs.
    pub overscan: Insets,
    pub is_internal: bool,
}

impl DisplayInfo {
    /// A 1x, unrotated external display.
    pub fn new(id: DisplayId, native_bounds: Rect) -> Self {
        Self {
            id,
            native_bounds,
            device_scale_factor: 1.0,
            rotation: Rotation::Rotate0,
            rotation_source: RotationSource::User,
            ui_scale: 1.0,
            overscan: Insets::default(),
            is_internal: false,
        }
    }

    pub fn with_scale(mut self, device_scale_factor: f32) -> Self {
        self.device_scale_factor = device_scale_factor;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_overscan(mut self, overscan: Insets) -> Self {
        self.overscan = overscan;
        self
    }

    pub fn with_ui_scale(mut self, ui_scale: f32) -> Self {
        self.ui_scale = ui_scale;
        self
    }

    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }

    /// The ui scale that actually applies to this display.
    pub fn effective_ui_scale(&self) -> f32 {
        if self.is_internal {
            self.ui_scale
        } else {
            1.0
        }
    }

    /// Overscan converted to host pixels.
    pub fn overscan_in_pixel(&self) -> Insets {
        self.overscan.scale(self.device_scale_factor)
    }

    /// Native size minus overscan, before rotation.
    pub fn unrotated_size_in_pixel(&self) -> Size {
        let overscan = self.overscan_in_pixel();
        Size::new(
            (self.native_bounds.width - overscan.width()).max(0),
            (self.native_bounds.height - overscan.height()).max(0),
        )
    }

    /// Usable pixel size after overscan and rotation.
    pub fn size_in_pixel(&self) -> Size {
        let size = self.unrotated_size_in_pixel();
        if self.rotation.is_transposed() {
            size.transpose()
        } else {
            size
        }
    }

    /// Logical size used for layout.
    pub fn size_in_dip(&self) -> Size {
        let px = self.size_in_pixel();
        let factor = self.effective_ui_scale() / self.device_scale_factor;
        Size::new(
            (px.width as f32 * factor).floor() as i32,
            (px.height as f32 * factor).floor() as i32,
        )
    }
}

bitflags! {
    /// Which aspects of a display changed in one configuration pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DisplayMetrics: u32 {
        const BOUNDS              = 1 << 0;
        const WORK_AREA           = 1 << 1;
        const DEVICE_SCALE_FACTOR = 1 << 2;
        const ROTATION            = 1 << 3;
        const PRIMARY             = 1 << 4;
    }
}

/// A display as published to observers after layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Display {
    pub id: DisplayId,
    /// Absolute DIP bounds; the primary display sits at the origin.
    pub bounds: Rect,
    pub work_area: Rect,
    pub rotation: Rotation,
    pub rotation_source: RotationSource,
    pub device_scale_factor: f32,
    pub ui_scale: f32,
    pub overscan: Insets,
    pub is_internal: bool,
    pub is_primary: bool,
}

impl Display {
    /// Metrics that differ between two snapshots of the same display.
    pub fn changed_metrics(&self, newer: &Display) -> DisplayMetrics {
        let mut changed = DisplayMetrics::empty();
        if self.bounds != newer.bounds {
            changed |= DisplayMetrics::BOUNDS;
        }
        if self.work_area != newer.work_area {
            changed |= DisplayMetrics::WORK_AREA;
        }
        if self.device_scale_factor != newer.device_scale_factor {
            changed |= DisplayMetrics::DEVICE_SCALE_FACTOR;
        }
        if self.rotation != newer.rotation {
            changed |= DisplayMetrics::ROTATION;
        }
        if self.is_primary != newer.is_primary {
            changed |= DisplayMetrics::PRIMARY;
        }
        changed
    }
}

/// Parse a comma-separated list of display specs.
///
/// Each entry is `[id:]WxH[*dsf][/opts][@ui_scale]`. Option letters:
/// `o` overscan, `r`/`u`/`l` rotation by 90/180/270, `i` internal.
/// Native origins are stacked vertically in list order.
///
/// ```
/// use multiroot_core::display::{parse_display_specs, Rotation};
///
/// let displays = parse_display_specs("1920x1080,1280x1024*2/r").unwrap();
/// assert_eq!(displays.len(), 2);
/// assert_eq!(displays[1].native_bounds.y, 1080);
/// assert_eq!(displays[1].rotation, Rotation::Rotate90);
/// ```
pub fn parse_display_specs(specs: &str) -> Result<Vec<DisplayInfo>, DisplayError> {
    let mut displays = Vec::new();
    let mut next_y = 0;

    for (index, entry) in specs.split(',').map(str::trim).enumerate() {
        if entry.is_empty() {
            continue;
        }
        let default_id = SYNTHETIC_DISPLAY_ID_BASE + index as DisplayId;
        let info = parse_one(entry, default_id, next_y)?;
        next_y = next_y
            .checked_add(info.native_bounds.height)
            .ok_or_else(|| DisplayError::invalid_spec(entry, "displays are too tall to stack"))?;
        displays.push(info);
    }

    if displays.is_empty() {
        return Err(DisplayError::NoDisplays);
    }
    Ok(displays)
}

fn parse_one(entry: &str, default_id: DisplayId, y: i32) -> Result<DisplayInfo, DisplayError> {
    let (id, rest) = match entry.split_once(':') {
        Some((id, rest)) => {
            let id = id
                .trim()
                .parse::<DisplayId>()
                .map_err(|_| DisplayError::invalid_spec(entry, "display id is not an integer"))?;
            (id, rest)
        }
        None => (default_id, entry),
    };

    let (rest, ui_scale) = match rest.split_once('@') {
        Some((rest, ui)) => (rest, parse_scale(entry, ui)?),
        None => (rest, 1.0),
    };
    let (rest, options) = rest.split_once('/').unwrap_or((rest, ""));
    let (size, dsf) = match rest.split_once('*') {
        Some((size, dsf)) => (size, parse_scale(entry, dsf)?),
        None => (rest, 1.0),
    };

    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| DisplayError::invalid_spec(entry, "expected WIDTHxHEIGHT"))?;
    let width: i32 = w
        .parse()
        .map_err(|_| DisplayError::invalid_spec(entry, "width is not an integer"))?;
    let height: i32 = h
        .parse()
        .map_err(|_| DisplayError::invalid_spec(entry, "height is not an integer"))?;
    if width <= 0 || height <= 0 {
        return Err(DisplayError::invalid_spec(entry, "size must be positive"));
    }
    if width > MAX_DISPLAY_EXTENT || height > MAX_DISPLAY_EXTENT {
        return Err(DisplayError::invalid_spec(
            entry,
            format!("size exceeds {} pixels", MAX_DISPLAY_EXTENT),
        ));
    }

    let mut info = DisplayInfo::new(id, Rect::new(0, y, width, height))
        .with_scale(dsf)
        .with_ui_scale(ui_scale);

    for option in options.chars() {
        match option {
            'o' => {
                let h_inset = (width as f32 * DEFAULT_OVERSCAN_RATIO / dsf).round() as i32;
                let v_inset = (height as f32 * DEFAULT_OVERSCAN_RATIO / dsf).round() as i32;
                info.overscan = Insets::new(v_inset, h_inset, v_inset, h_inset);
            }
            'r' => info.rotation = Rotation::Rotate90,
            'u' => info.rotation = Rotation::Rotate180,
            'l' => info.rotation = Rotation::Rotate270,
            'i' => info.is_internal = true,
            other => {
                return Err(DisplayError::invalid_spec(
                    entry,
                    format!("unknown option '{}'", other),
                ))
            }
        }
    }

    Ok(info)
}

fn parse_scale(entry: &str, value: &str) -> Result<f32, DisplayError> {
    let scale: f32 = value
        .parse()
        .map_err(|_| DisplayError::invalid_spec(entry, "scale is not a number"))?;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(DisplayError::InvalidScale(scale));
    }
    Ok(scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pair() {
        let displays = parse_display_specs("500x500,400x400").unwrap();
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].id, SYNTHETIC_DISPLAY_ID_BASE);
        assert_eq!(displays[1].id, SYNTHETIC_DISPLAY_ID_BASE + 1);
        assert_eq!(displays[0].native_bounds, Rect::new(0, 0, 500, 500));
        assert_eq!(displays[1].native_bounds, Rect::new(0, 500, 400, 400));
    }

    #[test]
    fn test_parse_full_entry() {
        let displays = parse_display_specs("600x400*2/ri@1.5").unwrap();
        let d = &displays[0];
        assert_eq!(d.device_scale_factor, 2.0);
        assert_eq!(d.rotation, Rotation::Rotate90);
        assert!(d.is_internal);
        assert_eq!(d.ui_scale, 1.5);
        assert_eq!(d.size_in_dip(), Size::new(300, 450));
    }

    #[test]
    fn test_parse_explicit_id() {
        let displays = parse_display_specs("10:400x400, 11:300x300").unwrap();
        assert_eq!(displays[0].id, 10);
        assert_eq!(displays[1].id, 11);
    }

    #[test]
    fn test_parse_default_overscan() {
        let displays = parse_display_specs("600x400/o").unwrap();
        assert_eq!(displays[0].overscan, Insets::new(10, 15, 10, 15));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_display_specs("600by400"),
            Err(DisplayError::InvalidSpec { .. })
        ));
        assert!(matches!(
            parse_display_specs("600x400/z"),
            Err(DisplayError::InvalidSpec { .. })
        ));
        assert_eq!(
            parse_display_specs("600x400*0"),
            Err(DisplayError::InvalidScale(0.0))
        );
        assert_eq!(parse_display_specs(" , "), Err(DisplayError::NoDisplays));
    }

    #[test]
    fn test_parse_rejects_oversized_displays() {
        assert!(matches!(
            parse_display_specs("1x2000000000,1x2000000000"),
            Err(DisplayError::InvalidSpec { .. })
        ));
        assert!(matches!(
            parse_display_specs("70000x100"),
            Err(DisplayError::InvalidSpec { .. })
        ));
        let tall = vec![format!("1x{}", MAX_DISPLAY_EXTENT); 100].join(",");
        let stacked = parse_display_specs(&tall).unwrap();
        assert_eq!(stacked[99].native_bounds.y, 99 * MAX_DISPLAY_EXTENT);
    }

    #[test]
    fn test_size_in_dip_with_overscan() {
        let info = DisplayInfo::new(1, Rect::new(0, 0, 120, 200))
            .with_overscan(Insets::new(10, 15, 20, 25));
        assert_eq!(info.size_in_dip(), Size::new(80, 170));
    }

    #[test]
    fn test_ui_scale_ignored_for_external() {
        let info = DisplayInfo::new(1, Rect::new(0, 0, 600, 400))
            .with_scale(2.0)
            .with_ui_scale(1.5);
        assert_eq!(info.size_in_dip(), Size::new(300, 200));
        assert_eq!(info.internal().size_in_dip(), Size::new(450, 300));
    }

    #[test]
    fn test_rotation_degrees_roundtrip() {
        for degrees in [0, 90, 180, 270] {
            let rotation = Rotation::from_degrees(degrees).unwrap();
            assert_eq!(rotation.degrees(), degrees);
        }
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn test_changed_metrics() {
        let before = Display {
            id: 1,
            bounds: Rect::new(0, 0, 100, 100),
            work_area: Rect::new(0, 0, 100, 100),
            rotation: Rotation::Rotate0,
            rotation_source: RotationSource::User,
            device_scale_factor: 1.0,
            ui_scale: 1.0,
            overscan: Insets::default(),
            is_internal: false,
            is_primary: true,
        };
        let mut after = before.clone();
        assert!(before.changed_metrics(&after).is_empty());

        after.rotation = Rotation::Rotate90;
        after.bounds = Rect::new(0, 0, 100, 120);
        let changed = before.changed_metrics(&after);
        assert_eq!(changed, DisplayMetrics::ROTATION | DisplayMetrics::BOUNDS);
    }
}
