//! The Coordinate Transform Engine.
//!
//! Host-to-root conversion is an ordered pipeline of independent stages.
//! Stages that would be the identity for a display are left out.

use serde::{Deserialize, Serialize};

use crate::display::{DisplayId, DisplayInfo, Rotation};
use crate::geometry::{Point, PointF};

/// One step of the host-to-root pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformStage {
    /// Remove the overscan margin, in host pixels.
    Overscan { left: f32, top: f32 },
    /// Host pixels to DIPs.
    DeviceScale(f32),
    /// Undo the display rotation. `width`/`height` are the unrotated DIP extents.
    Rotation {
        rotation: Rotation,
        width: f32,
        height: f32,
    },
    /// Zoom of the internal display.
    UiScale(f32),
}

impl TransformStage {
    fn forward(&self, p: PointF) -> PointF {
        match *self {
            TransformStage::Overscan { left, top } => PointF::new(p.x - left, p.y - top),
            TransformStage::DeviceScale(scale) => PointF::new(p.x / scale, p.y / scale),
            TransformStage::Rotation {
                rotation,
                width,
                height,
            } => match rotation {
                Rotation::Rotate0 => p,
                Rotation::Rotate90 => PointF::new(p.y, width - p.x),
                Rotation::Rotate180 => PointF::new(width - p.x, height - p.y),
                Rotation::Rotate270 => PointF::new(height - p.y, p.x),
            },
            TransformStage::UiScale(scale) => PointF::new(p.x * scale, p.y * scale),
        }
    }

    fn inverse(&self, p: PointF) -> PointF {
        match *self {
            TransformStage::Overscan { left, top } => PointF::new(p.x + left, p.y + top),
            TransformStage::DeviceScale(scale) => PointF::new(p.x * scale, p.y * scale),
            TransformStage::Rotation {
                rotation,
                width,
                height,
            } => match rotation {
                Rotation::Rotate0 => p,
                Rotation::Rotate90 => PointF::new(width - p.y, p.x),
                Rotation::Rotate180 => PointF::new(width - p.x, height - p.y),
                Rotation::Rotate270 => PointF::new(p.y, height - p.x),
            },
            TransformStage::UiScale(scale) => PointF::new(p.x / scale, p.y / scale),
        }
    }
}

/// Composed host-to-root transform of one display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootTransform {
    stages: Vec<TransformStage>,
    device_scale_factor: f32,
}

impl RootTransform {
    /// Build the pipeline for a display's current metrics.
    pub fn for_display(info: &DisplayInfo) -> Self {
        let dsf = info.device_scale_factor;
        let mut stages = Vec::new();

        let overscan = info.overscan_in_pixel();
        if !overscan.is_empty() {
            stages.push(TransformStage::Overscan {
                left: overscan.left as f32,
                top: overscan.top as f32,
            });
        }
        if dsf != 1.0 {
            stages.push(TransformStage::DeviceScale(dsf));
        }
        if info.rotation != Rotation::Rotate0 {
            // Extents of the last addressable pixel, so corners map onto corners.
            let size = info.unrotated_size_in_pixel();
            stages.push(TransformStage::Rotation {
                rotation: info.rotation,
                width: (size.width - 1) as f32 / dsf,
                height: (size.height - 1) as f32 / dsf,
            });
        }
        let ui_scale = info.effective_ui_scale();
        if ui_scale != 1.0 {
            stages.push(TransformStage::UiScale(ui_scale));
        }

        Self {
            stages,
            device_scale_factor: dsf,
        }
    }

    pub fn stages(&self) -> &[TransformStage] {
        &self.stages
    }

    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn host_to_root_f(&self, p: PointF) -> PointF {
        self.stages.iter().fold(p, |p, stage| stage.forward(p))
    }

    pub fn root_to_host_f(&self, p: PointF) -> PointF {
        self.stages.iter().rev().fold(p, |p, stage| stage.inverse(p))
    }

    /// Map a host pixel to root DIPs, flooring the result.
    pub fn host_to_root(&self, p: Point) -> Point {
        self.host_to_root_f(p.into()).floor()
    }

    /// Map a root DIP back to host pixels, flooring the result.
    pub fn root_to_host(&self, p: Point) -> Point {
        self.root_to_host_f(p.into()).floor()
    }

    pub fn device_scale_factor(&self) -> f32 {
        self.device_scale_factor
    }

    pub fn scale_touch(&self, radius_x: f32, radius_y: f32) -> TouchRadius {
        TouchRadius {
            x: radius_x / self.device_scale_factor,
            y: radius_y / self.device_scale_factor,
            ordinal_x: radius_x,
            ordinal_y: radius_y,
        }
    }

    pub fn scale_scroll(&self, x: f32, y: f32) -> ScrollOffsets {
        ScrollOffsets {
            x: x / self.device_scale_factor,
            y: y / self.device_scale_factor,
            ordinal_x: x,
            ordinal_y: y,
        }
    }
}

/// Touch contact radius; `ordinal_*` are the raw hardware values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchRadius {
    pub x: f32,
    pub y: f32,
    pub ordinal_x: f32,
    pub ordinal_y: f32,
}

/// Scroll deltas; `ordinal_*` are the raw hardware values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffsets {
    pub x: f32,
    pub y: f32,
    pub ordinal_x: f32,
    pub ordinal_y: f32,
}

/// Kind of a raw input event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEventKind {
    MouseMove,
    MousePress,
    MouseRelease,
    Touch { radius_x: f32, radius_y: f32 },
    Scroll { x_offset: f32, y_offset: f32 },
}

/// An input event in host pixels, as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    pub kind: HostEventKind,
    pub location: Point,
}

impl HostEvent {
    pub fn new(kind: HostEventKind, location: Point) -> Self {
        Self { kind, location }
    }

    pub fn mouse_move(x: i32, y: i32) -> Self {
        Self::new(HostEventKind::MouseMove, Point::new(x, y))
    }
}

/// An input event translated into root and screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocatedEvent {
    pub kind: HostEventKind,
    pub display_id: DisplayId,
    pub root_location: Point,
    pub screen_location: Point,
    pub touch: Option<TouchRadius>,
    pub scroll: Option<ScrollOffsets>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::parse_display_specs;
    use crate::geometry::{Insets, Rect};

    fn transform(spec: &str) -> RootTransform {
        let info = parse_display_specs(spec).unwrap().remove(0);
        RootTransform::for_display(&info)
    }

    fn check(t: &RootTransform, cases: &[((i32, i32), (i32, i32))]) {
        for &((hx, hy), (rx, ry)) in cases {
            assert_eq!(
                t.host_to_root(Point::new(hx, hy)),
                Point::new(rx, ry),
                "host ({}, {})",
                hx,
                hy
            );
        }
    }

    #[test]
    fn test_identity_has_no_stages() {
        let t = transform("800x600");
        assert!(t.is_identity());
        assert_eq!(t.host_to_root(Point::new(12, 34)), Point::new(12, 34));
    }

    #[test]
    fn test_stage_order() {
        let t = transform("600x400*2/oli@1.5");
        let kinds: Vec<&str> = t
            .stages()
            .iter()
            .map(|s| match s {
                TransformStage::Overscan { .. } => "overscan",
                TransformStage::DeviceScale(_) => "scale",
                TransformStage::Rotation { .. } => "rotation",
                TransformStage::UiScale(_) => "ui",
            })
            .collect();
        assert_eq!(kinds, vec!["overscan", "scale", "rotation", "ui"]);
    }

    #[test]
    fn test_rotate_90_with_ui_scale() {
        check(
            &transform("600x400*2/ri@1.5"),
            &[((0, 0), (0, 449)), ((599, 0), (0, 0)), ((599, 399), (299, 0)), ((0, 399), (299, 449))],
        );
    }

    #[test]
    fn test_rotate_180_with_ui_scale() {
        check(
            &transform("600x400*2/ui@1.5"),
            &[((0, 0), (449, 299)), ((599, 0), (0, 299)), ((599, 399), (0, 0)), ((0, 399), (449, 0))],
        );
    }

    #[test]
    fn test_rotate_270_with_ui_scale() {
        check(
            &transform("600x400*2/li@1.5"),
            &[((0, 0), (299, 0)), ((599, 0), (299, 449)), ((599, 399), (0, 449)), ((0, 399), (0, 0))],
        );
    }

    #[test]
    fn test_ui_scale_only() {
        check(&transform("600x400*2/i@1.5"), &[((599, 200), (449, 150))]);
    }

    #[test]
    fn test_overscan() {
        let info = crate::display::DisplayInfo::new(1, Rect::new(0, 0, 120, 200))
            .with_overscan(Insets::new(10, 15, 20, 25));
        let t = RootTransform::for_display(&info);
        assert_eq!(t.host_to_root(Point::new(20, 25)), Point::new(5, 15));
        assert_eq!(transform("600x400/o").root_to_host(Point::new(0, 0)), Point::new(15, 10));
    }

    #[test]
    fn test_inverse_roundtrip() {
        for spec in ["600x400*2/ri@1.5", "300x400*2/l", "120x200/u", "600x400/o"] {
            let t = transform(spec);
            for p in [Point::new(0, 0), Point::new(40, 50), Point::new(100, 120)] {
                let back = t.host_to_root_f(t.root_to_host_f(p.into()));
                assert!((back.x - p.x as f32).abs() < 1e-3, "{} {:?}", spec, p);
                assert!((back.y - p.y as f32).abs() < 1e-3, "{} {:?}", spec, p);
            }
        }
    }

    #[test]
    fn test_touch_and_scroll_scaling() {
        let t = transform("200x200*2");
        let touch = t.scale_touch(1.0, 1.0);
        assert_eq!(touch.x, 0.5);
        assert_eq!(touch.ordinal_x, 1.0);

        let scroll = t.scale_scroll(10.0, -4.0);
        assert_eq!((scroll.x, scroll.y), (5.0, -2.0));
        assert_eq!((scroll.ordinal_x, scroll.ordinal_y), (10.0, -4.0));
    }
}
