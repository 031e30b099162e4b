use crate::geom::{Vec2, vec2};
use crate::physics::SimNode;

pub const FIT_PADDING: f32 = 48.0;
pub const MIN_FIT_SCALE: f32 = 0.1;
pub const MAX_FIT_SCALE: f32 = 4.0;

/// Uniform world-to-screen mapping: `screen = world * scale + translate`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub translate: Vec2,
}

impl ViewTransform {
    pub fn apply(self, world: Vec2) -> Vec2 {
        (world * self.scale) + self.translate
    }
}

/// Transform that centers a padded bounding box of all node circles inside
/// `width` x `height`. Scale is clamped to a sane range, and the clamp wins
/// over containment for degenerate extents. Not meant to run every tick.
pub fn fit_to_view(nodes: &[SimNode], width: f32, height: f32) -> ViewTransform {
    let viewport_center = vec2(width * 0.5, height * 0.5);

    let mut min = vec2(f32::INFINITY, f32::INFINITY);
    let mut max = vec2(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for node in nodes {
        if !node.pos.is_finite() {
            continue;
        }
        min.x = min.x.min(node.pos.x - node.radius);
        min.y = min.y.min(node.pos.y - node.radius);
        max.x = max.x.max(node.pos.x + node.radius);
        max.y = max.y.max(node.pos.y + node.radius);
    }

    if !min.is_finite() || !max.is_finite() {
        return ViewTransform {
            scale: 1.0,
            translate: viewport_center,
        };
    }

    let span_x = (max.x - min.x).max(1.0);
    let span_y = (max.y - min.y).max(1.0);
    let usable_x = (width - (FIT_PADDING * 2.0)).max(1.0);
    let usable_y = (height - (FIT_PADDING * 2.0)).max(1.0);

    let scale = (usable_x / span_x)
        .min(usable_y / span_y)
        .clamp(MIN_FIT_SCALE, MAX_FIT_SCALE);
    let world_center = (min + max) * 0.5;

    ViewTransform {
        scale,
        translate: viewport_center - (world_center * scale),
    }
}
