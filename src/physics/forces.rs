use crate::geom::{Vec2, golden_dir};

use super::grid::SpatialGrid;
use super::{SimConfig, SimEdge, SimNode};

// Intersections this close to an endpoint are shared-vertex fan-out, not
// crossings worth fighting.
const CROSSING_SPAN_MIN: f32 = 0.05;
const CROSSING_SPAN_MAX: f32 = 0.95;

pub(super) fn point_segment_closest(point: Vec2, start: Vec2, end: Vec2) -> Vec2 {
    let span = end - start;
    let length_sq = span.length_sq();
    if length_sq <= 1e-8 {
        return start;
    }

    let t = ((point - start).dot(span) / length_sq).clamp(0.0, 1.0);
    start + (span * t)
}

/// Parametric segment intersection restricted to the open interior of both
/// segments. Returns the crossing point, or None for parallel, disjoint,
/// or near-endpoint contact.
pub(super) fn segment_crossing(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> Option<Vec2> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denominator = r.cross(s);
    if denominator.abs() <= 1e-6 {
        return None;
    }

    let offset = b1 - a1;
    let t = offset.cross(s) / denominator;
    let u = offset.cross(r) / denominator;
    let interior = t > CROSSING_SPAN_MIN
        && t < CROSSING_SPAN_MAX
        && u > CROSSING_SPAN_MIN
        && u < CROSSING_SPAN_MAX;

    interior.then(|| a1 + (r * t))
}

/// Push nodes out of the clearance band around edges they are not part of.
/// Quadratic ramp: gentle at the rim of the band, strong on the segment.
pub(super) fn accumulate_edge_clearance(
    edges: &[SimEdge],
    positions: &[Vec2],
    radii: &[f32],
    config: &SimConfig,
    forces: &mut [Vec2],
) {
    for edge in edges {
        let (from, to) = (edge.source, edge.target);
        if from >= positions.len() || to >= positions.len() || from == to {
            continue;
        }

        for (index, &point) in positions.iter().enumerate() {
            if index == from || index == to {
                continue;
            }

            let band = config.edge_clearance + radii[index];
            let closest = point_segment_closest(point, positions[from], positions[to]);
            let delta = point - closest;
            let distance_sq = delta.length_sq();
            if distance_sq >= band * band {
                continue;
            }

            let distance = distance_sq.sqrt();
            let direction = if distance > 1e-3 {
                delta / distance
            } else {
                // sitting on the segment: push perpendicular to it
                let along = (positions[to] - positions[from]).normalized();
                if along == Vec2::ZERO { golden_dir(index) } else { along.perp() }
            };

            let shortfall = (band - distance) / band;
            let push = direction * (shortfall * shortfall * config.edge_avoid_strength * band);
            forces[index] += push;
            forces[from] -= push * 0.5;
            forces[to] -= push * 0.5;
        }
    }
}

/// For every crossing pair of edges with disjoint endpoints, shove all four
/// endpoints radially off the intersection point. Magnitude fades with
/// distance from the crossing; alpha scaling happens at integration.
pub(super) fn accumulate_uncrossing(
    edges: &[SimEdge],
    positions: &[Vec2],
    config: &SimConfig,
    forces: &mut [Vec2],
) {
    for first in 0..edges.len() {
        let a = &edges[first];
        if a.source >= positions.len() || a.target >= positions.len() {
            continue;
        }

        for second in (first + 1)..edges.len() {
            let b = &edges[second];
            if b.source >= positions.len() || b.target >= positions.len() {
                continue;
            }
            if a.source == b.source || a.source == b.target || a.target == b.source || a.target == b.target {
                continue;
            }

            let Some(crossing) = segment_crossing(
                positions[a.source],
                positions[a.target],
                positions[b.source],
                positions[b.target],
            ) else {
                continue;
            };

            for index in [a.source, a.target, b.source, b.target] {
                let delta = positions[index] - crossing;
                let distance = delta.length();
                let direction = if distance > 1e-3 { delta / distance } else { golden_dir(index) };
                forces[index] += direction * (config.uncross_strength / (1.0 + (distance * 0.05)));
            }
        }
    }
}

/// Hard minimum-separation pass, run in position space after integration so
/// overlap never survives a tick regardless of how low alpha has decayed.
/// Pinned nodes do not yield; their partner absorbs the full correction.
pub(super) fn resolve_collisions(nodes: &mut [SimNode], positions: &mut Vec<Vec2>, config: &SimConfig) {
    if nodes.len() < 2 {
        return;
    }

    positions.clear();
    let mut max_radius = 0.0_f32;
    for node in nodes.iter() {
        positions.push(node.pos);
        max_radius = max_radius.max(node.radius);
    }

    let reach = (max_radius * 2.0) + config.collision_margin;
    let grid = SpatialGrid::build(positions, reach);

    let mut pairs = Vec::new();
    for (index, &point) in positions.iter().enumerate() {
        grid.for_each_within(point, reach, |other| {
            if other > index {
                pairs.push((index, other));
            }
        });
    }

    for (first, second) in pairs {
        let min_distance = nodes[first].radius + nodes[second].radius + config.collision_margin;
        let delta = positions[first] - positions[second];
        let distance_sq = delta.length_sq();
        if distance_sq >= min_distance * min_distance {
            continue;
        }

        let distance = distance_sq.sqrt();
        let direction = if distance > 1e-4 {
            delta / distance
        } else {
            golden_dir(first.wrapping_mul(31).wrapping_add(second))
        };
        let overlap = min_distance - distance;

        match (nodes[first].pin.is_some(), nodes[second].pin.is_some()) {
            (true, true) => {}
            (true, false) => shift(nodes, positions, second, direction * -overlap),
            (false, true) => shift(nodes, positions, first, direction * overlap),
            (false, false) => {
                shift(nodes, positions, first, direction * (overlap * 0.5));
                shift(nodes, positions, second, direction * (overlap * -0.5));
            }
        }
    }
}

fn shift(nodes: &mut [SimNode], positions: &mut [Vec2], index: usize, offset: Vec2) {
    if !offset.is_finite() {
        return;
    }
    nodes[index].pos += offset;
    positions[index] += offset;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::vec2;

    #[test]
    fn closest_point_clamps_to_endpoints() {
        let start = vec2(0.0, 0.0);
        let end = vec2(10.0, 0.0);
        assert_eq!(point_segment_closest(vec2(-5.0, 3.0), start, end), start);
        assert_eq!(point_segment_closest(vec2(15.0, 3.0), start, end), end);
        assert_eq!(point_segment_closest(vec2(4.0, 3.0), start, end), vec2(4.0, 0.0));
    }

    #[test]
    fn crossing_is_detected_in_the_interior() {
        let hit = segment_crossing(vec2(-10.0, 0.0), vec2(10.0, 0.0), vec2(0.0, -10.0), vec2(0.0, 10.0));
        let point = hit.expect("segments cross");
        assert!(point.length() < 1e-4);
    }

    #[test]
    fn near_endpoint_contact_is_ignored() {
        // vertical segment meets the horizontal one at t ~ 0.01
        let hit = segment_crossing(
            vec2(0.0, 0.0),
            vec2(100.0, 0.0),
            vec2(1.0, -10.0),
            vec2(1.0, 10.0),
        );
        assert!(hit.is_none());
    }

    #[test]
    fn parallel_segments_do_not_cross() {
        let hit = segment_crossing(vec2(0.0, 0.0), vec2(10.0, 0.0), vec2(0.0, 5.0), vec2(10.0, 5.0));
        assert!(hit.is_none());
    }
}
