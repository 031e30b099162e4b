mod forces;
mod grid;

use std::collections::HashMap;

use crate::geom::{Vec2, golden_dir};
use crate::graph::{EntityKind, EntityRecord, RelationshipKind};
use forces::{accumulate_edge_clearance, accumulate_uncrossing, resolve_collisions};
use grid::SpatialGrid;

const ROOT_RADIUS: f32 = 18.0;
const MIN_SLEEP_SPEED_SQ: f32 = 0.02 * 0.02;

/// Tunables for the relaxation process. Everything the heuristics depend on
/// lives here rather than inline, including the full-rebuild threshold the
/// update manager consults.
#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub link_distance: f32,
    pub link_strength: f32,
    pub charge_strength: f32,
    pub charge_softening: f32,
    pub charge_max_distance: f32,
    pub collision_margin: f32,
    pub edge_clearance: f32,
    pub edge_avoid_strength: f32,
    pub uncross_strength: f32,
    pub compaction_slack: f32,
    pub compaction_strength: f32,
    pub center_strength: f32,
    pub alpha_decay: f32,
    pub alpha_min: f32,
    pub reheat_alpha: f32,
    pub drag_alpha: f32,
    pub velocity_decay: f32,
    pub max_speed: f32,
    /// Fraction of live nodes that must vanish from a snapshot before the
    /// update manager abandons the patch path for a full rebuild.
    pub rebuild_threshold: f32,
    /// Hard bound on ticks per relaxation cycle, in case a degenerate force
    /// configuration never lets alpha drain naturally.
    pub max_ticks_per_cycle: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            link_distance: 120.0,
            link_strength: 0.4,
            charge_strength: 30_000.0,
            charge_softening: 600.0,
            charge_max_distance: 480.0,
            collision_margin: 6.0,
            edge_clearance: 30.0,
            edge_avoid_strength: 0.9,
            uncross_strength: 40.0,
            compaction_slack: 100.0,
            compaction_strength: 0.02,
            center_strength: 0.003,
            alpha_decay: 0.03,
            alpha_min: 0.001,
            reheat_alpha: 0.3,
            drag_alpha: 0.5,
            velocity_decay: 0.4,
            max_speed: 40.0,
            rebuild_threshold: 0.5,
            max_ticks_per_cycle: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimPhase {
    Cold,
    Seeding,
    Relaxing,
    Settled,
}

/// A live entity in the simulation: the discovery record's display fields
/// plus the layout-owned state the ticker mutates.
#[derive(Clone, Debug)]
pub struct SimNode {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub is_root: bool,
    pub red_flags: Vec<String>,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Fixed position override. A pinned node copies this target and holds
    /// still under force influence; only explicit relocation moves it.
    pub pin: Option<Vec2>,
    pub radius: f32,
}

impl SimNode {
    pub(crate) fn from_record(record: &EntityRecord) -> Self {
        let radius = if record.is_root { ROOT_RADIUS } else { record.kind.base_radius() };
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            kind: record.kind,
            is_root: record.is_root,
            red_flags: record.red_flags.clone(),
            pos: Vec2::ZERO,
            vel: Vec2::ZERO,
            pin: record.is_root.then_some(Vec2::ZERO),
            radius,
        }
    }

    /// Refresh the fields the discovery stream owns, leaving layout state
    /// (position, velocity, pin) untouched.
    pub(crate) fn refresh_from(&mut self, record: &EntityRecord) {
        self.name = record.name.clone();
        self.kind = record.kind;
        self.is_root = record.is_root;
        self.red_flags = record.red_flags.clone();
        self.radius = if record.is_root { ROOT_RADIUS } else { record.kind.base_radius() };
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SimEdge {
    pub source: usize,
    pub target: usize,
    pub kind: RelationshipKind,
    pub percentage: Option<f32>,
    pub circular: bool,
}

#[derive(Default)]
struct StepScratch {
    forces: Vec<Vec2>,
    positions: Vec<Vec2>,
    radii: Vec<f32>,
    collision_positions: Vec<Vec2>,
}

/// The whole mutable simulation: node and edge arrays plus the residual
/// energy scalar. Owned by the engine; force passes borrow it per tick.
pub struct SimulationState {
    pub nodes: Vec<SimNode>,
    pub edges: Vec<SimEdge>,
    pub alpha: f32,
    index_by_id: HashMap<String, usize>,
    ticks_since_heat: u32,
    phase: SimPhase,
    scratch: StepScratch,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationState {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            alpha: 0.0,
            index_by_id: HashMap::new(),
            ticks_since_heat: 0,
            phase: SimPhase::Cold,
            scratch: StepScratch::default(),
        }
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&SimNode> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut SimNode> {
        let index = self.index_of(id)?;
        Some(&mut self.nodes[index])
    }

    /// Full rebuild: discard all live state and restart the relaxation from
    /// the seeded arrays.
    pub(crate) fn reset_with(&mut self, nodes: Vec<SimNode>, edges: Vec<SimEdge>) {
        self.nodes = nodes;
        self.edges = edges;
        self.rebuild_index();
        self.alpha = 1.0;
        self.ticks_since_heat = 0;
        self.phase = if self.nodes.is_empty() { SimPhase::Cold } else { SimPhase::Seeding };
    }

    /// Additive patch: swap in the reconciled arrays while preserving the
    /// current energy level, so untouched nodes stay where they settled.
    pub(crate) fn splice(&mut self, nodes: Vec<SimNode>, edges: Vec<SimEdge>) {
        self.nodes = nodes;
        self.edges = edges;
        self.rebuild_index();
        if self.nodes.is_empty() {
            self.phase = SimPhase::Cold;
        }
    }

    fn rebuild_index(&mut self) {
        self.index_by_id.clear();
        for (index, node) in self.nodes.iter().enumerate() {
            self.index_by_id.insert(node.id.clone(), index);
        }
    }

    /// Cap residual energy. Used when a rebuild restored a layout that was
    /// already settled, so relaxation wakes gently instead of re-exploding.
    pub(crate) fn temper(&mut self, alpha: f32) {
        self.alpha = self.alpha.min(alpha.clamp(0.0, 1.0));
    }

    /// Raise residual energy so the simulation re-relaxes without starting
    /// over. Never lowers alpha.
    pub(crate) fn reheat(&mut self, alpha: f32) {
        self.alpha = self.alpha.max(alpha.clamp(0.0, 1.0));
        self.ticks_since_heat = 0;
        if !self.nodes.is_empty() {
            self.phase = SimPhase::Relaxing;
        }
    }

    /// One tick: accumulate forces, integrate velocities scaled by alpha,
    /// resolve residual overlap, decay alpha. Returns whether the
    /// simulation is still live.
    pub fn step(&mut self, config: &SimConfig) -> bool {
        let node_count = self.nodes.len();
        if node_count == 0 {
            self.phase = SimPhase::Cold;
            return false;
        }
        if self.alpha < config.alpha_min || self.ticks_since_heat >= config.max_ticks_per_cycle {
            self.phase = SimPhase::Settled;
            return false;
        }
        self.phase = SimPhase::Relaxing;

        let scratch = &mut self.scratch;
        scratch.forces.clear();
        scratch.forces.resize(node_count, Vec2::ZERO);
        scratch.positions.clear();
        scratch.radii.clear();
        for node in &self.nodes {
            scratch.positions.push(node.pos);
            scratch.radii.push(node.radius);
        }

        let forces = &mut scratch.forces;
        let positions = &scratch.positions;
        let radii = &scratch.radii;

        let max_distance_sq = config.charge_max_distance * config.charge_max_distance;
        let grid = SpatialGrid::build(positions, config.charge_max_distance);
        for index in 0..node_count {
            let mut repulsion = Vec2::ZERO;
            grid.for_each_within(positions[index], config.charge_max_distance, |other| {
                if other == index {
                    return;
                }
                let delta = positions[index] - positions[other];
                let distance_sq = delta.length_sq();
                if distance_sq > max_distance_sq {
                    return;
                }
                let direction = if distance_sq > 1e-8 {
                    delta / distance_sq.sqrt()
                } else {
                    golden_dir(index)
                };
                repulsion += direction * (config.charge_strength / (distance_sq + config.charge_softening));
            });
            forces[index] += repulsion;
        }

        for edge in &self.edges {
            let (from, to) = (edge.source, edge.target);
            if from >= node_count || to >= node_count || from == to {
                continue;
            }

            let delta = positions[from] - positions[to];
            let distance_sq = delta.length_sq();
            if distance_sq <= 1e-8 {
                continue;
            }
            let distance = distance_sq.sqrt();
            let direction = delta / distance;
            let stretch = (distance - config.link_distance) * config.link_strength;

            forces[from] -= direction * stretch;
            forces[to] += direction * stretch;
        }

        accumulate_edge_clearance(&self.edges, positions, radii, config, forces);
        accumulate_uncrossing(&self.edges, positions, config, forces);

        let mut centroid = Vec2::ZERO;
        for position in positions {
            centroid += *position;
        }
        centroid /= node_count as f32;

        for (index, force) in forces.iter_mut().enumerate() {
            let position = positions[index];
            let offset = position - centroid;
            let distance = offset.length();
            if distance > config.compaction_slack {
                *force -= (offset / distance) * ((distance - config.compaction_slack) * config.compaction_strength);
            }
            *force -= position * config.center_strength;
        }

        let keep = (1.0 - config.velocity_decay).clamp(0.0, 1.0);
        let max_speed_sq = config.max_speed * config.max_speed;
        for (index, node) in self.nodes.iter_mut().enumerate() {
            if let Some(pin) = node.pin {
                node.pos = pin;
                node.vel = Vec2::ZERO;
                continue;
            }

            let mut force = forces[index];
            if !force.is_finite() {
                force = Vec2::ZERO;
            }

            let mut velocity = (node.vel + (force * self.alpha)) * keep;
            let speed_sq = velocity.length_sq();
            if speed_sq > max_speed_sq {
                velocity *= config.max_speed / speed_sq.sqrt();
            }
            if velocity.length_sq() < MIN_SLEEP_SPEED_SQ {
                velocity = Vec2::ZERO;
            }

            node.vel = velocity;
            node.pos += velocity;
        }

        resolve_collisions(&mut self.nodes, &mut self.scratch.collision_positions, config);

        self.alpha *= 1.0 - config.alpha_decay;
        self.ticks_since_heat += 1;
        if self.alpha < config.alpha_min {
            self.phase = SimPhase::Settled;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::vec2;
    use crate::graph::RelationshipKind;

    fn plain_node(id: &str, pos: Vec2) -> SimNode {
        SimNode {
            id: id.to_owned(),
            name: String::new(),
            kind: EntityKind::Company,
            is_root: false,
            red_flags: Vec::new(),
            pos,
            vel: Vec2::ZERO,
            pin: None,
            radius: 12.0,
        }
    }

    fn link(source: usize, target: usize) -> SimEdge {
        SimEdge {
            source,
            target,
            kind: RelationshipKind::Owns,
            percentage: None,
            circular: false,
        }
    }

    #[test]
    fn coincident_nodes_separate_without_nan() {
        let mut sim = SimulationState::new();
        sim.reset_with(
            vec![plain_node("a", vec2(5.0, 5.0)), plain_node("b", vec2(5.0, 5.0))],
            vec![link(0, 1)],
        );

        let config = SimConfig::default();
        for _ in 0..10 {
            sim.step(&config);
        }

        for node in &sim.nodes {
            assert!(node.pos.is_finite());
            assert!(node.vel.is_finite());
        }
        let gap = (sim.nodes[0].pos - sim.nodes[1].pos).length();
        assert!(gap > 1.0, "coincident nodes stayed stacked, gap {gap}");
    }

    #[test]
    fn pinned_node_never_moves_under_forces() {
        let mut sim = SimulationState::new();
        let mut anchored = plain_node("anchored", vec2(40.0, 0.0));
        anchored.pin = Some(vec2(40.0, 0.0));
        sim.reset_with(
            vec![anchored, plain_node("free", vec2(48.0, 0.0))],
            vec![link(0, 1)],
        );

        let config = SimConfig::default();
        for _ in 0..50 {
            sim.step(&config);
        }

        assert_eq!(sim.nodes[0].pos, vec2(40.0, 0.0));
        assert_ne!(sim.nodes[1].pos, vec2(48.0, 0.0));
    }

    #[test]
    fn alpha_decays_to_settled() {
        let mut sim = SimulationState::new();
        sim.reset_with(
            vec![plain_node("a", vec2(-60.0, 0.0)), plain_node("b", vec2(60.0, 0.0))],
            vec![link(0, 1)],
        );

        let config = SimConfig::default();
        let mut ticks = 0;
        while sim.step(&config) {
            ticks += 1;
            assert!(ticks < 2000, "never settled");
        }
        assert_eq!(sim.phase(), SimPhase::Settled);
        assert!(sim.alpha < config.alpha_min);
    }

    #[test]
    fn collision_pass_enforces_minimum_separation() {
        let mut sim = SimulationState::new();
        sim.reset_with(
            vec![plain_node("a", vec2(0.0, 0.0)), plain_node("b", vec2(4.0, 0.0))],
            Vec::new(),
        );

        let config = SimConfig::default();
        sim.step(&config);

        let min_distance = sim.nodes[0].radius + sim.nodes[1].radius + config.collision_margin;
        let gap = (sim.nodes[0].pos - sim.nodes[1].pos).length();
        assert!(gap >= min_distance - 1e-3, "gap {gap} below {min_distance}");
    }

    #[test]
    fn empty_simulation_reports_cold() {
        let mut sim = SimulationState::new();
        assert!(!sim.step(&SimConfig::default()));
        assert_eq!(sim.phase(), SimPhase::Cold);
    }
}
