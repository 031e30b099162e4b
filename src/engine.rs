use std::collections::HashMap;

use crate::geom::Vec2;
use crate::graph::{EntityKind, GraphSnapshot, RelationshipKind};
use crate::interact::DragState;
use crate::persist::{KeyValueStore, PositionStore, StoredPosition};
use crate::physics::{SimConfig, SimEdge, SimNode, SimPhase, SimulationState};
use crate::viewport::{ViewTransform, fit_to_view};

/// Notifications the surrounding application drains between ticks.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    SelectionChanged(Option<String>),
    Reconciled(ReconcileMode),
}

/// How the update manager absorbed the latest snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileMode {
    FullRebuild,
    Patch,
}

#[derive(Clone, Debug)]
pub struct FrameNode {
    pub id: String,
    pub name: String,
    pub pos: Vec2,
    pub radius: f32,
    pub kind: EntityKind,
    pub is_root: bool,
    pub flagged: bool,
    pub pinned: bool,
    pub selected: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct FrameEdge {
    pub from: Vec2,
    pub to: Vec2,
    pub kind: RelationshipKind,
    pub percentage: Option<f32>,
    pub circular: bool,
}

/// Everything a painter needs for one tick: node circles and edge endpoint
/// pairs in world coordinates, plus the residual energy for spinners.
#[derive(Clone, Debug, Default)]
pub struct RenderFrame {
    pub nodes: Vec<FrameNode>,
    pub edges: Vec<FrameEdge>,
    pub alpha: f32,
    pub settled: bool,
}

/// External painter. The engine pushes a frame after every tick it is
/// driven through; how drawing happens is not its concern.
pub trait RenderSurface {
    fn present(&mut self, frame: &RenderFrame);
}

/// Adapter so a closure can serve as the render surface.
pub struct FnSurface<F: FnMut(&RenderFrame)>(pub F);

impl<F: FnMut(&RenderFrame)> RenderSurface for FnSurface<F> {
    fn present(&mut self, frame: &RenderFrame) {
        (self.0)(frame)
    }
}

/// The layout engine: owns the simulation, reconciles incoming snapshots
/// between ticks, persists and restores positions, and exposes the
/// interaction surface. Single logical thread of control; the caller's
/// tick driver is the only thing that advances it.
pub struct LayoutEngine {
    pub(crate) config: SimConfig,
    pub(crate) sim: SimulationState,
    pub(crate) store: PositionStore,
    /// Latest unapplied snapshot. Submissions overwrite it, so a burst of
    /// discovery updates coalesces to the newest one.
    pub(crate) pending: Option<GraphSnapshot>,
    pub(crate) snapshots_seen: u64,
    pub(crate) structural_key: Option<String>,
    /// Positions restored at the last full rebuild; the patch path consults
    /// this for late-arriving nodes without touching the store again.
    pub(crate) restored: HashMap<String, StoredPosition>,
    pub(crate) selected: Option<String>,
    pub(crate) drag: Option<DragState>,
    pub(crate) events: Vec<EngineEvent>,
    pub(crate) full_rebuilds: u32,
    pub(crate) patches: u32,
}

impl LayoutEngine {
    pub fn new(config: SimConfig, backend: Box<dyn KeyValueStore>) -> Self {
        Self {
            config,
            sim: SimulationState::new(),
            store: PositionStore::new(backend),
            pending: None,
            snapshots_seen: 0,
            structural_key: None,
            restored: HashMap::new(),
            selected: None,
            drag: None,
            events: Vec::new(),
            full_rebuilds: 0,
            patches: 0,
        }
    }

    /// Queue a discovery snapshot. Applied at the top of the next tick,
    /// never mid-tick; a newer submission replaces a queued one.
    pub fn submit_snapshot(&mut self, snapshot: GraphSnapshot) {
        self.pending = Some(snapshot);
    }

    /// Advance one tick. Returns whether the simulation is still live;
    /// stopping is simply not calling this again.
    pub fn tick(&mut self) -> bool {
        if let Some(snapshot) = self.pending.take() {
            self.apply_snapshot(&snapshot);
        }
        self.sim.step(&self.config)
    }

    /// Cooperative tick loop: advance and present until the simulation
    /// settles or the tick budget runs out. Returns the ticks consumed.
    pub fn drive(&mut self, surface: &mut dyn RenderSurface, max_ticks: u32) -> u32 {
        let mut ticks = 0;
        while ticks < max_ticks {
            let live = self.tick();
            surface.present(&self.render_frame());
            ticks += 1;
            if !live {
                break;
            }
        }
        ticks
    }

    pub fn render_frame(&self) -> RenderFrame {
        let nodes = self
            .sim
            .nodes
            .iter()
            .map(|node| FrameNode {
                id: node.id.clone(),
                name: node.name.clone(),
                pos: node.pos,
                radius: node.radius,
                kind: node.kind,
                is_root: node.is_root,
                flagged: !node.red_flags.is_empty(),
                pinned: node.pin.is_some(),
                selected: self.selected.as_deref() == Some(node.id.as_str()),
            })
            .collect::<Vec<_>>();

        let edges = self
            .sim
            .edges
            .iter()
            .filter(|edge| edge.source < self.sim.nodes.len() && edge.target < self.sim.nodes.len())
            .map(|edge| FrameEdge {
                from: self.sim.nodes[edge.source].pos,
                to: self.sim.nodes[edge.target].pos,
                kind: edge.kind,
                percentage: edge.percentage,
                circular: edge.circular,
            })
            .collect::<Vec<_>>();

        RenderFrame {
            nodes,
            edges,
            alpha: self.sim.alpha,
            settled: self.sim.phase() == SimPhase::Settled,
        }
    }

    pub fn fit_to_view(&self, width: f32, height: f32) -> ViewTransform {
        fit_to_view(&self.sim.nodes, width, height)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn phase(&self) -> SimPhase {
        self.sim.phase()
    }

    pub fn alpha(&self) -> f32 {
        self.sim.alpha
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.sim.nodes
    }

    pub fn edges(&self) -> &[SimEdge] {
        &self.sim.edges
    }

    pub fn position_of(&self, id: &str) -> Option<Vec2> {
        self.sim.node(id).map(|node| node.pos)
    }

    pub fn full_rebuilds(&self) -> u32 {
        self.full_rebuilds
    }

    pub fn patches(&self) -> u32 {
        self.patches
    }
}
