//! Incremental force-directed layout for beneficial-ownership graphs.
//!
//! Entities and relationships stream in from an asynchronous discovery
//! process; the engine filters them into a valid graph, relaxes positions
//! under a composable set of forces, keeps settled nodes stable as the
//! graph grows, persists manual adjustments through an injected key-value
//! store, and hands per-tick frames to an injected render surface.

mod engine;
mod geom;
mod graph;
mod interact;
mod persist;
mod physics;
mod reconcile;
mod viewport;

pub use engine::{
    EngineEvent, FnSurface, FrameEdge, FrameNode, LayoutEngine, ReconcileMode, RenderFrame,
    RenderSurface,
};
pub use geom::{Vec2, vec2};
pub use graph::{
    EntityKind, EntityRecord, GraphSnapshot, RelationshipKind, RelationshipRecord, RetainedGraph,
};
pub use interact::NodeHold;
pub use persist::{FileStore, KeyValueStore, MemoryStore, PositionStore, StoredPosition, structural_key};
pub use physics::{SimConfig, SimEdge, SimNode, SimPhase, SimulationState};
pub use viewport::{FIT_PADDING, MAX_FIT_SCALE, MIN_FIT_SCALE, ViewTransform, fit_to_view};
