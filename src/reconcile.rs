use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;

use log::debug;

use crate::engine::{EngineEvent, LayoutEngine, ReconcileMode};
use crate::geom::{Vec2, golden_dir, hash_jitter, vec2};
use crate::graph::{GraphSnapshot, RetainedGraph};
use crate::persist::structural_key;
use crate::physics::{SimEdge, SimNode};

impl LayoutEngine {
    /// Reconcile a freshly filtered snapshot with the live simulation.
    /// Runs strictly between ticks; the caller guarantees no tick is in
    /// flight when this is invoked.
    pub(crate) fn apply_snapshot(&mut self, snapshot: &GraphSnapshot) {
        let retained = snapshot.retain_valid();
        let first = self.snapshots_seen == 0;
        self.snapshots_seen += 1;
        let key = structural_key(&retained);

        let mode = if first || self.needs_full_rebuild(&retained) {
            self.full_rebuild(&retained, &key);
            ReconcileMode::FullRebuild
        } else {
            self.patch(&retained);
            ReconcileMode::Patch
        };

        self.structural_key = Some(key);

        let drag_gone = self
            .drag
            .as_ref()
            .is_some_and(|drag| self.sim.index_of(&drag.node_id).is_none());
        if drag_gone {
            self.drag = None;
        }

        let selection_gone = self
            .selected
            .as_ref()
            .is_some_and(|id| self.sim.index_of(id).is_none());
        if selection_gone {
            self.selected = None;
            self.events.push(EngineEvent::SelectionChanged(None));
        }

        self.events.push(EngineEvent::Reconciled(mode));
    }

    /// The patch path only pays off while most of the live graph survives.
    /// Losing more than the configured fraction of nodes means the layout
    /// is stale wholesale, so start over.
    fn needs_full_rebuild(&self, retained: &RetainedGraph) -> bool {
        let live = self.sim.nodes.len();
        if live == 0 {
            return true;
        }

        let next_ids = retained.node_ids().collect::<HashSet<_>>();
        let missing = self
            .sim
            .nodes
            .iter()
            .filter(|node| !next_ids.contains(node.id.as_str()))
            .count();

        (missing as f32) > (live as f32) * self.config.rebuild_threshold
    }

    fn full_rebuild(&mut self, retained: &RetainedGraph, key: &str) {
        self.restored = self.store.load(key).unwrap_or_default();
        debug!(
            "full rebuild: {} nodes, {} edges, {} restored positions",
            retained.nodes.len(),
            retained.edges.len(),
            self.restored.len()
        );

        let total = retained.nodes.len().max(1);
        let ring_radius = (total as f32).sqrt() * self.config.link_distance * 0.45;

        let mut restored_hits = 0_usize;
        let mut nodes = Vec::with_capacity(retained.nodes.len());
        for (index, record) in retained.nodes.iter().enumerate() {
            let mut node = SimNode::from_record(record);
            if let Some(saved) = self.restored.get(&record.id) {
                restored_hits += 1;
                saved.apply_to(&mut node);
                // a dragged root keeps the user's placement across sessions
                if node.is_root && (saved.fx.is_none() || saved.fy.is_none()) {
                    node.pin = Some(node.pos);
                }
            } else if !node.is_root {
                let angle = (index as f32 / total as f32) * TAU;
                let radial = vec2(angle.cos(), angle.sin()) * ring_radius;
                node.pos = radial + (hash_jitter(&record.id) * (self.config.link_distance * 0.25));
            }
            nodes.push(node);
        }

        let fully_restored = !nodes.is_empty() && restored_hits == nodes.len();
        let edges = index_edges(retained, &nodes);
        self.sim.reset_with(nodes, edges);
        if fully_restored {
            // the saved layout was already settled; wake it gently
            self.sim.temper(self.config.reheat_alpha);
        }
        self.full_rebuilds += 1;
    }

    fn patch(&mut self, retained: &RetainedGraph) {
        let old_pairs = self
            .sim
            .edges
            .iter()
            .filter(|edge| edge.source < self.sim.nodes.len() && edge.target < self.sim.nodes.len())
            .map(|edge| {
                (
                    self.sim.nodes[edge.source].id.clone(),
                    self.sim.nodes[edge.target].id.clone(),
                )
            })
            .collect::<HashSet<_>>();

        let mut prior = std::mem::take(&mut self.sim.nodes)
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect::<HashMap<_, _>>();

        let mut placed: HashMap<String, Vec2> = prior
            .iter()
            .map(|(id, node)| (id.clone(), node.pos))
            .collect();

        let mut added = 0_usize;
        let mut next_nodes = Vec::with_capacity(retained.nodes.len());
        for (index, record) in retained.nodes.iter().enumerate() {
            if let Some(mut node) = prior.remove(&record.id) {
                node.refresh_from(record);
                next_nodes.push(node);
                continue;
            }

            added += 1;
            let mut node = SimNode::from_record(record);
            if let Some(saved) = self.restored.get(&record.id) {
                saved.apply_to(&mut node);
            } else if !node.is_root {
                node.pos = self.seed_near_neighbors(record.id.as_str(), index, retained, &placed);
            }
            placed.insert(node.id.clone(), node.pos);
            next_nodes.push(node);
        }

        let removed = prior.len();
        let edges = index_edges(retained, &next_nodes);
        let new_pairs = retained
            .edges
            .iter()
            .map(|edge| (edge.source_id.clone(), edge.target_id.clone()))
            .collect::<HashSet<_>>();
        let changed = added > 0 || removed > 0 || old_pairs != new_pairs;

        self.sim.splice(next_nodes, edges);
        if changed {
            self.sim.reheat(self.config.reheat_alpha);
        }
        debug!("patch: +{added} -{removed} nodes, reheat={changed}");
        self.patches += 1;
    }

    /// Seed position for a node arriving mid-relaxation: next to an already
    /// placed neighbor at half a link length, else near the centroid of the
    /// placed nodes. The standoff keeps the first tick after a patch from
    /// shoving settled neighbors around.
    fn seed_near_neighbors(
        &self,
        id: &str,
        index: usize,
        retained: &RetainedGraph,
        placed: &HashMap<String, Vec2>,
    ) -> Vec2 {
        let mut direction = hash_jitter(id).normalized();
        if direction == Vec2::ZERO {
            direction = golden_dir(index);
        }
        let standoff = direction * (self.config.link_distance * 0.5);

        let anchor = retained.edges.iter().find_map(|edge| {
            if edge.source_id == id {
                placed.get(edge.target_id.as_str()).copied()
            } else if edge.target_id == id {
                placed.get(edge.source_id.as_str()).copied()
            } else {
                None
            }
        });

        if let Some(anchor) = anchor {
            return anchor + standoff;
        }

        let mut centroid = Vec2::ZERO;
        if !placed.is_empty() {
            for position in placed.values() {
                centroid += *position;
            }
            centroid /= placed.len() as f32;
        }
        centroid + (direction * self.config.link_distance)
    }
}

fn index_edges(retained: &RetainedGraph, nodes: &[SimNode]) -> Vec<SimEdge> {
    let index_by_id = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id.as_str(), index))
        .collect::<HashMap<_, _>>();

    let mut edges = Vec::with_capacity(retained.edges.len());
    for edge in &retained.edges {
        let (Some(&source), Some(&target)) = (
            index_by_id.get(edge.source_id.as_str()),
            index_by_id.get(edge.target_id.as_str()),
        ) else {
            continue;
        };

        edges.push(SimEdge {
            source,
            target,
            kind: edge.kind,
            percentage: edge.percentage,
            circular: edge.circular,
        });
    }
    edges
}
