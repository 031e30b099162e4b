use log::debug;

use crate::engine::{EngineEvent, LayoutEngine};
use crate::geom::{Vec2, vec2};

/// Pointer movement below this is a click, not a drag; a click must never
/// displace the node it lands on.
const CLICK_SLOP: f32 = 3.0;

/// Where a node sits in the drag state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeHold {
    Free,
    Dragging,
    Pinned,
}

#[derive(Clone, Debug)]
pub(crate) struct DragState {
    pub(crate) node_id: String,
    pub(crate) grab: Vec2,
    pub(crate) moved: bool,
    pub(crate) was_pinned: bool,
}

impl LayoutEngine {
    /// Select a node. Unknown ids are ignored; a repeated selection does
    /// not re-notify.
    pub fn on_node_click(&mut self, id: &str) {
        if self.sim.index_of(id).is_none() {
            return;
        }
        self.change_selection(Some(id.to_owned()));
    }

    pub fn set_selected(&mut self, id: Option<&str>) {
        if let Some(id) = id
            && self.sim.index_of(id).is_none()
        {
            return;
        }
        self.change_selection(id.map(str::to_owned));
    }

    fn change_selection(&mut self, next: Option<String>) {
        if self.selected == next {
            return;
        }
        self.selected = next.clone();
        self.events.push(EngineEvent::SelectionChanged(next));
    }

    /// Grab a node: pin it where it stands and wake the simulation so the
    /// rest of the graph relaxes around the hand-held one.
    pub fn on_drag_start(&mut self, id: &str) {
        let drag_alpha = self.config.drag_alpha;
        let Some(node) = self.sim.node_mut(id) else {
            return;
        };

        let was_pinned = node.pin.is_some();
        let grab = node.pos;
        node.pin = Some(grab);
        node.vel = Vec2::ZERO;
        self.drag = Some(DragState {
            node_id: id.to_owned(),
            grab,
            moved: false,
            was_pinned,
        });
        self.sim.reheat(drag_alpha);
    }

    pub fn on_drag_move(&mut self, id: &str, x: f32, y: f32) {
        let drag_alpha = self.config.drag_alpha;
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        if drag.node_id != id {
            return;
        }

        let target = vec2(x, y);
        if !target.is_finite() {
            return;
        }
        if (target - drag.grab).length() > CLICK_SLOP {
            drag.moved = true;
        }

        if let Some(node) = self.sim.node_mut(id) {
            node.pin = Some(target);
            node.pos = target;
            node.vel = Vec2::ZERO;
        }
        self.sim.reheat(drag_alpha);
    }

    /// Release a node. A real drag leaves roots pinned where the user put
    /// them and frees everything else, then flushes the layout to the
    /// store. A release without movement is a click.
    pub fn on_drag_end(&mut self, id: &str) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        if drag.node_id != id {
            self.drag = Some(drag);
            return;
        }

        let Some(node) = self.sim.node_mut(id) else {
            return;
        };

        if !drag.moved {
            // restore the pre-drag hold and treat the gesture as a click
            if !node.is_root && !drag.was_pinned {
                node.pin = None;
            }
            self.on_node_click(id);
            return;
        }

        if node.is_root {
            debug!("root {id} re-pinned at user position");
        } else {
            node.pin = None;
        }

        if let Some(key) = self.structural_key.clone() {
            self.store.save(&key, &self.sim.nodes);
        }
        self.sim.reheat(self.config.reheat_alpha);
    }

    /// Current drag-state-machine position for a node.
    pub fn hold_state(&self, id: &str) -> NodeHold {
        if self.drag.as_ref().is_some_and(|drag| drag.node_id == id) {
            return NodeHold::Dragging;
        }
        match self.sim.node(id) {
            Some(node) if node.pin.is_some() => NodeHold::Pinned,
            _ => NodeHold::Free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityRecord, GraphSnapshot, RelationshipRecord};
    use crate::persist::MemoryStore;
    use crate::physics::SimConfig;

    fn sourced(id: &str) -> EntityRecord {
        let mut record = EntityRecord::new(id);
        record.source = Some("registry".to_owned());
        record
    }

    fn engine_with_pair() -> LayoutEngine {
        let mut root = sourced("r");
        root.is_root = true;
        let snapshot = GraphSnapshot::new(
            vec![root, sourced("a")],
            vec![RelationshipRecord::new("r", "a")],
        );

        let mut engine = LayoutEngine::new(SimConfig::default(), Box::new(MemoryStore::new()));
        engine.submit_snapshot(snapshot);
        engine.tick();
        engine
    }

    #[test]
    fn drag_pins_then_releases_non_root() {
        let mut engine = engine_with_pair();
        assert_eq!(engine.hold_state("a"), NodeHold::Free);

        engine.on_drag_start("a");
        assert_eq!(engine.hold_state("a"), NodeHold::Dragging);

        engine.on_drag_move("a", 90.0, -40.0);
        assert_eq!(engine.position_of("a"), Some(vec2(90.0, -40.0)));

        engine.on_drag_end("a");
        assert_eq!(engine.hold_state("a"), NodeHold::Free);
        assert_eq!(engine.position_of("a"), Some(vec2(90.0, -40.0)));
    }

    #[test]
    fn root_stays_pinned_where_the_user_dropped_it() {
        let mut engine = engine_with_pair();
        engine.on_drag_start("r");
        engine.on_drag_move("r", 55.0, 25.0);
        engine.on_drag_end("r");

        assert_eq!(engine.hold_state("r"), NodeHold::Pinned);
        let pinned = engine.nodes().iter().find(|node| node.id == "r").unwrap();
        assert_eq!(pinned.pin, Some(vec2(55.0, 25.0)));
    }

    #[test]
    fn click_without_movement_selects_and_does_not_move() {
        let mut engine = engine_with_pair();
        let before = engine.position_of("a").unwrap();

        engine.on_drag_start("a");
        engine.on_drag_end("a");

        assert_eq!(engine.position_of("a"), Some(before));
        assert_eq!(engine.hold_state("a"), NodeHold::Free);
        assert_eq!(engine.selected(), Some("a"));

        let events = engine.drain_events();
        assert!(events.contains(&EngineEvent::SelectionChanged(Some("a".to_owned()))));
    }

    #[test]
    fn repeated_selection_notifies_once() {
        let mut engine = engine_with_pair();
        engine.drain_events();

        engine.on_node_click("a");
        engine.on_node_click("a");
        let notifications = engine
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, EngineEvent::SelectionChanged(_)))
            .count();
        assert_eq!(notifications, 1);

        engine.set_selected(None);
        assert_eq!(engine.selected(), None);
    }

    #[test]
    fn drag_raises_alpha_for_re_relaxation() {
        let mut engine = engine_with_pair();
        for _ in 0..2000 {
            if !engine.tick() {
                break;
            }
        }
        assert!(engine.alpha() < SimConfig::default().alpha_min);

        engine.on_drag_start("a");
        assert!(engine.alpha() >= SimConfig::default().drag_alpha);
    }

    #[test]
    fn unknown_node_interactions_are_ignored() {
        let mut engine = engine_with_pair();
        engine.on_drag_start("ghost");
        engine.on_drag_move("ghost", 1.0, 1.0);
        engine.on_drag_end("ghost");
        engine.on_node_click("ghost");
        assert_eq!(engine.selected(), None);
        assert_eq!(engine.hold_state("ghost"), NodeHold::Free);
    }
}
