use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Individual,
    #[default]
    Unknown,
    Boilerplate,
}

impl EntityKind {
    pub fn base_radius(self) -> f32 {
        match self {
            Self::Company => 12.0,
            Self::Individual => 10.0,
            Self::Unknown | Self::Boilerplate => 9.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Owns,
    BeneficialOwner,
    ParentCompany,
    Vendor,
    Consultant,
    Supplier,
    Directs,
    Director,
    #[default]
    Related,
}

impl RelationshipKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Owns => "owns",
            Self::BeneficialOwner => "beneficial owner",
            Self::ParentCompany => "parent company",
            Self::Vendor => "vendor",
            Self::Consultant => "consultant",
            Self::Supplier => "supplier",
            Self::Directs => "directs",
            Self::Director => "director",
            Self::Related => "related",
        }
    }
}

/// One entity as delivered by the discovery stream. Unknown upstream fields
/// collect into `extra` instead of being dropped or loosely typed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EntityRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: EntityKind::default(),
            is_root: false,
            red_flags: Vec::new(),
            source: None,
            extra: BTreeMap::new(),
        }
    }

    /// Provenance counts as known unless it is missing, blank, or the
    /// upstream placeholder "unknown".
    pub fn has_known_source(&self) -> bool {
        self.source
            .as_deref()
            .is_some_and(|source| !source.trim().is_empty() && !source.trim().eq_ignore_ascii_case("unknown"))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub kind: RelationshipKind,
    #[serde(default)]
    pub percentage: Option<f32>,
    #[serde(default)]
    pub circular: bool,
}

impl RelationshipRecord {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind: RelationshipKind::default(),
            percentage: None,
            circular: false,
        }
    }
}

/// A raw discovery snapshot. Records may arrive in any order, with
/// duplicates; `retain_valid` is where they become a coherent graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
}

/// The filtered graph every downstream component works from. Invariants:
/// every edge's endpoints exist in `nodes`, every non-root node has at
/// least one incident edge, and at most one node is the root.
#[derive(Clone, Debug, Default)]
pub struct RetainedGraph {
    pub nodes: Vec<EntityRecord>,
    pub edges: Vec<RelationshipRecord>,
    pub root_id: Option<String>,
}

impl RetainedGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.id.as_str())
    }
}

impl GraphSnapshot {
    pub fn new(entities: Vec<EntityRecord>, relationships: Vec<RelationshipRecord>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    /// Normalize the raw records into a valid graph. Malformed input is
    /// dropped, never reported: an entity without an id, an edge whose
    /// endpoint does not survive, a node nothing connects to. The first
    /// record claiming root wins; later claims are demoted.
    pub fn retain_valid(&self) -> RetainedGraph {
        let mut order = Vec::new();
        let mut merged: HashMap<String, EntityRecord> = HashMap::new();
        let mut root_id: Option<String> = None;

        for record in &self.entities {
            if record.id.is_empty() {
                continue;
            }

            if record.is_root && root_id.is_none() {
                root_id = Some(record.id.clone());
            }

            let mut record = record.clone();
            record.is_root = false;
            if let Some(existing) = merged.get_mut(&record.id) {
                *existing = record;
            } else {
                order.push(record.id.clone());
                merged.insert(record.id.clone(), record);
            }
        }

        if let Some(root) = &root_id
            && let Some(record) = merged.get_mut(root)
        {
            record.is_root = true;
        }

        let surviving = order
            .iter()
            .filter(|id| {
                let record = &merged[id.as_str()];
                record.is_root || record.has_known_source()
            })
            .map(|id| id.as_str())
            .collect::<HashSet<_>>();

        let mut edges = Vec::new();
        let mut seen_pairs = HashSet::new();
        for edge in &self.relationships {
            if edge.source_id == edge.target_id
                || !surviving.contains(edge.source_id.as_str())
                || !surviving.contains(edge.target_id.as_str())
            {
                continue;
            }
            if seen_pairs.insert((edge.source_id.clone(), edge.target_id.clone())) {
                edges.push(edge.clone());
            }
        }

        let mut connected = HashSet::new();
        for edge in &edges {
            connected.insert(edge.source_id.as_str());
            connected.insert(edge.target_id.as_str());
        }

        let nodes = order
            .iter()
            .filter(|id| {
                let record = &merged[id.as_str()];
                surviving.contains(id.as_str()) && (record.is_root || connected.contains(id.as_str()))
            })
            .map(|id| merged[id.as_str()].clone())
            .collect::<Vec<_>>();

        RetainedGraph {
            nodes,
            edges,
            root_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sourced(id: &str) -> EntityRecord {
        let mut record = EntityRecord::new(id);
        record.source = Some("companies-house".to_owned());
        record
    }

    fn root(id: &str) -> EntityRecord {
        let mut record = sourced(id);
        record.is_root = true;
        record
    }

    fn retained_ids(graph: &RetainedGraph) -> Vec<&str> {
        graph.node_ids().collect()
    }

    #[test]
    fn dangling_edge_is_dropped_without_error() {
        let snapshot = GraphSnapshot::new(
            vec![sourced("a"), sourced("b")],
            vec![
                RelationshipRecord::new("a", "b"),
                RelationshipRecord::new("a", "z"),
            ],
        );

        let graph = snapshot.retain_valid();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source_id, "a");
        assert_eq!(graph.edges[0].target_id, "b");
    }

    #[test]
    fn every_retained_edge_references_retained_nodes() {
        // pseudo-random graphs with dangling references, seeded LCG
        let mut state = 0x2545_f491_u64;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            (state >> 33) as usize
        };

        for _ in 0..50 {
            let node_count = next() % 12;
            let mut entities = Vec::new();
            for index in 0..node_count {
                let mut record = sourced(&format!("n{index}"));
                if next() % 4 == 0 {
                    record.source = None;
                }
                entities.push(record);
            }

            let mut relationships = Vec::new();
            for _ in 0..(next() % 20) {
                // deliberately reference ids beyond the node set
                let source = format!("n{}", next() % (node_count + 4));
                let target = format!("n{}", next() % (node_count + 4));
                relationships.push(RelationshipRecord::new(source, target));
            }

            let graph = GraphSnapshot::new(entities, relationships).retain_valid();
            let ids = graph.node_ids().collect::<HashSet<_>>();
            for edge in &graph.edges {
                assert!(ids.contains(edge.source_id.as_str()));
                assert!(ids.contains(edge.target_id.as_str()));
            }
        }
    }

    #[test]
    fn orphan_non_root_nodes_are_dropped() {
        let snapshot = GraphSnapshot::new(
            vec![root("r"), sourced("a"), sourced("lonely")],
            vec![RelationshipRecord::new("r", "a")],
        );

        let graph = snapshot.retain_valid();
        assert_eq!(retained_ids(&graph), vec!["r", "a"]);
    }

    #[test]
    fn root_is_retained_even_when_disconnected() {
        let snapshot = GraphSnapshot::new(vec![root("r")], Vec::new());
        let graph = snapshot.retain_valid();
        assert_eq!(retained_ids(&graph), vec!["r"]);
        assert_eq!(graph.root_id.as_deref(), Some("r"));
    }

    #[test]
    fn first_root_claim_wins() {
        let snapshot = GraphSnapshot::new(
            vec![root("first"), root("second"), sourced("a")],
            vec![
                RelationshipRecord::new("first", "a"),
                RelationshipRecord::new("second", "a"),
            ],
        );

        let graph = snapshot.retain_valid();
        assert_eq!(graph.root_id.as_deref(), Some("first"));
        let roots = graph.nodes.iter().filter(|node| node.is_root).count();
        assert_eq!(roots, 1);
    }

    #[test]
    fn unknown_provenance_is_dropped_unless_root() {
        let mut rootless = EntityRecord::new("mystery");
        rootless.source = Some("Unknown".to_owned());
        let mut unsourced_root = EntityRecord::new("r");
        unsourced_root.is_root = true;

        let snapshot = GraphSnapshot::new(
            vec![unsourced_root, rootless, sourced("a")],
            vec![
                RelationshipRecord::new("r", "mystery"),
                RelationshipRecord::new("r", "a"),
            ],
        );

        let graph = snapshot.retain_valid();
        assert_eq!(retained_ids(&graph), vec!["r", "a"]);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn duplicate_ids_merge_last_write_wins() {
        let mut first = sourced("a");
        first.red_flags = vec!["stale".to_owned()];
        let mut second = sourced("a");
        second.red_flags = vec!["circular ownership".to_owned()];

        let snapshot = GraphSnapshot::new(
            vec![first, second, sourced("b")],
            vec![RelationshipRecord::new("a", "b")],
        );

        let graph = snapshot.retain_valid();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].red_flags, vec!["circular ownership"]);
    }

    #[test]
    fn self_loops_and_duplicate_edges_are_dropped() {
        let snapshot = GraphSnapshot::new(
            vec![sourced("a"), sourced("b")],
            vec![
                RelationshipRecord::new("a", "a"),
                RelationshipRecord::new("a", "b"),
                RelationshipRecord::new("a", "b"),
            ],
        );

        let graph = snapshot.retain_valid();
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn snapshot_records_parse_from_json() {
        let raw = r#"{
            "entities": [
                {"id": "r", "name": "Audited Ltd", "kind": "company", "is_root": true,
                 "source": "registry", "jurisdiction": "LU"},
                {"id": "p", "kind": "individual", "source": "registry"}
            ],
            "relationships": [
                {"source_id": "p", "target_id": "r", "kind": "beneficial_owner", "percentage": 51.0}
            ]
        }"#;

        let snapshot: GraphSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.entities[0].extra["jurisdiction"], "LU");
        assert_eq!(snapshot.relationships[0].kind, RelationshipKind::BeneficialOwner);

        let graph = snapshot.retain_valid();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
    }
}
