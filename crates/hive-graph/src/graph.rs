//! In-memory entity/relation graph
//!
//! Nodes live in a map keyed by canonical id; edges live in a vec with
//! two adjacency indexes (`from_id -> edge positions` and
//! `to_id -> edge positions`). Every mutation updates all three
//! structures together, and at most one edge exists per
//! (type, from, to) triple.

use hive_core::{HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Entity types the graph understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Service,
    EnvVar,
    Incident,
    Route,
    Permission,
    Feature,
}

impl EntityType {
    /// Prefix used in canonical node ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            EntityType::Service => "svc",
            EntityType::EnvVar => "env",
            EntityType::Incident => "inc",
            EntityType::Route => "route",
            EntityType::Permission => "perm",
            EntityType::Feature => "feat",
        }
    }

    /// Canonical node id for a key of this type.
    pub fn node_id(&self, key: &str) -> String {
        format!("{}:{}", self.id_prefix(), key)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id_prefix())
    }
}

/// Relation types between entities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    ServiceRequiresEnvvar,
    IncidentImpactsService,
    ServiceExposesRoute,
    RouteRequiresPermission,
    FeatureDependsOnService,
}

/// Graph node with a canonical `type:key` id and free-form properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: EntityType,
    #[serde(default)]
    pub props: HashMap<String, Value>,
}

impl Node {
    pub fn new(node_type: EntityType, key: &str) -> Self {
        Self {
            id: node_type.node_id(key),
            node_type,
            props: HashMap::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// Non-empty string property, if present.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    #[serde(rename = "type")]
    pub edge_type: RelationType,
    pub from_id: String,
    pub to_id: String,
    #[serde(default)]
    pub props: HashMap<String, Value>,
}

impl Edge {
    pub fn new(edge_type: RelationType, from_id: impl Into<String>, to_id: impl Into<String>) -> Self {
        Self {
            edge_type,
            from_id: from_id.into(),
            to_id: to_id.into(),
            props: HashMap::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    fn triple(&self) -> (RelationType, &str, &str) {
        (self.edge_type, self.from_id.as_str(), self.to_id.as_str())
    }
}

/// Serialized form for export/import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// The graph itself. One instance per session; mutations are serialized
/// by the owner.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node count.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edge count.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by canonical id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes, unordered.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Nodes of one type, sorted by id for stable output.
    pub fn nodes_of_type(&self, node_type: EntityType) -> Vec<&Node> {
        let mut out: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Insert a node, or merge props into an existing one. Returns true
    /// when the node was newly created.
    pub fn upsert_node(&mut self, node: Node) -> bool {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                for (key, value) in node.props {
                    existing.props.insert(key, value);
                }
                false
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
                true
            }
        }
    }

    /// Add an edge. Both endpoints must already exist; a duplicate
    /// (type, from, to) triple merges props instead of inserting.
    /// Returns true when the edge was newly created.
    pub fn add_edge(&mut self, edge: Edge) -> HiveResult<bool> {
        if !self.nodes.contains_key(&edge.from_id) {
            return Err(HiveError::validation(format!(
                "Source node {} not found",
                edge.from_id
            )));
        }
        if !self.nodes.contains_key(&edge.to_id) {
            return Err(HiveError::validation(format!(
                "Target node {} not found",
                edge.to_id
            )));
        }

        if let Some(idx) = self
            .edges
            .iter()
            .position(|e| e.triple() == edge.triple())
        {
            for (key, value) in edge.props {
                self.edges[idx].props.insert(key, value);
            }
            return Ok(false);
        }

        let idx = self.edges.len();
        self.outgoing
            .entry(edge.from_id.clone())
            .or_default()
            .push(idx);
        self.incoming
            .entry(edge.to_id.clone())
            .or_default()
            .push(idx);
        self.edges.push(edge);
        Ok(true)
    }

    /// Outgoing edges of a type from a node. O(deg) via the index.
    pub fn outgoing_edges(&self, from_id: &str, edge_type: RelationType) -> Vec<&Edge> {
        self.outgoing
            .get(from_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&i| &self.edges[i])
                    .filter(|e| e.edge_type == edge_type)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Incoming edges of a type into a node. O(deg) via the index.
    pub fn incoming_edges(&self, to_id: &str, edge_type: RelationType) -> Vec<&Edge> {
        self.incoming
            .get(to_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&i| &self.edges[i])
                    .filter(|e| e.edge_type == edge_type)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes reachable over one outgoing hop of the given type.
    pub fn neighbors(&self, from_id: &str, edge_type: RelationType) -> Vec<&Node> {
        self.outgoing_edges(from_id, edge_type)
            .into_iter()
            .filter_map(|e| self.nodes.get(&e.to_id))
            .collect()
    }

    /// Export to the serialized document form.
    pub fn to_document(&self) -> GraphDocument {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        GraphDocument {
            nodes,
            edges: self.edges.clone(),
        }
    }

    /// Rebuild a graph from the serialized form. Edges referencing
    /// missing nodes fail with Validation, matching `add_edge`.
    pub fn from_document(doc: GraphDocument) -> HiveResult<Self> {
        let mut graph = Self::new();
        for node in doc.nodes {
            graph.upsert_node(node);
        }
        for edge in doc.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    /// Check the structural invariants: adjacency indexes consistent
    /// with the edge set, every endpoint present, no duplicate triples.
    pub fn check_invariants(&self) -> HiveResult<()> {
        let mut seen = std::collections::HashSet::new();
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from_id) || !self.nodes.contains_key(&edge.to_id) {
                return Err(HiveError::internal(format!(
                    "edge {:?} has a dangling endpoint",
                    edge.triple()
                )));
            }
            if !seen.insert((edge.edge_type, edge.from_id.clone(), edge.to_id.clone())) {
                return Err(HiveError::internal(format!(
                    "duplicate edge triple {:?}",
                    edge.triple()
                )));
            }
        }
        let indexed: usize = self.outgoing.values().map(Vec::len).sum();
        if indexed != self.edges.len() {
            return Err(HiveError::internal(
                "outgoing index out of sync with edge set",
            ));
        }
        let indexed: usize = self.incoming.values().map(Vec::len).sum();
        if indexed != self.edges.len() {
            return Err(HiveError::internal(
                "incoming index out of sync with edge set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_graph() {
        let graph = MemoryGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn test_upsert_merges_props() {
        let mut graph = MemoryGraph::new();
        assert!(graph.upsert_node(
            Node::new(EntityType::Service, "crm7").with_prop("name", json!("crm7"))
        ));
        assert!(!graph.upsert_node(
            Node::new(EntityType::Service, "crm7").with_prop("platform", json!("vercel"))
        ));

        let node = graph.node("svc:crm7").unwrap();
        assert_eq!(node.prop_str("name"), Some("crm7"));
        assert_eq!(node.prop_str("platform"), Some("vercel"));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_edge_requires_endpoints() {
        let mut graph = MemoryGraph::new();
        let err = graph
            .add_edge(Edge::new(
                RelationType::ServiceRequiresEnvvar,
                "svc:missing",
                "env:missing",
            ))
            .unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::Validation);
        assert!(err.message.contains("svc:missing not found"));
    }

    #[test]
    fn test_duplicate_edge_merges_props() {
        let mut graph = MemoryGraph::new();
        graph.upsert_node(Node::new(EntityType::Service, "crm7"));
        graph.upsert_node(Node::new(EntityType::EnvVar, "DB_URL"));

        assert!(graph
            .add_edge(Edge::new(
                RelationType::ServiceRequiresEnvvar,
                "svc:crm7",
                "env:DB_URL",
            ))
            .unwrap());
        assert!(!graph
            .add_edge(
                Edge::new(RelationType::ServiceRequiresEnvvar, "svc:crm7", "env:DB_URL")
                    .with_prop("source", json!("readme"))
            )
            .unwrap());

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.edges()[0].props.get("source"),
            Some(&json!("readme"))
        );
        graph.check_invariants().unwrap();
    }

    #[test]
    fn test_neighbors() {
        let mut graph = MemoryGraph::new();
        graph.upsert_node(Node::new(EntityType::Service, "crm7"));
        graph.upsert_node(Node::new(EntityType::EnvVar, "VAR1"));
        graph.upsert_node(Node::new(EntityType::EnvVar, "VAR2"));
        graph
            .add_edge(Edge::new(RelationType::ServiceRequiresEnvvar, "svc:crm7", "env:VAR1"))
            .unwrap();
        graph
            .add_edge(Edge::new(RelationType::ServiceRequiresEnvvar, "svc:crm7", "env:VAR2"))
            .unwrap();

        let neighbors = graph.neighbors("svc:crm7", RelationType::ServiceRequiresEnvvar);
        let ids: Vec<&str> = neighbors.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(neighbors.len(), 2);
        assert!(ids.contains(&"env:VAR1"));
        assert!(ids.contains(&"env:VAR2"));
    }

    #[test]
    fn test_incoming_index() {
        let mut graph = MemoryGraph::new();
        graph.upsert_node(Node::new(EntityType::Incident, "INC-100"));
        graph.upsert_node(Node::new(EntityType::Service, "crm7"));
        graph
            .add_edge(Edge::new(
                RelationType::IncidentImpactsService,
                "inc:INC-100",
                "svc:crm7",
            ))
            .unwrap();

        let incoming = graph.incoming_edges("svc:crm7", RelationType::IncidentImpactsService);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_id, "inc:INC-100");
    }

    #[test]
    fn test_document_round_trip() {
        let mut graph = MemoryGraph::new();
        graph.upsert_node(Node::new(EntityType::Service, "crm7").with_prop("name", json!("crm7")));
        graph.upsert_node(Node::new(EntityType::EnvVar, "DB_URL"));
        graph
            .add_edge(Edge::new(RelationType::ServiceRequiresEnvvar, "svc:crm7", "env:DB_URL"))
            .unwrap();

        let doc = graph.to_document();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.edges.len(), 1);

        let rebuilt = MemoryGraph::from_document(doc.clone()).unwrap();
        assert_eq!(rebuilt.node_count(), 2);
        assert_eq!(rebuilt.edge_count(), 1);
        assert_eq!(rebuilt.to_document().nodes, doc.nodes);
        assert_eq!(rebuilt.to_document().edges, doc.edges);
        rebuilt.check_invariants().unwrap();
    }

    #[test]
    fn test_invariants_hold_after_mutation_sequence() {
        let mut graph = MemoryGraph::new();
        for i in 0..5 {
            graph.upsert_node(Node::new(EntityType::Service, &format!("svc{}", i)));
            graph.upsert_node(Node::new(EntityType::EnvVar, &format!("VAR{}", i)));
        }
        for i in 0..5 {
            graph
                .add_edge(Edge::new(
                    RelationType::ServiceRequiresEnvvar,
                    format!("svc:svc{}", i),
                    format!("env:VAR{}", i),
                ))
                .unwrap();
        }
        // Duplicates must not change the count.
        for i in 0..5 {
            graph
                .add_edge(Edge::new(
                    RelationType::ServiceRequiresEnvvar,
                    format!("svc:svc{}", i),
                    format!("env:VAR{}", i),
                ))
                .unwrap();
        }
        assert_eq!(graph.edge_count(), 5);
        graph.check_invariants().unwrap();
    }
}
