//! Text ingestion: deterministic entity and relation extraction
//!
//! The ingestor recognizes service names, ALL_CAPS environment
//! variables, and `INC-<n>` incident ids, upserts nodes under canonical
//! ids, and applies sentence-scoped relation rules. Every node and edge
//! it touches is stamped with a `source_info` property.

use chrono::{DateTime, Utc};
use hive_core::HiveResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::graph::{Edge, EntityType, MemoryGraph, Node, RelationType};

/// Well-known service names recognized without structural hints.
const KNOWN_SERVICES: &[&str] = &[
    "crm7",
    "workforce-hub",
    "apprentice-tracker",
    "billing-engine",
    "auth-gateway",
];

fn envvar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Z0-9_]{2,}\b").expect("valid regex"))
}

fn incident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bINC-\d+\b").expect("valid regex"))
}

/// Compact service tokens like `crm7` (letters then digits).
fn compact_service_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-z]+\d+\b").expect("valid regex"))
}

/// Hyphenated lowercase tokens like `workforce-hub`.
fn hyphenated_service_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-z][a-z0-9]*(?:-[a-z0-9]+)+\b").expect("valid regex"))
}

/// The word right before "service" ("the crm7 service requires ...").
fn named_service_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([a-z][a-z0-9-]*)\s+service\b").expect("valid regex"))
}

fn requires_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(requires?|needs?|depends\s+on)\b").expect("valid regex"))
}

fn impact_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(affects?|affecting|impacts?|impacting|caused\s+by|due\s+to|outage|failure)\b",
        )
        .expect("valid regex")
    })
}

/// What one ingest call extracted and created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub nodes_created: usize,
    pub edges_created: usize,
    pub services: Vec<String>,
    pub envvars: Vec<String>,
    pub incidents: Vec<String>,
    /// Canonical ids of every node referenced by this fragment
    pub nodes: Vec<String>,
    /// `TYPE from -> to` descriptors for every edge referenced
    pub edges: Vec<String>,
}

/// Provenance stamped onto touched nodes and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl SourceInfo {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self::new("unattributed")
    }
}

/// Deterministic text-to-graph ingestor.
#[derive(Debug, Default)]
pub struct Ingestor;

impl Ingestor {
    pub fn new() -> Self {
        Self
    }

    /// Extract entities and relations from a text fragment into the
    /// graph.
    pub fn ingest(
        &self,
        graph: &mut MemoryGraph,
        text: &str,
        source: &SourceInfo,
    ) -> HiveResult<IngestReport> {
        let source_prop = json!({
            "source": source.source,
            "timestamp": source.timestamp.to_rfc3339(),
        });

        let incidents = extract_incidents(text);
        let envvars = extract_envvars(text);
        let services = extract_services(text, &envvars);

        let mut nodes_created = 0;
        let mut edges_created = 0;
        let mut node_ids = BTreeSet::new();

        for service in &services {
            let node = Node::new(EntityType::Service, service)
                .with_prop("name", json!(service))
                .with_prop("source_info", source_prop.clone());
            node_ids.insert(node.id.clone());
            if graph.upsert_node(node) {
                nodes_created += 1;
            }
        }
        for envvar in &envvars {
            let node = Node::new(EntityType::EnvVar, envvar)
                .with_prop("key", json!(envvar))
                .with_prop("source_info", source_prop.clone());
            node_ids.insert(node.id.clone());
            if graph.upsert_node(node) {
                nodes_created += 1;
            }
        }
        for incident in &incidents {
            let node = Node::new(EntityType::Incident, incident)
                .with_prop("id", json!(incident))
                .with_prop("source_info", source_prop.clone());
            node_ids.insert(node.id.clone());
            if graph.upsert_node(node) {
                nodes_created += 1;
            }
        }

        // Relation rules apply per sentence.
        let mut edge_descs = Vec::new();
        for sentence in split_sentences(text) {
            let sentence_envvars = extract_envvars(sentence);
            let sentence_incidents = extract_incidents(sentence);
            let sentence_services = extract_services(sentence, &sentence_envvars);

            if requires_re().is_match(sentence) {
                for service in &sentence_services {
                    for envvar in &sentence_envvars {
                        let edge = Edge::new(
                            RelationType::ServiceRequiresEnvvar,
                            EntityType::Service.node_id(service),
                            EntityType::EnvVar.node_id(envvar),
                        )
                        .with_prop("source_info", source_prop.clone());
                        edge_descs.push(describe_edge(&edge));
                        if graph.add_edge(edge)? {
                            edges_created += 1;
                        }
                    }
                }
            }

            if impact_verb_re().is_match(sentence) {
                for incident in &sentence_incidents {
                    for service in &sentence_services {
                        let edge = Edge::new(
                            RelationType::IncidentImpactsService,
                            EntityType::Incident.node_id(incident),
                            EntityType::Service.node_id(service),
                        )
                        .with_prop("source_info", source_prop.clone());
                        edge_descs.push(describe_edge(&edge));
                        if graph.add_edge(edge)? {
                            edges_created += 1;
                        }
                    }
                }
            }
        }

        tracing::debug!(
            services = services.len(),
            envvars = envvars.len(),
            incidents = incidents.len(),
            nodes_created,
            edges_created,
            "text fragment ingested"
        );

        Ok(IngestReport {
            nodes_created,
            edges_created,
            services,
            envvars,
            incidents,
            nodes: node_ids.into_iter().collect(),
            edges: edge_descs,
        })
    }
}

fn describe_edge(edge: &Edge) -> String {
    format!(
        "{} {} -> {}",
        serde_json::to_value(edge.edge_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        edge.from_id,
        edge.to_id
    )
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n']).filter(|s| !s.trim().is_empty())
}

fn extract_incidents(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in incident_re().find_iter(text) {
        let id = m.as_str().to_string();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

fn extract_envvars(text: &str) -> Vec<String> {
    // Spans claimed by incident ids are not env vars ("INC" would
    // otherwise match).
    let incident_spans: Vec<(usize, usize)> = incident_re()
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut out = Vec::new();
    for m in envvar_re().find_iter(text) {
        let overlaps = incident_spans
            .iter()
            .any(|&(start, end)| m.start() < end && start < m.end());
        if overlaps {
            continue;
        }
        let key = m.as_str().to_string();
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

fn extract_services(text: &str, envvars: &[String]) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.to_string();
        if !name.is_empty() && name != "service" && !out.contains(&name) {
            out.push(name);
        }
    };

    for known in KNOWN_SERVICES {
        if word_boundary_contains(&lowered, known) {
            push(known);
        }
    }
    for m in compact_service_re().find_iter(&lowered) {
        push(m.as_str());
    }
    for m in hyphenated_service_re().find_iter(&lowered) {
        push(m.as_str());
    }
    for cap in named_service_re().captures_iter(&lowered) {
        push(&cap[1]);
    }

    // Lowercased env vars and incident ids are not services.
    static INCIDENT_SHAPED: OnceLock<Regex> = OnceLock::new();
    let incident_shaped =
        INCIDENT_SHAPED.get_or_init(|| Regex::new(r"^inc-\d+$").expect("valid regex"));
    out.retain(|candidate| {
        !incident_shaped.is_match(candidate)
            && !envvars
                .iter()
                .any(|envvar| envvar.to_lowercase() == *candidate)
    });
    out
}

fn word_boundary_contains(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        let before_ok = idx == 0
            || !haystack[..idx]
                .chars()
                .next_back()
                .map(|c| c.is_alphanumeric() || c == '-')
                .unwrap_or(false);
        let after = idx + needle.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .map(|c| c.is_alphanumeric() || c == '-')
                .unwrap_or(false);
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest(graph: &mut MemoryGraph, text: &str) -> IngestReport {
        Ingestor::new()
            .ingest(graph, text, &SourceInfo::new("test"))
            .unwrap()
    }

    #[test]
    fn test_basic_extraction() {
        let mut graph = MemoryGraph::new();
        let report = ingest(&mut graph, "crm7 service requires SUPABASE_URL and REDIS_URL");

        assert!(report.services.contains(&"crm7".to_string()));
        assert!(report.envvars.contains(&"SUPABASE_URL".to_string()));
        assert!(report.envvars.contains(&"REDIS_URL".to_string()));
        assert!(report.nodes_created >= 3);
        assert!(report.edges_created >= 2);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn test_incident_extraction() {
        let mut graph = MemoryGraph::new();
        let report = ingest(&mut graph, "Incident INC-101 caused by missing environment variable");

        assert!(report.incidents.contains(&"INC-101".to_string()));
        assert!(graph.node("inc:INC-101").is_some());
        // "INC" must not leak in as an env var, nor "inc-101" as a service.
        assert!(report.envvars.is_empty());
        assert!(report.services.is_empty());
    }

    #[test]
    fn test_capitalized_words_are_not_envvars() {
        let mut graph = MemoryGraph::new();
        let report = ingest(&mut graph, "crm7 on Vercel requires SUPABASE_URL");
        assert_eq!(report.envvars, vec!["SUPABASE_URL".to_string()]);
    }

    #[test]
    fn test_relationship_extraction_across_fragments() {
        let mut graph = MemoryGraph::new();
        ingest(&mut graph, "crm7 service requires DATABASE_URL");
        ingest(&mut graph, "Incident INC-100 affects crm7 service");

        let required = graph.neighbors("svc:crm7", RelationType::ServiceRequiresEnvvar);
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].id, "env:DATABASE_URL");

        let impacts: Vec<_> = graph
            .edges()
            .iter()
            .filter(|e| e.edge_type == RelationType::IncidentImpactsService)
            .collect();
        assert_eq!(impacts.len(), 1);
        assert_eq!(impacts[0].from_id, "inc:INC-100");
        assert_eq!(impacts[0].to_id, "svc:crm7");
    }

    #[test]
    fn test_hyphenated_service_names() {
        let mut graph = MemoryGraph::new();
        let report = ingest(&mut graph, "workforce-hub depends on REDIS_URL and AUTH_SECRET");

        assert!(report.services.contains(&"workforce-hub".to_string()));
        let required = graph.neighbors("svc:workforce-hub", RelationType::ServiceRequiresEnvvar);
        assert_eq!(required.len(), 2);
    }

    #[test]
    fn test_source_info_is_stamped() {
        let mut graph = MemoryGraph::new();
        Ingestor::new()
            .ingest(
                &mut graph,
                "crm7 requires DB_URL",
                &SourceInfo::new("readme"),
            )
            .unwrap();

        let node = graph.node("svc:crm7").unwrap();
        let info = node.props.get("source_info").unwrap();
        assert_eq!(info.get("source").and_then(|v| v.as_str()), Some("readme"));
        assert!(info.get("timestamp").is_some());

        let edge = &graph.edges()[0];
        assert!(edge.props.contains_key("source_info"));
    }

    #[test]
    fn test_relations_are_sentence_scoped() {
        let mut graph = MemoryGraph::new();
        // The env var in the second sentence must not link to crm7.
        ingest(
            &mut graph,
            "crm7 requires DB_URL. unrelated-svc needs STRIPE_KEY",
        );

        let crm7_deps = graph.neighbors("svc:crm7", RelationType::ServiceRequiresEnvvar);
        assert_eq!(crm7_deps.len(), 1);
        assert_eq!(crm7_deps[0].id, "env:DB_URL");
    }

    #[test]
    fn test_reingest_is_idempotent_on_edges() {
        let mut graph = MemoryGraph::new();
        let first = ingest(&mut graph, "crm7 requires DB_URL");
        let second = ingest(&mut graph, "crm7 requires DB_URL");

        assert!(first.edges_created >= 1);
        assert_eq!(second.edges_created, 0);
        assert_eq!(second.nodes_created, 0);
        assert_eq!(graph.edge_count(), first.edges_created);
    }
}
