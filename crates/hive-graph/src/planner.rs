//! Planning queries over the memory graph
//!
//! The planner answers blocking/impact/missing-dependency questions by
//! multi-hop traversal. Every answer carries typed evidence with the
//! underlying node and edge ids, plus the list of graph operations
//! performed, so downstream consumers can audit the reasoning.

use hive_core::HiveResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::graph::{EntityType, MemoryGraph, RelationType};

/// Supported query classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Auto,
    BlockingAnalysis,
    MissingEnvvars,
    ImpactAnalysis,
    RelatedIncidents,
}

/// One piece of evidence backing an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Evidence class: missing_envvar, related_incident,
    /// impacted_service, not_found
    #[serde(rename = "type")]
    pub evidence_type: String,

    /// Human-readable explanation
    pub description: String,

    /// Env-var key, for missing_envvar items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Service name, for impacted_service items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Incident id, for related_incident items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,

    /// Underlying node ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<String>,

    /// Underlying edge descriptor, when one edge backs this item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<String>,
}

/// Planner answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerResult {
    pub query: String,
    pub query_type: QueryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    pub answer: String,
    pub evidence: Vec<Evidence>,
    /// Traversals performed, for traceability
    pub graph_operations: Vec<String>,
}

fn incident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bINC-\d+\b").expect("valid regex"))
}

/// Query planner over one graph instance.
#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Answer a query, auto-detecting the query type unless the caller
    /// pinned one.
    pub fn answer_query(
        &self,
        graph: &MemoryGraph,
        query: &str,
        query_type: QueryType,
    ) -> HiveResult<PlannerResult> {
        let resolved = match query_type {
            QueryType::Auto => detect_query_type(query),
            pinned => pinned,
        };
        tracing::debug!(query_type = ?resolved, "planning query");

        match resolved {
            QueryType::BlockingAnalysis => self.blocking_analysis(graph, query),
            QueryType::MissingEnvvars => self.missing_envvars(graph, query),
            QueryType::ImpactAnalysis => self.impact_analysis(graph, query),
            QueryType::RelatedIncidents => self.related_incidents(graph, query),
            QueryType::Auto => unreachable!("detection never returns Auto"),
        }
    }

    /// Missing env vars plus unresolved impacting incidents for one
    /// service.
    fn blocking_analysis(&self, graph: &MemoryGraph, query: &str) -> HiveResult<PlannerResult> {
        let mut ops = Vec::new();
        let service = match find_service(graph, query) {
            Some(service) => service,
            None => return Ok(unknown_service_result(query, QueryType::BlockingAnalysis)),
        };
        let service_id = EntityType::Service.node_id(&service);

        let mut evidence = collect_missing_envvars(graph, &service_id, &mut ops);
        evidence.extend(collect_unresolved_incidents(graph, &service_id, &mut ops));

        let answer = if evidence.is_empty() {
            format!("Nothing is currently blocking {}.", service)
        } else {
            let missing: Vec<&str> = evidence
                .iter()
                .filter(|e| e.evidence_type == "missing_envvar")
                .filter_map(|e| e.key.as_deref())
                .collect();
            let incidents: Vec<&str> = evidence
                .iter()
                .filter(|e| e.evidence_type == "related_incident")
                .filter_map(|e| e.incident_id.as_deref())
                .collect();
            let mut parts = Vec::new();
            if !missing.is_empty() {
                parts.push(format!("missing env vars: {}", missing.join(", ")));
            }
            if !incidents.is_empty() {
                parts.push(format!("open incidents: {}", incidents.join(", ")));
            }
            format!("{} is blocked by {}.", service, parts.join(" and "))
        };

        Ok(PlannerResult {
            query: query.to_string(),
            query_type: QueryType::BlockingAnalysis,
            service_name: Some(service),
            answer,
            evidence,
            graph_operations: ops,
        })
    }

    /// Required env vars with no value for one service.
    fn missing_envvars(&self, graph: &MemoryGraph, query: &str) -> HiveResult<PlannerResult> {
        let mut ops = Vec::new();
        let service = match find_service(graph, query) {
            Some(service) => service,
            None => return Ok(unknown_service_result(query, QueryType::MissingEnvvars)),
        };
        let service_id = EntityType::Service.node_id(&service);
        let evidence = collect_missing_envvars(graph, &service_id, &mut ops);

        let answer = if evidence.is_empty() {
            format!("All required env vars for {} have values.", service)
        } else {
            let keys: Vec<&str> = evidence.iter().filter_map(|e| e.key.as_deref()).collect();
            format!("{} is missing: {}.", service, keys.join(", "))
        };

        Ok(PlannerResult {
            query: query.to_string(),
            query_type: QueryType::MissingEnvvars,
            service_name: Some(service),
            answer,
            evidence,
            graph_operations: ops,
        })
    }

    /// Services reachable from an incident.
    fn impact_analysis(&self, graph: &MemoryGraph, query: &str) -> HiveResult<PlannerResult> {
        let mut ops = Vec::new();
        let incident = incident_re()
            .find(query)
            .map(|m| m.as_str().to_string())
            .or_else(|| {
                // No explicit id: fall back to the only known incident.
                let incidents = graph.nodes_of_type(EntityType::Incident);
                if incidents.len() == 1 {
                    incidents[0].prop_str("id").map(str::to_string)
                } else {
                    None
                }
            });

        let Some(incident) = incident else {
            return Ok(PlannerResult {
                query: query.to_string(),
                query_type: QueryType::ImpactAnalysis,
                service_name: None,
                answer: "No incident named in the query and none uniquely known.".to_string(),
                evidence: vec![Evidence {
                    evidence_type: "not_found".to_string(),
                    description: "no incident identified".to_string(),
                    key: None,
                    service_name: None,
                    incident_id: None,
                    node_ids: Vec::new(),
                    edge: None,
                }],
                graph_operations: Vec::new(),
            });
        };

        let incident_id = EntityType::Incident.node_id(&incident);
        ops.push(format!("outgoing({}, INCIDENT_IMPACTS_SERVICE)", incident_id));
        let mut evidence = Vec::new();
        for edge in graph.outgoing_edges(&incident_id, RelationType::IncidentImpactsService) {
            if let Some(node) = graph.node(&edge.to_id) {
                let name = node.prop_str("name").unwrap_or(&node.id).to_string();
                evidence.push(Evidence {
                    evidence_type: "impacted_service".to_string(),
                    description: format!("{} impacts {}", incident, name),
                    key: None,
                    service_name: Some(name),
                    incident_id: Some(incident.clone()),
                    node_ids: vec![edge.from_id.clone(), edge.to_id.clone()],
                    edge: Some(format!(
                        "INCIDENT_IMPACTS_SERVICE {} -> {}",
                        edge.from_id, edge.to_id
                    )),
                });
            }
        }

        let answer = if evidence.is_empty() {
            format!("{} impacts no known services.", incident)
        } else {
            let names: Vec<&str> = evidence
                .iter()
                .filter_map(|e| e.service_name.as_deref())
                .collect();
            format!("{} impacts: {}.", incident, names.join(", "))
        };

        Ok(PlannerResult {
            query: query.to_string(),
            query_type: QueryType::ImpactAnalysis,
            service_name: None,
            answer,
            evidence,
            graph_operations: ops,
        })
    }

    /// Incidents impacting any service that is currently blocking.
    fn related_incidents(&self, graph: &MemoryGraph, query: &str) -> HiveResult<PlannerResult> {
        let mut ops = Vec::new();
        let mut evidence = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for service in graph.nodes_of_type(EntityType::Service) {
            let mut probe_ops = Vec::new();
            let blocking = !collect_missing_envvars(graph, &service.id, &mut probe_ops).is_empty()
                || !collect_unresolved_incidents(graph, &service.id, &mut probe_ops).is_empty();
            ops.extend(probe_ops);
            if !blocking {
                continue;
            }
            for edge in graph.incoming_edges(&service.id, RelationType::IncidentImpactsService) {
                let Some(incident) = graph.node(&edge.from_id) else {
                    continue;
                };
                let id = incident.prop_str("id").unwrap_or(&incident.id).to_string();
                if !seen.insert(id.clone()) {
                    continue;
                }
                let service_name = service.prop_str("name").unwrap_or(&service.id).to_string();
                evidence.push(Evidence {
                    evidence_type: "related_incident".to_string(),
                    description: format!("{} impacts blocked service {}", id, service_name),
                    key: None,
                    service_name: Some(service_name),
                    incident_id: Some(id),
                    node_ids: vec![edge.from_id.clone(), edge.to_id.clone()],
                    edge: Some(format!(
                        "INCIDENT_IMPACTS_SERVICE {} -> {}",
                        edge.from_id, edge.to_id
                    )),
                });
            }
        }

        let answer = if evidence.is_empty() {
            "No incidents are related to currently blocked services.".to_string()
        } else {
            let ids: Vec<&str> = evidence
                .iter()
                .filter_map(|e| e.incident_id.as_deref())
                .collect();
            format!("Related incidents: {}.", ids.join(", "))
        };

        Ok(PlannerResult {
            query: query.to_string(),
            query_type: QueryType::RelatedIncidents,
            service_name: None,
            answer,
            evidence,
            graph_operations: ops,
        })
    }
}

/// Keyword-based query classification.
pub fn detect_query_type(query: &str) -> QueryType {
    let lowered = query.to_lowercase();
    if lowered.contains("blocking") || lowered.contains("blocked") {
        QueryType::BlockingAnalysis
    } else if lowered.contains("missing")
        && (lowered.contains("env") || lowered.contains("variable"))
    {
        QueryType::MissingEnvvars
    } else if lowered.contains("affected") || lowered.contains("impact") {
        QueryType::ImpactAnalysis
    } else if lowered.contains("incident") {
        QueryType::RelatedIncidents
    } else {
        QueryType::BlockingAnalysis
    }
}

/// Find the service the query talks about: the first known service
/// whose name appears in the text.
fn find_service(graph: &MemoryGraph, query: &str) -> Option<String> {
    let lowered = query.to_lowercase();
    graph
        .nodes_of_type(EntityType::Service)
        .into_iter()
        .filter_map(|n| n.prop_str("name"))
        .find(|name| lowered.contains(&name.to_lowercase()))
        .map(str::to_string)
}

fn unknown_service_result(query: &str, query_type: QueryType) -> PlannerResult {
    PlannerResult {
        query: query.to_string(),
        query_type,
        service_name: None,
        answer: "No known service matches this query.".to_string(),
        evidence: vec![Evidence {
            evidence_type: "not_found".to_string(),
            description: "the query names no service present in the graph".to_string(),
            key: None,
            service_name: None,
            incident_id: None,
            node_ids: Vec::new(),
            edge: None,
        }],
        graph_operations: Vec::new(),
    }
}

fn collect_missing_envvars(
    graph: &MemoryGraph,
    service_id: &str,
    ops: &mut Vec<String>,
) -> Vec<Evidence> {
    ops.push(format!("outgoing({}, SERVICE_REQUIRES_ENVVAR)", service_id));
    let mut out = Vec::new();
    for edge in graph.outgoing_edges(service_id, RelationType::ServiceRequiresEnvvar) {
        let Some(node) = graph.node(&edge.to_id) else {
            continue;
        };
        if node.prop_str("value").is_some() {
            continue; // value set; not missing
        }
        let key = node.prop_str("key").unwrap_or(&node.id).to_string();
        out.push(Evidence {
            evidence_type: "missing_envvar".to_string(),
            description: format!("required env var {} has no value", key),
            key: Some(key),
            service_name: None,
            incident_id: None,
            node_ids: vec![edge.from_id.clone(), edge.to_id.clone()],
            edge: Some(format!(
                "SERVICE_REQUIRES_ENVVAR {} -> {}",
                edge.from_id, edge.to_id
            )),
        });
    }
    out
}

fn collect_unresolved_incidents(
    graph: &MemoryGraph,
    service_id: &str,
    ops: &mut Vec<String>,
) -> Vec<Evidence> {
    ops.push(format!("incoming({}, INCIDENT_IMPACTS_SERVICE)", service_id));
    let mut out = Vec::new();
    for edge in graph.incoming_edges(service_id, RelationType::IncidentImpactsService) {
        let Some(incident) = graph.node(&edge.from_id) else {
            continue;
        };
        let resolved = incident
            .props
            .get("resolved")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if resolved {
            continue;
        }
        let id = incident.prop_str("id").unwrap_or(&incident.id).to_string();
        out.push(Evidence {
            evidence_type: "related_incident".to_string(),
            description: format!("unresolved incident {} impacts this service", id),
            key: None,
            service_name: None,
            incident_id: Some(id),
            node_ids: vec![edge.from_id.clone(), edge.to_id.clone()],
            edge: Some(format!(
                "INCIDENT_IMPACTS_SERVICE {} -> {}",
                edge.from_id, edge.to_id
            )),
        });
    }
    out
}
