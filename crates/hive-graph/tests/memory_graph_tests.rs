//! End-to-end memory graph scenarios: ingest free text, then answer
//! planning queries with evidence.

use hive_graph::{Ingestor, MemoryGraph, Planner, QueryType, SourceInfo};

fn ingest(graph: &mut MemoryGraph, text: &str, source: &str) {
    Ingestor::new()
        .ingest(graph, text, &SourceInfo::new(source))
        .unwrap();
}

#[test]
fn test_crm7_blocking_analysis_scenario() {
    let mut graph = MemoryGraph::new();

    ingest(
        &mut graph,
        "crm7 on Vercel requires SUPABASE_URL, SUPABASE_ANON_KEY",
        "readme",
    );
    ingest(
        &mut graph,
        "Incident INC-101 caused by missing SUPABASE_URL affects crm7 deployment",
        "incident_log",
    );
    graph.check_invariants().unwrap();

    let result = Planner::new()
        .answer_query(&graph, "What's blocking crm7 rollout?", QueryType::Auto)
        .unwrap();

    assert_eq!(result.query_type, QueryType::BlockingAnalysis);
    assert_eq!(result.service_name.as_deref(), Some("crm7"));

    // The answer mentions both the missing env vars and the incident.
    assert!(result.answer.contains("SUPABASE_URL"));
    assert!(result.answer.contains("INC-101"));

    let missing: Vec<&str> = result
        .evidence
        .iter()
        .filter(|e| e.evidence_type == "missing_envvar")
        .filter_map(|e| e.key.as_deref())
        .collect();
    assert!(missing.contains(&"SUPABASE_URL"));
    assert!(missing.contains(&"SUPABASE_ANON_KEY"));

    let incidents: Vec<&str> = result
        .evidence
        .iter()
        .filter(|e| e.evidence_type == "related_incident")
        .filter_map(|e| e.incident_id.as_deref())
        .collect();
    assert_eq!(incidents, vec!["INC-101"]);
}

#[test]
fn test_multi_service_environment() {
    let mut graph = MemoryGraph::new();
    let fragments = [
        "workforce-hub service depends on REDIS_URL and AUTH_SECRET",
        "apprentice-tracker requires DATABASE_URL, STRIPE_KEY, and SENDGRID_API_KEY",
        "INC-200 outage affecting workforce-hub due to Redis connection timeout",
        "INC-201 payment processing failure in apprentice-tracker missing STRIPE_KEY",
    ];
    for (idx, fragment) in fragments.iter().enumerate() {
        ingest(&mut graph, fragment, &format!("scenario_{}", idx + 1));
    }
    graph.check_invariants().unwrap();

    // Impact of one incident.
    let result = Planner::new()
        .answer_query(
            &graph,
            "What services are affected by INC-200?",
            QueryType::ImpactAnalysis,
        )
        .unwrap();
    let impacted: Vec<&str> = result
        .evidence
        .iter()
        .filter_map(|e| e.service_name.as_deref())
        .collect();
    assert_eq!(impacted, vec!["workforce-hub"]);

    // Both incidents hit services that are blocked on something.
    let related = Planner::new()
        .answer_query(&graph, "Which incidents are related?", QueryType::Auto)
        .unwrap();
    let ids: Vec<&str> = related
        .evidence
        .iter()
        .filter_map(|e| e.incident_id.as_deref())
        .collect();
    assert!(ids.contains(&"INC-200"));
    assert!(ids.contains(&"INC-201"));
}

#[test]
fn test_unknown_service_query_is_graceful() {
    let mut graph = MemoryGraph::new();
    ingest(&mut graph, "crm7 requires DB_URL", "readme");

    let result = Planner::new()
        .answer_query(
            &graph,
            "What's blocking totally-unknown-service?",
            QueryType::Auto,
        )
        .unwrap();
    assert_eq!(result.evidence.len(), 1);
    assert_eq!(result.evidence[0].evidence_type, "not_found");
}

#[test]
fn test_export_round_trip_preserves_canonical_graphs() {
    let mut graph = MemoryGraph::new();
    ingest(
        &mut graph,
        "crm7 requires SUPABASE_URL. Incident INC-1 affects crm7",
        "readme",
    );

    let doc = graph.to_document();
    let rebuilt = MemoryGraph::from_document(doc.clone()).unwrap();
    let doc2 = rebuilt.to_document();

    assert_eq!(doc.nodes, doc2.nodes);
    assert_eq!(doc.edges, doc2.edges);
}
