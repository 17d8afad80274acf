use anyhow::{anyhow, Context, Result};
use hive_core::Settings;
use hive_graph::{GraphStore, Ingestor, Planner, QueryType, SourceInfo};

/// Graphs live under the local storage path so sessions survive
/// between invocations.
async fn store(settings: &Settings) -> Result<GraphStore> {
    Ok(GraphStore::file(settings.storage_path.join("graphs")).await?)
}

pub async fn ingest(text: &str, session: &str, source: &str, output: &str) -> Result<()> {
    let settings = Settings::from_env();
    let store = store(&settings).await?;
    let mut graph = store.load(session).await?;

    let report = Ingestor::new()
        .ingest(&mut graph, text, &SourceInfo::new(source))
        .context("ingestion failed")?;
    store.save(session, &graph).await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "ingested: {} nodes created, {} edges created",
            report.nodes_created, report.edges_created
        );
        if !report.services.is_empty() {
            println!("services:  {}", report.services.join(", "));
        }
        if !report.envvars.is_empty() {
            println!("env vars:  {}", report.envvars.join(", "));
        }
        if !report.incidents.is_empty() {
            println!("incidents: {}", report.incidents.join(", "));
        }
    }
    Ok(())
}

pub async fn query(query: &str, session: &str, query_type: &str, output: &str) -> Result<()> {
    let settings = Settings::from_env();
    let store = store(&settings).await?;
    let graph = store.load(session).await?;

    let query_type = match query_type {
        "auto" => QueryType::Auto,
        "blocking_analysis" => QueryType::BlockingAnalysis,
        "missing_envvars" => QueryType::MissingEnvvars,
        "impact_analysis" => QueryType::ImpactAnalysis,
        "related_incidents" => QueryType::RelatedIncidents,
        other => return Err(anyhow!("unknown query type '{}'", other)),
    };

    let result = Planner::new().answer_query(&graph, query, query_type)?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.answer);
        for evidence in &result.evidence {
            println!("  - [{}] {}", evidence.evidence_type, evidence.description);
        }
    }
    Ok(())
}

pub async fn export(session: &str, _output: &str) -> Result<()> {
    let settings = Settings::from_env();
    let store = store(&settings).await?;
    let graph = store.load(session).await?;

    let doc = graph.to_document();
    let export = serde_json::json!({
        "metadata": {
            "session": session,
            "total_nodes": doc.nodes.len(),
            "total_edges": doc.edges.len(),
        },
        "nodes": doc.nodes,
        "edges": doc.edges,
    });
    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
