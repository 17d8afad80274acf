use anyhow::{Context, Result};
use hive_core::Settings;
use hive_llm::ModelIntegrationLayer;
use hive_runtime::HeavyAnalysisService;
use std::sync::Arc;

pub async fn run(query: &str, agents: usize, detailed: bool, output: &str) -> Result<()> {
    let settings = Settings::from_env();
    let mil = Arc::new(
        ModelIntegrationLayer::from_settings(&settings)
            .context("failed to initialize the model gateway")?,
    );
    if !mil.has_providers() {
        tracing::warn!("no provider API keys configured; deterministic fallbacks will run");
    }

    let service = HeavyAnalysisService::new(mil);
    let result = service
        .execute(query, agents)
        .await
        .context("heavy analysis failed")?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("task:   {}", result.task_id);
    println!("status: {}", result.status);
    println!("agents: {}", result.num_agents);
    println!("time:   {:.2}s", result.execution_time);
    if detailed {
        println!();
        for agent in &result.agent_results {
            println!(
                "agent {} [{}] ({:.2}s)",
                agent.agent_id, agent.status, agent.execution_time
            );
            println!("  {}", agent.response.replace('\n', "\n  "));
        }
    }
    println!("\n{}", result.result);
    Ok(())
}
