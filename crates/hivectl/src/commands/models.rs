use anyhow::{Context, Result};
use hive_core::{ModelFilter, Settings};
use hive_llm::ModelIntegrationLayer;

pub async fn list(provider: Option<&str>, output: &str) -> Result<()> {
    let settings = Settings::from_env();
    let mil = ModelIntegrationLayer::from_settings(&settings)
        .context("failed to initialize the model gateway")?;

    let filter = ModelFilter {
        provider: provider.map(str::to_string),
        ..Default::default()
    };
    let models = mil.list_models(&filter);

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!(
        "{:<42} {:>10} {:>8} {:>8}  {}",
        "MODEL", "CONTEXT", "$IN/M", "$OUT/M", "CAPABILITIES"
    );
    for model in models {
        let capabilities = model
            .capabilities
            .iter()
            .map(|c| format!("{:?}", c))
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<42} {:>10} {:>8.2} {:>8.2}  {}",
            model.qualified_id(),
            model.context_window,
            model.input_cost_per_million_tokens,
            model.output_cost_per_million_tokens,
            capabilities
        );
    }
    Ok(())
}
