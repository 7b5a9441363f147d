//! Ask the configured provider chain whether a chart upgrade is safe
//!
//! Loads the given helmcheck YAML file, or falls back to a single OpenAI
//! provider reading `OPENAI_API_KEY`, then streams one analysis.
//!
//! Run with: cargo run --example analyze_chart -- [config.yaml]

use helmcheck_ai::config;
use helmcheck_ai::protocol::HelmChartInfo;
use helmcheck_ai::{
    AnalysisContext, AnalysisType, Context, Provider, ProviderChain, ProviderRegistry, Request,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let loaded = match std::env::args().nth(1) {
        Some(path) => config::load_from_yaml(path)?,
        None => config::default_config(),
    };
    let chain = ProviderChain::from_config(&loaded.ai, &ProviderRegistry::with_defaults())?;
    println!("providers: {}", chain.provider_names().join(" -> "));

    let request = Request::new("Is it safe to upgrade cert-manager to the latest release?")
        .with_type(AnalysisType::RiskAssessment)
        .with_context(AnalysisContext {
            helm_charts: vec![HelmChartInfo {
                name: "cert-manager".to_string(),
                version: "1.12.3".to_string(),
                latest_version: Some("1.14.4".to_string()),
                ..Default::default()
            }],
            constraints: vec!["no downtime for ingress certificates".to_string()],
            ..Default::default()
        });

    let ctx = Context::with_timeout(Duration::from_secs(120));
    let mut stream = chain.analyze_stream(&ctx, &request).await?;
    while let Some(chunk) = stream.recv().await {
        if let Some(error) = chunk.error {
            eprintln!("\nstream failed: {}", error);
            break;
        }
        print!("{}", chunk.content);
        if chunk.done {
            println!();
            break;
        }
    }

    let usage = chain.metrics().snapshot();
    println!(
        "requests: {} | tokens: {} | cost: ${:.4}",
        usage.total_requests, usage.tokens_used, usage.total_cost
    );
    chain.close().await?;
    Ok(())
}
