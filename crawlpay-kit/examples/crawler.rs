use crawlpay_core::signature::{ComposerConfig, SignatureComposer};
use crawlpay_kit::{
    client::{SettlementClient, SignedClient},
    config::{CrawlerConfig, signing_key_from_env},
    decision::PaymentDecisionEngine,
    orchestrator::CrawlOrchestrator,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CrawlerConfig::from_env().expect("Invalid CRAWLPAY_* crawler configuration");
    let key = signing_key_from_env().expect(
        "Please set `CRAWLPAY_SIGNING_SEED` or `CRAWLPAY_SIGNING_KEY_PEM` in environment variables",
    );
    tracing::info!("Signing as {} with key {}", config.crawler_id, key.key_id());

    let composer = SignatureComposer::new(
        key,
        ComposerConfig::builder()
            .validity_secs(config.validity_secs)
            .build(),
    );
    let client = SignedClient::new(composer);

    let engine = PaymentDecisionEngine::builder()
        .settler(SettlementClient::new(
            client.clone(),
            config.settle_url.clone(),
        ))
        .policy(config.budget())
        .crawler_id(config.crawler_id.clone())
        .build();

    let orchestrator = CrawlOrchestrator::new(client, engine, config.listing_url.clone());
    let report = orchestrator.run().await.expect("Failed to fetch resource listing");

    for resource in &report.resources {
        println!(
            "{}",
            serde_json::to_string(resource).expect("Failed to serialize report")
        );
    }
    tracing::info!("Summary: {}", report.summary());
}
