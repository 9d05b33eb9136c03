use crawlpay_core::signature::SignatureVerifier;
use crawlpay_paywall::{
    gate::SignatureGate,
    negotiator::{Catalog, PaymentNegotiator},
    server::{ServerConfig, key_resolver_from_env, router},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().expect("Invalid CRAWLPAY_* server configuration");
    let resolver = key_resolver_from_env()
        .expect("Please set `CRAWLPAY_PUBLIC_KEY` or `CRAWLPAY_SIGNING_SEED` in environment variables");
    tracing::info!("Trusting crawler key {}", resolver.key_id);

    let gate = SignatureGate::builder()
        .verifier(SignatureVerifier::new(resolver, config.verifier.clone()))
        .config(config.gate.clone())
        .build();
    let negotiator = PaymentNegotiator::builder()
        .catalog(Catalog::demo())
        .build();

    let app = router(negotiator, gate).layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at {}://{}", config.gate.scheme, config.bind);
    axum::serve(listener, app).await.expect("Server failed");
}
