//! Axum router for the content server.
//!
//! | Route | Behavior |
//! |---|---|
//! | `GET /resources` | catalog listing |
//! | `GET /content/{id}` | `200` page, `402` with payment terms, or `404` |
//! | `POST /settle` | settlement receipt, or `400` for a malformed claim |
//!
//! Every route sits behind the [`SignatureGate`].

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
};
use bon::Builder;
use crawlpay_core::{
    keys::{KeyError, KeyMaterial, KeyResolver, StaticKeyResolver, verifying_key_from_base64},
    listing::ResourceListing,
    payment::{PaymentOffer, SettlementReceipt},
    signature::{VerifiedSignature, VerifierConfig},
};
use serde_json::{Value, json};

use crate::{
    errors::ErrorResponse,
    gate::{GateConfig, SignatureGate},
    negotiator::PaymentNegotiator,
};

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Invalid or missing server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("No verification key configured; set CRAWLPAY_PUBLIC_KEY or CRAWLPAY_SIGNING_SEED")]
    MissingKey,
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// Content server configuration.
#[derive(Builder, Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    #[builder(default)]
    pub gate: GateConfig,
    #[builder(default)]
    pub verifier: VerifierConfig,
}

fn env_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|v| {
            v.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
                name,
                reason: err.to_string(),
            })
        })
        .transpose()
}

impl ServerConfig {
    /// Read configuration from `CRAWLPAY_*` environment variables.
    ///
    /// - `CRAWLPAY_BIND` (default `127.0.0.1:8787`)
    /// - `CRAWLPAY_SCHEME` (default `http`)
    /// - `CRAWLPAY_PUBLIC_AUTHORITY` (default: the request's `Host`)
    /// - `CRAWLPAY_CLOCK_SKEW_SECS` (default 60)
    /// - `CRAWLPAY_MAX_AGE_SECS` (default unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind = match parse_env::<SocketAddr>("CRAWLPAY_BIND")? {
            Some(bind) => bind,
            None => DEFAULT_BIND.parse().map_err(|_| ConfigError::Invalid {
                name: "CRAWLPAY_BIND",
                reason: format!("bad default {DEFAULT_BIND}"),
            })?,
        };

        let gate = GateConfig::builder()
            .scheme(env_var("CRAWLPAY_SCHEME").unwrap_or_else(|| "http".to_string()))
            .maybe_authority(env_var("CRAWLPAY_PUBLIC_AUTHORITY"))
            .build();

        let verifier = VerifierConfig::builder()
            .maybe_clock_skew_secs(parse_env("CRAWLPAY_CLOCK_SKEW_SECS")?)
            .maybe_max_age_secs(parse_env("CRAWLPAY_MAX_AGE_SECS")?)
            .build();

        Ok(ServerConfig::builder()
            .bind(bind)
            .gate(gate)
            .verifier(verifier)
            .build())
    }
}

/// The single crawler key this deployment trusts.
///
/// `CRAWLPAY_PUBLIC_KEY` holds a base64 Ed25519 public key, with an optional
/// `CRAWLPAY_KEY_ID`. Without it, the public half of `CRAWLPAY_SIGNING_SEED`
/// is used, which keeps a single-machine testbed to one variable.
pub fn key_resolver_from_env() -> Result<StaticKeyResolver, ConfigError> {
    if let Some(public) = env_var("CRAWLPAY_PUBLIC_KEY") {
        let key = verifying_key_from_base64(&public)?;
        let key_id = env_var("CRAWLPAY_KEY_ID")
            .unwrap_or_else(|| crawlpay_core::keys::jwk_thumbprint(&key));
        return Ok(StaticKeyResolver::new(key_id, key));
    }

    let seed = env_var("CRAWLPAY_SIGNING_SEED").ok_or(ConfigError::MissingKey)?;
    let mut material = KeyMaterial::from_seed_base64(&seed)?;
    if let Some(key_id) = env_var("CRAWLPAY_KEY_ID") {
        material = material.with_key_id(key_id);
    }
    Ok(StaticKeyResolver::from(&material))
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub negotiator: Arc<PaymentNegotiator>,
}

/// Build the content server router with every route behind `gate`.
pub fn router<R>(negotiator: PaymentNegotiator, gate: SignatureGate<R>) -> Router
where
    R: KeyResolver + Send + Sync + 'static,
{
    let state = AppState {
        negotiator: Arc::new(negotiator),
    };

    Router::new()
        .route("/resources", get(list_resources))
        .route("/content/{id}", get(get_content))
        .route("/settle", post(settle))
        .layer(gate)
        .with_state(state)
}

async fn list_resources(State(state): State<AppState>) -> Json<ResourceListing> {
    Json(state.negotiator.catalog.listing())
}

async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(verified): Extension<VerifiedSignature>,
) -> Result<Json<Value>, ErrorResponse> {
    let (entry, offer) = state
        .negotiator
        .offer_for(&id)
        .ok_or_else(|| ErrorResponse::not_found(format!("resource '{id}'")))?;

    match offer {
        PaymentOffer::NotRequired => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Serving free resource: id='{id}', keyid='{}'", verified.key_id);

            Ok(Json(json!({
                "id": entry.id,
                "title": entry.title,
                "content": entry.content,
                "crawler": verified.key_id,
            })))
        }
        offer => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Payment required: id='{id}', keyid='{}'", verified.key_id);

            Err(ErrorResponse::payment_required(&offer))
        }
    }
}

async fn settle(
    State(state): State<AppState>,
    Extension(verified): Extension<VerifiedSignature>,
    body: Bytes,
) -> Result<Json<SettlementReceipt>, ErrorResponse> {
    let receipt = state.negotiator.settle_json(&body).map_err(|err| {
        #[cfg(feature = "tracing")]
        tracing::info!("Settlement rejected: keyid='{}', reason='{err}'", verified.key_id);

        ErrorResponse::settlement_failed(err)
    })?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Settled: keyid='{}', transaction='{}', amount={} {}",
        verified.key_id,
        receipt.transaction_id,
        receipt.amount,
        receipt.currency
    );
    #[cfg(not(feature = "tracing"))]
    let _ = verified;

    Ok(Json(receipt))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use crawlpay_core::{
        payment::{SettlementRequest, SettlementResponse},
        signature::{ComposerConfig, SignatureComposer, SignatureVerifier},
    };
    use http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header::CONTENT_TYPE};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::negotiator::Catalog;

    use super::*;

    const HOST: &str = "testbed.local";

    fn key() -> KeyMaterial {
        KeyMaterial::from_seed(&[9u8; 32])
    }

    fn app() -> Router {
        let gate = SignatureGate::builder()
            .verifier(SignatureVerifier::new(
                StaticKeyResolver::from(&key()),
                VerifierConfig::default(),
            ))
            .build();
        router(
            PaymentNegotiator::builder().catalog(Catalog::demo()).build(),
            gate,
        )
    }

    fn signed(method: Method, path: &str, headers: HeaderMap, body: Body) -> Request<Body> {
        let composer = SignatureComposer::new(key(), ComposerConfig::default());
        let signed = composer
            .compose(&method, &format!("http://{HOST}{path}"), &headers)
            .unwrap();

        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header("host", HOST)
            .body(body)
            .unwrap();
        request.headers_mut().extend(headers);
        signed.apply(request.headers_mut()).unwrap();
        request
    }

    fn signed_get(path: &str) -> Request<Body> {
        signed(Method::GET, path, HeaderMap::new(), Body::empty())
    }

    fn signed_settle(body: &Value) -> Request<Body> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        signed(
            Method::POST,
            "/settle",
            headers,
            Body::from(body.to_string()),
        )
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_listing() {
        let response = app().oneshot(signed_get("/resources")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let listing: ResourceListing = serde_json::from_value(json_body(response).await).unwrap();
        let ids: Vec<_> = listing.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["public-notes", "premium-report", "daily-digest"]);
        assert_eq!(listing.resources[0].url, "/content/public-notes");
    }

    #[tokio::test]
    async fn test_unsigned_requests_are_rejected_uniformly() {
        let unsigned = |method: Method, path: &str| {
            Request::builder()
                .method(method)
                .uri(path)
                .header("host", HOST)
                .body(Body::empty())
                .unwrap()
        };

        for request in [
            unsigned(Method::GET, "/resources"),
            unsigned(Method::GET, "/content/public-notes"),
            unsigned(Method::POST, "/settle"),
            // Signed, but for another path
            {
                let mut request = signed_get("/content/public-notes");
                *request.uri_mut() = "/content/daily-digest".parse().unwrap();
                request
            },
        ] {
            let response = app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(response).await, json!({ "error": "unauthorized" }));
        }
    }

    #[tokio::test]
    async fn test_content_by_tier() {
        let response = app()
            .oneshot(signed_get("/content/public-notes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("payment-required").is_none());
        let body = json_body(response).await;
        assert_eq!(body["id"], "public-notes");
        assert_eq!(body["crawler"], key().key_id());

        let response = app()
            .oneshot(signed_get("/content/daily-digest"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(response.headers().get("payment-required").unwrap(), "true");
        assert_eq!(response.headers().get("payment-required-amount").unwrap(), "10");
        assert_eq!(response.headers().get("payment-required-currency").unwrap(), "USD");
        assert_eq!(
            json_body(response).await,
            json!({
                "required": true,
                "amount": 10,
                "currency": "USD",
                "description": "Standard crawl license"
            })
        );

        let response = app()
            .oneshot(signed_get("/content/premium-report"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(response.headers().get("payment-required-amount").unwrap(), "1000");

        let response = app().oneshot(signed_get("/content/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settle() {
        let offer = PaymentNegotiator::default().offer(crate::negotiator::OfferTier::Affordable);
        let claim = SettlementRequest::for_terms(offer.terms().unwrap(), "crawler-1");

        let response = app()
            .oneshot(signed_settle(&serde_json::to_value(&claim).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let receipt = serde_json::from_value::<SettlementResponse>(json_body(response).await)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(receipt.amount, claim.amount);
        assert_eq!(receipt.currency, claim.currency);
        assert_eq!(receipt.description, claim.description);
    }

    #[tokio::test]
    async fn test_settle_malformed() {
        let response = app()
            .oneshot(signed_settle(&json!({ "amount": "ten" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Malformed"));
    }
}
