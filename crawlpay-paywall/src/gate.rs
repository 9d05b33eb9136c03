//! HTTP signature gate in front of every content server route.
//!
//! For details, see the [`SignatureGate`] struct documentation.

use std::sync::Arc;

use bon::Builder;
use crawlpay_core::{
    keys::KeyResolver,
    signature::{SignatureVerifier, VerifyError},
};
use http::{Request, Response, header::HOST};

use crate::{errors::ErrorResponse, processor::RequestProcessor};

/// Gate configuration options.
#[derive(Builder, Debug, Clone)]
pub struct GateConfig {
    /// Scheme the server is reached with, used to rebuild `@target-uri`.
    #[builder(default = "http".to_string(), into)]
    pub scheme: String,
    /// Fixed public authority. The request's `Host` header is used otherwise.
    #[builder(into)]
    pub authority: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig::builder().build()
    }
}

/// Rejects any request whose detached signature does not verify.
///
/// Every failure produces the same `401 Unauthorized` answer; the reason is
/// only logged. Accepted requests carry their
/// [`VerifiedSignature`](crawlpay_core::signature::VerifiedSignature) in the
/// request extensions.
///
/// ## Step-by-Step API
///
/// [`handle_request`](SignatureGate::handle_request) chains:
///
/// 1. **Process Request** ([`process_request`](SignatureGate::process_request)): rebuilds the
///    absolute request URL, creating a [`RequestProcessor`].
/// 2. **Verify** ([`RequestProcessor::verify`]): runs the signature verifier.
/// 3. **Run Handler** ([`RequestProcessor::run_handler`]): executes the resource handler.
#[derive(Builder)]
pub struct SignatureGate<R: KeyResolver> {
    #[builder(into)]
    pub verifier: Arc<SignatureVerifier<R>>,
    #[builder(default)]
    pub config: GateConfig,
}

impl<R: KeyResolver> Clone for SignatureGate<R> {
    fn clone(&self) -> Self {
        SignatureGate {
            verifier: self.verifier.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: KeyResolver> std::fmt::Debug for SignatureGate<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: KeyResolver> SignatureGate<R> {
    /// Entrypoint of the gate.
    ///
    /// Returns a [`RequestProcessor`] holding the rebuilt target URI.
    pub fn process_request<Req>(
        &self,
        request: Request<Req>,
    ) -> Result<RequestProcessor<'_, R, Req>, ErrorResponse> {
        let target_uri = self.target_uri(&request)?;
        Ok(RequestProcessor {
            gate: self,
            request,
            target_uri,
            verified: None,
        })
    }

    /// Standard flow: **process**, **verify**, then **run** the handler.
    pub async fn handle_request<Fun, Fut, Req, Res>(
        &self,
        request: Request<Req>,
        handler: Fun,
    ) -> Result<Response<Res>, ErrorResponse>
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Response<Res>>,
    {
        let response = self
            .process_request(request)?
            .verify()?
            .run_handler(handler)
            .await;

        Ok(response)
    }

    /// Absolute URL of a request as the client addressed it.
    ///
    /// Servers mostly see origin-form targets (`/content/a?x=1`), so the
    /// scheme comes from configuration and the authority from `Host`.
    pub fn target_uri<Req>(&self, request: &Request<Req>) -> Result<String, ErrorResponse> {
        let uri = request.uri();
        if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
            let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            return Ok(format!("{scheme}://{authority}{path}"));
        }

        let authority = match &self.config.authority {
            Some(authority) => authority.as_str(),
            None => request
                .headers()
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| {
                    self.rejected(&VerifyError::Parse(
                        "cannot rebuild target URI without a Host header".to_string(),
                    ))
                })?,
        };
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        Ok(format!("{}://{authority}{path}", self.config.scheme))
    }

    /// Log a verification failure and produce the uniform rejection.
    pub fn rejected(&self, err: &VerifyError) -> ErrorResponse {
        #[cfg(feature = "tracing")]
        tracing::warn!("Request rejected: kind='{}', reason='{err}'", err.kind());
        #[cfg(not(feature = "tracing"))]
        let _ = err;

        ErrorResponse::unauthorized()
    }
}
