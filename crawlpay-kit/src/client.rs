//! Signed HTTP client for the crawler.
//!
//! Every outgoing request gets a fresh signature; nothing is ever re-sent with
//! an old one.

use std::sync::Arc;

use crawlpay_core::{
    errors::Error as EncodingError,
    listing::ResourceListing,
    payment::{
        OfferError, PAYMENT_REQUIRED, PaymentOffer, SettlementFailure, SettlementRequest,
        SettlementResponse,
    },
    signature::{SignError, SignatureComposer},
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header::CONTENT_TYPE};
use url::Url;

/// A request could not be sent or its response could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to sign request: {0}")]
    Sign(#[from] SignError),
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: StatusCode, url: String },
    #[error("Invalid payment terms: {0}")]
    Offer(#[from] OfferError),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] EncodingError),
    #[error("Invalid resource URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A resource response the crawler can act on.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub url: Url,
    pub status: StatusCode,
    /// Payment terms attached to the response, if any.
    pub offer: PaymentOffer,
    pub body: String,
}

/// Reads resources with signed requests.
pub trait Fetcher {
    /// Fetch the resource listing.
    fn listing(&self, url: &Url) -> impl Future<Output = Result<ResourceListing, TransportError>>;

    /// Fetch one resource.
    ///
    /// Successful and `402 Payment Required` responses are returned; any other
    /// status is a [`TransportError::UnexpectedStatus`].
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedResource, TransportError>>;
}

/// Submits settlement claims.
pub trait Settler {
    /// Submit a claim.
    ///
    /// A refusal by the server is an `Ok(SettlementResponse::Failed)`; only
    /// failures to reach or understand the server are errors.
    fn settle(
        &self,
        request: &SettlementRequest,
    ) -> impl Future<Output = Result<SettlementResponse, TransportError>>;
}

/// A reqwest client that signs each request with one [`SignatureComposer`].
#[derive(Debug, Clone)]
pub struct SignedClient {
    pub client: reqwest::Client,
    pub composer: Arc<SignatureComposer>,
    /// Headers sent, and covered by the signature, on every request.
    pub headers: HeaderMap,
}

impl SignedClient {
    pub fn new(composer: SignatureComposer) -> Self {
        SignedClient {
            client: reqwest::Client::new(),
            composer: Arc::new(composer),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.headers.insert(key, value.to_owned());
        self
    }

    /// Build a request carrying `Signature` and `Signature-Input` for this exact
    /// method, URL and header set.
    pub fn signed_request(
        &self,
        method: Method,
        url: &Url,
        extra: HeaderMap,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let mut headers = self.headers.clone();
        headers.extend(extra);

        let signed = self.composer.compose(&method, url.as_str(), &headers)?;
        signed.apply(&mut headers)?;

        #[cfg(feature = "tracing")]
        tracing::trace!("Signed {method} {url}: keyid='{}'", self.composer.key().key_id());

        Ok(self.client.request(method, url.clone()).headers(headers))
    }
}

impl Fetcher for SignedClient {
    async fn listing(&self, url: &Url) -> Result<ResourceListing, TransportError> {
        let response = self
            .signed_request(Method::GET, url, HeaderMap::new())?
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::UnexpectedStatus {
                status,
                url: url.to_string(),
            });
        }

        Ok(response.json().await?)
    }

    async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError> {
        let response = self
            .signed_request(Method::GET, url, HeaderMap::new())?
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::PAYMENT_REQUIRED {
            return Err(TransportError::UnexpectedStatus {
                status,
                url: url.to_string(),
            });
        }

        let offer = PaymentOffer::from_headers(response.headers())?;
        if status == StatusCode::PAYMENT_REQUIRED && !offer.is_required() {
            return Err(OfferError::Missing(PAYMENT_REQUIRED).into());
        }
        let body = response.text().await?;

        Ok(FetchedResource {
            url: url.clone(),
            status,
            offer,
            body,
        })
    }
}

/// Posts settlement claims to one endpoint through a [`SignedClient`].
#[derive(Debug, Clone)]
pub struct SettlementClient {
    pub client: SignedClient,
    pub url: Url,
}

impl SettlementClient {
    pub fn new(client: SignedClient, url: Url) -> Self {
        SettlementClient { client, url }
    }
}

impl Settler for SettlementClient {
    async fn settle(
        &self,
        request: &SettlementRequest,
    ) -> Result<SettlementResponse, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .signed_request(Method::POST, &self.url, headers)?
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::UnexpectedStatus {
                status,
                url: self.url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        match SettlementResponse::from_slice(&bytes) {
            Ok(settlement) => Ok(settlement),
            // The gate answers refusals with its own generic body
            Err(_) if status.is_client_error() => Ok(SettlementResponse::Failed(
                SettlementFailure::new(format!("settlement refused with status {status}")),
            )),
            Err(err) => Err(err.into()),
        }
    }
}
