//! Client side of HTTP message signatures.

use std::time::SystemTimeError;

use base64::{Engine, prelude::BASE64_STANDARD};
use bon::Builder;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::{
    keys::{KeyError, KeyMaterial},
    signature::{
        DEFAULT_LABEL, DEFAULT_VALIDITY_SECS, SIGNATURE, SIGNATURE_INPUT,
        components::{Component, ComponentError, DEFAULT_COMPONENTS, RequestView, canonical_base},
        params::{SignatureParameters, is_sf_string_safe},
        unix_now,
    },
};

/// Errors raised while signing a request.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),
    #[error("System time error: {0}")]
    Clock(#[from] SystemTimeError),
}

/// Composer behavior configuration.
#[derive(Builder, Debug, Clone)]
pub struct ComposerConfig {
    /// Dictionary label shared by both signature headers.
    #[builder(default = DEFAULT_LABEL.to_string(), into)]
    pub label: String,
    /// Seconds from `created` to `expires`.
    #[builder(default = DEFAULT_VALIDITY_SECS)]
    pub validity_secs: u64,
    /// Optional `tag` parameter identifying the application profile.
    #[builder(into)]
    pub tag: Option<String>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        ComposerConfig::builder().build()
    }
}

/// Header values produced for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    /// `Signature` header value: `label=:base64:`.
    pub signature: String,
    /// `Signature-Input` header value: `label=(...);created=...`.
    pub signature_input: String,
    /// The parameters that were signed.
    pub parameters: SignatureParameters,
    /// The exact bytes that were signed.
    pub canonical_base: String,
}

impl SignatureHeaders {
    /// Insert both headers into `headers`, replacing earlier signatures.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), SignError> {
        for (name, value) in [
            (SIGNATURE, &self.signature),
            (SIGNATURE_INPUT, &self.signature_input),
        ] {
            let value =
                HeaderValue::from_str(value).map_err(|err| SignError::Encoding(err.to_string()))?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(())
    }
}

/// Builds canonical signature bases and signs them.
///
/// The composer owns its key material for its whole lifetime; it performs no
/// I/O and its output only depends on its inputs and the creation time.
#[derive(Debug, Clone)]
pub struct SignatureComposer {
    key: KeyMaterial,
    config: ComposerConfig,
}

impl SignatureComposer {
    pub fn new(key: KeyMaterial, config: ComposerConfig) -> Self {
        SignatureComposer { key, config }
    }

    /// Build a composer from a base64 encoded Ed25519 seed.
    pub fn from_seed_base64(seed: &str, config: ComposerConfig) -> Result<Self, SignError> {
        Ok(Self::new(KeyMaterial::from_seed_base64(seed)?, config))
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Sign a request created now.
    ///
    /// Every header in `headers` is covered, after the fixed derived components.
    pub fn compose(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<SignatureHeaders, SignError> {
        self.compose_at(method, url, headers, unix_now()?)
    }

    /// Sign a request with an explicit creation time.
    pub fn compose_at(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        created: u64,
    ) -> Result<SignatureHeaders, SignError> {
        let url = Url::parse(url)
            .map_err(|err| SignError::Encoding(format!("invalid request URL '{url}': {err}")))?;
        if !is_sf_string_safe(self.key.key_id()) {
            return Err(SignError::Encoding(format!(
                "key id '{}' is not printable ASCII",
                self.key.key_id()
            )));
        }

        let mut components = DEFAULT_COMPONENTS.to_vec();
        components.extend(headers.keys().map(|name| Component::Header(name.clone())));

        let parameters = SignatureParameters::builder()
            .components(components)
            .created(created)
            .expires(created.saturating_add(self.config.validity_secs))
            .key_id(self.key.key_id())
            .maybe_tag(self.config.tag.clone())
            .build();
        let serialized = parameters.to_string();

        let request = RequestView::new(method, &url, headers);
        let base = canonical_base(&request, &parameters, &serialized)?;
        let signature = self.key.sign(base.as_bytes());

        let label = &self.config.label;
        Ok(SignatureHeaders {
            signature: format!(
                "{label}=:{}:",
                BASE64_STANDARD.encode(signature.to_bytes())
            ),
            signature_input: format!("{label}={serialized}"),
            parameters,
            canonical_base: base,
        })
    }
}
