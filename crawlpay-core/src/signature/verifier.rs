//! Server side of HTTP message signatures.
//!
//! [`SignatureVerifier::verify`] runs a short-circuiting pipeline:
//!
//! 1. Locate `Signature-Input` (missing: [`VerifyError::InputMissing`]).
//! 2. Locate `Signature` (missing: [`VerifyError::SignatureMissing`]).
//! 3. Parse the declaration into label, components and typed parameters.
//! 4. Decode the signature bytes for the same label.
//! 5. Check freshness against `expires`, `created` and the configured window.
//! 6. Rebuild the canonical base from the request, using the declared `created`
//!    and the declaration exactly as received for `@signature-params`.
//! 7. Resolve the public key by `keyid`.
//! 8. Verify the signature with the declared algorithm.
//!
//! The outcome is binary: [`VerifyResult::Valid`] or [`VerifyResult::Invalid`].

use std::{fmt::Display, time::SystemTimeError};

use bon::Builder;
use ed25519_dalek::{Signature, Verifier};
use http::{HeaderMap, Method};
use url::Url;

use crate::{
    keys::{KeyResolutionError, KeyResolver},
    signature::{
        SIGNATURE, SIGNATURE_INPUT, SignatureAlgorithm, UnsupportedAlgorithm,
        components::{ComponentError, RequestView, canonical_base},
        params::{ParamsError, SignatureDeclaration, parse_signature_values},
        unix_now,
    },
};

/// Coarse failure categories.
///
/// These are diagnostic only. Every kind leads to the same rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyErrorKind {
    InputMissing,
    SignatureMissing,
    ParseError,
    Expired,
    KeyResolutionError,
    VerificationFailed,
}

impl Display for VerifyErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerifyErrorKind::InputMissing => "InputMissing",
            VerifyErrorKind::SignatureMissing => "SignatureMissing",
            VerifyErrorKind::ParseError => "ParseError",
            VerifyErrorKind::Expired => "Expired",
            VerifyErrorKind::KeyResolutionError => "KeyResolutionError",
            VerifyErrorKind::VerificationFailed => "VerificationFailed",
        };
        f.write_str(s)
    }
}

/// Why a request signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("Signature-Input header is missing")]
    InputMissing,
    #[error("Signature header is missing")]
    SignatureMissing,
    #[error("Malformed signature headers: {0}")]
    Parse(String),
    #[error("Signature expired at {expires}, now {now}")]
    Expired { expires: u64, now: u64 },
    #[error("Signature created at {created} is in the future, now {now}")]
    NotYetValid { created: u64, now: u64 },
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),
    #[error("Signature verification failed: {0}")]
    VerificationFailed(String),
}

impl VerifyError {
    pub fn kind(&self) -> VerifyErrorKind {
        match self {
            VerifyError::InputMissing => VerifyErrorKind::InputMissing,
            VerifyError::SignatureMissing => VerifyErrorKind::SignatureMissing,
            VerifyError::Parse(_) => VerifyErrorKind::ParseError,
            VerifyError::Expired { .. } | VerifyError::NotYetValid { .. } => {
                VerifyErrorKind::Expired
            }
            VerifyError::KeyResolution(_) => VerifyErrorKind::KeyResolutionError,
            VerifyError::UnsupportedAlgorithm(_) | VerifyError::VerificationFailed(_) => {
                VerifyErrorKind::VerificationFailed
            }
        }
    }
}

impl From<ParamsError> for VerifyError {
    fn from(err: ParamsError) -> Self {
        VerifyError::Parse(err.to_string())
    }
}

impl From<ComponentError> for VerifyError {
    fn from(err: ComponentError) -> Self {
        VerifyError::VerificationFailed(err.to_string())
    }
}

impl From<SystemTimeError> for VerifyError {
    fn from(err: SystemTimeError) -> Self {
        VerifyError::VerificationFailed(format!("system clock error: {err}"))
    }
}

/// Identity attached to a request whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    pub label: String,
    pub key_id: String,
    pub algorithm: SignatureAlgorithm,
    pub created: u64,
    pub expires: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid(VerifiedSignature),
    Invalid(VerifyError),
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid(_))
    }

    pub fn as_valid(&self) -> Option<&VerifiedSignature> {
        match self {
            VerifyResult::Valid(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_invalid(&self) -> Option<&VerifyError> {
        match self {
            VerifyResult::Invalid(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<VerifiedSignature, VerifyError> {
        match self {
            VerifyResult::Valid(v) => Ok(v),
            VerifyResult::Invalid(e) => Err(e),
        }
    }
}

impl From<Result<VerifiedSignature, VerifyError>> for VerifyResult {
    fn from(result: Result<VerifiedSignature, VerifyError>) -> Self {
        match result {
            Ok(v) => VerifyResult::Valid(v),
            Err(e) => VerifyResult::Invalid(e),
        }
    }
}

/// Verifier behavior configuration.
#[derive(Builder, Debug, Clone)]
pub struct VerifierConfig {
    /// Tolerated clock difference for `created` values ahead of our clock.
    #[builder(default = 60)]
    pub clock_skew_secs: u64,
    /// Reject signatures older than this, even without `expires`.
    pub max_age_secs: Option<u64>,
    /// Only accept this label. The first declared label is used otherwise.
    #[builder(into)]
    pub label: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig::builder().build()
    }
}

/// Checks detached request signatures against keys from a [`KeyResolver`].
#[derive(Debug, Clone)]
pub struct SignatureVerifier<R: KeyResolver> {
    resolver: R,
    config: VerifierConfig,
}

fn joined_header(headers: &HeaderMap, name: &str) -> Result<Option<String>, VerifyError> {
    let mut parts = Vec::new();
    for value in headers.get_all(name) {
        let value = value
            .to_str()
            .map_err(|err| VerifyError::Parse(format!("{name} header: {err}")))?;
        parts.push(value);
    }
    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(", ")))
    }
}

impl<R: KeyResolver> SignatureVerifier<R> {
    pub fn new(resolver: R, config: VerifierConfig) -> Self {
        SignatureVerifier { resolver, config }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Verify a request against the current time.
    pub fn verify(&self, method: &Method, url: &str, headers: &HeaderMap) -> VerifyResult {
        unix_now()
            .map_err(VerifyError::from)
            .and_then(|now| self.try_verify(method, url, headers, now))
            .into()
    }

    /// Verify a request against an explicit current time.
    pub fn verify_at(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        now: u64,
    ) -> VerifyResult {
        self.try_verify(method, url, headers, now).into()
    }

    fn try_verify(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        now: u64,
    ) -> Result<VerifiedSignature, VerifyError> {
        let input = joined_header(headers, SIGNATURE_INPUT)?.ok_or(VerifyError::InputMissing)?;
        let signature = joined_header(headers, SIGNATURE)?.ok_or(VerifyError::SignatureMissing)?;

        let declarations = SignatureDeclaration::parse_all(&input)?;
        let declaration = match &self.config.label {
            Some(label) => declarations.into_iter().find(|d| &d.label == label),
            None => declarations.into_iter().next(),
        }
        .ok_or_else(|| VerifyError::Parse("no acceptable signature label".to_string()))?;

        let raw_signature = parse_signature_values(&signature)?
            .into_iter()
            .find(|(label, _)| label == &declaration.label)
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| {
                VerifyError::Parse(format!(
                    "no signature value for label '{}'",
                    declaration.label
                ))
            })?;
        let signature = Signature::from_slice(&raw_signature)
            .map_err(|err| VerifyError::Parse(format!("signature bytes: {err}")))?;

        let params = &declaration.parameters;
        self.check_freshness(params.created, params.expires, now)?;

        let url = Url::parse(url).map_err(|err| VerifyError::Parse(format!("URL: {err}")))?;
        let request = RequestView::new(method, &url, headers);
        let base = canonical_base(&request, params, &declaration.raw)?;

        let key = self.resolver.resolve(&params.key_id)?;

        let algorithm = match &params.alg {
            Some(alg) => alg.parse::<SignatureAlgorithm>()?,
            None => SignatureAlgorithm::default(),
        };
        match algorithm {
            SignatureAlgorithm::Ed25519 => key
                .verify(base.as_bytes(), &signature)
                .map_err(|_| VerifyError::VerificationFailed("signature mismatch".to_string()))?,
        }

        Ok(VerifiedSignature {
            label: declaration.label,
            key_id: params.key_id.clone(),
            algorithm,
            created: params.created,
            expires: params.expires,
        })
    }

    fn check_freshness(
        &self,
        created: u64,
        expires: Option<u64>,
        now: u64,
    ) -> Result<(), VerifyError> {
        if let Some(expires) = expires {
            if now > expires {
                return Err(VerifyError::Expired { expires, now });
            }
        }
        if created > now.saturating_add(self.config.clock_skew_secs) {
            return Err(VerifyError::NotYetValid { created, now });
        }
        if let Some(max_age) = self.config.max_age_secs {
            let expires = created.saturating_add(max_age);
            if now > expires {
                return Err(VerifyError::Expired { expires, now });
            }
        }
        Ok(())
    }
}
