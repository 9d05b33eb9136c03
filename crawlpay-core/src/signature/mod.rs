//! Detached HTTP message signatures.
//!
//! A request is signed by building a canonical signature base from an ordered
//! list of covered components, then signing the raw base bytes with Ed25519.
//! Two headers carry the result:
//!
//! ```text
//! Signature-Input: sig1=("@method" "@target-uri" "@authority" "@scheme" "@request-target" "created");created=1700000000;expires=1700000300;keyid="..."
//! Signature: sig1=:<base64 signature>:
//! ```
//!
//! The last line of every signature base binds the signature to its own
//! declaration, so parameters cannot be swapped after signing:
//!
//! ```text
//! "@method": GET
//! "@target-uri": https://example.com/content/a
//! ...
//! "@signature-params": ("@method" ...);created=1700000000;keyid="..."
//! ```
//!
//! - [`composer`]: builds the base and produces [`SignatureHeaders`](composer::SignatureHeaders).
//! - [`verifier`]: parses the headers, rebuilds the base and checks it.
//! - [`params`]: the declaration grammar shared by both sides.
//! - [`components`]: component values and canonical base construction.

use std::{
    fmt::Display,
    str::FromStr,
    time::{SystemTime, SystemTimeError},
};

pub mod components;
pub mod composer;
pub mod params;
pub mod verifier;

pub use components::{Component, RequestView, authority, canonical_base};
pub use composer::{ComposerConfig, SignError, SignatureComposer, SignatureHeaders};
pub use params::{ParamValue, ParamsError, SignatureDeclaration, SignatureParameters};
pub use verifier::{
    SignatureVerifier, VerifiedSignature, VerifierConfig, VerifyError, VerifyErrorKind,
    VerifyResult,
};

/// Header carrying the signature value dictionary.
pub const SIGNATURE: &str = "signature";
/// Header carrying the signature declaration dictionary.
pub const SIGNATURE_INPUT: &str = "signature-input";

/// Label used when the composer is not configured otherwise.
pub const DEFAULT_LABEL: &str = "sig1";
/// Seconds between `created` and `expires` by default.
pub const DEFAULT_VALIDITY_SECS: u64 = 300;

/// Signature algorithms understood by both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureAlgorithm {
    #[default]
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "ed25519",
        }
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported signature algorithm '{0}'")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for SignatureAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            other => Err(UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Current time in whole seconds since the Unix epoch.
pub fn unix_now() -> Result<u64, SystemTimeError> {
    Ok(SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)?
        .as_secs())
}
