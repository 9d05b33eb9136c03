//! # Crawlpay Paywall
//!
//! The content server side of the pay-per-crawl testbed.
//!
//! Two pieces sit between a crawler and the content:
//!
//! - [`SignatureGate`](gate::SignatureGate) authenticates every request by
//!   verifying its detached HTTP message signature. Any failure, whatever the
//!   reason, yields the same `401 Unauthorized`.
//! - [`PaymentNegotiator`](negotiator::PaymentNegotiator) attaches one of three
//!   canonical offers (none, affordable, prohibitive) to each resource and
//!   settles accepted offers.
//!
//! ## Quick Start
//!
//! ```rust
//! use crawlpay_core::{
//!     keys::{KeyMaterial, StaticKeyResolver},
//!     signature::{SignatureVerifier, VerifierConfig},
//! };
//! use crawlpay_paywall::{
//!     gate::SignatureGate,
//!     negotiator::{Catalog, PaymentNegotiator},
//!     server::router,
//! };
//!
//! let crawler_key = KeyMaterial::from_seed(&[7u8; 32]);
//!
//! let gate = SignatureGate::builder()
//!     .verifier(SignatureVerifier::new(
//!         StaticKeyResolver::from(&crawler_key),
//!         VerifierConfig::default(),
//!     ))
//!     .build();
//!
//! let negotiator = PaymentNegotiator::builder()
//!     .catalog(Catalog::demo())
//!     .build();
//!
//! let app: axum::Router = router(negotiator, gate);
//! ```
//!
//! ## Request Flow
//!
//! The standard flow using [`SignatureGate::handle_request`](gate::SignatureGate::handle_request):
//!
//! 1. **Process Request**: Rebuild the absolute URL the client signed.
//! 2. **Verify**: Check `Signature-Input` and `Signature` against the trusted key.
//! 3. **Run Handler**: Execute the route with the
//!    [`VerifiedSignature`](crawlpay_core::signature::VerifiedSignature) in its extensions.
//!
//! ## Modules
//!
//! - [`gate`]: The [`SignatureGate`](gate::SignatureGate) and its configuration.
//! - [`processor`]: Step-by-step request processing.
//! - [`negotiator`]: Catalog, offers and settlement.
//! - [`errors`]: HTTP error responses.
//! - `server` (feature `axum`): The axum router for the testbed server.

pub mod errors;
pub mod gate;
pub mod negotiator;
pub mod processor;

#[cfg(feature = "axum")]
pub mod axum;
#[cfg(feature = "axum")]
pub mod server;
