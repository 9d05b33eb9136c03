//! # Crawlpay Kit
//!
//! The crawler side of the pay-per-crawl testbed.
//!
//! A crawler signs every request it sends, reads the payment terms a server
//! attaches to a resource, pays what its budget allows and skips the rest.
//!
//! ## Related Crates
//!
//! - **`crawlpay-core`**: key material, HTTP message signatures and the
//!   payment wire types shared with the server.
//! - **`crawlpay-paywall`**: the content server these crawlers talk to.
//!
//! ## Quick Start
//!
//! ```no_run
//! use crawlpay_core::{
//!     keys::KeyMaterial,
//!     signature::{ComposerConfig, SignatureComposer},
//! };
//! use crawlpay_kit::{
//!     client::{SettlementClient, SignedClient},
//!     config::CrawlerConfig,
//!     decision::PaymentDecisionEngine,
//!     orchestrator::CrawlOrchestrator,
//! };
//! use url::Url;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CrawlerConfig::for_server(&Url::parse("http://127.0.0.1:8787/")?, 50u64)?;
//!
//! let key = KeyMaterial::from_seed(&[7u8; 32]);
//! let client = SignedClient::new(SignatureComposer::new(key, ComposerConfig::default()));
//!
//! let engine = PaymentDecisionEngine::builder()
//!     .settler(SettlementClient::new(client.clone(), config.settle_url.clone()))
//!     .policy(config.budget())
//!     .crawler_id(config.crawler_id.clone())
//!     .build();
//!
//! let report = CrawlOrchestrator::new(client, engine, config.listing_url.clone())
//!     .run()
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: Signed HTTP client, plus the [`Fetcher`](client::Fetcher) and
//!   [`Settler`](client::Settler) seams.
//! - [`decision`]: Budget policy and the payment decision engine.
//! - [`orchestrator`]: Runs a crawl and reports per-resource outcomes.
//! - [`config`]: Crawler configuration from builders or the environment.

pub mod client;
pub mod config;
pub mod decision;
pub mod orchestrator;
