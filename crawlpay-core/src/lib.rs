//! Crawlpay core library.
//!
//! Shared building blocks of the pay-per-crawl testbed: Ed25519 key material,
//! detached HTTP message signatures, and the payment term and settlement wire
//! types exchanged between crawlers and content servers.

pub mod errors;
pub mod keys;
pub mod listing;
pub mod payment;
pub mod signature;
pub mod types;
