//! Per-resource payment terms and simulated settlement.
//!
//! Every resource in a [`Catalog`] is assigned one of three canonical offers up
//! front. Nothing is priced dynamically, and settlement keeps no ledger: each
//! accepted claim simply yields a fresh transaction id.

use bon::Builder;
use chrono::Utc;
use crawlpay_core::{
    listing::{ResourceListing, ResourceSummary},
    payment::{PaymentOffer, PaymentTerms, SettlementReceipt, SettlementRequest},
    types::{AmountValue, Currency},
};
use serde::{Deserialize, Serialize};

/// Which canonical offer a resource carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferTier {
    Free,
    Affordable,
    Prohibitive,
}

/// One protected resource.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub title: String,
    pub tier: OfferTier,
    /// Page content returned once access is granted.
    #[builder(into, default)]
    pub content: String,
    /// Advertised location. Defaults to `/content/{id}` on this server.
    #[builder(into)]
    pub location: Option<String>,
}

impl ResourceEntry {
    pub fn location(&self) -> String {
        self.location
            .clone()
            .unwrap_or_else(|| format!("/content/{}", self.id))
    }
}

/// Ordered set of resources served by one content server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<ResourceEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing an earlier one with the same id.
    pub fn with(mut self, entry: ResourceEntry) -> Self {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.push(entry);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ResourceEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    pub fn listing(&self) -> ResourceListing {
        ResourceListing {
            resources: self
                .entries
                .iter()
                .map(|e| ResourceSummary {
                    id: e.id.clone(),
                    title: e.title.clone(),
                    url: e.location(),
                })
                .collect(),
        }
    }

    /// The catalog served by the demo server: one resource per tier.
    pub fn demo() -> Self {
        Catalog::new()
            .with(
                ResourceEntry::builder()
                    .id("public-notes")
                    .title("Public field notes")
                    .tier(OfferTier::Free)
                    .content("Openly licensed notes, free to crawl.")
                    .build(),
            )
            .with(
                ResourceEntry::builder()
                    .id("premium-report")
                    .title("Premium market report")
                    .tier(OfferTier::Prohibitive)
                    .content("Quarterly figures for subscribers.")
                    .build(),
            )
            .with(
                ResourceEntry::builder()
                    .id("daily-digest")
                    .title("Daily digest")
                    .tier(OfferTier::Affordable)
                    .content("Today's headlines, summarized.")
                    .build(),
            )
    }
}

/// A settlement claim was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("Malformed settlement request: {0}")]
    Malformed(String),
    #[error("Amount must be positive")]
    NonPositiveAmount,
    #[error("crawlerId must not be empty")]
    MissingCrawlerId,
}

/// Attaches payment terms to resources and settles accepted offers.
#[derive(Builder, Debug, Clone)]
pub struct PaymentNegotiator {
    #[builder(default)]
    pub catalog: Catalog,
    #[builder(default = Currency::usd())]
    pub currency: Currency,
    #[builder(default = AmountValue(10), into)]
    pub affordable_amount: AmountValue,
    #[builder(default = AmountValue(1000), into)]
    pub prohibitive_amount: AmountValue,
}

impl PaymentNegotiator {
    /// The canonical offer for a tier.
    pub fn offer(&self, tier: OfferTier) -> PaymentOffer {
        let amount = match tier {
            OfferTier::Free => return PaymentOffer::NotRequired,
            OfferTier::Affordable => self.affordable_amount,
            OfferTier::Prohibitive => self.prohibitive_amount,
        };
        PaymentOffer::Required(PaymentTerms {
            amount,
            currency: self.currency.clone(),
            description: match tier {
                OfferTier::Affordable => "Standard crawl license".to_string(),
                _ => "Premium crawl license".to_string(),
            },
        })
    }

    /// The offer for a resource, or `None` if it is not in the catalog.
    pub fn offer_for(&self, id: &str) -> Option<(&ResourceEntry, PaymentOffer)> {
        self.catalog
            .get(id)
            .map(|entry| (entry, self.offer(entry.tier)))
    }

    /// Settle a claimed offer.
    ///
    /// The claim is validated for shape only; every accepted call gets a new
    /// transaction id and nothing is recorded.
    pub fn settle(&self, request: &SettlementRequest) -> Result<SettlementReceipt, SettlementError> {
        if !request.amount.is_positive() {
            return Err(SettlementError::NonPositiveAmount);
        }
        if request.crawler_id.trim().is_empty() {
            return Err(SettlementError::MissingCrawlerId);
        }

        Ok(SettlementReceipt {
            success: true,
            transaction_id: uuid::Uuid::new_v4().to_string(),
            amount: request.amount,
            currency: request.currency.clone(),
            description: request.description.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Decode and settle a raw `POST /settle` body.
    pub fn settle_json(&self, body: &[u8]) -> Result<SettlementReceipt, SettlementError> {
        let request: SettlementRequest = serde_json::from_slice(body)
            .map_err(|err| SettlementError::Malformed(err.to_string()))?;
        self.settle(&request)
    }
}

impl Default for PaymentNegotiator {
    fn default() -> Self {
        PaymentNegotiator::builder().build()
    }
}
