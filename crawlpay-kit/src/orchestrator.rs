//! Crawl driver.
//!
//! A run fetches the listing once, then walks every listed resource through
//! fetch, decide and settle. Only a failed listing aborts the run; anything
//! that goes wrong with one resource is recorded in its report and the crawl
//! moves on.

use std::fmt::Display;

use crawlpay_core::listing::ResourceSummary;
use serde::Serialize;
use url::Url;

use crate::{
    client::{Fetcher, Settler, TransportError},
    decision::{Acceptance, PaymentDecision, PaymentDecisionEngine, Rejection},
};

/// What happened to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum CrawlOutcome {
    /// Free, or settled.
    ///
    /// A settled resource is not fetched again: the report records the
    /// settlement, not the page body.
    Accessible {
        #[serde(skip_serializing_if = "Option::is_none")]
        transaction_id: Option<String>,
    },
    DeniedByPolicy { reason: String },
    DeniedByNegotiator { reason: String },
    TransportError { reason: String },
}

impl CrawlOutcome {
    pub fn is_accessible(&self) -> bool {
        matches!(self, CrawlOutcome::Accessible { .. })
    }

    fn transport(err: impl Display) -> Self {
        CrawlOutcome::TransportError {
            reason: err.to_string(),
        }
    }
}

impl From<PaymentDecision> for CrawlOutcome {
    fn from(decision: PaymentDecision) -> Self {
        match decision {
            PaymentDecision::Accepted(Acceptance::NoPaymentRequired) => CrawlOutcome::Accessible {
                transaction_id: None,
            },
            PaymentDecision::Accepted(Acceptance::Settled(receipt)) => CrawlOutcome::Accessible {
                transaction_id: Some(receipt.transaction_id),
            },
            PaymentDecision::Rejected(Rejection::Policy(violation)) => {
                CrawlOutcome::DeniedByPolicy {
                    reason: violation.to_string(),
                }
            }
            PaymentDecision::Rejected(Rejection::Negotiator(reason)) => {
                CrawlOutcome::DeniedByNegotiator { reason }
            }
            PaymentDecision::Rejected(Rejection::Transport(err)) => CrawlOutcome::transport(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub id: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: CrawlOutcome,
}

/// Per-resource outcomes of one run, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub resources: Vec<ResourceReport>,
}

/// Outcome counts of a [`CrawlReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub accessible: usize,
    pub settled: usize,
    pub denied_by_policy: usize,
    pub denied_by_negotiator: usize,
    pub transport_error: usize,
}

impl Display for CrawlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "accessible={} (settled={}), denied-by-policy={}, denied-by-negotiator={}, transport-error={}",
            self.accessible,
            self.settled,
            self.denied_by_policy,
            self.denied_by_negotiator,
            self.transport_error
        )
    }
}

impl CrawlReport {
    pub fn get(&self, id: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn summary(&self) -> CrawlSummary {
        self.resources
            .iter()
            .fold(CrawlSummary::default(), |mut summary, report| {
                match &report.outcome {
                    CrawlOutcome::Accessible { transaction_id } => {
                        summary.accessible += 1;
                        if transaction_id.is_some() {
                            summary.settled += 1;
                        }
                    }
                    CrawlOutcome::DeniedByPolicy { .. } => summary.denied_by_policy += 1,
                    CrawlOutcome::DeniedByNegotiator { .. } => summary.denied_by_negotiator += 1,
                    CrawlOutcome::TransportError { .. } => summary.transport_error += 1,
                }
                summary
            })
    }
}

/// Drives a crawl over every resource in a listing.
pub struct CrawlOrchestrator<F: Fetcher, S: Settler> {
    pub fetcher: F,
    pub engine: PaymentDecisionEngine<S>,
    pub listing_url: Url,
}

impl<F: Fetcher, S: Settler> CrawlOrchestrator<F, S> {
    pub fn new(fetcher: F, engine: PaymentDecisionEngine<S>, listing_url: Url) -> Self {
        CrawlOrchestrator {
            fetcher,
            engine,
            listing_url,
        }
    }

    /// Crawl every listed resource once.
    ///
    /// Fails only when the listing itself cannot be fetched.
    pub async fn run(&self) -> Result<CrawlReport, TransportError> {
        let listing = self.fetcher.listing(&self.listing_url).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Crawling {} resources from {}",
            listing.resources.len(),
            self.listing_url
        );

        let mut report = CrawlReport::default();
        for resource in &listing.resources {
            report.resources.push(self.crawl(resource).await);
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Crawl finished: {}", report.summary());

        Ok(report)
    }

    /// Fetch, decide and settle one resource. Never fails; failures become the
    /// outcome.
    pub async fn crawl(&self, resource: &ResourceSummary) -> ResourceReport {
        let outcome = match self.listing_url.join(&resource.url) {
            Ok(url) => self.crawl_url(&url).await,
            Err(err) => CrawlOutcome::transport(TransportError::from(err)),
        };

        #[cfg(feature = "tracing")]
        if let CrawlOutcome::TransportError { reason } = &outcome {
            tracing::warn!("Resource '{}' failed: {reason}", resource.id);
        } else {
            tracing::info!("Resource '{}': {outcome:?}", resource.id);
        }

        ResourceReport {
            id: resource.id.clone(),
            url: resource.url.clone(),
            outcome,
        }
    }

    async fn crawl_url(&self, url: &Url) -> CrawlOutcome {
        let fetched = match self.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(err) => return CrawlOutcome::transport(err),
        };

        self.engine.decide(&fetched.offer).await.into()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use crawlpay_core::{
        listing::ResourceListing,
        payment::{PaymentOffer, PaymentTerms},
        types::Currency,
    };
    use http::StatusCode;
    use url_macro::url;

    use crate::{
        client::FetchedResource,
        decision::{BudgetPolicy, tests::MockSettler},
    };

    use super::*;

    /// Serves canned offers by URL; any URL without one fails to connect.
    #[derive(Debug, Default)]
    struct MockFetcher {
        listing: Option<ResourceListing>,
        offers: HashMap<String, PaymentOffer>,
        fetched: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn resource(mut self, id: &str, url: &str, offer: Option<u64>) -> Self {
            let listing = self.listing.get_or_insert_with(ResourceListing::default);
            listing.resources.push(ResourceSummary {
                id: id.to_string(),
                title: id.to_uppercase(),
                url: url.to_string(),
            });
            if let Some(amount) = offer {
                let offer = match amount {
                    0 => PaymentOffer::NotRequired,
                    amount => PaymentOffer::Required(PaymentTerms {
                        amount: amount.into(),
                        currency: Currency::usd(),
                        description: "Crawl license".to_string(),
                    }),
                };
                let absolute = url!("http://testbed.local/resources").join(url).unwrap();
                self.offers.insert(absolute.to_string(), offer);
            }
            self
        }
    }

    impl Fetcher for MockFetcher {
        async fn listing(&self, url: &Url) -> Result<ResourceListing, TransportError> {
            self.listing
                .clone()
                .ok_or_else(|| TransportError::UnexpectedStatus {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    url: url.to_string(),
                })
        }

        async fn fetch(&self, url: &Url) -> Result<FetchedResource, TransportError> {
            self.fetched.lock().unwrap().push(url.to_string());
            let offer = self.offers.get(url.as_str()).cloned().ok_or_else(|| {
                TransportError::UnexpectedStatus {
                    status: StatusCode::BAD_GATEWAY,
                    url: url.to_string(),
                }
            })?;
            Ok(FetchedResource {
                url: url.clone(),
                status: if offer.is_required() {
                    StatusCode::PAYMENT_REQUIRED
                } else {
                    StatusCode::OK
                },
                offer,
                body: String::new(),
            })
        }
    }

    fn orchestrator(
        fetcher: MockFetcher,
        settler: MockSettler,
    ) -> CrawlOrchestrator<MockFetcher, MockSettler> {
        let engine = PaymentDecisionEngine::builder()
            .settler(settler)
            .policy(BudgetPolicy::builder().ceiling(50u64).build())
            .crawler_id("crawler-1")
            .build();
        CrawlOrchestrator::new(fetcher, engine, url!("http://testbed.local/resources"))
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_resource() {
        let fetcher = MockFetcher::default()
            .resource("a", "/content/a", Some(0))
            .resource("d", "/content/d", None)
            .resource("b", "/content/b", Some(1000))
            .resource("c", "http://testbed.local/content/c", Some(10));
        let settler = MockSettler::default();

        let report = orchestrator(fetcher, settler.clone()).run().await.unwrap();

        assert_eq!(report.resources.len(), 4);
        assert_eq!(
            report.get("a").unwrap().outcome,
            CrawlOutcome::Accessible {
                transaction_id: None
            }
        );
        assert!(matches!(
            report.get("b").unwrap().outcome,
            CrawlOutcome::DeniedByPolicy { .. }
        ));
        assert_eq!(
            report.get("c").unwrap().outcome,
            CrawlOutcome::Accessible {
                transaction_id: Some("tx-0".to_string())
            }
        );
        assert!(matches!(
            report.get("d").unwrap().outcome,
            CrawlOutcome::TransportError { .. }
        ));
        assert_eq!(settler.call_count(), 1);

        let summary = report.summary();
        assert_eq!(summary.accessible, 2);
        assert_eq!(summary.settled, 1);
        assert_eq!(summary.denied_by_policy, 1);
        assert_eq!(summary.transport_error, 1);
    }

    #[tokio::test]
    async fn test_negotiator_refusal_is_recorded() {
        let fetcher = MockFetcher::default().resource("c", "/content/c", Some(10));
        let settler = MockSettler {
            refuse: Some("crawlerId must not be empty".to_string()),
            ..Default::default()
        };

        let report = orchestrator(fetcher, settler).run().await.unwrap();

        assert_eq!(
            report.get("c").unwrap().outcome,
            CrawlOutcome::DeniedByNegotiator {
                reason: "crawlerId must not be empty".to_string()
            }
        );
        assert_eq!(report.summary().denied_by_negotiator, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let settler = MockSettler::default();
        let result = orchestrator(MockFetcher::default(), settler.clone())
            .run()
            .await;

        assert!(matches!(
            result,
            Err(TransportError::UnexpectedStatus { .. })
        ));
        assert_eq!(settler.call_count(), 0);
    }

    #[tokio::test]
    async fn test_relative_urls_resolve_against_listing() {
        let fetcher = MockFetcher::default().resource("a", "/content/a", Some(0));
        let orchestrator = orchestrator(fetcher, MockSettler::default());

        orchestrator.run().await.unwrap();

        assert_eq!(
            *orchestrator.fetcher.fetched.lock().unwrap(),
            vec!["http://testbed.local/content/a".to_string()]
        );
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let report = ResourceReport {
            id: "c".to_string(),
            url: "/content/c".to_string(),
            outcome: CrawlOutcome::Accessible {
                transaction_id: Some("tx-1".to_string()),
            },
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "id": "c",
                "url": "/content/c",
                "outcome": "accessible",
                "transaction_id": "tx-1",
            })
        );
    }
}
