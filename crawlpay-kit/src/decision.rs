//! Accepting or rejecting payment offers.
//!
//! | Offer | Decision | Settlement calls |
//! |---|---|---|
//! | not required | accept | 0 |
//! | required, within budget | accept if settlement succeeds | 1 |
//! | required, over budget | reject | 0 |
//!
//! The check is local and stateless: nothing tracks what was already spent.

use bon::Builder;
use crawlpay_core::{
    payment::{PaymentOffer, PaymentTerms, SettlementReceipt, SettlementRequest},
    types::{AmountValue, Currency},
};

use crate::client::{Settler, TransportError};

/// Static spending policy for a crawl run.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct BudgetPolicy {
    /// Highest amount payable for one resource.
    #[builder(into)]
    pub ceiling: AmountValue,
    /// Only pay in this currency, when set.
    pub currency: Option<Currency>,
}

/// Why the policy refused an offer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Amount {amount} exceeds ceiling {ceiling}")]
    OverCeiling {
        amount: AmountValue,
        ceiling: AmountValue,
    },
    #[error("Offer in {offered}, budget is in {budget}")]
    CurrencyMismatch { offered: Currency, budget: Currency },
}

impl BudgetPolicy {
    pub fn check(&self, terms: &PaymentTerms) -> Result<(), PolicyViolation> {
        if let Some(budget) = &self.currency {
            if budget != &terms.currency {
                return Err(PolicyViolation::CurrencyMismatch {
                    offered: terms.currency.clone(),
                    budget: budget.clone(),
                });
            }
        }
        if terms.amount > self.ceiling {
            return Err(PolicyViolation::OverCeiling {
                amount: terms.amount,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// The resource is free; nothing was settled.
    NoPaymentRequired,
    /// The offer was settled.
    Settled(SettlementReceipt),
}

#[derive(Debug)]
pub enum Rejection {
    /// The budget policy refused the offer. No settlement was attempted.
    Policy(PolicyViolation),
    /// The server refused the settlement claim.
    Negotiator(String),
    /// The settlement claim could not be delivered or its answer was unreadable.
    Transport(TransportError),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Policy(violation) => write!(f, "policy: {violation}"),
            Rejection::Negotiator(reason) => write!(f, "negotiator: {reason}"),
            Rejection::Transport(err) => write!(f, "transport: {err}"),
        }
    }
}

/// Outcome of evaluating one offer.
#[derive(Debug)]
pub enum PaymentDecision {
    Accepted(Acceptance),
    Rejected(Rejection),
}

impl PaymentDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PaymentDecision::Accepted(_))
    }

    pub fn as_accepted(&self) -> Option<&Acceptance> {
        match self {
            PaymentDecision::Accepted(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_rejected(&self) -> Option<&Rejection> {
        match self {
            PaymentDecision::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Transaction id of a settled offer.
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            PaymentDecision::Accepted(Acceptance::Settled(receipt)) => {
                Some(&receipt.transaction_id)
            }
            _ => None,
        }
    }
}

/// Evaluates offers against a [`BudgetPolicy`] and settles affordable ones.
#[derive(Builder, Debug, Clone)]
pub struct PaymentDecisionEngine<S: Settler> {
    pub settler: S,
    pub policy: BudgetPolicy,
    #[builder(into)]
    pub crawler_id: String,
}

impl<S: Settler> PaymentDecisionEngine<S> {
    pub async fn decide(&self, offer: &PaymentOffer) -> PaymentDecision {
        let terms = match offer {
            PaymentOffer::NotRequired => {
                return PaymentDecision::Accepted(Acceptance::NoPaymentRequired);
            }
            PaymentOffer::Required(terms) => terms,
        };

        if let Err(violation) = self.policy.check(terms) {
            #[cfg(feature = "tracing")]
            tracing::info!("Offer rejected by policy: {violation}");

            return PaymentDecision::Rejected(Rejection::Policy(violation));
        }

        let request = SettlementRequest::for_terms(terms, self.crawler_id.clone());
        let response = match self.settler.settle(&request).await {
            Ok(response) => response,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Settlement failed to complete: {err}");

                return PaymentDecision::Rejected(Rejection::Transport(err));
            }
        };

        match response.into_result() {
            Ok(receipt) => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    "Offer settled: transaction='{}', amount={} {}",
                    receipt.transaction_id,
                    receipt.amount,
                    receipt.currency
                );

                PaymentDecision::Accepted(Acceptance::Settled(receipt))
            }
            Err(reason) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Settlement refused: {reason}");

                PaymentDecision::Rejected(Rejection::Negotiator(reason))
            }
        }
    }
}
