//! Payment terms and settlement wire types.
//!
//! A content server advertises terms with four response headers:
//!
//! ```text
//! Payment-Required: true
//! Payment-Required-Amount: 10
//! Payment-Required-Currency: USD
//! Payment-Required-Description: Premium article
//! ```
//!
//! All four are absent when no payment is required. The same offer is echoed
//! as a JSON body so clients that only read bodies see it too.

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    types::{AmountValue, Currency},
};

pub const PAYMENT_REQUIRED: &str = "payment-required";
pub const PAYMENT_REQUIRED_AMOUNT: &str = "payment-required-amount";
pub const PAYMENT_REQUIRED_CURRENCY: &str = "payment-required-currency";
pub const PAYMENT_REQUIRED_DESCRIPTION: &str = "payment-required-description";

/// Malformed or inconsistent payment terms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OfferError {
    #[error("Payment term '{0}' is missing")]
    Missing(&'static str),
    #[error("Payment term '{name}' is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("Payment amount must be positive")]
    NonPositiveAmount,
}

/// What a crawler must pay for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTerms {
    pub amount: AmountValue,
    pub currency: Currency,
    pub description: String,
}

/// Payment metadata attached to a resource response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OfferBody", into = "OfferBody")]
pub enum PaymentOffer {
    NotRequired,
    Required(PaymentTerms),
}

/// Flat JSON shape of an offer: `{"required": true, "amount": 10, ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OfferBody {
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<AmountValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl From<PaymentOffer> for OfferBody {
    fn from(offer: PaymentOffer) -> Self {
        match offer {
            PaymentOffer::NotRequired => OfferBody {
                required: false,
                amount: None,
                currency: None,
                description: None,
            },
            PaymentOffer::Required(terms) => OfferBody {
                required: true,
                amount: Some(terms.amount),
                currency: Some(terms.currency),
                description: Some(terms.description),
            },
        }
    }
}

impl TryFrom<OfferBody> for PaymentOffer {
    type Error = OfferError;

    fn try_from(body: OfferBody) -> std::result::Result<Self, Self::Error> {
        if !body.required {
            return Ok(PaymentOffer::NotRequired);
        }
        let amount = body.amount.ok_or(OfferError::Missing("amount"))?;
        if !amount.is_positive() {
            return Err(OfferError::NonPositiveAmount);
        }
        Ok(PaymentOffer::Required(PaymentTerms {
            amount,
            currency: body.currency.ok_or(OfferError::Missing("currency"))?,
            description: body.description.unwrap_or_default(),
        }))
    }
}

fn header_str<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> std::result::Result<Option<&'a str>, OfferError> {
    headers
        .get(name)
        .map(|value| {
            value.to_str().map(str::trim).map_err(|err| OfferError::Invalid {
                name,
                reason: err.to_string(),
            })
        })
        .transpose()
}

impl PaymentOffer {
    pub fn is_required(&self) -> bool {
        matches!(self, PaymentOffer::Required(_))
    }

    pub fn terms(&self) -> Option<&PaymentTerms> {
        match self {
            PaymentOffer::Required(terms) => Some(terms),
            PaymentOffer::NotRequired => None,
        }
    }

    /// Read an offer from response headers.
    ///
    /// A missing or `false` `Payment-Required` header means no payment.
    pub fn from_headers(headers: &HeaderMap) -> std::result::Result<Self, OfferError> {
        let required = match header_str(headers, PAYMENT_REQUIRED)? {
            None => return Ok(PaymentOffer::NotRequired),
            Some(flag) if flag.eq_ignore_ascii_case("false") => {
                return Ok(PaymentOffer::NotRequired);
            }
            Some(flag) if flag.eq_ignore_ascii_case("true") => true,
            Some(flag) => {
                return Err(OfferError::Invalid {
                    name: PAYMENT_REQUIRED,
                    reason: format!("expected true or false, got '{flag}'"),
                });
            }
        };

        let amount = header_str(headers, PAYMENT_REQUIRED_AMOUNT)?
            .ok_or(OfferError::Missing(PAYMENT_REQUIRED_AMOUNT))?
            .parse::<AmountValue>()
            .map_err(|err| OfferError::Invalid {
                name: PAYMENT_REQUIRED_AMOUNT,
                reason: err.to_string(),
            })?;
        let currency = header_str(headers, PAYMENT_REQUIRED_CURRENCY)?
            .ok_or(OfferError::Missing(PAYMENT_REQUIRED_CURRENCY))?
            .parse::<Currency>()
            .map_err(|err| OfferError::Invalid {
                name: PAYMENT_REQUIRED_CURRENCY,
                reason: err.to_string(),
            })?;
        let description = header_str(headers, PAYMENT_REQUIRED_DESCRIPTION)?
            .unwrap_or_default()
            .to_string();

        OfferBody {
            required,
            amount: Some(amount),
            currency: Some(currency),
            description: Some(description),
        }
        .try_into()
    }

    /// Write this offer's headers. Nothing is written for [`PaymentOffer::NotRequired`].
    pub fn write_headers(&self, headers: &mut HeaderMap) -> std::result::Result<(), OfferError> {
        let PaymentOffer::Required(terms) = self else {
            return Ok(());
        };
        let description =
            HeaderValue::from_str(&terms.description).map_err(|err| OfferError::Invalid {
                name: PAYMENT_REQUIRED_DESCRIPTION,
                reason: err.to_string(),
            })?;

        headers.insert(
            HeaderName::from_static(PAYMENT_REQUIRED),
            HeaderValue::from_static("true"),
        );
        headers.insert(
            HeaderName::from_static(PAYMENT_REQUIRED_AMOUNT),
            HeaderValue::from(terms.amount.0),
        );
        headers.insert(
            HeaderName::from_static(PAYMENT_REQUIRED_CURRENCY),
            // Validated as three ASCII letters on construction
            HeaderValue::from_str(terms.currency.as_str()).map_err(|err| OfferError::Invalid {
                name: PAYMENT_REQUIRED_CURRENCY,
                reason: err.to_string(),
            })?,
        );
        headers.insert(
            HeaderName::from_static(PAYMENT_REQUIRED_DESCRIPTION),
            description,
        );
        Ok(())
    }
}

/// Body of `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    pub amount: AmountValue,
    pub currency: Currency,
    pub description: String,
    pub crawler_id: String,
}

impl SettlementRequest {
    /// Claim `terms` on behalf of `crawler_id`.
    pub fn for_terms(terms: &PaymentTerms, crawler_id: impl Into<String>) -> Self {
        SettlementRequest {
            amount: terms.amount,
            currency: terms.currency.clone(),
            description: terms.description.clone(),
            crawler_id: crawler_id.into(),
        }
    }
}

/// Successful settlement, echoing the claimed terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub success: bool,
    pub transaction_id: String,
    pub amount: AmountValue,
    pub currency: Currency,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Error payload for a malformed settlement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFailure {
    pub success: bool,
    pub error: String,
}

impl SettlementFailure {
    pub fn new(error: impl Into<String>) -> Self {
        SettlementFailure {
            success: false,
            error: error.into(),
        }
    }
}

/// Either settlement payload, as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettlementResponse {
    Settled(SettlementReceipt),
    Failed(SettlementFailure),
}

impl SettlementResponse {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The receipt, if the server reported success.
    pub fn into_result(self) -> std::result::Result<SettlementReceipt, String> {
        match self {
            SettlementResponse::Settled(receipt) if receipt.success => Ok(receipt),
            SettlementResponse::Settled(receipt) => Err(format!(
                "settlement {} reported unsuccessful",
                receipt.transaction_id
            )),
            SettlementResponse::Failed(failure) => Err(failure.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn terms() -> PaymentTerms {
        PaymentTerms {
            amount: 10u64.into(),
            currency: "USD".parse().unwrap(),
            description: "Premium article".to_string(),
        }
    }

    #[test]
    fn test_offer_headers() {
        let offer = PaymentOffer::Required(terms());
        let mut headers = HeaderMap::new();
        offer.write_headers(&mut headers).unwrap();

        assert_eq!(headers.get("Payment-Required").unwrap(), "true");
        assert_eq!(headers.get("Payment-Required-Amount").unwrap(), "10");
        assert_eq!(headers.get("Payment-Required-Currency").unwrap(), "USD");
        assert_eq!(
            headers.get("Payment-Required-Description").unwrap(),
            "Premium article"
        );
        assert_eq!(PaymentOffer::from_headers(&headers).unwrap(), offer);
    }

    #[test]
    fn test_no_offer_writes_nothing() {
        let mut headers = HeaderMap::new();
        PaymentOffer::NotRequired.write_headers(&mut headers).unwrap();
        assert!(headers.is_empty());
        assert_eq!(
            PaymentOffer::from_headers(&headers).unwrap(),
            PaymentOffer::NotRequired
        );
    }

    #[test]
    fn test_offer_header_errors() {
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_REQUIRED, HeaderValue::from_static("true"));
        assert_eq!(
            PaymentOffer::from_headers(&headers),
            Err(OfferError::Missing(PAYMENT_REQUIRED_AMOUNT))
        );

        headers.insert(PAYMENT_REQUIRED_AMOUNT, HeaderValue::from_static("0"));
        headers.insert(PAYMENT_REQUIRED_CURRENCY, HeaderValue::from_static("USD"));
        assert_eq!(
            PaymentOffer::from_headers(&headers),
            Err(OfferError::NonPositiveAmount)
        );

        headers.insert(PAYMENT_REQUIRED_AMOUNT, HeaderValue::from_static("-5"));
        assert!(matches!(
            PaymentOffer::from_headers(&headers),
            Err(OfferError::Invalid {
                name: PAYMENT_REQUIRED_AMOUNT,
                ..
            })
        ));

        headers.insert(PAYMENT_REQUIRED, HeaderValue::from_static("maybe"));
        assert!(matches!(
            PaymentOffer::from_headers(&headers),
            Err(OfferError::Invalid {
                name: PAYMENT_REQUIRED,
                ..
            })
        ));
    }

    #[test]
    fn test_offer_json_shape() {
        assert_eq!(
            serde_json::to_value(PaymentOffer::NotRequired).unwrap(),
            json!({ "required": false })
        );
        assert_eq!(
            serde_json::to_value(PaymentOffer::Required(terms())).unwrap(),
            json!({
                "required": true,
                "amount": 10,
                "currency": "USD",
                "description": "Premium article"
            })
        );
        assert!(
            serde_json::from_value::<PaymentOffer>(json!({ "required": true, "amount": 0, "currency": "USD" }))
                .is_err()
        );
    }

    #[test]
    fn test_settlement_wire_format() {
        let request = SettlementRequest::for_terms(&terms(), "crawler-1");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "amount": 10,
                "currency": "USD",
                "description": "Premium article",
                "crawlerId": "crawler-1"
            })
        );

        let receipt = json!({
            "success": true,
            "transactionId": "8b0c7a2e-4f0e-4c7e-9d55-2f4a8c1e2b11",
            "amount": 10,
            "currency": "USD",
            "description": "Premium article",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        let response = SettlementResponse::from_slice(receipt.to_string().as_bytes()).unwrap();
        let receipt = response.into_result().unwrap();
        assert_eq!(receipt.transaction_id, "8b0c7a2e-4f0e-4c7e-9d55-2f4a8c1e2b11");
        assert_eq!(receipt.amount, AmountValue(10));

        let failure = json!({ "success": false, "error": "amount must be positive" });
        let response = SettlementResponse::from_slice(failure.to_string().as_bytes()).unwrap();
        assert_eq!(
            response.into_result(),
            Err("amount must be positive".to_string())
        );

        assert!(matches!(
            SettlementResponse::from_slice(b"not json"),
            Err(crate::errors::Error::SerdeJsonError(_))
        ));
    }
}
