use bytes::Bytes;
use crawlpay_core::payment::{PaymentOffer, SettlementFailure};
use http::{HeaderMap, HeaderValue, Response, StatusCode, header::CONTENT_TYPE};
use http_body_util::Full;
use serde_json::{Value, json};

/// Represents an error response from the content server.
///
/// A `402 Payment Required` answer is modeled as an error too: the handler
/// did not grant access and the client has to act on the attached offer.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ErrorResponse {
    fn new(status: StatusCode, body: Value) -> Self {
        ErrorResponse {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// The single rejection returned for every signature failure.
    ///
    /// Callers log the reason; it never reaches the client.
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "unauthorized" }),
        )
    }

    /// Payment is needed to access the resource.
    pub fn payment_required(offer: &PaymentOffer) -> Self {
        let mut response = Self::new(
            StatusCode::PAYMENT_REQUIRED,
            serde_json::to_value(offer).unwrap_or_else(|_| json!({ "required": true })),
        );
        if let Err(err) = offer.write_headers(&mut response.headers) {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to encode payment headers: {err}; body only");
            #[cfg(not(feature = "tracing"))]
            let _ = err;
        }
        response
    }

    /// Malformed settlement input.
    pub fn settlement_failed(reason: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            serde_json::to_value(SettlementFailure::new(reason.to_string()))
                .unwrap_or_else(|_| json!({ "success": false })),
        )
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            json!({ "error": format!("{what} not found") }),
        )
    }
}

impl From<ErrorResponse> for Response<Full<Bytes>> {
    fn from(value: ErrorResponse) -> Self {
        let body = match serde_json::to_vec(&value.body) {
            Ok(b) => b,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to serialize ErrorResponse body to JSON bytes: {err}");
                #[cfg(not(feature = "tracing"))]
                let _ = err;

                let mut response = Response::new(Full::new(Bytes::from_static(
                    b"Failed to serialize ErrorResponse body to JSON bytes",
                )));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return response;
            }
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = value.status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.headers_mut().extend(value.headers);
        response
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status, axum::extract::Json(self.body)).into_response();
        response.headers_mut().extend(self.headers);
        response
    }
}
