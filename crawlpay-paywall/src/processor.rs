use crawlpay_core::{
    keys::KeyResolver,
    signature::{VerifiedSignature, VerifyResult},
};
use http::Request;

use crate::{errors::ErrorResponse, gate::SignatureGate};

/// Request processing state before running the resource handler.
///
/// See [`SignatureGate`] for usage in the full flow.
pub struct RequestProcessor<'g, R: KeyResolver, Req> {
    pub gate: &'g SignatureGate<R>,
    pub request: Request<Req>,
    /// Absolute URL the signature is checked against.
    pub target_uri: String,
    /// Verification result, once [`verify`](RequestProcessor::verify) succeeded.
    pub verified: Option<VerifiedSignature>,
}

impl<'g, R: KeyResolver, Req> RequestProcessor<'g, R, Req> {
    /// Verify the request signature.
    ///
    /// `self.verified` will be populated on success.
    pub fn verify(mut self) -> Result<Self, ErrorResponse> {
        let result = self.gate.verifier.verify(
            self.request.method(),
            &self.target_uri,
            self.request.headers(),
        );

        let verified = match result {
            VerifyResult::Valid(v) => v,
            VerifyResult::Invalid(err) => return Err(self.gate.rejected(&err)),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Signature verified: keyid='{}', label='{}', created={}",
            verified.key_id,
            verified.label,
            verified.created
        );

        self.verified = Some(verified);
        Ok(self)
    }

    /// Run the resource handler with the verified signature attached to the request extensions.
    pub async fn run_handler<Fun, Fut, Res>(mut self, handler: Fun) -> Res
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Res>,
    {
        if let Some(verified) = self.verified {
            self.request.extensions_mut().insert(verified);
        }
        handler(self.request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crawlpay_core::{
        keys::{KeyMaterial, StaticKeyResolver},
        signature::{ComposerConfig, SignatureComposer, SignatureVerifier, VerifierConfig},
    };
    use http::{HeaderMap, Method, Response, StatusCode};

    use crate::gate::GateConfig;

    use super::*;

    fn gate(key: &KeyMaterial) -> SignatureGate<StaticKeyResolver> {
        SignatureGate::builder()
            .verifier(SignatureVerifier::new(
                StaticKeyResolver::from(key),
                VerifierConfig::default(),
            ))
            .build()
    }

    fn signed_request(key: &KeyMaterial, url: &str, host: &str, path: &str) -> Request<()> {
        let composer = SignatureComposer::new(key.clone(), ComposerConfig::default());
        let signed = composer.compose(&Method::GET, url, &HeaderMap::new()).unwrap();

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header("host", host)
            .body(())
            .unwrap();
        signed.apply(request.headers_mut()).unwrap();
        request
    }

    #[test]
    fn test_target_uri_from_host() {
        let key = KeyMaterial::from_seed(&[3u8; 32]);
        let request = Request::builder()
            .uri("/content/a?x=1")
            .header("host", "127.0.0.1:8787")
            .body(())
            .unwrap();

        assert_eq!(
            gate(&key).target_uri(&request).unwrap(),
            "http://127.0.0.1:8787/content/a?x=1"
        );

        let fixed = SignatureGate::builder()
            .verifier(Arc::new(SignatureVerifier::new(
                StaticKeyResolver::from(&key),
                VerifierConfig::default(),
            )))
            .config(
                GateConfig::builder()
                    .scheme("https")
                    .authority("crawl.example")
                    .build(),
            )
            .build();
        assert_eq!(
            fixed.target_uri(&request).unwrap(),
            "https://crawl.example/content/a?x=1"
        );

        let absolute = Request::builder()
            .uri("https://other.example/content/b")
            .body(())
            .unwrap();
        assert_eq!(
            gate(&key).target_uri(&absolute).unwrap(),
            "https://other.example/content/b"
        );
    }

    #[tokio::test]
    async fn test_verified_signature_reaches_handler() {
        let key = KeyMaterial::from_seed(&[3u8; 32]);
        let request = signed_request(
            &key,
            "http://testbed.local/content/a",
            "testbed.local",
            "/content/a",
        );

        let response = gate(&key)
            .handle_request(request, |req| async move {
                let verified = req.extensions().get::<VerifiedSignature>().cloned();
                Response::new(verified.map(|v| v.key_id))
            })
            .await
            .unwrap();

        assert_eq!(response.body().as_deref(), Some(key.key_id()));
    }

    #[tokio::test]
    async fn test_rejection_is_uniform() {
        let key = KeyMaterial::from_seed(&[3u8; 32]);
        // Signed for a different path than the one requested
        let request = signed_request(
            &key,
            "http://testbed.local/content/a",
            "testbed.local",
            "/content/b",
        );

        let err = gate(&key)
            .handle_request(request, |_| async { Response::new(()) })
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let unsigned = Request::builder()
            .uri("/content/a")
            .header("host", "testbed.local")
            .body(())
            .unwrap();
        let err = gate(&key)
            .handle_request(unsigned, |_| async { Response::new(()) })
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.body, ErrorResponse::unauthorized().body);
    }
}
