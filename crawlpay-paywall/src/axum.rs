use std::{convert::Infallible, pin::Pin};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use crawlpay_core::keys::KeyResolver;
use tower::{Layer, Service};

use crate::gate::SignatureGate;

impl<R: KeyResolver, S> Layer<S> for SignatureGate<R> {
    type Service = SignatureGateService<R, S>;

    fn layer(&self, inner: S) -> Self::Service {
        SignatureGateService {
            gate: self.clone(),
            inner,
        }
    }
}

pub struct SignatureGateService<R: KeyResolver, S> {
    gate: SignatureGate<R>,
    inner: S,
}

impl<R: KeyResolver, S: Clone> Clone for SignatureGateService<R, S> {
    fn clone(&self) -> Self {
        SignatureGateService {
            gate: self.gate.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<R, S> Service<Request> for SignatureGateService<R, S>
where
    R: KeyResolver + Send + Sync + 'static,
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let gate = self.gate.clone();
        // The readied service handles this call; the clone waits for the next one
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = gate
                .handle_request(request, move |req| async move {
                    match inner.call(req).await {
                        Ok(response) => response,
                        Err(never) => match never {},
                    }
                })
                .await
                .unwrap_or_else(IntoResponse::into_response);

            Ok(response)
        })
    }
}
