use std::convert::Infallible;

use futures::future::BoxFuture;
use http_body::Limited;
use hyper::{http, Body};
use registry_types::{error::ApiError, request::Request, response::Response};
use tower::{Layer, Service, ServiceExt};

use crate::response::into_hyper_response;

/// Maps a raw hyper request into the logical [`Request`] every inner layer
/// and handler speaks, and maps the logical [`Response`]/[`ApiError`] back
/// out to hyper. Everything below this layer never sees an HTTP type.
#[derive(Debug, Clone)]
pub struct LogicalRequestResponseService<S> {
    inner: S,
}

impl<S> LogicalRequestResponseService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> Service<http::Request<Limited<Body>>> for LogicalRequestResponseService<S>
where
    S: Service<Request, Response = Response, Error = ApiError> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = http::Response<Body>;

    type Error = Infallible;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<Limited<Body>>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let logical_req = match Request::new(req).await {
                Ok(req) => req,
                Err(err) => return Ok(err.into()),
            };
            match this.inner.oneshot(logical_req).await {
                Ok(resp) => Ok(into_hyper_response(&resp)),
                Err(err) => {
                    let report = err.report();
                    tracing::error!(?report, "API error encountered");
                    Ok(err.into())
                }
            }
        })
    }
}

#[derive(Default)]
pub struct LogicalRequestResponseLayer {}

impl LogicalRequestResponseLayer {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }
}

impl<S> Layer<S> for LogicalRequestResponseLayer {
    type Service = LogicalRequestResponseService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LogicalRequestResponseService::new(inner)
    }
}
