use base64::Engine;
use futures::future::BoxFuture;
use registry_abac::expr::{AttributeValue, EvalContext};
use registry_types::{error::ApiError, request::Request, response::Response};
use tower::{Layer, Service};

/// Extracts the caller's claims from the bearer token into an
/// [`EvalContext`] extension, the fact set [`crate::layer::abac`] matches
/// policy rules against. JWT *verification* is a collaborator concern
/// upstream of this server; this layer trusts the token's payload segment
/// and only decodes it, without re-deriving anything cryptographic.
#[derive(Clone)]
pub struct ClaimsExtensionService<S> {
    inner: S,
}

impl<S> ClaimsExtensionService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn claims_from_token(token: &str) -> EvalContext {
    let mut ctx = EvalContext::new();
    let Some(payload) = token.split('.').nth(1) else {
        return ctx;
    };
    let Ok(bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload) else {
        return ctx;
    };
    let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(&bytes) else {
        return ctx;
    };
    for (key, value) in map {
        let attr = match value {
            serde_json::Value::String(s) => AttributeValue::Str(s),
            serde_json::Value::Number(n) => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Num),
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            serde_json::Value::Null => AttributeValue::Null,
            // Arrays/objects aren't representable as a single attribute value;
            // the fragment grammar only ever needs scalar claims.
            _ => continue,
        };
        ctx.claims.insert(key, attr);
    }
    ctx
}

impl<S> Service<Request> for ClaimsExtensionService<S>
where
    S: Service<Request, Response = Response, Error = ApiError> + Send + Clone + 'static,
    S::Future: Send,
{
    type Response = Response;

    type Error = ApiError;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let mut this = self.clone();
        let claims = req
            .token
            .as_deref()
            .map_or_else(EvalContext::new, claims_from_token);
        req.extensions.insert(claims);
        Box::pin(async move { this.inner.call(req).await })
    }
}

pub struct ClaimsExtensionLayer;

impl<S: Service<Request>> Layer<S> for ClaimsExtensionLayer {
    type Service = ClaimsExtensionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClaimsExtensionService::new(inner)
    }
}
