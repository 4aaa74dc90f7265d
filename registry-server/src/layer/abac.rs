use futures::future::BoxFuture;
use registry_abac::expr::EvalContext;
use registry_abac::policy::Right;
use registry_authorizer::{authorize, build_mask_plan, field_gates, filter_for_decision, AuthzRequest, Decision};
use registry_sql::{MaskFlag, QueryFilter};
use registry_types::error::ApiError;
use registry_types::request::{Operation, Request};
use registry_types::response::Response;
use tower::{Layer, Service};

use crate::context::Context;

fn as_right(operation: Operation) -> Right {
    match operation {
        Operation::Create => Right::Create,
        Operation::Read => Right::Read,
        Operation::Update => Right::Update,
        Operation::Delete => Right::Delete,
        Operation::Execute => Right::Execute,
    }
}

/// The Authorizer (C6) and Query Filter Integration (C7) wired into the
/// route stack: every request is matched against the current policy
/// snapshot, a hard deny short-circuits before the handler ever runs, and
/// a conditional allow attaches the [`QueryFilter`] the descriptor repos
/// splice into their SQL (`registry_authorizer::filter_for_decision`).
#[derive(Clone)]
pub struct AbacService<S> {
    inner: S,
    ctx: Context,
}

impl<S> AbacService<S> {
    pub fn new(inner: S, ctx: Context) -> Self {
        Self { inner, ctx }
    }
}

impl<S> Service<Request> for AbacService<S>
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
        Box::pin(async move {
            let bypass = this.ctx.config.anonymous_bypass && req.token.is_none();
            let policy = this.ctx.policy();
            let claims = req
                .extensions
                .get::<EvalContext>()
                .cloned()
                .unwrap_or_default();
            let authz_req = AuthzRequest {
                claims,
                right: as_right(req.operation),
                route_path: req.path.clone(),
                object_id: req.params.first().cloned(),
            };

            let decision = if bypass {
                Decision::AllowDirect
            } else {
                authorize(&policy, &authz_req)
            };

            if let Decision::Denied(reason) = &decision {
                tracing::debug!(path = %req.path, operation = ?req.operation, reason = %reason, "access denied");
                return Err(ApiError::denied_because(*reason).in_context("abac", "authorize"));
            }

            let mask_plan = if bypass {
                Vec::new()
            } else {
                build_mask_plan(&field_gates(&policy, &authz_req), &authz_req.claims)
            };

            req.extensions.insert::<QueryFilter>(filter_for_decision(&decision));
            req.extensions.insert::<Vec<MaskFlag>>(mask_plan);
            this.inner.call(req).await
        })
    }
}

pub struct AbacLayer {
    ctx: Context,
}

impl AbacLayer {
    #[must_use]
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

impl<S: Service<Request>> Layer<S> for AbacLayer {
    type Service = AbacService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AbacService::new(inner, self.ctx.clone())
    }
}
