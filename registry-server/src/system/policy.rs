use registry_abac::parser::parse_policy;
use registry_abac::policy::ObjectMatcher;
use registry_framework::extract::{Extension, Json, Path};
use registry_types::{error::ApiError, response::Response};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::router::KNOWN_ROUTES;

pub const DEFAULT_POLICY_NAME: &str = "default";

#[derive(Debug, Deserialize)]
pub struct ReloadPolicyParams {
    /// The raw `{"AllAccessPermissionRules": {...}}` document. Stored
    /// verbatim; only the parsed/linked form is kept in memory as the
    /// active [`registry_abac::policy::Policy`].
    pub document: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ReloadPolicyResponse {
    pub name: String,
    pub rule_count: usize,
}

/// In strict mode, a ROUTE this server doesn't serve is rejected outright
/// rather than merely logged — see `handle_reload_policy`.
fn validate_routes(policy: &registry_abac::policy::Policy, strict: bool) -> Result<(), ApiError> {
    for rule in &policy.rules {
        for object in &rule.objects {
            if let ObjectMatcher::Route { path, .. } = object {
                let known = KNOWN_ROUTES.iter().any(|route| route == path);
                if !known {
                    if strict {
                        let mut api_err = ApiError::bad_request().in_context("policy", "reload");
                        api_err.error = anyhow::Error::msg(format!(
                            "policy references a route this server does not serve: \"{path}\""
                        ));
                        return Err(api_err);
                    }
                    tracing::debug!(path, "policy references an unrecognized route");
                }
            }
        }
    }
    Ok(())
}

/// Re-runs the parser/linker (C2) against the posted document and
/// atomically swaps the active policy snapshot. Reload replaces the whole
/// snapshot; it never mutates the old one in place.
pub async fn handle_reload_policy(
    Extension(ctx): Extension<Context>,
    Json(body): Json<ReloadPolicyParams>,
) -> Result<Response, ApiError> {
    let text = serde_json::to_string(&body.document)
        .map_err(|_| ApiError::bad_request().in_context("policy", "reload"))?;
    let policy = parse_policy(&text).map_err(|err| {
        let mut api_err = ApiError::bad_request().in_context("policy", "reload");
        api_err.error = err;
        api_err
    })?;

    validate_routes(&policy, ctx.config.strict_route_validation)?;

    ctx.repos
        .policy
        .put(DEFAULT_POLICY_NAME, &body.document)
        .await?;

    let rule_count = policy.rules.len();
    ctx.reload_policy(policy);

    let resp = ReloadPolicyResponse {
        name: DEFAULT_POLICY_NAME.to_string(),
        rule_count,
    };
    Response::raw(resp).map_err(|_| ApiError::internal_error().in_context("policy", "reload"))
}

pub async fn handle_get_policy(
    Extension(ctx): Extension<Context>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let document = ctx
        .repos
        .policy
        .lookup(&name)
        .await?
        .ok_or_else(ApiError::not_found)?;
    Response::raw(document).map_err(|_| ApiError::internal_error().in_context("policy", "get"))
}
