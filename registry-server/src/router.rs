use registry_framework::extract::Extension;
use registry_framework::{read_with_config, Router, RouteConfig, SyncService};
use registry_types::request::Request;
use registry_types::response::Response;

use crate::context::Context;
use crate::handlers::descriptor::{
    handle_get_aas_descriptor, handle_list_aas_descriptors, handle_list_submodel_descriptors,
};
use crate::layer::{AbacLayer, ClaimsExtensionLayer};
use crate::system::policy::{handle_get_policy, handle_reload_policy};

/// Route templates this server actually serves, in the `{param}` form
/// `registry_abac::policy::ObjectMatcher::Route` templates use. Consulted
/// by `system::policy::handle_reload_policy` under strict mode to verify
/// that every ROUTE in OBJECTS matches a route this server actually
/// serves.
pub const KNOWN_ROUTES: &[&str] = &[
    "/shell-descriptors",
    "/shell-descriptors/{aasIdentifier}",
    "/shell-descriptors/{aasIdentifier}/submodel-descriptors",
    "/policies/{name}",
];

// Every route here is registered `unauthenticated`: the per-route token
// gate is a blunt yes/no check, and the real decision, for both
// authenticated and (when configured) anonymous callers, is made by
// `AbacLayer` (C6/C7) wrapped around the whole router below.
pub fn build(ctx: Context) -> SyncService<Request, Response> {
    Router::new()
        .route(
            "/shell-descriptors",
            read_with_config(handle_list_aas_descriptors, RouteConfig::unauthenticated()),
        )
        .route(
            "/shell-descriptors/:id",
            read_with_config(handle_get_aas_descriptor, RouteConfig::unauthenticated()),
        )
        .route(
            "/shell-descriptors/:id/submodel-descriptors",
            read_with_config(
                handle_list_submodel_descriptors,
                RouteConfig::unauthenticated(),
            ),
        )
        .route(
            "/policies/:name",
            read_with_config(handle_get_policy, RouteConfig::unauthenticated())
                .update_with_config(handle_reload_policy, RouteConfig::unauthenticated()),
        )
        .layer(AbacLayer::new(ctx.clone()))
        .layer(ClaimsExtensionLayer)
        .layer(Extension(ctx))
        .build()
        .into_service()
}
