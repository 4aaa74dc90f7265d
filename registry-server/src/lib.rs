#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![deny(clippy::get_unwrap)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod context;
mod handlers;
mod layer;
mod response;
mod router;
mod system;

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

pub use config::Config;
use registry_abac::parser::parse_policy;
use registry_abac::policy::Policy;
use tower::{make::Shared, ServiceBuilder};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};
use tracing::info;

use crate::{context::Context, layer::LogicalRequestResponseLayer, system::policy::DEFAULT_POLICY_NAME};

pub async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}

async fn load_policy(repos: &registry_storage::Repos) -> anyhow::Result<Policy> {
    match repos.policy.lookup(DEFAULT_POLICY_NAME).await? {
        Some(document) => {
            let text = serde_json::to_string(&document)?;
            parse_policy(&text)
        }
        None => {
            tracing::warn!("no policy document stored yet; starting deny-all");
            Ok(Policy { rules: Vec::new() })
        }
    }
}

pub async fn start(
    mut config: Config,
    shutdown_signal: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    config.sanitize()?;

    let port_tx = config.port_tx.take();
    let config = Arc::new(config);

    let pool = registry_storage::connect(&config.database_url).await?;
    let repos = registry_storage::Repos::new(Arc::new(pool));

    let policy = load_policy(&repos).await?;
    let ctx = Context::new(Arc::clone(&config), repos, policy);

    let server_router_svc = ServiceBuilder::new()
        .concurrency_limit(1000)
        .timeout(Duration::from_secs(30))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(LogicalRequestResponseLayer::new())
        .service(router::build(ctx));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let server = hyper::Server::bind(&addr).serve(Shared::new(server_router_svc));
    let addr = server.local_addr();
    let server = server.with_graceful_shutdown(shutdown_signal);

    info!("listening on {addr}");
    if let Some(tx) = port_tx {
        let _ = tx.send(addr.port());
    }

    if let Err(error) = server.await {
        tracing::error!(?error, "Encountered server error. Shutting down.");
        return Err(error.into());
    }
    Ok(())
}
