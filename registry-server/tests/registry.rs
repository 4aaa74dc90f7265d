use std::future::Future;

use serde_json::json;
use sqlx::PgPool;
use tokio::sync::oneshot;

fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

async fn setup(
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
    strict_route_validation: bool,
    anonymous_bypass: bool,
) -> (String, PgPool) {
    let database_url = database_url().expect("DATABASE_URL must be set");
    let (port_tx, port_rx) = oneshot::channel();

    let config = registry_server::Config {
        port: 0,
        port_tx: Some(port_tx),
        database_url: database_url.clone(),
        strict_route_validation,
        anonymous_bypass,
    };

    tokio::spawn(async move {
        if let Err(err) = registry_server::start(config, shutdown_signal).await {
            panic!("server error: {err}");
        }
    });

    let port = port_rx.await.expect("server announces its port");
    let pool = PgPool::connect(&database_url).await.expect("connect");
    (format!("http://127.0.0.1:{port}"), pool)
}

async fn seed_descriptor(pool: &PgPool, id: &str, asset_kind: &str, global_asset_id: Option<&str>) {
    sqlx::query(
        "INSERT INTO aas_descriptors (id, id_short, asset_kind, global_asset_id) VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE SET asset_kind = EXCLUDED.asset_kind, global_asset_id = EXCLUDED.global_asset_id",
    )
    .bind(id)
    .bind(format!("{id}-short"))
    .bind(asset_kind)
    .bind(global_asset_id)
    .execute(pool)
    .await
    .expect("seed descriptor");
}

async fn cleanup(pool: &PgPool) {
    sqlx::query("DELETE FROM submodel_descriptors").execute(pool).await.ok();
    sqlx::query("DELETE FROM aas_descriptors").execute(pool).await.ok();
    sqlx::query("DELETE FROM policies").execute(pool).await.ok();
}

/// An anonymous caller with no bearer token is denied once
/// `anonymous_bypass` is off and the active policy grants no rule
/// covering the request. A deny-all document is seeded straight
/// into storage (the way an operator ships a pre-authored policy with a
/// fresh deployment); the server picks it up on startup since loading the
/// stored document is the bootstrap path, not the reload endpoint.
#[tokio::test]
#[ignore = "requires a live Postgres at DATABASE_URL"]
async fn anonymous_caller_denied_without_bypass() {
    let database_url = database_url().expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url).await.expect("connect");
    cleanup(&pool).await;
    seed_descriptor(&pool, "aas-1", "Instance", None).await;

    let policy = json!({
        "AllAccessPermissionRules": {
            "rules": [{
                "ACL": { "access": "DENY", "rights": ["READ"], "subjects": ["any"] },
                "OBJECTS": [{ "route": { "path": "/shell-descriptors" } }],
                "FORMULA": { "$boolVal": true },
            }],
        }
    });
    sqlx::query("INSERT INTO policies (name, document) VALUES ('default', $1)")
        .bind(&policy)
        .execute(&pool)
        .await
        .expect("seed policy");

    let (base, pool) = setup(registry_server::shutdown_signal(), false, false).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/shell-descriptors"))
        .send()
        .await
        .expect("list descriptors");
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);

    cleanup(&pool).await;
}

/// Anonymous bypass grants every right when no token is presented. Used
/// by trusted internal callers only.
#[tokio::test]
#[ignore = "requires a live Postgres at DATABASE_URL"]
async fn anonymous_bypass_allows_full_access() {
    let (base, pool) = setup(registry_server::shutdown_signal(), false, true).await;
    cleanup(&pool).await;
    seed_descriptor(&pool, "aas-2", "Instance", Some("urn:example:asset-2")).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/shell-descriptors/aas-2"))
        .send()
        .await
        .expect("get descriptor");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    cleanup(&pool).await;
}

/// Reloading a policy whose ROUTE objects all name routes this server
/// actually serves round-trips through storage and is reflected back by
/// the get-policy endpoint.
#[tokio::test]
#[ignore = "requires a live Postgres at DATABASE_URL"]
async fn policy_reload_round_trips_through_storage() {
    let (base, pool) = setup(registry_server::shutdown_signal(), true, true).await;
    cleanup(&pool).await;

    let policy = json!({
        "AllAccessPermissionRules": {
            "rules": [{
                "idShort": "allow-read",
                "ACL": { "access": "ALLOW", "rights": ["READ"], "subjects": ["any"] },
                "OBJECTS": [{ "route": { "path": "/shell-descriptors" } }],
                "FORMULA": { "$boolVal": true },
            }],
        }
    });

    let client = reqwest::Client::new();
    let resp = client
        .put(format!("{base}/policies/default"))
        .json(&json!({ "document": policy }))
        .send()
        .await
        .expect("reload policy");
    assert!(resp.status().is_success());

    let resp = client
        .get(format!("{base}/policies/default"))
        .send()
        .await
        .expect("get policy")
        .json::<serde_json::Value>()
        .await
        .expect("json body");
    assert_eq!(resp["AllAccessPermissionRules"]["rules"][0]["idShort"], "allow-read");

    cleanup(&pool).await;
}

/// In strict mode, reloading a policy whose ROUTE objects name a route
/// this server doesn't serve is rejected rather than silently accepted.
#[tokio::test]
#[ignore = "requires a live Postgres at DATABASE_URL"]
async fn strict_mode_rejects_policy_with_unknown_route() {
    let (base, pool) = setup(registry_server::shutdown_signal(), true, true).await;
    cleanup(&pool).await;

    let policy = json!({
        "AllAccessPermissionRules": {
            "rules": [{
                "idShort": "allow-read",
                "ACL": { "access": "ALLOW", "rights": ["READ"], "subjects": ["any"] },
                "OBJECTS": [{ "route": { "path": "/not-a-real-route" } }],
                "FORMULA": { "$boolVal": true },
            }],
        }
    });

    let client = reqwest::Client::new();
    let resp = client
        .put(format!("{base}/policies/default"))
        .json(&json!({ "document": policy }))
        .send()
        .await
        .expect("reload policy");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    cleanup(&pool).await;
}
