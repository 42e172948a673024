use serde_json::Value;
use stormgrid_auth::config::{ClientSeed, RoleSeed, UserSeed};
use stormgrid_auth::types::{ClientKind, GrantType};
use stormgrid_config::ServerConfig;
use stormgrid_server::build_app;
use tokio::task::JoinHandle;

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.auth.issuer = "https://control.test".to_string();
    config.auth.signing.hmac_secret = Some("0123456789abcdef0123456789abcdef".to_string());

    config.auth.clients = vec![
        ClientSeed {
            client_id: "ops".to_string(),
            secret: Some("s3cret".to_string()),
            kind: ClientKind::Confidential,
            display_name: None,
            allowed_scopes: vec![
                "engine.*".to_string(),
                "control-plane.cluster.read".to_string(),
            ],
            allowed_grants: vec![GrantType::ClientCredentials],
            enabled: true,
        },
        ClientSeed {
            client_id: "portal".to_string(),
            secret: Some("p0rtal".to_string()),
            kind: ClientKind::Confidential,
            display_name: None,
            allowed_scopes: vec!["engine.*".to_string(), "control-plane.*".to_string()],
            allowed_grants: vec![GrantType::Password, GrantType::RefreshToken],
            enabled: true,
        },
        ClientSeed {
            client_id: "fleet".to_string(),
            secret: Some("fl33t".to_string()),
            kind: ClientKind::Confidential,
            display_name: None,
            allowed_scopes: vec!["control-plane.*".to_string()],
            allowed_grants: vec![GrantType::ClientCredentials],
            enabled: true,
        },
    ];
    config.auth.roles = vec![RoleSeed {
        name: "operator".to_string(),
        scopes: vec!["engine.match.*".to_string(), "control-plane.*".to_string()],
        includes: vec![],
    }];
    config.auth.users = vec![UserSeed {
        username: "ada".to_string(),
        password: "pa55word".to_string(),
        roles: vec!["operator".to_string()],
    }];
    config
}

async fn start_server(config: ServerConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let (app, _state) = build_app(config).await.expect("build app");

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

async fn fetch_token(
    client: &reqwest::Client,
    base: &str,
    form: &[(&str, &str)],
) -> (reqwest::StatusCode, Value) {
    let resp = client
        .post(format!("{base}/oauth2/token"))
        .form(form)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

async fn service_token(client: &reqwest::Client, base: &str, id: &str, secret: &str) -> String {
    let (status, body) = fetch_token(
        client,
        base,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", id),
            ("client_secret", secret),
        ],
    )
    .await;
    assert_eq!(status, 200, "token request for {id} failed: {body}");
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_endpoints_are_anonymous() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    for path in ["/", "/healthz", "/readyz"] {
        let resp = client.get(format!("{base}{path}")).send().await.unwrap();
        assert!(resp.status().is_success(), "{path} should be public");
    }

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn client_credentials_happy_path() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let (status, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "ops"),
            ("client_secret", "s3cret"),
            ("scope", "engine.match.read"),
        ],
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["scope"], "engine.match.read");
    assert!(body.get("refresh_token").is_none());

    // The issued JWT verifies through the validation endpoint.
    let resp = client
        .post(format!("{base}/api/tokens/validate"))
        .json(&serde_json::json!({ "token": body["access_token"] }))
        .send()
        .await
        .unwrap();
    let validation: Value = resp.json().await.unwrap();
    assert_eq!(validation["valid"], true);
    assert_eq!(validation["scopes"], serde_json::json!(["engine.match.read"]));

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn client_credentials_with_basic_auth() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/oauth2/token"))
        .basic_auth("ops", Some("s3cret"))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scope"], "engine.* control-plane.cluster.read");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn invalid_scope_is_rejected() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let (status, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "ops"),
            ("client_secret", "s3cret"),
            ("scope", "auth.user.delete"),
        ],
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_scope");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unknown_client_is_unauthorized() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let (status, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "ghost"),
            ("client_secret", "nope"),
        ],
    )
    .await;

    assert_eq!(status, 401);
    assert_eq!(body["error"], "invalid_client");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn refresh_token_rotates_and_is_single_use() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let (status, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "password"),
            ("client_id", "portal"),
            ("client_secret", "p0rtal"),
            ("username", "ada"),
            ("password", "pa55word"),
        ],
    )
    .await;
    assert_eq!(status, 200);
    let r1 = body["refresh_token"].as_str().unwrap().to_string();

    let (status, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", "portal"),
            ("client_secret", "p0rtal"),
            ("refresh_token", &r1),
        ],
    )
    .await;
    assert_eq!(status, 200);
    let r2 = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(r1, r2);

    // Replaying the spent token fails with invalid_grant.
    let (status, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", "portal"),
            ("client_secret", "p0rtal"),
            ("refresh_token", &r1),
        ],
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_grant");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn node_lifecycle_over_http() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();
    let token = service_token(&client, &base, "fleet", "fl33t").await;

    // Register.
    let resp = client
        .post(format!("{base}/api/nodes"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "nodeId": "n1",
            "endpointUrl": "http://10.0.0.1:7700",
            "capacity": { "maxContainers": 8 }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let node: Value = resp.json().await.unwrap();
    assert_eq!(node["status"], "HEALTHY");

    // Heartbeat with metrics.
    let resp = client
        .put(format!("{base}/api/nodes/n1/heartbeat"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "metrics": {
                "containerCount": 3,
                "matchCount": 2,
                "cpuUsage": 0.4,
                "memoryUsedMb": 2048,
                "memoryMaxMb": 8192
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let node: Value = resp.json().await.unwrap();
    assert_eq!(node["metrics"]["containerCount"], 3);

    // List.
    let resp = client
        .get(format!("{base}/api/nodes"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let nodes: Value = resp.json().await.unwrap();
    assert_eq!(nodes.as_array().unwrap().len(), 1);

    // Drain.
    let resp = client
        .post(format!("{base}/api/nodes/n1/drain"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let node: Value = resp.json().await.unwrap();
    assert_eq!(node["status"], "DRAINING");

    // Deregister.
    let resp = client
        .delete(format!("{base}/api/nodes/n1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .delete(format!("{base}/api/nodes/n1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn node_endpoints_enforce_scopes() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    // No token at all.
    let resp = client
        .get(format!("{base}/api/nodes"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // A token without control-plane scopes.
    let (_, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "client_credentials"),
            ("client_id", "ops"),
            ("client_secret", "s3cret"),
            ("scope", "engine.match.read"),
        ],
    )
    .await;
    let weak_token = body["access_token"].as_str().unwrap();

    let resp = client
        .get(format!("{base}/api/nodes"))
        .bearer_auth(weak_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert!(
        body["error_description"]
            .as_str()
            .unwrap()
            .contains("control-plane.cluster.read")
    );

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn user_token_reaches_node_api() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let (_, body) = fetch_token(
        &client,
        &base,
        &[
            ("grant_type", "password"),
            ("client_id", "portal"),
            ("client_secret", "p0rtal"),
            ("username", "ada"),
            ("password", "pa55word"),
        ],
    )
    .await;
    let token = body["access_token"].as_str().unwrap();

    let resp = client
        .get(format!("{base}/api/nodes"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn autoscaler_recommendation_and_ack() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();
    let token = service_token(&client, &base, "fleet", "fl33t").await;

    // Empty fleet bootstraps towards min_nodes.
    let resp = client
        .get(format!("{base}/api/autoscaler/recommendation"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let rec: Value = resp.json().await.unwrap();
    assert_eq!(rec["action"], "SCALE_UP");
    assert_eq!(rec["reason"], "no healthy nodes");

    // Acknowledge: the cooldown starts.
    let resp = client
        .post(format!("{base}/api/autoscaler/ack"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{base}/api/autoscaler/recommendation"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let rec: Value = resp.json().await.unwrap();
    assert_eq!(rec["action"], "NONE");
    assert_eq!(rec["reason"], "cooldown");

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn validate_endpoint_rejects_garbage() {
    let (base, shutdown, handle) = start_server(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/tokens/validate"))
        .json(&serde_json::json!({ "token": "not.a.jwt" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["valid"], false);
    assert!(body["error"].is_string());

    let _ = shutdown.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn token_endpoint_rate_limits() {
    let mut config = test_config();
    config.auth.rate_limit.max_per_window = 2;
    let (base, shutdown, handle) = start_server(config).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let (status, _) = fetch_token(
            &client,
            &base,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", "ops"),
                ("client_secret", "s3cret"),
            ],
        )
        .await;
        assert_eq!(status, 200);
    }

    let resp = client
        .post(format!("{base}/oauth2/token"))
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", "ops"),
            ("client_secret", "s3cret"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("retry-after"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate_limit_exceeded");

    let _ = shutdown.send(());
    let _ = handle.await;
}
