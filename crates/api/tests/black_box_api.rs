use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use quillerp_auth::{JwtClaims, PrincipalId, Role};
use quillerp_core::TenantId;
use quillerp_jobs::JobServiceConfig;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    _artifacts: tempfile::TempDir,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        let artifacts = tempfile::tempdir().expect("failed to create artifact dir");
        let config = JobServiceConfig {
            artifact_dir: artifacts.path().to_path_buf(),
            poll_interval: std::time::Duration::from_millis(20),
            ..JobServiceConfig::default()
        };

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = quillerp_api::app::build_app(jwt_secret.to_string(), config).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            _artifacts: artifacts,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, tenant_id: TenantId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn seed_demo(client: &reqwest::Client, base_url: &str, token: &str) {
    let res = client
        .post(format!("{}/admin/seed-demo", base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

/// Poll a job until it reaches a terminal status (the worker runs in the
/// background; a job takes a few poll intervals to settle).
async fn wait_for_settled(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    collection: &str,
    id: &str,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = client
            .get(format!("{}/{}/{}", base_url, collection, id))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();

        match body["status"].as_str().unwrap() {
            "pending" | "processing" => {
                tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            }
            _ => return body,
        }
    }
    panic!("job did not settle within timeout");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let health = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/exports", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn invalid_export_reports_every_violation() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    // Unknown entity type, empty id scope and a pdf export without template.
    let res = client
        .post(format!("{}/exports", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "entityType": "spaceship",
            "format": "pdf",
            "entityIds": [],
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["violations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn export_lifecycle_submit_poll_download() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);
    let client = reqwest::Client::new();
    seed_demo(&client, &srv.base_url, &token).await;

    let res = client
        .post(format!("{}/exports", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "entityType": "invoice",
            "format": "csv",
            "filters": { "status": "open" },
            "columns": ["status", "total"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: serde_json::Value = res.json().await.unwrap();
    assert_eq!(accepted["status"], "pending");
    assert_eq!(accepted["records"], 2);
    let id = accepted["jobId"].as_str().unwrap().to_string();

    let job = wait_for_settled(&client, &srv.base_url, &token, "exports", &id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"], 100);
    assert!(job["expiresAt"].is_string());
    assert!(job["output"]["fileName"].as_str().unwrap().ends_with(".csv"));

    let res = client
        .get(format!("{}/exports/{}/download", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["content-type"].to_str().unwrap(),
        "text/csv"
    );
    let body = res.text().await.unwrap();
    assert!(body.contains("inv-1001"));
    assert!(body.contains("inv-1002"));
    assert!(!body.contains("inv-1003"));

    // Downloads are counted.
    let res = client
        .get(format!("{}/exports/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let job: serde_json::Value = res.json().await.unwrap();
    assert_eq!(job["downloadCount"], 1);

    // DELETE on a finished job removes the record (and its artifact).
    let res = client
        .delete(format!("{}/exports/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = client
        .get(format!("{}/exports/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn print_uses_the_default_template() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);
    let client = reqwest::Client::new();
    seed_demo(&client, &srv.base_url, &token).await;

    // No default template yet: the submission is rejected up front.
    let print_request = json!({
        "entityType": "invoice",
        "entityIds": ["inv-1001"],
        "docType": "invoice",
    });
    let res = client
        .post(format!("{}/prints", srv.base_url))
        .bearer_auth(&token)
        .json(&print_request)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/templates", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "name": "standard invoice",
            "docType": "invoice",
            "content": "Invoice {{id}} total {{total}}",
            "isDefault": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/prints", srv.base_url))
        .bearer_auth(&token)
        .json(&print_request)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: serde_json::Value = res.json().await.unwrap();
    let id = accepted["jobId"].as_str().unwrap().to_string();

    let job = wait_for_settled(&client, &srv.base_url, &token, "prints", &id).await;
    assert_eq!(job["status"], "completed");

    let res = client
        .get(format!("{}/prints/{}/download", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(body.contains("Invoice inv-1001 total 1250"));
}

#[tokio::test]
async fn bulk_operation_reports_per_record_failures() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);
    let client = reqwest::Client::new();
    seed_demo(&client, &srv.base_url, &token).await;

    let res = client
        .post(format!("{}/bulk-operations", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "entityType": "invoice",
            "entityIds": ["inv-1001", "does-not-exist"],
            "operation": { "op": "set_status", "status": "archived" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: serde_json::Value = res.json().await.unwrap();
    let id = accepted["jobId"].as_str().unwrap().to_string();

    let job = wait_for_settled(&client, &srv.base_url, &token, "bulk-operations", &id).await;
    assert_eq!(job["status"], "partially_completed");
    assert_eq!(job["counts"]["succeeded"], 1);
    assert_eq!(job["counts"]["failed"], 1);
    let errors = job["output"]["recordErrors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["entityId"], "does-not-exist");
    assert!(job["output"]["undoAvailableUntil"].is_string());
}

#[tokio::test]
async fn jobs_of_other_principals_read_as_not_found() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let tenant_id = TenantId::new();
    let owner_token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let other_token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();
    seed_demo(&client, &srv.base_url, &owner_token).await;

    let res = client
        .post(format!("{}/exports", srv.base_url))
        .bearer_auth(&owner_token)
        .json(&json!({ "entityType": "invoice", "format": "csv" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: serde_json::Value = res.json().await.unwrap();
    let id = accepted["jobId"].as_str().unwrap().to_string();

    // Same tenant, different principal: the job does not exist for them.
    let res = client
        .get(format!("{}/exports/{}", srv.base_url, id))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/exports/{}/download", srv.base_url, id))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_without_a_completed_result_is_too_early() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);
    let client = reqwest::Client::new();
    seed_demo(&client, &srv.base_url, &token).await;

    // xlsx passes validation but the dev renderer cannot produce it, so the
    // job settles as failed.
    let res = client
        .post(format!("{}/exports", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "entityType": "invoice", "format": "xlsx" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: serde_json::Value = res.json().await.unwrap();
    let id = accepted["jobId"].as_str().unwrap().to_string();

    let job = wait_for_settled(&client, &srv.base_url, &token, "exports", &id).await;
    assert_eq!(job["status"], "failed");

    let res = client
        .get(format!("{}/exports/{}/download", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_EARLY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_ready");
}

#[tokio::test]
async fn roles_gate_job_capabilities() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let tenant_id = TenantId::new();
    let client = reqwest::Client::new();

    // back_office may create jobs but not seed demo data.
    let back_office = mint_jwt(jwt_secret, tenant_id, vec![Role::new("back_office")]);
    let res = client
        .post(format!("{}/admin/seed-demo", srv.base_url))
        .bearer_auth(&back_office)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // An unknown role gets nothing.
    let visitor = mint_jwt(jwt_secret, tenant_id, vec![Role::new("visitor")]);
    let res = client
        .get(format!("{}/exports", srv.base_url))
        .bearer_auth(&visitor)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stats_count_jobs_per_tenant() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);
    let client = reqwest::Client::new();
    seed_demo(&client, &srv.base_url, &token).await;

    let res = client
        .post(format!("{}/exports", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "entityType": "invoice", "format": "csv" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: serde_json::Value = res.json().await.unwrap();
    let id = accepted["jobId"].as_str().unwrap().to_string();
    wait_for_settled(&client, &srv.base_url, &token, "exports", &id).await;

    let res = client
        .get(format!("{}/jobs/stats", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["jobs"]["completed"], 1);
    assert_eq!(body["queueDepths"]["export"], 0);

    // Per-category counters report the same completion.
    let res = client
        .get(format!("{}/exports/stats", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["jobs"]["completed"], 1);
    assert_eq!(body["queueDepth"], 0);

    // A fresh tenant sees empty stats.
    let other = mint_jwt(jwt_secret, TenantId::new(), vec![Role::new("admin")]);
    let res = client
        .get(format!("{}/jobs/stats", srv.base_url))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["jobs"]["completed"], 0);
}
