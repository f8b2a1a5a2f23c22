//! Integration tests for the OAuth credentials and the API client against wiremock

use azauth::cache::{CacheKey, CacheMode, TokenCache};
use azauth::oauth::MIN_POLL_INTERVAL;
use azauth::{
    ApiClient, AuthCodeCredential, AuthError, ClientSecretCredential, Config, Credential,
    CredentialParams, DeviceCodeCredential, InteractiveCredential, RetryPolicy, Token,
};
use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, interactive: bool) -> Config {
    Config::builder()
        .authority_host(server.uri())
        .interactive(interactive)
        .open_browser(false)
        .build()
}

fn token_body(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "ext_expires_in": 3600
    })
}

fn secret_params(tenant: &str, client_id: &str) -> CredentialParams {
    CredentialParams::builder()
        .tenant_id(tenant)
        .client_id(client_id)
        .client_secret("s1")
        .cache_mode(CacheMode::Memory)
        .build()
}

#[tokio::test]
async fn test_client_secret_token_is_cached_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-a/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-cache-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("app-token")))
        .expect(1)
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new(
        &secret_params("tenant-a", "client-cache-test"),
        &config_for(&server, false),
    )
    .unwrap();
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let request = credential
            .req_auth(client.get("http://localhost/"))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer app-token");
    }
}

#[tokio::test]
async fn test_disk_cache_survives_new_instances() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-disk/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("disk-token")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .authority_host(server.uri())
        .config_dir(dir.path())
        .interactive(false)
        .build();
    let params = CredentialParams::builder()
        .tenant_id("tenant-disk")
        .client_id("client-disk-test")
        .client_secret("s1")
        .build();

    for _ in 0..2 {
        let credential = ClientSecretCredential::new(&params, &config).unwrap();
        assert_eq!(credential.get_token().await.unwrap().access_token, "disk-token");
    }
    assert!(dir.path().join("tokens").is_dir());
}

#[tokio::test]
async fn test_rejected_secret_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-b/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new(
        &secret_params("tenant-b", "client-reject-test"),
        &config_for(&server, false),
    )
    .unwrap();

    let err = credential.get_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Authentication(_)), "{err}");
    assert!(err.to_string().contains("invalid_client"));
}

#[tokio::test]
async fn test_device_code_flow_polls_until_approved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-c/oauth2/v2.0/devicecode"))
        .and(body_string_contains("offline_access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "device-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 60,
            "interval": 0,
            "message": "To sign in, enter ABCD-EFGH at https://microsoft.com/devicelogin"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-c/oauth2/v2.0/token"))
        .and(body_string_contains("device_code=device-123"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-c/oauth2/v2.0/token"))
        .and(body_string_contains("device_code=device-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = CredentialParams::builder()
        .tenant_id("tenant-c")
        .client_id("client-device-test")
        .cache_mode(CacheMode::Memory)
        .build();
    let credential = DeviceCodeCredential::new(&params, &config_for(&server, true)).unwrap();

    let start = Instant::now();
    let token = credential.get_token().await.unwrap();
    assert_eq!(token.access_token, "user-token");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-123"));
    // The server asked for a zero interval; polls are still spaced out
    assert!(start.elapsed() >= MIN_POLL_INTERVAL, "{:?}", start.elapsed());

    // Served from the cache, no second flow
    let again = credential.get_token().await.unwrap();
    assert_eq!(again.access_token, "user-token");
}

#[tokio::test]
async fn test_huge_device_code_lifetime_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-g/oauth2/v2.0/devicecode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "device-789",
            "user_code": "HUGE",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": u64::MAX,
            "interval": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-g/oauth2/v2.0/token"))
        .and(body_string_contains("device_code=device-789"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "long-lived",
            "token_type": "Bearer",
            "expires_in": u64::MAX
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = CredentialParams::builder()
        .tenant_id("tenant-g")
        .client_id("client-huge-lifetime-test")
        .cache_mode(CacheMode::Memory)
        .build();
    let credential = DeviceCodeCredential::new(&params, &config_for(&server, true)).unwrap();

    let token = credential.get_token_with(true).await.unwrap();
    assert_eq!(token.access_token, "long-lived");
    assert!(!token.is_expired());
}

#[tokio::test]
async fn test_huge_token_lifetime_does_not_overflow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-h/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "forever",
            "token_type": "Bearer",
            "expires_in": u64::MAX
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new(
        &secret_params("tenant-h", "client-overflow-test"),
        &config_for(&server, false),
    )
    .unwrap();

    let token = credential.get_token().await.unwrap();
    assert_eq!(token.access_token, "forever");
    assert!(!token.is_expired());
    assert!(token.remaining_validity().unwrap() <= Duration::from_secs(24 * 60 * 60));
}

#[tokio::test]
async fn test_string_encoded_huge_lifetime_fails_cleanly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-i/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "stringly",
            "token_type": "Bearer",
            "expires_in": "18446744073709551615"
        })))
        .mount(&server)
        .await;

    let credential = ClientSecretCredential::new(
        &secret_params("tenant-i", "client-string-lifetime-test"),
        &config_for(&server, false),
    )
    .unwrap();

    match credential.get_token().await {
        Ok(token) => assert!(!token.is_expired()),
        Err(err) => assert!(matches!(err, AuthError::Authentication(_)), "{err}"),
    }
}

#[tokio::test]
async fn test_auth_code_flow_redeems_code_with_pkce() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-f/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "browser-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "browser-refresh"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = CredentialParams::builder()
        .tenant_id("tenant-f")
        .client_id("client-auth-code-test")
        .redirect_uri("http://127.0.0.1:0/callback")
        .cache_mode(CacheMode::Memory)
        .build();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Url>();
    let credential = AuthCodeCredential::new(&params, &config_for(&server, true))
        .unwrap()
        .with_url_opener(move |url| {
            let _ = tx.send(url.clone());
        });

    // Plays the browser: follows the authorize URL back to the redirect listener
    let browser = tokio::spawn(async move {
        let authorize = rx.recv().await.unwrap();
        let pairs: HashMap<String, String> = authorize.query_pairs().into_owned().collect();
        let mut redirect = Url::parse(&pairs["redirect_uri"]).unwrap();
        redirect
            .query_pairs_mut()
            .append_pair("code", "code-abc")
            .append_pair("state", &pairs["state"]);
        let response = reqwest::get(redirect).await.unwrap();
        assert!(response.status().is_success());
        pairs
    });

    let token = credential.get_token_with(true).await.unwrap();
    let authorize = browser.await.unwrap();
    assert_eq!(token.access_token, "browser-token");
    assert_eq!(token.refresh_token.as_deref(), Some("browser-refresh"));

    assert_eq!(authorize["client_id"], "client-auth-code-test");
    assert_eq!(authorize["code_challenge_method"], "S256");
    assert!(authorize["scope"].contains("offline_access"));
    let redirect = Url::parse(&authorize["redirect_uri"]).unwrap();
    assert_ne!(redirect.port(), Some(0));
    assert_eq!(redirect.path(), "/callback");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let form: HashMap<String, String> = url::form_urlencoded::parse(&requests[0].body)
        .into_owned()
        .collect();
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "code-abc");
    assert_eq!(form["client_id"], "client-auth-code-test");
    assert_eq!(form["redirect_uri"], authorize["redirect_uri"]);
    let challenge = PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
        form["code_verifier"].clone(),
    ));
    assert_eq!(challenge.as_str(), authorize["code_challenge"]);
}

#[tokio::test]
async fn test_declined_device_code_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-d/oauth2/v2.0/devicecode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "device-456",
            "user_code": "XYZ",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 60,
            "interval": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-d/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_declined"})),
        )
        .mount(&server)
        .await;

    let params = CredentialParams::builder()
        .tenant_id("tenant-d")
        .client_id("client-declined-test")
        .cache_mode(CacheMode::Memory)
        .build();
    let credential = DeviceCodeCredential::new(&params, &config_for(&server, true)).unwrap();

    let err = credential.get_token_with(true).await.unwrap_err();
    assert!(matches!(err, AuthError::Authentication(_)), "{err}");
    assert!(err.to_string().contains("declined"));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_before_prompting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-e/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=stale-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("renewed")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-e/oauth2/v2.0/devicecode"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = TokenCache::new(CacheMode::Disk, dir.path());
    let key = CacheKey::new(
        "client-refresh-test",
        "tenant-e",
        "https://management.azure.com/.default offline_access",
    );
    cache
        .save(&key, &Token::new("old", "Bearer", 1, Some("stale-refresh".to_string())))
        .unwrap();

    let config = Config::builder()
        .authority_host(server.uri())
        .config_dir(dir.path())
        .interactive(true)
        .open_browser(false)
        .build();
    let params = CredentialParams::builder()
        .tenant_id("tenant-e")
        .client_id("client-refresh-test")
        .build();
    let credential = DeviceCodeCredential::new(&params, &config).unwrap();

    let token = credential.get_token().await.unwrap();
    assert_eq!(token.access_token, "renewed");
    assert_eq!(token.refresh_token.as_deref(), Some("stale-refresh"));
    assert_eq!(cache.load_valid(&key).unwrap().access_token, "renewed");
}

async fn api_fixture(tenant: &str, client_id: &str) -> (MockServer, Arc<dyn Credential>) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{tenant}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("api-token")))
        .mount(&server)
        .await;
    let credential =
        ClientSecretCredential::new(&secret_params(tenant, client_id), &config_for(&server, false))
            .unwrap();
    (server, Arc::new(credential))
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .base_delay(Duration::from_millis(10))
        .build()
}

#[tokio::test]
async fn test_api_client_retries_unavailable() {
    let (server, provider) = api_fixture("tenant-api", "client-api-test").await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(header("authorization", "Bearer api-token"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(header("authorization", "Bearer api-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [{"id": "sub-1"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), provider).with_retry_policy(fast_retries(3));
    let body: serde_json::Value = client.get_json("/subscriptions").await.unwrap();
    assert_eq!(body["value"][0]["id"], "sub-1");
}

#[tokio::test]
async fn test_api_client_gives_up_after_retries() {
    let (server, provider) = api_fixture("tenant-api-fail", "client-api-fail-test").await;
    Mock::given(method("POST"))
        .and(path("/deployments"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(2)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), provider).with_retry_policy(fast_retries(1));
    let err = client
        .post_json::<_, serde_json::Value>("/deployments", &json!({"name": "d1"}))
        .await
        .unwrap_err();

    match err {
        AuthError::RequestFailed { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected RequestFailed, got {other}"),
    }
}

#[tokio::test]
async fn test_api_client_does_not_retry_client_errors() {
    let (server, provider) = api_fixture("tenant-api-404", "client-api-404-test").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri(), provider).with_retry_policy(fast_retries(3));
    let err = client
        .get_json::<serde_json::Value>("/missing")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RequestFailed { status: 404, .. }));
}
