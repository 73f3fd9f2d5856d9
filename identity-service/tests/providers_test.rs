//! GitHub and Google clients against stubbed provider endpoints.

use chrono::{Duration, Utc};
use identity_service::config::{GitHubOAuthConfig, GoogleOAuthConfig};
use identity_service::services::providers::{
    CodeExchangeProvider, GitHubClient, GoogleIdTokenVerifier, IdentityTokenVerifier,
    ProviderError,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_ID: &str = "client-123.apps.googleusercontent.com";
const KEY_ID: &str = "test-key-1";
const JWKS_PATH: &str = "/oauth2/v3/certs";
const SIGNING_KEY: &str = include_str!("fixtures/google_signing_key.pem");

/// Public half of `fixtures/google_signing_key.pem`, base64url.
const MODULUS: &str = "rJxn8IVmy7xO9b4-8YKwCUrHuVYXJqDABvzI_UlFjIVX0cKuyiuyJZZr8NBZ15GCfayOBFo5K4HMoJO2WKKMej6TJf4LddRe36rvZCXIKCDDhRtvL1lMgi-QnwdtsLqVOD98nOVoxV6ggYt2RQB-OFAL2-LQHEchb6WBmGuNrcZC8jce5y_SKUtS-dNersBERufFiyO0BMbzLF6gJWUbSzxW3-1tciEBULSPMyMU3QA2URGb_I-97YUkoi3fyPCXJXctX5JBvx4kwqQ_x2pknAAMcEdcZ10pj7-Bd4huM0Hty1msej_4GfCPDnXtLSqqqyUpw4IznGDzCh0Ir364QQ";
const EXPONENT: &str = "AQAB";

// Google

fn jwks() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": KEY_ID,
            "alg": "RS256",
            "use": "sig",
            "n": MODULUS,
            "e": EXPONENT,
        }]
    })
}

async fn mount_jwks(server: &MockServer, expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks()))
        .expect(expected_fetches)
        .mount(server)
        .await;
}

fn verifier(server: &MockServer) -> GoogleIdTokenVerifier {
    GoogleIdTokenVerifier::new(&GoogleOAuthConfig {
        client_id: CLIENT_ID.to_string(),
        jwks_uri: format!("{}{}", server.uri(), JWKS_PATH),
    })
    .unwrap()
}

fn claims() -> Value {
    json!({
        "iss": "https://accounts.google.com",
        "aud": CLIENT_ID,
        "sub": "1099",
        "email": "grace@example.com",
        "email_verified": true,
        "name": "Grace Hopper",
        "picture": "https://lh3.googleusercontent.com/a/grace",
        "nonce": "n-0S6_WzA2Mj",
        "iat": Utc::now().timestamp(),
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
    })
}

fn with(mut claims: Value, field: &str, value: Value) -> Value {
    claims[field] = value;
    claims
}

fn sign_with_kid(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(SIGNING_KEY.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

fn sign(claims: &Value) -> String {
    sign_with_kid(claims, KEY_ID)
}

fn assert_rejected(result: Result<impl std::fmt::Debug, ProviderError>) {
    assert!(
        matches!(result, Err(ProviderError::Rejected(_))),
        "expected rejection, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_google_token_verifies_against_jwks() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;
    let verifier = verifier(&server);

    let identity = verifier
        .verify_signed_identity(&sign(&claims()), CLIENT_ID)
        .await
        .unwrap();

    assert_eq!(identity.sub, "1099");
    assert_eq!(identity.email, "grace@example.com");
    assert_eq!(identity.name.as_deref(), Some("Grace Hopper"));
    assert_eq!(identity.nonce.as_deref(), Some("n-0S6_WzA2Mj"));

    // Served from cache
    verifier
        .verify_signed_identity(&sign(&claims()), CLIENT_ID)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_google_token_with_bare_issuer_is_accepted() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;

    let token = sign(&with(claims(), "iss", json!("accounts.google.com")));
    assert!(verifier(&server)
        .verify_signed_identity(&token, CLIENT_ID)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_google_token_for_other_audience_is_rejected() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;

    let token = sign(&with(claims(), "aud", json!("someone-else.apps.googleusercontent.com")));
    assert_rejected(verifier(&server).verify_signed_identity(&token, CLIENT_ID).await);
}

#[tokio::test]
async fn test_google_token_from_other_issuer_is_rejected() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;

    let token = sign(&with(claims(), "iss", json!("https://evil.example.com")));
    assert_rejected(verifier(&server).verify_signed_identity(&token, CLIENT_ID).await);
}

#[tokio::test]
async fn test_expired_google_token_is_rejected() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;

    let token = sign(&with(
        claims(),
        "exp",
        json!((Utc::now() - Duration::hours(1)).timestamp()),
    ));
    assert_rejected(verifier(&server).verify_signed_identity(&token, CLIENT_ID).await);
}

#[tokio::test]
async fn test_google_token_with_unverified_email_is_rejected() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;

    let token = sign(&with(claims(), "email_verified", json!(false)));
    assert_rejected(verifier(&server).verify_signed_identity(&token, CLIENT_ID).await);
}

#[tokio::test]
async fn test_google_token_with_swapped_signature_is_rejected() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;

    // Payload of one token under the signature of another
    let genuine = sign(&claims());
    let other = sign(&with(claims(), "email", json!("mallory@example.com")));
    let (signed_part, _) = genuine.rsplit_once('.').unwrap();
    let (_, other_signature) = other.rsplit_once('.').unwrap();
    let forged = format!("{}.{}", signed_part, other_signature);

    assert_rejected(verifier(&server).verify_signed_identity(&forged, CLIENT_ID).await);
}

#[tokio::test]
async fn test_unknown_kid_refetches_jwks_at_most_once_per_interval() {
    let server = MockServer::start().await;
    mount_jwks(&server, 1).await;
    let verifier = verifier(&server);

    let token = sign_with_kid(&claims(), "rotated-away");
    assert_rejected(verifier.verify_signed_identity(&token, CLIENT_ID).await);
    assert_rejected(verifier.verify_signed_identity(&token, CLIENT_ID).await);

    // The known key still verifies from the same fetch
    assert!(verifier
        .verify_signed_identity(&sign(&claims()), CLIENT_ID)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_jwks_endpoint_failure_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = verifier(&server)
        .verify_signed_identity(&sign(&claims()), CLIENT_ID)
        .await;
    assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
}

// GitHub

const TOKEN_PATH: &str = "/login/oauth/access_token";

fn github(server: &MockServer) -> GitHubClient {
    GitHubClient::new(&GitHubOAuthConfig {
        client_id: "gh-client".to_string(),
        client_secret: "gh-secret".to_string(),
        token_url: format!("{}{}", server.uri(), TOKEN_PATH),
        api_url: server.uri(),
    })
    .unwrap()
}

#[tokio::test]
async fn test_github_code_exchange_returns_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("code=good-code"))
        .and(body_string_contains("client_id=gh-client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_abc",
            "token_type": "bearer",
            "scope": "read:user,user:email",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = github(&server)
        .exchange_authorization_code("good-code")
        .await
        .unwrap();
    assert_eq!(token, "gho_abc");
}

#[tokio::test]
async fn test_github_token_endpoint_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = github(&server).exchange_authorization_code("any").await;
    match result {
        Err(ProviderError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_github_bad_code_reported_with_200_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired.",
        })))
        .mount(&server)
        .await;

    let result = github(&server).exchange_authorization_code("stale").await;
    match result {
        Err(ProviderError::InvalidResponse(message)) => {
            assert!(message.starts_with("bad_verification_code"), "{}", message)
        }
        other => panic!("expected invalid response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_github_profile_with_public_email() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "Bearer gho_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 583231,
            "login": "octocat",
            "name": null,
            "email": "octocat@github.com",
            "avatar_url": "https://avatars.githubusercontent.com/u/583231",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let profile = github(&server).fetch_profile("gho_abc").await.unwrap();
    assert_eq!(profile.id, "583231");
    assert_eq!(profile.name, "octocat");
    assert_eq!(profile.email, "octocat@github.com");
}

#[tokio::test]
async fn test_github_private_email_falls_back_to_primary_verified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 583231,
            "login": "octocat",
            "name": "The Octocat",
            "email": null,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .and(header("authorization", "Bearer gho_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "old@example.com", "primary": false, "verified": true},
            {"email": "unverified@example.com", "primary": true, "verified": false},
            {"email": "octocat@example.com", "primary": true, "verified": true},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let profile = github(&server).fetch_profile("gho_abc").await.unwrap();
    assert_eq!(profile.name, "The Octocat");
    assert_eq!(profile.email, "octocat@example.com");
    assert_eq!(profile.raw["email"], "octocat@example.com");
}

#[tokio::test]
async fn test_github_without_verified_primary_email_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "583231",
            "login": "octocat",
            "email": "",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "octocat@example.com", "primary": true, "verified": false},
        ])))
        .mount(&server)
        .await;

    let result = github(&server).fetch_profile("gho_abc").await;
    assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
}
