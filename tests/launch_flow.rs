//! End-to-end launch flow tests: login initiation through token validation
//! against a mock platform serving a real JWKS.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lti_bridge::lti::{LaunchService, LoginRequest};
use lti_bridge::error::AuthError;
use lti_bridge::Error;

use common::{
    jwks_json, platform_config, sign_token, sign_token_with_kid, unix_now, valid_claims,
};

/// Spin up a mock platform JWKS endpoint and a service pointed at it.
async fn service_with_mock_jwks() -> (MockServer, LaunchService) {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/mod/lti/certs.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json()))
        .mount(&server)
        .await;

    let platform = platform_config(&format!("{}/mod/lti/certs.php", server.uri()));
    let service = LaunchService::new(platform, Duration::from_secs(300));
    (server, service)
}

fn assert_claim_error(err: &Error, needle: &str) {
    match err {
        Error::Auth(AuthError::Claims { details }) => {
            assert!(
                details.iter().any(|d| d.contains(needle)),
                "expected a detail containing {needle:?}, got {details:?}"
            );
        }
        other => panic!("expected a claims error, got {other:?}"),
    }
}

#[tokio::test]
async fn end_to_end_launch_succeeds() {
    let (_server, service) = service_with_mock_jwks().await;

    // Initiation: the authorization URL carries the fixed OIDC parameters
    let login = service
        .begin_login(&LoginRequest {
            target_url: Some("https://tool.example/app".to_string()),
            login_hint: None,
        })
        .unwrap();

    assert!(login.auth_url.contains("response_mode=form_post"));
    assert!(login.auth_url.contains(&format!("state={}", login.state)));
    assert!(
        login
            .auth_url
            .contains("lti_message_hint=https%3A%2F%2Ftool.example%2Fapp")
    );

    // The platform answers with a signed token bound to our nonce
    let token = sign_token(&valid_claims(&login.nonce));
    let session = service.validate_launch(&token, &login.state).await.unwrap();

    assert_eq!(session.deployment_id, "dep-1");
    assert_eq!(session.issuer, "https://platform.example");
    assert_eq!(session.subject, "user-7");
    assert_eq!(session.context_id.as_deref(), Some("course-9"));
    assert_eq!(session.resource_link_id.as_deref(), Some("rl-2"));
    assert_eq!(session.roles.len(), 1);
    assert_eq!(session.launch_url, "https://tool.example/app");
    assert_eq!(
        session.target_link_uri.as_deref(),
        Some("https://tool.example/app/unit/3")
    );
}

#[tokio::test]
async fn replaying_the_same_launch_fails_the_second_time() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let token = sign_token(&valid_claims(&login.nonce));

    assert!(service.validate_launch(&token, &login.state).await.is_ok());

    let err = service
        .validate_launch(&token, &login.state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::ReplayOrExpired)));
}

#[tokio::test]
async fn nonce_mismatch_is_rejected_despite_valid_signature() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let token = sign_token(&valid_claims("a-completely-different-nonce"));

    let err = service
        .validate_launch(&token, &login.state)
        .await
        .unwrap_err();
    assert_claim_error(&err, "Nonce mismatch");
}

#[tokio::test]
async fn unknown_kid_fails_after_exactly_one_refresh() {
    let server = MockServer::start().await;

    // Warm fetch + one refresh for the unknown kid: exactly two requests
    Mock::given(method("GET"))
        .and(path("/mod/lti/certs.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json()))
        .expect(2)
        .mount(&server)
        .await;

    let platform = platform_config(&format!("{}/mod/lti/certs.php", server.uri()));
    let service = LaunchService::new(platform, Duration::from_secs(300));

    // Warm the cache with a successful launch
    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let token = sign_token(&valid_claims(&login.nonce));
    service.validate_launch(&token, &login.state).await.unwrap();

    // A token signed under a kid the platform never published
    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let token = sign_token_with_kid(&valid_claims(&login.nonce), "rotated-away-key");

    let err = service
        .validate_launch(&token, &login.state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownKey(kid) if kid == "rotated-away-key"));
}

#[tokio::test]
async fn jwks_fetch_failure_is_retried_once_then_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/mod/lti/certs.php"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let platform = platform_config(&format!("{}/mod/lti/certs.php", server.uri()));
    let service = LaunchService::new(platform, Duration::from_secs(300));

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let token = sign_token(&valid_claims(&login.nonce));

    let err = service
        .validate_launch(&token, &login.state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyFetch(_)));
}

#[tokio::test]
async fn expiry_is_checked_with_five_minute_skew() {
    let (_server, service) = service_with_mock_jwks().await;

    // Just past the skew window: rejected
    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let mut claims = valid_claims(&login.nonce);
    claims["exp"] = json!(unix_now() - 301);
    let err = service
        .validate_launch(&sign_token(&claims), &login.state)
        .await
        .unwrap_err();
    assert_claim_error(&err, "Token expired");

    // Just inside the skew window: accepted
    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let mut claims = valid_claims(&login.nonce);
    claims["exp"] = json!(unix_now() - 299);
    assert!(
        service
            .validate_launch(&sign_token(&claims), &login.state)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn future_iat_is_rejected() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let mut claims = valid_claims(&login.nonce);
    claims["iat"] = json!(unix_now() + 301);

    let err = service
        .validate_launch(&sign_token(&claims), &login.state)
        .await
        .unwrap_err();
    assert_claim_error(&err, "issued in the future");
}

#[tokio::test]
async fn deployment_id_mismatch_is_rejected() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let mut claims = valid_claims(&login.nonce);
    claims["https://purl.imsglobal.org/spec/lti/claim/deployment_id"] = json!("dep-2");

    let err = service
        .validate_launch(&sign_token(&claims), &login.state)
        .await
        .unwrap_err();
    assert_claim_error(&err, "Invalid deployment_id");
}

#[tokio::test]
async fn issuer_and_audience_mismatches_are_both_reported() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let mut claims = valid_claims(&login.nonce);
    claims["iss"] = json!("https://evil.example");
    claims["aud"] = json!(["someone-else"]);

    let err = service
        .validate_launch(&sign_token(&claims), &login.state)
        .await
        .unwrap_err();
    assert_claim_error(&err, "Invalid issuer");
    assert_claim_error(&err, "Invalid audience");
}

#[tokio::test]
async fn azp_must_match_client_id_when_present() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let mut claims = valid_claims(&login.nonce);
    claims["azp"] = json!("someone-else");

    let err = service
        .validate_launch(&sign_token(&claims), &login.state)
        .await
        .unwrap_err();
    assert_claim_error(&err, "Invalid azp");
}

#[tokio::test]
async fn string_audience_form_is_accepted() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let mut claims = valid_claims(&login.nonce);
    claims["aud"] = json!("client-123");

    assert!(
        service
            .validate_launch(&sign_token(&claims), &login.state)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn tampered_signature_leaves_pending_launch_intact() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let token = sign_token(&valid_claims(&login.nonce));

    // Corrupt the signature segment
    let mut parts: Vec<&str> = token.split('.').collect();
    let tampered_sig = if parts[2].starts_with('A') {
        format!("B{}", &parts[2][1..])
    } else {
        format!("A{}", &parts[2][1..])
    };
    parts[2] = &tampered_sig;
    let tampered = parts.join(".");

    let err = service
        .validate_launch(&tampered, &login.state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::Signature(_))));

    // Signature checks happen before state consumption, so the genuine
    // token still goes through afterwards.
    assert!(service.validate_launch(&token, &login.state).await.is_ok());
}

#[tokio::test]
async fn garbage_token_is_a_format_error() {
    let (_server, service) = service_with_mock_jwks().await;

    let login = service.begin_login(&LoginRequest::default()).unwrap();

    let err = service
        .validate_launch("not-a-jwt", &login.state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::Format(_))));
}

#[tokio::test]
async fn expired_pending_launch_is_replay_or_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mod/lti/certs.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json()))
        .mount(&server)
        .await;

    // Zero TTL: every pending launch is dead on arrival
    let platform = platform_config(&format!("{}/mod/lti/certs.php", server.uri()));
    let service = LaunchService::new(platform, Duration::ZERO);

    let login = service.begin_login(&LoginRequest::default()).unwrap();
    let token = sign_token(&valid_claims(&login.nonce));

    let err = service
        .validate_launch(&token, &login.state)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::ReplayOrExpired)));
}
