//! End-to-end tests for the token lifecycle over a mock identity provider
//! and backend.
//!
//! Uses [`wiremock`] to stand up local HTTP servers so the tests can assert
//! exact call counts against the token endpoint — the heart of the
//! single-flight guarantee.
//!
//! Coverage:
//! - Single-flight: a burst of requests with an expired access token causes
//!   exactly one refresh call
//! - Waiter resolution order
//! - At-most-one retry after a 401
//! - Short-circuit when the refresh token itself is unusable
//! - Refresh failure fan-out and the single `SessionExpired` event
//! - Login, logout, registration (including partial failure), and
//!   cross-context storage changes
//! - Typed backend endpoints riding the pipeline (feed, like toggle,
//!   comments)

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use gallery_auth::{CredentialPair, MemoryStorage, Storage, now_millis};
use gallery_client::{AuthEvent, AuthStack, ClientConfig, Error, SessionState};
use tokio::sync::Mutex;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a config pointing both URLs at the given mock server.
fn mock_config(server_uri: &str) -> ClientConfig {
    ClientConfig {
        token_url: format!("{server_uri}/realms/arts-realm/protocol/openid-connect/token"),
        api_base_url: server_uri.to_string(),
        client_id: "arts-app".into(),
        timeout_secs: 10,
    }
}

/// A pair whose access token is expired but whose refresh token is valid
/// for another hour.
fn expired_access_pair() -> CredentialPair {
    let now = now_millis();
    CredentialPair {
        access_token: "at_stale".into(),
        refresh_token: "rt_valid".into(),
        access_expires_at: now - 1,
        refresh_expires_at: now + 3_600_000,
    }
}

/// A pair where both tokens are expired.
fn fully_expired_pair() -> CredentialPair {
    CredentialPair {
        access_token: "at_stale".into(),
        refresh_token: "rt_stale".into(),
        access_expires_at: 1_000,
        refresh_expires_at: 2_000,
    }
}

fn token_json(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 300,
        "refresh_expires_in": 1800
    })
}

async fn stack_with_pair(
    config: &ClientConfig,
    pair: Option<CredentialPair>,
) -> AuthStack {
    let stack = AuthStack::build(config, Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    if let Some(pair) = pair {
        stack.store.replace(pair).await.unwrap();
    }
    stack
}

// ── Single-flight ──────────────────────────────────────────────────────

#[tokio::test]
async fn burst_of_requests_triggers_exactly_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at_new", "rt_new")))
        .expect(1)
        .mount(&server)
        .await;

    // The feed only answers to the refreshed token, proving every request
    // carried it
    Mock::given(method("GET"))
        .and(path("/arts/feed"))
        .and(header("authorization", "Bearer at_new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [], "totalElements": 0
        })))
        .expect(3)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(expired_access_pair())).await;
    let old_expiry = stack.store.pair().await.unwrap().access_expires_at;

    let (r1, r2, r3) = tokio::join!(
        stack.api.get_json::<serde_json::Value>("/arts/feed", &[]),
        stack.api.get_json::<serde_json::Value>("/arts/feed", &[]),
        stack.api.get_json::<serde_json::Value>("/arts/feed", &[]),
    );
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    // Store holds the new pair with a later expiry
    let pair = stack.store.pair().await.unwrap();
    assert_eq!(pair.access_token, "at_new");
    assert_eq!(pair.refresh_token, "rt_new");
    assert!(pair.access_expires_at > old_expiry);
}

// ── Waiter resolution order ────────────────────────────────────────────

#[tokio::test]
async fn waiters_resolve_in_arrival_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_json("at_new", "rt_new"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(expired_access_pair())).await;

    // Leader starts the refresh and blocks on the delayed response
    let leader = {
        let refresher = stack.refresher.clone();
        tokio::spawn(async move { refresher.acquire_or_join().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut joiners = Vec::new();
    for i in 1..=3 {
        let refresher = stack.refresher.clone();
        let order = order.clone();
        joiners.push(tokio::spawn(async move {
            let token = refresher.acquire_or_join().await.unwrap();
            order.lock().await.push(i);
            token
        }));
        // Fix arrival order deterministically
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let leader_token = leader.await.unwrap().unwrap();
    for joiner in joiners {
        assert_eq!(joiner.await.unwrap(), leader_token);
    }
    assert_eq!(*order.lock().await, vec![1, 2, 3]);
}

// ── At-most-one retry ──────────────────────────────────────────────────

#[tokio::test]
async fn second_401_propagates_without_another_retry() {
    let server = MockServer::start().await;

    // Refresh succeeds, but the backend keeps rejecting: the original
    // request plus exactly one resend, never a third attempt
    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at_new", "rt_new")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/arts/feed"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let now = now_millis();
    let valid_pair = CredentialPair {
        access_token: "at_revoked_server_side".into(),
        refresh_token: "rt_valid".into(),
        access_expires_at: now + 3_600_000,
        refresh_expires_at: now + 7_200_000,
    };
    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(valid_pair)).await;

    let err = stack
        .api
        .get_json::<serde_json::Value>("/arts/feed", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }), "got: {err}");
}

// ── Unauthenticated short-circuit ──────────────────────────────────────

#[tokio::test]
async fn expired_refresh_token_fails_without_touching_the_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at", "rt")))
        .expect(0)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(fully_expired_pair())).await;
    let mut events = stack.events.subscribe();

    let err = stack
        .api
        .get_json::<serde_json::Value>("/arts/feed", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AuthenticationRequired), "got: {err}");
    assert!(stack.store.pair().await.is_none());
    assert_eq!(events.recv().await.unwrap(), AuthEvent::SessionExpired);
}

// ── Refresh failure fan-out ────────────────────────────────────────────

#[tokio::test]
async fn refresh_failure_fans_out_and_emits_one_event() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("invalid_grant")
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(expired_access_pair())).await;
    let mut events = stack.events.subscribe();
    let mut session_rx = stack.session.subscribe();
    // The state-sync task observes the seeded pair
    session_rx
        .wait_for(|state| *state == SessionState::Authenticated)
        .await
        .unwrap();

    let (r1, r2, r3) = tokio::join!(
        stack.api.get_json::<serde_json::Value>("/arts/feed", &[]),
        stack.api.get_json::<serde_json::Value>("/arts/feed", &[]),
        stack.api.get_json::<serde_json::Value>("/arts/feed", &[]),
    );
    // Leader and every waiter surface the typed authentication-required
    // condition, not a generic refresh error
    for result in [r1, r2, r3] {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::AuthenticationRequired), "got: {err}");
    }

    assert!(stack.store.pair().await.is_none());
    assert_eq!(events.recv().await.unwrap(), AuthEvent::SessionExpired);
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    // The cleared store forces the session back to Anonymous
    session_rx
        .wait_for(|state| *state == SessionState::Anonymous)
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_refresh_token_surfaces_authentication_required() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(expired_access_pair())).await;

    let err = stack
        .api
        .get_json::<serde_json::Value>("/arts/feed", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AuthenticationRequired), "got: {err}");
    assert!(stack.store.pair().await.is_none());
}

// ── Session controller flows ───────────────────────────────────────────

#[tokio::test]
async fn login_stores_pair_and_authenticates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at_login", "rt_login")))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, None).await;
    assert_eq!(stack.session.state(), SessionState::Anonymous);

    stack
        .session
        .login("alice", &Secret::new("hunter2".to_string()))
        .await
        .unwrap();

    assert_eq!(stack.session.state(), SessionState::Authenticated);
    let pair = stack.store.pair().await.unwrap();
    assert_eq!(pair.access_token, "at_login");
    assert!(pair.access_expires_at > now_millis());
}

#[tokio::test]
async fn failed_login_stores_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, None).await;

    let err = stack
        .session
        .login("alice", &Secret::new("wrong".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err}");
    assert_eq!(stack.session.state(), SessionState::Anonymous);
    assert!(stack.store.pair().await.is_none());
}

#[tokio::test]
async fn logout_clears_everything() {
    let server = MockServer::start().await;
    let config = mock_config(&server.uri());
    let now = now_millis();
    let stack = stack_with_pair(
        &config,
        Some(CredentialPair {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            access_expires_at: now + 3_600_000,
            refresh_expires_at: now + 7_200_000,
        }),
    )
    .await;

    stack.session.logout().await.unwrap();
    assert_eq!(stack.session.state(), SessionState::Anonymous);
    assert!(stack.store.pair().await.is_none());
}

#[tokio::test]
async fn registration_chains_into_login() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/keycloak/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "kc-42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users/register"))
        .and(body_string_contains("kc-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "kc-42", "userName": "bob"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at_bob", "rt_bob")))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, None).await;

    let profile = stack
        .session
        .register("bob", "bob@example.com", &Secret::new("s3cret".to_string()))
        .await
        .unwrap();
    assert_eq!(profile.user_name, "bob");
    assert_eq!(stack.session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn registration_profile_failure_leaves_session_anonymous() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/keycloak/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "kc-43"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Profile creation fails; the identity is orphaned and no login happens
    Mock::given(method("POST"))
        .and(path("/users/register"))
        .respond_with(ResponseTemplate::new(500).set_body_string("profile service down"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/realms/arts-realm/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at", "rt")))
        .expect(0)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, None).await;

    let err = stack
        .session
        .register("carol", "carol@example.com", &Secret::new("pw".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 500, .. }), "got: {err}");
    assert_eq!(stack.session.state(), SessionState::Anonymous);
}

// ── Cross-context storage changes ──────────────────────────────────────

#[tokio::test]
async fn storage_change_from_another_context_authenticates() {
    let server = MockServer::start().await;
    let config = mock_config(&server.uri());

    let storage = Arc::new(MemoryStorage::new());
    let stack = AuthStack::build(&config, storage.clone()).await.unwrap();
    assert_eq!(stack.session.state(), SessionState::Anonymous);

    // Another tab logs in and writes the four entries directly
    let expiry = (now_millis() + 3_600_000).to_string();
    storage
        .set("access_token", "at_other_tab".into())
        .await
        .unwrap();
    storage
        .set("refresh_token", "rt_other_tab".into())
        .await
        .unwrap();
    storage
        .set("access_token_expires_at", expiry.clone())
        .await
        .unwrap();
    storage
        .set("refresh_token_expires_at", expiry)
        .await
        .unwrap();

    // No network call: the server has no mocks mounted at all
    stack.session.handle_storage_change().await.unwrap();
    assert_eq!(stack.session.state(), SessionState::Authenticated);
    assert_eq!(
        stack.store.pair().await.unwrap().access_token,
        "at_other_tab"
    );
}

// ── Unauthenticated passthrough ────────────────────────────────────────

#[tokio::test]
async fn empty_store_sends_without_authorization_header() {
    let server = MockServer::start().await;

    // wiremock has no absent-header matcher, so the header is asserted
    // from the received-request log after the call
    Mock::given(method("GET"))
        .and(path("/arts/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, None).await;

    stack
        .api
        .get_json::<serde_json::Value>("/arts/feed", &[])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(
        !requests[0].headers.contains_key("authorization"),
        "anonymous call must not carry a bearer token"
    );
}

#[tokio::test]
async fn empty_access_token_entry_sends_unauthenticated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/arts/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    // Backend holds a partial entry set: an empty access token and no
    // expiries, as another context may leave behind
    let storage = Arc::new(MemoryStorage::new());
    storage.set("access_token", String::new()).await.unwrap();
    let stack = AuthStack::build(&config, storage).await.unwrap();

    stack
        .api
        .get_json::<serde_json::Value>("/arts/feed", &[])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(
        !requests[0].headers.contains_key("authorization"),
        "an empty stored token must not become a Bearer header"
    );
}

// ── Typed endpoints ────────────────────────────────────────────────────

/// A pair valid for another hour on both tokens.
fn fresh_pair() -> CredentialPair {
    let now = now_millis();
    CredentialPair {
        access_token: "at_live".into(),
        refresh_token: "rt_live".into(),
        access_expires_at: now + 3_600_000,
        refresh_expires_at: now + 3_600_000,
    }
}

#[tokio::test]
async fn feed_page_deserializes_through_the_pipeline() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/arts/feed"))
        .and(query_param("type", "trending"))
        .and(query_param("page", "0"))
        .and(query_param("size", "2"))
        .and(header("authorization", "Bearer at_live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [
                {"id": "a1", "name": "Sunset", "imageUrl": "/img/a1.png",
                 "authorUserName": "alice", "countLikes": 4, "countViews": 120},
                {"id": "a2", "name": "Dawn", "countLikes": 0, "countViews": 3}
            ],
            "totalElements": 2,
            "totalPages": 1,
            "number": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(fresh_pair())).await;

    let page = gallery_client::api::get_feed(&stack.api, "trending", 0, 2)
        .await
        .unwrap();
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.content[0].name, "Sunset");
    assert_eq!(page.content[0].author_user_name.as_deref(), Some("alice"));
    assert_eq!(page.content[1].count_views, 3);
}

#[tokio::test]
async fn like_toggle_posts_query_and_returns_new_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/arts/like"))
        .and(query_param("id", "a1"))
        .and(header("authorization", "Bearer at_live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(true))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(fresh_pair())).await;

    let liked = gallery_client::api::toggle_like(&stack.api, "a1")
        .await
        .unwrap();
    assert!(liked);
}

#[tokio::test]
async fn comment_page_unwraps_to_its_content() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/comments/art"))
        .and(query_param("id", "a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [
                {"id": "c1", "text": "lovely", "authorUserName": "bob"}
            ],
            "totalElements": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(&server.uri());
    let stack = stack_with_pair(&config, Some(fresh_pair())).await;

    let comments = gallery_client::api::get_art_comments(&stack.api, "a1", 0, 10)
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].text, "lovely");
    assert_eq!(comments[0].author_user_name.as_deref(), Some("bob"));
}
