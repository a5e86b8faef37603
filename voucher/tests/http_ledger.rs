//! Integration tests for the HTTP ledger client against a mock ledger.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use voucher::binding::InMemoryBindingStore;
use voucher::error::{DOMAIN_FALLBACK_MESSAGE, NETWORK_FALLBACK_MESSAGE};
use voucher::ledger::{HttpLedgerClient, LedgerClient};
use voucher::mocks::RecordingNavigator;
use voucher::redemption::{RedemptionAction, RedemptionPhase, RedemptionReducer, RedemptionState};
use voucher::routes::Route;
use voucher::ticket_view::{TicketViewAction, TicketViewPhase, TicketViewReducer, TicketViewState};
use voucher::{Item, Phone, TicketStatus, Token, UsedAt, VoucherEnvironment, VoucherError};
use voucher_runtime::Store;
use voucher_testing::test_clock;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn client(server: &MockServer) -> HttpLedgerClient {
    HttpLedgerClient::new(format!("{}/exec", server.uri()), TIMEOUT)
        .unwrap()
        .with_source("kuangsan_2025")
}

fn token(raw: &str) -> Token {
    Token::parse(raw).unwrap()
}

async fn answer(server: &MockServer, action: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/exec"))
        .and(query_param("action", action))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn issue_sends_phone_and_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exec"))
        .and(query_param("action", "issue"))
        .and(query_param("phone", "0987654321"))
        .and(query_param("source", "kuangsan_2025"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": "T1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let issued = client(&server)
        .issue_ticket(&Phone::parse("0987654321").unwrap())
        .await
        .unwrap();

    assert_eq!(issued, token("T1"));
}

#[tokio::test]
async fn redeem_sends_token_and_item_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exec"))
        .and(query_param("action", "redeem"))
        .and(query_param("token", "T1"))
        .and(query_param("item", "bumper_car"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client(&server)
        .redeem_ticket(&token("T1"), Item::BumperCar)
        .await
        .unwrap();

    assert_eq!(receipt.item, Item::BumperCar);
}

#[tokio::test]
async fn get_ticket_parses_a_used_ticket() {
    let server = MockServer::start().await;
    answer(
        &server,
        "getTicket",
        200,
        json!({
            "success": true,
            "token": "T1",
            "status": "used",
            "item": "carousel",
            "usedAt": "2025-01-15T09:30:00Z"
        }),
    )
    .await;

    let snapshot = client(&server).get_ticket(&token("T1")).await.unwrap();

    assert_eq!(snapshot.status, TicketStatus::Used);
    assert_eq!(snapshot.item, Some(Item::Carousel));
    assert_eq!(
        snapshot.used_at.and_then(|t| t.timestamp()).map(|t| t.to_rfc3339()),
        Some("2025-01-15T09:30:00+00:00".to_string())
    );
}

#[tokio::test]
async fn get_ticket_keeps_a_formatted_redemption_time() {
    let server = MockServer::start().await;
    answer(
        &server,
        "getTicket",
        200,
        json!({
            "success": true,
            "token": "T1",
            "status": "used",
            "item": "carousel",
            "usedAt": "2025/11/20 14:03:22"
        }),
    )
    .await;

    let snapshot = client(&server).get_ticket(&token("T1")).await.unwrap();

    assert_eq!(snapshot.status, TicketStatus::Used);
    assert_eq!(snapshot.item, Some(Item::Carousel));
    assert_eq!(
        snapshot.used_at,
        Some(UsedAt::Text("2025/11/20 14:03:22".to_string()))
    );
}

#[tokio::test]
async fn used_ticket_with_unknown_item_still_locks_redemption() {
    let server = MockServer::start().await;
    answer(
        &server,
        "getTicket",
        200,
        json!({
            "success": true,
            "token": "T1",
            "status": "used",
            "item": "ferris_wheel",
            "usedAt": "yesterday"
        }),
    )
    .await;

    let env = VoucherEnvironment::new(
        Arc::new(client(&server)),
        Arc::new(InMemoryBindingStore::new()),
        Arc::new(RecordingNavigator::new()),
        Arc::new(test_clock()),
    );
    let store = Store::new(RedemptionState::default(), RedemptionReducer::new(), env);

    store
        .send(RedemptionAction::Load {
            token: Some("T1".to_string()),
        })
        .await
        .unwrap();
    store
        .wait_until(|s| s.phase != RedemptionPhase::Loading, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(store.state(|s| s.phase).await, RedemptionPhase::LockedUsed);
    store.send(RedemptionAction::Teardown).await.unwrap();
    store.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn get_ticket_treats_blank_fields_as_absent() {
    let server = MockServer::start().await;
    answer(
        &server,
        "getTicket",
        200,
        json!({
            "success": true,
            "token": "T1",
            "status": "unused",
            "item": "",
            "usedAt": ""
        }),
    )
    .await;

    let snapshot = client(&server).get_ticket(&token("T1")).await.unwrap();

    assert_eq!(snapshot.status, TicketStatus::Unused);
    assert_eq!(snapshot.item, None);
    assert_eq!(snapshot.used_at, None);
}

#[tokio::test]
async fn rejection_carries_the_ledger_message() {
    let server = MockServer::start().await;
    answer(
        &server,
        "redeem",
        200,
        json!({ "success": false, "message": "This ticket has already been used" }),
    )
    .await;

    let error = client(&server)
        .redeem_ticket(&token("T1"), Item::Carousel)
        .await
        .unwrap_err();

    assert!(error.is_domain());
    assert_eq!(error.user_message(), "This ticket has already been used");
}

#[tokio::test]
async fn rejection_without_message_uses_the_fallback() {
    let server = MockServer::start().await;
    answer(&server, "redeem", 200, json!({ "success": false, "message": "  " })).await;

    let error = client(&server)
        .redeem_ticket(&token("T1"), Item::Carousel)
        .await
        .unwrap_err();

    assert!(error.is_domain());
    assert_eq!(error.user_message(), DOMAIN_FALLBACK_MESSAGE);
}

#[tokio::test]
async fn server_error_is_a_network_failure() {
    let server = MockServer::start().await;
    answer(&server, "getTicket", 500, json!({ "success": true })).await;

    let error = client(&server).get_ticket(&token("T1")).await.unwrap_err();

    assert!(matches!(error, VoucherError::Network(_)));
    assert_eq!(error.user_message(), NETWORK_FALLBACK_MESSAGE);
}

#[tokio::test]
async fn malformed_body_is_a_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exec"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let error = client(&server)
        .issue_ticket(&Phone::parse("0987654321").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(error, VoucherError::Network(_)));
}

#[tokio::test]
async fn unreachable_ledger_is_a_network_failure() {
    let server = MockServer::start().await;
    let endpoint = format!("{}/exec", server.uri());
    drop(server);

    let error = HttpLedgerClient::new(endpoint, TIMEOUT)
        .unwrap()
        .get_ticket(&token("T1"))
        .await
        .unwrap_err();

    assert!(matches!(error, VoucherError::Network(_)));
}

#[tokio::test]
async fn ticket_view_shows_the_ledger_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exec"))
        .and(query_param("action", "getTicket"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": "T1",
            "status": "unused"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let navigator = Arc::new(RecordingNavigator::new());
    let env = VoucherEnvironment::new(
        Arc::new(client(&server)),
        Arc::new(InMemoryBindingStore::new()),
        navigator.clone(),
        Arc::new(test_clock()),
    );
    let store = Store::new(TicketViewState::default(), TicketViewReducer::new(), env);

    store
        .send(TicketViewAction::Activate {
            token: "t1".to_string(),
        })
        .await
        .unwrap();
    store
        .wait_until(|s| s.phase != TicketViewPhase::Loading, TIMEOUT)
        .await
        .unwrap();

    let code = store.state(|s| s.scan_code().cloned()).await.unwrap();
    assert_eq!(
        code.payload,
        "http://localhost:5173/kuangsan-ticket/redeem?token=T1"
    );

    store.send(TicketViewAction::OpenRedemption).await.unwrap();
    store.shutdown(TIMEOUT).await.unwrap();
    assert_eq!(navigator.last(), Some(Route::redeem(&token("T1"))));
}
