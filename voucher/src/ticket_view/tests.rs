#![allow(clippy::unwrap_used)]

use super::*;
use crate::error::{DOMAIN_FALLBACK_MESSAGE, NETWORK_FALLBACK_MESSAGE};
use crate::mocks::TestEnvironment;
use crate::types::{TicketStatus, Token};
use std::sync::Arc;
use voucher_testing::{assertions, test_clock, test_time, ReducerTest};

fn harness() -> TestEnvironment {
    TestEnvironment::new(Arc::new(test_clock()))
}

fn token(raw: &str) -> Token {
    Token::parse(raw).unwrap()
}

fn used(raw: &str) -> TicketSnapshot {
    TicketSnapshot {
        token: token(raw),
        status: TicketStatus::Used,
        item: Some(Item::Carousel),
        used_at: Some(test_time().into()),
    }
}

fn loading(generation: u64) -> TicketViewState {
    TicketViewState {
        route_token: "t1".to_string(),
        generation,
        snapshot: None,
        phase: TicketViewPhase::Loading,
    }
}

#[test]
fn activation_fetches_once() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(TicketViewState::default())
        .when_action(TicketViewAction::Activate {
            token: "T1".to_string(),
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketViewPhase::Loading);
            assert_eq!(state.generation, 1);
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn blank_route_token_fails_without_a_call() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(TicketViewState::default())
        .when_action(TicketViewAction::Activate {
            token: "   ".to_string(),
        })
        .then_state(|state| {
            assert_eq!(
                state.phase,
                TicketViewPhase::Failed {
                    message: MISSING_TICKET_MESSAGE.to_string()
                }
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn unused_ticket_code_uses_the_ledger_token() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(loading(1))
        .when_action(TicketViewAction::Loaded {
            generation: 1,
            result: Ok(TicketSnapshot::unused(token("T1"))),
        })
        .then_state(|state| {
            let code = state.scan_code().unwrap();
            assert_eq!(
                code.payload,
                "http://localhost:5173/kuangsan-ticket/redeem?token=T1"
            );
            assert!(!code.payload.contains("t1"));
        })
        .run();
}

#[test]
fn used_ticket_shows_record_and_no_code() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(loading(1))
        .when_action(TicketViewAction::Loaded {
            generation: 1,
            result: Ok(used("T1")),
        })
        .then_state(|state| {
            assert_eq!(
                state.phase,
                TicketViewPhase::Used {
                    item: Some(Item::Carousel),
                    used_at: Some(test_time().into()),
                }
            );
            assert!(state.scan_code().is_none());
        })
        .run();
}

#[test]
fn load_failures_are_terminal_with_a_message() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(loading(1))
        .when_action(TicketViewAction::Loaded {
            generation: 1,
            result: Err(VoucherError::network("timeout")),
        })
        .then_state(|state| {
            assert_eq!(
                state.phase,
                TicketViewPhase::Failed {
                    message: NETWORK_FALLBACK_MESSAGE.to_string()
                }
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();

    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(loading(1))
        .when_action(TicketViewAction::Loaded {
            generation: 1,
            result: Err(VoucherError::Domain { message: None }),
        })
        .then_state(|state| {
            assert_eq!(
                state.phase,
                TicketViewPhase::Failed {
                    message: DOMAIN_FALLBACK_MESSAGE.to_string()
                }
            );
        })
        .run();
}

#[test]
fn answer_from_an_earlier_activation_is_dropped() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(loading(2))
        .when_action(TicketViewAction::Loaded {
            generation: 1,
            result: Ok(TicketSnapshot::unused(token("T1"))),
        })
        .then_state(|state| assert_eq!(state.phase, TicketViewPhase::Loading))
        .run();
}

#[test]
fn stale_unused_snapshot_never_hides_a_redemption() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(TicketViewState {
            snapshot: Some(used("T1")),
            ..loading(3)
        })
        .when_action(TicketViewAction::Loaded {
            generation: 3,
            result: Ok(TicketSnapshot::unused(token("T1"))),
        })
        .then_state(|state| {
            assert!(matches!(state.phase, TicketViewPhase::Used { .. }));
            assert!(state.snapshot.as_ref().unwrap().is_used());
        })
        .run();
}

#[test]
fn tapping_the_code_opens_redemption_for_canonical_token() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(loading(1))
        .given_actions(vec![TicketViewAction::Loaded {
            generation: 1,
            result: Ok(TicketSnapshot::unused(token("T1"))),
        }])
        .when_action(TicketViewAction::OpenRedemption)
        .then_effects(|effects| assertions::assert_effects_count(effects, 1))
        .run();
}

#[test]
fn used_ticket_offers_no_redemption() {
    ReducerTest::new(TicketViewReducer::new())
        .with_env(harness().env)
        .given_state(loading(1))
        .given_actions(vec![TicketViewAction::Loaded {
            generation: 1,
            result: Ok(used("T1")),
        }])
        .when_action(TicketViewAction::OpenRedemption)
        .then_effects(assertions::assert_no_effects)
        .run();
}
