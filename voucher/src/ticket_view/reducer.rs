use super::{TicketViewAction, TicketViewPhase, TicketViewState, MISSING_TICKET_MESSAGE};
use crate::environment::VoucherEnvironment;
use crate::routes::Route;
use crate::types::{Reconciled, TicketSnapshot, Token};
use std::sync::Arc;
use voucher_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};

/// Reducer for the ticket view
#[derive(Clone, Debug)]
pub struct TicketViewReducer;

impl TicketViewReducer {
    /// Creates a new `TicketViewReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn render(snapshot: &TicketSnapshot, env: &VoucherEnvironment) -> TicketViewPhase {
        if snapshot.is_used() {
            TicketViewPhase::Used {
                item: snapshot.item,
                used_at: snapshot.used_at.clone(),
            }
        } else {
            TicketViewPhase::Unused {
                code: env.scan_code(&snapshot.token),
            }
        }
    }
}

impl Default for TicketViewReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for TicketViewReducer {
    type State = TicketViewState;
    type Action = TicketViewAction;
    type Environment = VoucherEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TicketViewAction::Activate { token } => {
                state.generation += 1;
                state.route_token = token;

                let Some(token) = Token::parse(&state.route_token) else {
                    tracing::debug!("Ticket view opened without a ticket code");
                    state.phase = TicketViewPhase::Failed {
                        message: MISSING_TICKET_MESSAGE.to_string(),
                    };
                    return smallvec![Effect::None];
                };

                state.phase = TicketViewPhase::Loading;
                let generation = state.generation;
                let ledger = Arc::clone(&env.ledger);
                smallvec![Effect::Future(Box::pin(async move {
                    let result = ledger.get_ticket(&token).await;
                    Some(TicketViewAction::Loaded { generation, result })
                }))]
            },

            TicketViewAction::Loaded { generation, result } => {
                if generation != state.generation {
                    tracing::debug!(generation, current = state.generation, "Dropping answer for an earlier activation");
                    return smallvec![Effect::None];
                }

                match result {
                    Ok(incoming) => {
                        let snapshot = match state.snapshot.take() {
                            Some(mut known) if known.token == incoming.token => {
                                if known.reconcile(incoming) == Reconciled::IgnoredStale {
                                    tracing::debug!(token = known.token.prefix(), "Ignoring stale unused snapshot");
                                }
                                known
                            },
                            _ => incoming,
                        };
                        tracing::debug!(token = snapshot.token.prefix(), used = snapshot.is_used(), "Ticket loaded");
                        state.phase = Self::render(&snapshot, env);
                        state.snapshot = Some(snapshot);
                    },
                    Err(e) => {
                        tracing::warn!(route_token = %state.route_token, error = %e, "Ticket could not be loaded");
                        state.phase = TicketViewPhase::Failed {
                            message: e.user_message(),
                        };
                    },
                }
                smallvec![Effect::None]
            },

            TicketViewAction::OpenRedemption => match (&state.phase, &state.snapshot) {
                (TicketViewPhase::Unused { .. }, Some(snapshot)) => {
                    smallvec![env.navigate(Route::redeem(&snapshot.token))]
                },
                _ => smallvec![Effect::None],
            },
        }
    }
}
