use super::{RedemptionAction, RedemptionPhase, RedemptionState, MISSING_TOKEN_MESSAGE};
use crate::environment::VoucherEnvironment;
use crate::routes::Route;
use crate::types::{Item, Reconciled, TicketSnapshot, TicketStatus, Token};
use std::sync::Arc;
use voucher_core::effect::{Effect, EffectId};
use voucher_core::{reducer::Reducer, smallvec, SmallVec};

/// Identifier of the timer returning a finished redemption to the ticket view
pub const RETURN_TIMER: EffectId = EffectId::new("redemption.return");

type Effects = SmallVec<[Effect<RedemptionAction>; 4]>;

/// Reducer for the staff redemption page
#[derive(Clone, Debug)]
pub struct RedemptionReducer;

impl RedemptionReducer {
    /// Creates a new `RedemptionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Starts the return timer; re-arming replaces a live one
    fn arm_return(env: &VoucherEnvironment) -> Effect<RedemptionAction> {
        Effect::Delay {
            duration: env.settings.return_delay,
            action: Box::new(RedemptionAction::ReturnToTicket),
        }
        .cancellable(RETURN_TIMER)
    }

    fn fetch<F>(env: &VoucherEnvironment, token: Token, generation: u64, wrap: F) -> Effect<RedemptionAction>
    where
        F: FnOnce(u64, Result<TicketSnapshot, crate::error::VoucherError>) -> RedemptionAction
            + Send
            + 'static,
    {
        let ledger = Arc::clone(&env.ledger);
        Effect::Future(Box::pin(async move {
            let result = ledger.get_ticket(&token).await;
            Some(wrap(generation, result))
        }))
    }

    fn refresh(state: &RedemptionState, env: &VoucherEnvironment) -> Option<Effect<RedemptionAction>> {
        let token = state.canonical_token()?.clone();
        Some(Self::fetch(env, token, state.generation, |generation, result| {
            RedemptionAction::TicketRefreshed { generation, result }
        }))
    }

    fn lock_used(state: &mut RedemptionState, env: &VoucherEnvironment) -> Effects {
        tracing::info!(
            token = state.canonical_token().map(Token::prefix),
            "Ticket already used, redemption locked"
        );
        state.phase = RedemptionPhase::LockedUsed;
        if state.torn_down {
            return smallvec![Effect::None];
        }
        smallvec![Self::arm_return(env)]
    }

    fn tap(state: &mut RedemptionState, item: Item, env: &VoucherEnvironment) -> Effects {
        match state.phase {
            RedemptionPhase::Viewing => {
                state.phase = RedemptionPhase::Armed(item);
                state.error = None;
                tracing::debug!(item = item.code(), phase = "armed", "Item selected");
                smallvec![Effect::None]
            },
            RedemptionPhase::Armed(armed) if armed == item => {
                let Some(token) = state.canonical_token().cloned() else {
                    return smallvec![Effect::None];
                };
                state.phase = RedemptionPhase::Submitting(item);
                state.error = None;
                tracing::info!(token = token.prefix(), item = item.code(), "Submitting redemption");

                let ledger = Arc::clone(&env.ledger);
                let generation = state.generation;
                smallvec![Effect::Future(Box::pin(async move {
                    let result = ledger.redeem_ticket(&token, item).await;
                    Some(RedemptionAction::RedeemCompleted {
                        generation,
                        item,
                        result,
                    })
                }))]
            },
            RedemptionPhase::Armed(_) => {
                state.phase = RedemptionPhase::Armed(item);
                state.error = None;
                tracing::debug!(item = item.code(), phase = "armed", "Selection changed");
                smallvec![Effect::None]
            },
            phase => {
                tracing::debug!(item = item.code(), ?phase, "Tap ignored");
                smallvec![Effect::None]
            },
        }
    }
}

impl Default for RedemptionReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for RedemptionReducer {
    type State = RedemptionState;
    type Action = RedemptionAction;
    type Environment = VoucherEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action, kept together for readability
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Load ==========
            RedemptionAction::Load { token } => {
                let mut effects: Effects = SmallVec::new();
                if state.phase.is_finished() {
                    effects.push(Effect::Cancel(RETURN_TIMER));
                }

                *state = RedemptionState {
                    generation: state.generation + 1,
                    ..RedemptionState::default()
                };

                let Some(token) = token.as_deref().and_then(Token::parse) else {
                    tracing::warn!("Redemption page opened without a ticket code");
                    state.phase = RedemptionPhase::MissingToken;
                    state.error = Some(MISSING_TOKEN_MESSAGE.to_string());
                    effects.push(Effect::None);
                    return effects;
                };

                state.phase = RedemptionPhase::Loading;
                state.token = Some(token.clone());
                effects.push(Self::fetch(env, token, state.generation, |generation, result| {
                    RedemptionAction::TicketLoaded { generation, result }
                }));
                effects
            },

            RedemptionAction::TicketLoaded { generation, result } => {
                if generation != state.generation || state.phase != RedemptionPhase::Loading {
                    return smallvec![Effect::None];
                }

                match result {
                    Ok(snapshot) => {
                        let used = snapshot.is_used();
                        state.snapshot = Some(snapshot);
                        if used {
                            Self::lock_used(state, env)
                        } else {
                            state.phase = RedemptionPhase::Viewing;
                            smallvec![Effect::None]
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Ticket could not be loaded for redemption");
                        state.phase = RedemptionPhase::LoadFailed;
                        state.error = Some(e.user_message());
                        smallvec![Effect::None]
                    },
                }
            },

            // ========== Double confirmation ==========
            RedemptionAction::ItemTapped(item) => Self::tap(state, item, env),

            RedemptionAction::RedeemCompleted {
                generation,
                item,
                result,
            } => {
                if generation != state.generation || state.phase != RedemptionPhase::Submitting(item) {
                    tracing::debug!(item = item.code(), "Dropping redemption answer for a superseded request");
                    return smallvec![Effect::None];
                }

                match result {
                    Ok(receipt) => {
                        if receipt.item != item {
                            tracing::warn!(
                                submitted = item.code(),
                                recorded = receipt.item.code(),
                                "Ledger recorded a different item than submitted"
                            );
                        }
                        tracing::info!(item = item.code(), phase = "succeeded", "Ticket redeemed");
                        state.phase = RedemptionPhase::Succeeded(item);
                        state.error = None;

                        if let Some(token) = state.canonical_token().cloned() {
                            let optimistic = TicketSnapshot {
                                token: token.clone(),
                                status: TicketStatus::Used,
                                item: Some(receipt.item),
                                used_at: Some(env.clock.now().into()),
                            };
                            state
                                .snapshot
                                .get_or_insert_with(|| TicketSnapshot::unused(token))
                                .reconcile(optimistic);
                        }

                        // Nothing outlives the page.
                        if state.torn_down {
                            return smallvec![Effect::None];
                        }

                        let mut effects: Effects = smallvec![Self::arm_return(env)];
                        effects.extend(Self::refresh(state, env));
                        effects
                    },
                    Err(e) => {
                        tracing::warn!(item = item.code(), error = %e, "Redemption failed");
                        state.phase = RedemptionPhase::Armed(item);
                        state.error = Some(e.user_message());

                        // A rejection usually means the ticket was used elsewhere.
                        if e.is_domain() {
                            Self::refresh(state, env).into_iter().collect()
                        } else {
                            smallvec![Effect::None]
                        }
                    },
                }
            },

            RedemptionAction::TicketRefreshed { generation, result } => {
                if generation != state.generation {
                    return smallvec![Effect::None];
                }

                let incoming = match result {
                    Ok(incoming) => incoming,
                    Err(e) => {
                        tracing::warn!(error = %e, "Refresh failed, keeping the last known ticket");
                        return smallvec![Effect::None];
                    },
                };

                if let (RedemptionPhase::Succeeded(submitted), Some(recorded)) = (state.phase, incoming.item) {
                    if submitted != recorded {
                        tracing::warn!(
                            submitted = submitted.code(),
                            recorded = recorded.code(),
                            "Ledger snapshot disagrees with the redeemed item"
                        );
                    }
                }

                match state.snapshot.as_mut() {
                    Some(known) => {
                        if known.reconcile(incoming) == Reconciled::IgnoredStale {
                            tracing::debug!("Ignoring stale unused snapshot");
                        }
                    },
                    None => state.snapshot = Some(incoming),
                }

                let used = state.snapshot.as_ref().is_some_and(TicketSnapshot::is_used);
                if used && !state.phase.is_finished() {
                    Self::lock_used(state, env)
                } else {
                    smallvec![Effect::None]
                }
            },

            // ========== Leaving ==========
            RedemptionAction::ReturnToTicket => {
                if state.torn_down || state.returned || !state.phase.is_finished() {
                    return smallvec![Effect::None];
                }
                let Some(token) = state.canonical_token() else {
                    return smallvec![Effect::None];
                };
                let route = Route::ticket(token);
                state.returned = true;
                smallvec![env.navigate(route)]
            },

            RedemptionAction::Teardown => {
                state.torn_down = true;
                smallvec![Effect::Cancel(RETURN_TIMER)]
            },
        }
    }
}
