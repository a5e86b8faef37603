use super::{IssuanceAction, IssuancePhase, IssuanceState};
use crate::config::BindingPolicy;
use crate::environment::VoucherEnvironment;
use crate::routes::Route;
use crate::types::{DeviceBinding, Phone, Token};
use std::sync::Arc;
use voucher_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};

/// What to do with a stored binding when the user submits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPath {
    /// No binding: validate the phone and ask the ledger
    Issue,
    /// Show the bound ticket without contacting the ledger
    UseCached(Token),
    /// Confirm the bound ticket with the ledger first
    Revalidate(DeviceBinding),
}

/// The one decision point for bound devices
///
/// Under [`BindingPolicy::TrustCache`] any submitted phone routes to the bound
/// ticket, even a different number than the one it was issued for.
#[must_use]
pub fn fast_path(policy: BindingPolicy, binding: Option<DeviceBinding>) -> FastPath {
    match (binding, policy) {
        (None, _) => FastPath::Issue,
        (Some(binding), BindingPolicy::TrustCache) => FastPath::UseCached(binding.token),
        (Some(binding), BindingPolicy::Revalidate) => FastPath::Revalidate(binding),
    }
}

/// Reducer for the issuance screen
#[derive(Clone, Debug)]
pub struct IssuanceReducer;

impl IssuanceReducer {
    /// Creates a new `IssuanceReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn read_binding<F>(env: &VoucherEnvironment, wrap: F) -> Effect<IssuanceAction>
    where
        F: FnOnce(Option<DeviceBinding>) -> IssuanceAction + Send + 'static,
    {
        let bindings = Arc::clone(&env.bindings);
        Effect::Future(Box::pin(async move {
            let binding = bindings.get().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Device binding unreadable, treating device as unbound");
                None
            });
            Some(wrap(binding))
        }))
    }

    fn bind(
        state: &mut IssuanceState,
        token: Token,
        env: &VoucherEnvironment,
    ) -> SmallVec<[Effect<IssuanceAction>; 4]> {
        tracing::info!(token = token.prefix(), "Ticket bound, showing ticket view");
        let route = Route::ticket(&token);
        state.phase = IssuancePhase::Bound { token };
        state.error = None;
        smallvec![env.navigate(route)]
    }

    fn fail(state: &mut IssuanceState, message: String) -> SmallVec<[Effect<IssuanceAction>; 4]> {
        state.phase = IssuancePhase::Idle;
        state.error = Some(message);
        smallvec![Effect::None]
    }
}

impl Default for IssuanceReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for IssuanceReducer {
    type State = IssuanceState;
    type Action = IssuanceAction;
    type Environment = VoucherEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Screen entry ==========
            IssuanceAction::Load => smallvec![Self::read_binding(env, |binding| {
                IssuanceAction::BindingLoaded { binding }
            })],

            IssuanceAction::BindingLoaded { binding } => {
                if let Some(binding) = &binding {
                    state.phone_input = binding.phone.as_str().to_string();
                }
                state.existing = binding;
                smallvec![Effect::None]
            },

            IssuanceAction::PhoneChanged(input) => {
                if state.input_enabled() {
                    state.phone_input = input;
                }
                smallvec![Effect::None]
            },

            // ========== Submit ==========
            IssuanceAction::Submit => {
                if state.is_busy() {
                    tracing::debug!("Submit ignored, request already in flight");
                    return smallvec![Effect::None];
                }
                if let Some(token) = state.bound_token() {
                    return smallvec![env.navigate(Route::ticket(token))];
                }

                state.phase = IssuancePhase::Validating;
                state.error = None;
                smallvec![Self::read_binding(env, |binding| {
                    IssuanceAction::BindingChecked { binding }
                })]
            },

            IssuanceAction::BindingChecked { binding } => {
                if state.phase != IssuancePhase::Validating {
                    return smallvec![Effect::None];
                }
                state.existing.clone_from(&binding);

                match fast_path(env.settings.binding_policy, binding) {
                    FastPath::UseCached(token) => {
                        tracing::info!(token = token.prefix(), "Device already bound, skipping issuance");
                        Self::bind(state, token, env)
                    },
                    FastPath::Revalidate(binding) => {
                        state.phase = IssuancePhase::Requesting;
                        let ledger = Arc::clone(&env.ledger);
                        smallvec![Effect::Future(Box::pin(async move {
                            let result = ledger
                                .get_ticket(&binding.token)
                                .await
                                .map(|snapshot| snapshot.token);
                            Some(IssuanceAction::BindingRevalidated { binding, result })
                        }))]
                    },
                    FastPath::Issue => match Phone::parse(&state.phone_input) {
                        Err(e) => {
                            tracing::debug!("Phone number rejected locally");
                            Self::fail(state, e.user_message())
                        },
                        Ok(phone) => {
                            state.phase = IssuancePhase::Requesting;
                            tracing::debug!(phone = %phone.masked(), "Requesting ticket");
                            let ledger = Arc::clone(&env.ledger);
                            smallvec![Effect::Future(Box::pin(async move {
                                let result = ledger.issue_ticket(&phone).await;
                                Some(IssuanceAction::TicketIssued { phone, result })
                            }))]
                        },
                    },
                }
            },

            // ========== Ledger answers ==========
            IssuanceAction::BindingRevalidated { binding, result } => {
                if state.phase != IssuancePhase::Requesting {
                    return smallvec![Effect::None];
                }
                match result {
                    Ok(token) => Self::bind(state, token, env),
                    Err(e) => {
                        tracing::warn!(token = binding.token.prefix(), error = %e, "Bound ticket could not be confirmed");
                        Self::fail(state, e.user_message())
                    },
                }
            },

            IssuanceAction::TicketIssued { phone, result } => {
                if state.phase != IssuancePhase::Requesting {
                    return smallvec![Effect::None];
                }
                match result {
                    Err(e) => {
                        tracing::warn!(error = %e, "Ticket issuance failed");
                        Self::fail(state, e.user_message())
                    },
                    Ok(token) => {
                        let binding = DeviceBinding { phone, token };
                        let bindings = Arc::clone(&env.bindings);
                        smallvec![Effect::Future(Box::pin(async move {
                            if let Err(e) = bindings.set(&binding) {
                                tracing::warn!(error = %e, "Device binding could not be persisted");
                            }
                            Some(IssuanceAction::BindingStored { binding })
                        }))]
                    },
                }
            },

            IssuanceAction::BindingStored { binding } => {
                if state.phase != IssuancePhase::Requesting {
                    return smallvec![Effect::None];
                }
                let token = binding.token.clone();
                state.existing = Some(binding);
                Self::bind(state, token, env)
            },
        }
    }
}
