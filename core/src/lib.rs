//! # Voucher Core
//!
//! Core traits and types for the voucher controllers.
//!
//! Every controller in the voucher system (issuance, ticket view, staff
//! redemption) is written as a reducer: a pure function that updates state in
//! place and returns *descriptions* of side effects. The runtime crate executes
//! those effects and feeds resulting actions back into the reducer.
//!
//! ## Core Concepts
//!
//! - **State**: Everything a controller needs to render itself
//! - **Action**: All inputs (user taps, route activation, ledger responses, timers)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies (ledger, clock, binding store, navigator)
//!
//! ## Example
//!
//! ```ignore
//! use voucher_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! impl Reducer for TicketViewReducer {
//!     type State = TicketViewState;
//!     type Action = TicketViewAction;
//!     type Environment = VoucherEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TicketViewState,
//!         action: TicketViewAction,
//!         env: &VoucherEnvironment,
//!     ) -> SmallVec<[Effect<TicketViewAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - The core trait for controller logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They contain all state-machine logic and are deterministic and testable.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for controller logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most actions produce zero to two effects, so the inline capacity of
        /// four avoids a heap allocation on the hot path.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable and cancellable.
pub mod effect {
    use std::borrow::Cow;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identifier for a cancellable effect
    ///
    /// Identifiers are scoped to a single store: two stores may use the same
    /// identifier without interfering with each other.
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct EffectId(Cow<'static, str>);

    impl EffectId {
        /// Create an identifier from a static name
        #[must_use]
        pub const fn new(name: &'static str) -> Self {
            Self(Cow::Borrowed(name))
        }

        /// Create an identifier from an owned name
        #[must_use]
        pub const fn owned(name: String) -> Self {
            Self(Cow::Owned(name))
        }

        /// The identifier's name
        #[must_use]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl std::fmt::Display for EffectId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should
    /// happen, returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts and auto-navigation)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Run an effect that can later be cancelled by id
        ///
        /// Starting a cancellable effect under an id that is still live cancels
        /// the earlier one, so an id names at most one running effect.
        Cancellable {
            /// Identifier used by [`Effect::Cancel`]
            id: EffectId,
            /// The effect to run
            effect: Box<Effect<Action>>,
        },

        /// Cancel every live effect registered under the given id
        Cancel(EffectId),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap this effect so it can be cancelled with [`Effect::Cancel`]
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// Run a future whose output is not fed back into the reducer
        #[must_use]
        pub fn fire_and_forget<F>(fut: F) -> Effect<Action>
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            Effect::Future(Box::pin(async move {
                fut.await;
                None
            }))
        }

        /// Whether this effect (or any nested effect) is a cancellation for `id`
        #[must_use]
        pub fn cancels(&self, id: &EffectId) -> bool {
            match self {
                Effect::Cancel(target) => target == id,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().any(|e| e.cancels(id))
                },
                Effect::Cancellable { effect, .. } => effect.cancels(id),
                _ => false,
            }
        }

        /// Whether this effect (or any nested effect) is registered under `id`
        #[must_use]
        pub fn is_cancellable_as(&self, id: &EffectId) -> bool {
            match self {
                Effect::Cancellable { id: own, effect } => own == id || effect.is_cancellable_as(id),
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().any(|e| e.is_cancellable_as(id))
                },
                _ => false,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
