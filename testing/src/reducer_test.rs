//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use voucher_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// `given_actions` replays actions before the action under test; their
/// effects are discarded, only the final action's effects are asserted on.
///
/// # Example
///
/// ```ignore
/// ReducerTest::new(IssuanceReducer::new())
///     .with_env(test_environment())
///     .given_state(IssuanceState::default())
///     .given_actions(vec![IssuanceAction::PhoneChanged("12345".into())])
///     .when_action(IssuanceAction::Submit)
///     .then_state(|state| assert!(state.error.is_some()))
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    setup_actions: Vec<A>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            setup_actions: Vec::new(),
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Replay actions on top of the initial state (Given)
    #[must_use]
    pub fn given_actions(mut self, actions: Vec<A>) -> Self {
        self.setup_actions = actions;
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        for setup in self.setup_actions {
            let _ = self.reducer.reduce(&mut state, setup, &env);
        }

        let effects = self.reducer.reduce(&mut state, action, &env);

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use voucher_core::effect::{Effect, EffectId};

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if any effect other than `Effect::None` is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(|e| matches!(e, Effect::None)),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found, including inside composites.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(contains_future),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that some effect is registered as cancellable under `id`
    ///
    /// # Panics
    ///
    /// Panics if no effect is registered under `id`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_arms<A>(effects: &[Effect<A>], id: &EffectId) {
        assert!(
            effects.iter().any(|e| e.is_cancellable_as(id)),
            "Expected an effect registered under `{id}`, but none found"
        );
    }

    /// Assert that some effect cancels `id`
    ///
    /// # Panics
    ///
    /// Panics if no cancellation for `id` is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels<A>(effects: &[Effect<A>], id: &EffectId) {
        assert!(
            effects.iter().any(|e| e.cancels(id)),
            "Expected a cancellation of `{id}`, but none found"
        );
    }

    fn contains_future<A>(effect: &Effect<A>) -> bool {
        match effect {
            Effect::Future(_) => true,
            Effect::Parallel(effects) | Effect::Sequential(effects) => {
                effects.iter().any(contains_future)
            },
            Effect::Cancellable { effect, .. } => contains_future(effect),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voucher_core::effect::{Effect, EffectId};
    use voucher_core::reducer::Reducer;
    use voucher_core::{smallvec, SmallVec};

    const TIMER: EffectId = EffectId::new("timer");

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Arm,
        Disarm,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                },
                TestAction::Arm => smallvec![
                    Effect::Delay {
                        duration: std::time::Duration::from_secs(1),
                        action: Box::new(TestAction::Increment),
                    }
                    .cancellable(TIMER)
                ],
                TestAction::Disarm => smallvec![Effect::Cancel(TIMER)],
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_given_actions_are_replayed() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .given_actions(vec![TestAction::Increment, TestAction::Increment])
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 3);
            })
            .run();
    }

    #[test]
    fn test_timer_assertions() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Arm)
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_arms(effects, &TIMER);
            })
            .run();

        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Disarm)
            .then_effects(|effects| assertions::assert_cancels(effects, &TIMER))
            .run();
    }
}
