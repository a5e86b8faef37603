//! # Voucher Runtime
//!
//! Runtime implementation for the voucher controllers.
//!
//! This crate provides the [`Store`] that coordinates reducer execution and
//! effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns controller state and executes effects
//! - **Effect Executor**: Runs effect descriptions on tokio and feeds actions back
//! - **Cancellation Registry**: Tracks tasks started under an [`EffectId`] so
//!   timers can be torn down together with the controller that armed them
//!
//! ## Example
//!
//! ```ignore
//! use voucher_runtime::Store;
//!
//! let store = Store::new(RedemptionState::default(), RedemptionReducer::new(), env);
//!
//! store.send(RedemptionAction::Load { token: Some(raw_token) }).await?;
//! let phase = store.state(|s| s.phase).await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::AbortHandle;
use voucher_core::effect::{Effect, EffectId};
use voucher_core::reducer::Reducer;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action or for effects to finish
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects started by
/// that action. Only directly spawned effects are tracked: effects started by
/// actions that those effects feed back are not.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of tracked effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all tracked effects to complete
    ///
    /// Cancelled effects count as complete.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all tracked effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: counter shared between an [`EffectHandle`] and its running effects
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Runs on completion, on panic, and when the task is aborted by cancellation.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Internal: live tasks started under a cancellable effect id
#[derive(Default)]
struct CancellationRegistry {
    tasks: HashMap<EffectId, Vec<(u64, AbortHandle)>>,
}

impl CancellationRegistry {
    fn register(&mut self, id: EffectId, task: u64, handle: AbortHandle) {
        let entry = self.tasks.entry(id).or_default();
        entry.retain(|(_, h)| !h.is_finished());
        entry.push((task, handle));
    }

    fn release(&mut self, id: &EffectId, task: u64) {
        if let Some(entry) = self.tasks.get_mut(id) {
            entry.retain(|(t, _)| *t != task);
            if entry.is_empty() {
                self.tasks.remove(id);
            }
        }
    }

    /// Abort every task under `id`, returning how many were still running
    fn cancel(&mut self, id: &EffectId) -> usize {
        self.tasks.remove(id).map_or(0, |handles| {
            handles
                .into_iter()
                .filter(|(_, h)| !h.is_finished())
                .map(|(_, h)| h.abort())
                .count()
        })
    }

    fn cancel_all(&mut self) -> usize {
        let ids: Vec<EffectId> = self.tasks.keys().cloned().collect();
        ids.iter().map(|id| self.cancel(id)).sum()
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicU64, AtomicUsize, CancellationRegistry,
        DecrementGuard, Duration, Effect, EffectHandle, EffectId, EffectTracking, Mutex,
        Ordering, Reducer, RwLock, StoreError,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (controller logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// One store backs one controller instance; dropping every clone of the
    /// store does not abort running effects, call [`Store::shutdown`] for that.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: Arc<Mutex<CancellationRegistry>>,
        next_task: Arc<AtomicU64>,
        /// Actions produced by effects, published after the reducer has
        /// processed them so observers always see the updated state.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new Store with custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: Arc::new(Mutex::new(CancellationRegistry::default())),
                next_task: Arc::new(AtomicU64::new(0)),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects asynchronously
        ///
        /// `send()` returns after starting effect execution, not completion.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::debug!("Rejecting action, store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            let (handle, tracking) = EffectHandle::new();
            for effect in effects {
                self.execute_effect(effect, &tracking, None);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, then returns the
        /// first effect-produced action matching `predicate`.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action before the timeout
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Wait until the state satisfies `predicate`
        ///
        /// The predicate is checked immediately and again after every
        /// effect-produced action, so it observes chains of effects that a
        /// single [`EffectHandle`] does not track.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: the predicate did not hold before the timeout
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        pub async fn wait_until<F>(&self, predicate: F, timeout: Duration) -> Result<(), StoreError>
        where
            F: Fn(&S) -> bool,
        {
            // Subscribe BEFORE checking so no transition is missed
            let mut rx = self.action_broadcast.subscribe();

            tokio::time::timeout(timeout, async {
                loop {
                    if self.state(|state| predicate(state)).await {
                        return Ok(());
                    }
                    match rx.recv().await {
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "State observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read the current state
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Number of cancellable tasks currently registered under `id`
        ///
        /// # Panics
        ///
        /// Panics if the cancellation registry mutex is poisoned.
        #[must_use]
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
        pub fn live_cancellable(&self, id: &EffectId) -> usize {
            self.cancellations
                .lock()
                .unwrap()
                .tasks
                .get(id)
                .map_or(0, |tasks| tasks.iter().filter(|(_, h)| !h.is_finished()).count())
        }

        /// Initiate graceful shutdown
        ///
        /// Rejects new actions, aborts every cancellable effect (timers armed by
        /// the controller), then waits for the remaining effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when the timeout elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let cancelled = self.with_registry(CancellationRegistry::cancel_all);
            if cancelled > 0 {
                tracing::debug!(cancelled, "Cancelled live effects during shutdown");
                metrics::counter!("store.effects.cancelled").increment(cancelled as u64);
            }

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
        fn with_registry<T>(&self, f: impl FnOnce(&mut CancellationRegistry) -> T) -> T {
            f(&mut self.cancellations.lock().unwrap())
        }

        /// Spawn a task for an effect, tracked for completion and shutdown
        ///
        /// When `scope` is set the task is registered for cancellation under
        /// that id and unregisters itself on completion.
        fn spawn_tracked<F>(&self, tracking: &EffectTracking, scope: Option<&EffectId>, fut: F)
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);

            let guard = DecrementGuard(tracking.clone());
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
            let task = self.next_task.fetch_add(1, Ordering::Relaxed);
            let release = scope.map(|id| (id.clone(), Arc::clone(&self.cancellations)));

            let handle = tokio::spawn(async move {
                let _guard = guard;
                let _pending_guard = pending_guard;

                fut.await;

                if let Some((id, registry)) = release {
                    if let Ok(mut registry) = registry.lock() {
                        registry.release(&id, task);
                    }
                }
            });

            if let Some(id) = scope {
                let abort = handle.abort_handle();
                self.with_registry(|registry| registry.register(id.clone(), task, abort));
            }
        }

        /// Feed an effect-produced action back into the store
        async fn feed_back(&self, action: A) {
            match self.send(action.clone()).await {
                Ok(_) => {
                    let _ = self.action_broadcast.send(action);
                },
                Err(error) => {
                    tracing::debug!(%error, "Dropping effect-produced action");
                },
            }
        }

        /// Execute an effect
        ///
        /// # Effect Types
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        /// - `Cancellable`: Cancels the previous effect under the id, then runs
        ///   the inner effect registered under that id
        /// - `Cancel`: Aborts every effect registered under the id
        ///
        /// Effect failures are logged and never halt the store.
        #[tracing::instrument(skip(self, effect, tracking), name = "execute_effect")]
        fn execute_effect(
            &self,
            effect: Effect<A>,
            tracking: &EffectTracking,
            scope: Option<&EffectId>,
        ) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);

                    let store = self.clone();
                    self.spawn_tracked(tracking, scope, async move {
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action");
                            store.feed_back(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!(?duration, "Executing Effect::Delay");
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);

                    let store = self.clone();
                    self.spawn_tracked(tracking, scope, async move {
                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay elapsed, sending action");
                        store.feed_back(*action).await;
                    });
                },
                Effect::Parallel(effects) => {
                    tracing::trace!(count = effects.len(), "Executing Effect::Parallel");
                    for effect in effects {
                        self.execute_effect(effect, tracking, scope);
                    }
                },
                Effect::Sequential(effects) => {
                    tracing::trace!(count = effects.len(), "Executing Effect::Sequential");

                    let store = self.clone();
                    let inner_scope = scope.cloned();
                    self.spawn_tracked(tracking, scope, async move {
                        for effect in effects {
                            let (mut step, step_tracking) = EffectHandle::new();
                            store.execute_effect(effect, &step_tracking, inner_scope.as_ref());
                            drop(step_tracking);
                            step.wait().await;
                        }
                    });
                },
                Effect::Cancellable { id, effect } => {
                    let replaced = self.with_registry(|registry| registry.cancel(&id));
                    if replaced > 0 {
                        tracing::debug!(effect_id = %id, replaced, "Replacing live cancellable effect");
                        metrics::counter!("store.effects.cancelled").increment(replaced as u64);
                    }
                    self.execute_effect(*effect, tracking, Some(&id));
                },
                Effect::Cancel(id) => {
                    let cancelled = self.with_registry(|registry| registry.cancel(&id));
                    tracing::debug!(effect_id = %id, cancelled, "Cancelled effects");
                    metrics::counter!("store.effects.cancelled").increment(cancelled as u64);
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: Arc::clone(&self.cancellations),
                next_task: Arc::clone(&self.next_task),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

pub use store::Store;
