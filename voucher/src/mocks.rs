//! Test doubles for the voucher environment.
//!
//! Available with the `test-utils` feature (on by default).

use crate::binding::InMemoryBindingStore;
use crate::environment::VoucherEnvironment;
use crate::error::VoucherError;
use crate::ledger::{InMemoryLedger, LedgerClient, LedgerFuture, TokenScheme};
use crate::routes::{Navigator, Route};
use crate::types::{Item, Phone, RedeemReceipt, TicketSnapshot, Token};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voucher_core::environment::Clock;

/// Navigator that remembers every route it was asked to show
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    /// Create a navigator with an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every route navigated to, oldest first
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The most recent route
    #[must_use]
    pub fn last(&self) -> Option<Route> {
        self.routes().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(route);
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    get_failures: VecDeque<VoucherError>,
    redeem_failures: VecDeque<VoucherError>,
    get_delays: VecDeque<Duration>,
}

/// Ledger wrapper counting calls and injecting scripted faults
///
/// Calls are counted when issued, not when their future completes.
pub struct CountingLedger {
    inner: Arc<dyn LedgerClient>,
    issue_calls: AtomicUsize,
    get_calls: AtomicUsize,
    redeem_calls: AtomicUsize,
    script: Mutex<Script>,
}

impl CountingLedger {
    /// Wrap `inner`
    #[must_use]
    pub fn new(inner: Arc<dyn LedgerClient>) -> Self {
        Self {
            inner,
            issue_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            redeem_calls: AtomicUsize::new(0),
            script: Mutex::new(Script::default()),
        }
    }

    /// Number of `issue_ticket` calls
    #[must_use]
    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_ticket` calls
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `redeem_ticket` calls
    #[must_use]
    pub fn redeem_calls(&self) -> usize {
        self.redeem_calls.load(Ordering::SeqCst)
    }

    /// Make the next `get_ticket` fail with `error`
    pub fn fail_next_get(&self, error: VoucherError) {
        if let Ok(mut script) = self.script.lock() {
            script.get_failures.push_back(error);
        }
    }

    /// Make the next `redeem_ticket` fail with `error` without reaching the ledger
    pub fn fail_next_redeem(&self, error: VoucherError) {
        if let Ok(mut script) = self.script.lock() {
            script.redeem_failures.push_back(error);
        }
    }

    /// Read the next ticket immediately but deliver the answer after `delay`
    ///
    /// The answer reflects the ledger at call time, so it goes stale if the
    /// ticket changes while it is held back.
    pub fn delay_next_get(&self, delay: Duration) {
        if let Ok(mut script) = self.script.lock() {
            script.get_delays.push_back(delay);
        }
    }

    fn next<T>(&self, pick: impl FnOnce(&mut Script) -> Option<T>) -> Option<T> {
        self.script.lock().ok().and_then(|mut script| pick(&mut script))
    }
}

impl LedgerClient for CountingLedger {
    fn issue_ticket(&self, phone: &Phone) -> LedgerFuture<Token> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.issue_ticket(phone)
    }

    fn get_ticket(&self, token: &Token) -> LedgerFuture<TicketSnapshot> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.next(|s| s.get_failures.pop_front()) {
            return Box::pin(async move { Err(error) });
        }

        let call = self.inner.get_ticket(token);
        match self.next(|s| s.get_delays.pop_front()) {
            Some(delay) => Box::pin(async move {
                let answer = call.await;
                tokio::time::sleep(delay).await;
                answer
            }),
            None => call,
        }
    }

    fn redeem_ticket(&self, token: &Token, item: Item) -> LedgerFuture<RedeemReceipt> {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.next(|s| s.redeem_failures.pop_front()) {
            return Box::pin(async move { Err(error) });
        }
        self.inner.redeem_ticket(token, item)
    }
}

/// Fully wired environment over an in-memory ledger
///
/// Tokens are issued as `T1`, `T2`, ... so scenarios can name them.
pub struct TestEnvironment {
    /// Environment to hand to reducers and stores
    pub env: VoucherEnvironment,
    /// Call-counting view of the ledger the environment uses
    pub ledger: Arc<CountingLedger>,
    /// The ledger itself, for direct inspection and out-of-band redemption
    pub backing: InMemoryLedger,
    /// Device binding store
    pub bindings: Arc<InMemoryBindingStore>,
    /// Navigation history
    pub navigator: Arc<RecordingNavigator>,
}

impl TestEnvironment {
    /// Wire a fresh environment using `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let backing = InMemoryLedger::new(Arc::clone(&clock))
            .with_token_scheme(TokenScheme::Sequential("T".to_string()));
        let ledger = Arc::new(CountingLedger::new(Arc::new(backing.clone())));
        let bindings = Arc::new(InMemoryBindingStore::new());
        let navigator = Arc::new(RecordingNavigator::new());

        let env = VoucherEnvironment::new(
            ledger.clone(),
            bindings.clone(),
            navigator.clone(),
            clock,
        );

        Self {
            env,
            ledger,
            backing,
            bindings,
            navigator,
        }
    }
}
