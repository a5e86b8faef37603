//! Dependencies injected into every controller.

use crate::binding::DeviceBindingStore;
use crate::config::ControllerSettings;
use crate::ledger::LedgerClient;
use crate::routes::{Navigator, Route, ScanCode};
use crate::types::Token;
use std::sync::Arc;
use voucher_core::effect::Effect;
use voucher_core::environment::Clock;

/// Environment shared by the issuance, ticket view and redemption reducers
#[derive(Clone)]
pub struct VoucherEnvironment {
    /// Remote ticket ledger
    pub ledger: Arc<dyn LedgerClient>,
    /// Local device binding
    pub bindings: Arc<dyn DeviceBindingStore>,
    /// Screen handover
    pub navigator: Arc<dyn Navigator>,
    /// Clock for optimistic timestamps
    pub clock: Arc<dyn Clock>,
    /// Controller behavior
    pub settings: ControllerSettings,
}

impl VoucherEnvironment {
    /// Creates a new `VoucherEnvironment` with default settings
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        bindings: Arc<dyn DeviceBindingStore>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            bindings,
            navigator,
            clock,
            settings: ControllerSettings::default(),
        }
    }

    /// Replace the controller settings
    #[must_use]
    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Scannable code for a ledger-returned token
    #[must_use]
    pub fn scan_code(&self, token: &Token) -> ScanCode {
        ScanCode::for_ticket(&self.settings.public_origin, &self.settings.base_path, token)
    }

    /// Effect that hands control to `route`
    pub(crate) fn navigate<A: Send + 'static>(&self, route: Route) -> Effect<A> {
        let navigator = Arc::clone(&self.navigator);
        Effect::fire_and_forget(async move { navigator.navigate(route) })
    }
}

impl std::fmt::Debug for VoucherEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoucherEnvironment")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
