//! Application wiring: builds the environment from [`Config`] and hands out
//! one store per controller instance.

use crate::binding::{DeviceBindingStore, FileBindingStore};
use crate::config::{Config, LedgerBackend};
use crate::diagnostics;
use crate::environment::VoucherEnvironment;
use crate::error::{BindingError, ConfigError, VoucherError};
use crate::issuance::{IssuanceAction, IssuanceReducer, IssuanceState};
use crate::ledger::{HttpLedgerClient, InMemoryLedger, LedgerClient};
use crate::redemption::{RedemptionAction, RedemptionReducer, RedemptionState};
use crate::routes::LoggingNavigator;
use crate::ticket_view::{TicketViewAction, TicketViewReducer, TicketViewState};
use std::sync::Arc;
use thiserror::Error;
use voucher_core::environment::SystemClock;
use voucher_runtime::Store;

/// Store driving the issuance screen
pub type IssuanceStore = Store<IssuanceState, IssuanceAction, VoucherEnvironment, IssuanceReducer>;

/// Store driving one ticket view
pub type TicketViewStore =
    Store<TicketViewState, TicketViewAction, VoucherEnvironment, TicketViewReducer>;

/// Store driving one redemption page
pub type RedemptionStore =
    Store<RedemptionState, RedemptionAction, VoucherEnvironment, RedemptionReducer>;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The ledger client could not be built
    #[error("Ledger setup failed: {0}")]
    Ledger(#[from] VoucherError),
}

/// Voucher application: configuration plus the shared environment
pub struct VoucherApp {
    config: Config,
    env: VoucherEnvironment,
}

impl VoucherApp {
    /// Wire the application from configuration
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the HTTP backend has no URL, or
    /// [`AppError::Ledger`] if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let clock = Arc::new(SystemClock);

        let ledger: Arc<dyn LedgerClient> = match config.ledger.backend {
            LedgerBackend::Http => {
                let url = config
                    .ledger
                    .url
                    .clone()
                    .ok_or(ConfigError::Missing("VOUCHER_LEDGER_URL"))?;
                tracing::info!(url = %url, source = %config.ledger.source, "Using HTTP ledger");
                Arc::new(
                    HttpLedgerClient::new(url, config.ledger.timeout)?
                        .with_source(config.ledger.source.clone()),
                )
            },
            LedgerBackend::Memory => {
                tracing::info!("Using in-memory ledger");
                Arc::new(InMemoryLedger::new(clock.clone()))
            },
        };

        let bindings = Arc::new(FileBindingStore::new(&config.data_dir));
        tracing::debug!(path = %bindings.path().display(), "Device binding location");

        let env = VoucherEnvironment::new(
            ledger,
            bindings,
            Arc::new(LoggingNavigator::new(config.controllers.base_path.clone())),
            clock,
        )
        .with_settings(config.controllers.clone());

        Ok(Self { config, env })
    }

    /// Use an already wired environment
    #[must_use]
    pub const fn with_environment(config: Config, env: VoucherEnvironment) -> Self {
        Self { config, env }
    }

    /// Loaded configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Shared environment
    #[must_use]
    pub const fn environment(&self) -> &VoucherEnvironment {
        &self.env
    }

    /// Fresh store for the issuance screen
    #[must_use]
    pub fn issuance(&self) -> IssuanceStore {
        Store::new(IssuanceState::default(), IssuanceReducer::new(), self.env.clone())
    }

    /// Fresh store for a ticket view
    #[must_use]
    pub fn ticket_view(&self) -> TicketViewStore {
        Store::new(TicketViewState::default(), TicketViewReducer::new(), self.env.clone())
    }

    /// Fresh store for a redemption page
    #[must_use]
    pub fn redemption(&self) -> RedemptionStore {
        Store::new(RedemptionState::default(), RedemptionReducer::new(), self.env.clone())
    }

    /// Diagnostic reset of this device's binding
    ///
    /// # Errors
    ///
    /// See [`diagnostics::reset_device_binding`].
    pub fn reset_device_binding(&self) -> Result<(), BindingError> {
        diagnostics::reset_device_binding(&self.config, self.bindings())
    }

    fn bindings(&self) -> &dyn DeviceBindingStore {
        &*self.env.bindings
    }
}
