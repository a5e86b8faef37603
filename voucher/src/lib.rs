//! # Voucher
//!
//! Single-use promotional tickets for a two-ride campaign.
//!
//! A visitor requests a ticket with a phone number, is shown the ticket and
//! its scannable code, and staff redeem it for exactly one ride with a
//! double-confirm tap. The ticket ledger is the source of truth; this crate
//! holds three controllers (issuance, ticket view, redemption) written as
//! reducers over a shared [`VoucherEnvironment`](environment::VoucherEnvironment).
//!
//! ## Modules
//!
//! - [`issuance`]: phone validation, device binding and ticket issue
//! - [`ticket_view`]: renders a ticket from the ledger
//! - [`redemption`]: staff double-confirm state machine
//! - [`ledger`]: ledger client trait, HTTP and in-memory implementations
//! - [`binding`]: device binding persistence
//! - [`app`]: wiring from [`Config`](config::Config) to stores

pub mod app;
pub mod binding;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod issuance;
pub mod ledger;
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;
pub mod redemption;
pub mod routes;
pub mod ticket_view;
pub mod types;

pub use app::{AppError, IssuanceStore, RedemptionStore, TicketViewStore, VoucherApp};
pub use config::Config;
pub use environment::VoucherEnvironment;
pub use error::{BindingError, ConfigError, VoucherError};
pub use types::{
    DeviceBinding, Item, Phone, RedeemReceipt, TicketSnapshot, TicketStatus, Token, UsedAt,
};
