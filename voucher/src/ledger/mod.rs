//! Client side of the remote ticket ledger.
//!
//! The ledger is the single source of truth for tickets. Every operation
//! resolves to a typed outcome: a ledger rejection is
//! [`VoucherError::Domain`], anything that prevents a well-formed answer is
//! [`VoucherError::Network`].

mod http;
mod memory;

pub use http::HttpLedgerClient;
pub use memory::{InMemoryLedger, TokenScheme};

use crate::error::VoucherError;
use crate::types::{Item, Phone, RedeemReceipt, TicketSnapshot, Token};
use std::future::Future;
use std::pin::Pin;

/// Result of a ledger operation
pub type LedgerResult<T> = Result<T, VoucherError>;

/// Boxed future returned by [`LedgerClient`] operations
pub type LedgerFuture<T> = Pin<Box<dyn Future<Output = LedgerResult<T>> + Send>>;

/// The three remote ticket operations
pub trait LedgerClient: Send + Sync {
    /// Get-or-create the ticket for `phone`
    ///
    /// Calling this twice for the same phone returns the same token.
    ///
    /// # Errors
    ///
    /// [`VoucherError::Domain`] if the ledger refuses the phone,
    /// [`VoucherError::Network`] on transport failure.
    fn issue_ticket(&self, phone: &Phone) -> LedgerFuture<Token>;

    /// Fetch the current state of a ticket. Read-only.
    ///
    /// # Errors
    ///
    /// [`VoucherError::Domain`] for an unknown token,
    /// [`VoucherError::Network`] on transport failure.
    fn get_ticket(&self, token: &Token) -> LedgerFuture<TicketSnapshot>;

    /// Redeem a ticket for `item`
    ///
    /// Exclusive: exactly one call per token succeeds. Every later or
    /// concurrent call fails without changing the ticket.
    ///
    /// # Errors
    ///
    /// [`VoucherError::Domain`] if the ticket is unknown or already used,
    /// [`VoucherError::Network`] on transport failure.
    fn redeem_ticket(&self, token: &Token, item: Item) -> LedgerFuture<RedeemReceipt>;
}
