//! Ticket view: shows one ticket as a scannable code or as its redemption record.
//!
//! Each activation performs exactly one `get_ticket` call. There is no
//! polling and no automatic retry.

mod reducer;
#[cfg(test)]
mod tests;

pub use reducer::TicketViewReducer;

use crate::error::VoucherError;
use crate::routes::ScanCode;
use crate::types::{Item, TicketSnapshot, UsedAt};

/// Message shown when the route carries no ticket code
pub const MISSING_TICKET_MESSAGE: &str = "Ticket code is missing from the link";

/// What the ticket view renders
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TicketViewPhase {
    /// Not activated yet
    #[default]
    Idle,
    /// Waiting for the ledger
    Loading,
    /// Ticket can still be redeemed: show the code
    Unused {
        /// Code pointing at the redemption page
        code: ScanCode,
    },
    /// Ticket was redeemed: show the record, no code
    Used {
        /// Item it was redeemed for
        item: Option<Item>,
        /// When it was redeemed
        used_at: Option<UsedAt>,
    },
    /// Loading failed; terminal for this activation
    Failed {
        /// Message to show
        message: String,
    },
}

/// State of the ticket view
#[derive(Debug, Clone, Default)]
pub struct TicketViewState {
    /// Token exactly as it appeared in the route
    pub route_token: String,
    /// Incremented on every activation; answers from older activations are dropped
    pub generation: u64,
    /// Last snapshot received from the ledger
    pub snapshot: Option<TicketSnapshot>,
    /// What to render
    pub phase: TicketViewPhase,
}

impl TicketViewState {
    /// The scannable code, when the ticket is unused
    #[must_use]
    pub const fn scan_code(&self) -> Option<&ScanCode> {
        match &self.phase {
            TicketViewPhase::Unused { code } => Some(code),
            _ => None,
        }
    }
}

/// Inputs to the ticket view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketViewAction {
    /// The ticket route was opened
    Activate {
        /// Raw route parameter
        token: String,
    },
    /// Ledger answer for an activation
    Loaded {
        /// Activation the answer belongs to
        generation: u64,
        /// Snapshot or the failure
        result: Result<TicketSnapshot, VoucherError>,
    },
    /// The code was tapped on the same device: open the redemption page
    OpenRedemption,
}
