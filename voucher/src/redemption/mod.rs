//! Staff redemption: the double-confirmation state machine.
//!
//! Tapping an item arms it; tapping the same item again submits. Tapping the
//! other item re-arms without a request. At most one redemption is in flight
//! per controller, and both finished states return to the ticket view after
//! a fixed delay unless the controller is torn down first.
//!
//! ```text
//! Loading ──▶ Viewing ──tap X──▶ Armed(X) ──tap X──▶ Submitting(X) ──ok──▶ Succeeded(X)
//!    │                            │    ▲                  │
//!    │                            └tap Y┘                 └─err─▶ Armed(X) + error
//!    └─ ticket already used ──▶ LockedUsed
//! ```

mod reducer;

pub use reducer::{RedemptionReducer, RETURN_TIMER};

use crate::error::VoucherError;
use crate::types::{Item, RedeemReceipt, TicketSnapshot, Token};

/// Shown when the page is opened without a ticket code
pub const MISSING_TOKEN_MESSAGE: &str =
    "Cannot redeem: ticket code missing. Open this page by scanning the ticket's code.";

/// Where the redemption controller is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedemptionPhase {
    /// Not loaded yet
    #[default]
    Idle,
    /// Opened without a token; nothing is ever sent to the ledger
    MissingToken,
    /// Fetching the ticket
    Loading,
    /// Ticket could not be fetched
    LoadFailed,
    /// Unused ticket, no item selected
    Viewing,
    /// Item selected; tapping it again submits
    Armed(Item),
    /// Redemption request in flight; controls disabled
    Submitting(Item),
    /// Redeemed by this controller; terminal
    Succeeded(Item),
    /// Ticket was already used when seen; terminal
    LockedUsed,
}

impl RedemptionPhase {
    /// Terminal states that return to the ticket view
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::LockedUsed)
    }

    /// Whether an item tap can change anything
    #[must_use]
    pub const fn accepts_taps(self) -> bool {
        matches!(self, Self::Viewing | Self::Armed(_))
    }
}

/// Render model for one item button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemControl {
    /// The item
    pub item: Item,
    /// Selected and waiting for the confirming tap
    pub armed: bool,
    /// This item's redemption is in flight
    pub in_flight: bool,
    /// The button can be tapped
    pub enabled: bool,
}

/// State of the redemption page
#[derive(Debug, Clone, Default)]
pub struct RedemptionState {
    /// Token from the route, once parsed
    pub token: Option<Token>,
    /// Current phase
    pub phase: RedemptionPhase,
    /// Latest known ticket, reconciled with every ledger answer
    pub snapshot: Option<TicketSnapshot>,
    /// Message for the last failure
    pub error: Option<String>,
    /// Incremented on every load; ledger answers from older loads are dropped
    pub generation: u64,
    /// Set once the controller is torn down; nothing navigates afterwards
    pub torn_down: bool,
    /// Set once the return navigation has happened
    pub returned: bool,
}

impl RedemptionState {
    /// Item controls in display order
    #[must_use]
    pub fn controls(&self) -> [ItemControl; 2] {
        Item::ALL.map(|item| ItemControl {
            item,
            armed: self.phase == RedemptionPhase::Armed(item),
            in_flight: self.phase == RedemptionPhase::Submitting(item),
            enabled: self.phase.accepts_taps(),
        })
    }

    /// Token the ticket view should show: the ledger's, falling back to the route's
    #[must_use]
    pub fn canonical_token(&self) -> Option<&Token> {
        self.snapshot
            .as_ref()
            .map(|snapshot| &snapshot.token)
            .or(self.token.as_ref())
    }
}

/// Inputs to the redemption controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionAction {
    /// The redemption route was opened
    Load {
        /// Raw `token` query parameter
        token: Option<String>,
    },
    /// Ledger answer to the initial fetch
    TicketLoaded {
        /// Load the answer belongs to
        generation: u64,
        /// Snapshot or the failure
        result: Result<TicketSnapshot, VoucherError>,
    },
    /// Staff tapped an item
    ItemTapped(Item),
    /// Ledger answer to the redemption request
    RedeemCompleted {
        /// Load the request was made under
        generation: u64,
        /// Item that was submitted
        item: Item,
        /// Receipt or the failure
        result: Result<RedeemReceipt, VoucherError>,
    },
    /// Ledger answer to a post-redemption refresh
    TicketRefreshed {
        /// Load the answer belongs to
        generation: u64,
        /// Snapshot or the failure
        result: Result<TicketSnapshot, VoucherError>,
    },
    /// Return timer fired
    ReturnToTicket,
    /// The page is going away
    Teardown,
}
