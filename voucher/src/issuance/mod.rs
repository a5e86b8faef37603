//! "Get my ticket" flow.
//!
//! Validates the phone number, honors the device binding, and asks the ledger
//! for the phone's ticket. A device that already holds a binding goes straight
//! to its ticket; see [`fast_path`] for the single place that decision is made.

mod reducer;

pub use reducer::{fast_path, FastPath, IssuanceReducer};

use crate::error::VoucherError;
use crate::types::{DeviceBinding, Phone, Token};

/// Where the issuance controller is in its flow
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IssuancePhase {
    /// Waiting for input; `IssuanceState::error` may hold the last failure
    #[default]
    Idle,
    /// Submit received; checking the device binding and the phone format
    Validating,
    /// Waiting for the ledger
    Requesting,
    /// Ticket known and bound to this device; terminal
    Bound {
        /// Ticket to show
        token: Token,
    },
}

/// State of the issuance screen
#[derive(Debug, Clone, Default)]
pub struct IssuanceState {
    /// Current phase
    pub phase: IssuancePhase,
    /// Phone number as typed
    pub phone_input: String,
    /// Message for the last failure, cleared on the next submit
    pub error: Option<String>,
    /// Binding found on this device, if any
    pub existing: Option<DeviceBinding>,
}

impl IssuanceState {
    /// Whether a submit is being processed
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.phase, IssuancePhase::Validating | IssuancePhase::Requesting)
    }

    /// Whether the phone field accepts input
    ///
    /// A bound device shows its number read-only and offers its ticket instead.
    #[must_use]
    pub const fn input_enabled(&self) -> bool {
        self.existing.is_none() && !self.is_busy()
    }

    /// Bound ticket, once the flow has finished
    #[must_use]
    pub const fn bound_token(&self) -> Option<&Token> {
        match &self.phase {
            IssuancePhase::Bound { token } => Some(token),
            _ => None,
        }
    }
}

/// Inputs to the issuance controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceAction {
    /// Screen opened: look up the device binding
    Load,
    /// Result of the lookup started by `Load`
    BindingLoaded {
        /// Stored binding
        binding: Option<DeviceBinding>,
    },
    /// Phone field edited
    PhoneChanged(String),
    /// "Get my ticket" pressed
    Submit,
    /// Result of the binding lookup started by `Submit`
    BindingChecked {
        /// Stored binding
        binding: Option<DeviceBinding>,
    },
    /// Ledger answer when revalidating a stored binding
    BindingRevalidated {
        /// Binding that was checked
        binding: DeviceBinding,
        /// Canonical token or the failure
        result: Result<Token, VoucherError>,
    },
    /// Ledger answer to `issue`
    TicketIssued {
        /// Phone the ticket was requested for
        phone: Phone,
        /// Token or the failure
        result: Result<Token, VoucherError>,
    },
    /// The new binding was written (or the write failed and was logged)
    BindingStored {
        /// Binding now held by the device
        binding: DeviceBinding,
    },
}
