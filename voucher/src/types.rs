//! Domain types for voucher tickets.

use crate::error::VoucherError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message shown when a phone number fails validation
pub const INVALID_PHONE_MESSAGE: &str = "Please enter a valid mobile number (e.g. 0912345678)";

/// A Taiwan mobile number: `09` followed by eight digits.
///
/// The only way to obtain a `Phone` is [`Phone::parse`], so holding one proves
/// the number passed local validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    /// Parse raw user input, trimming surrounding whitespace
    ///
    /// # Errors
    ///
    /// Returns [`VoucherError::Validation`] unless the trimmed input is exactly
    /// `09` followed by eight ASCII digits.
    pub fn parse(input: &str) -> Result<Self, VoucherError> {
        let trimmed = input.trim();
        let valid = trimmed.len() == 10
            && trimmed.starts_with("09")
            && trimmed.bytes().all(|b| b.is_ascii_digit());

        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(VoucherError::Validation(INVALID_PHONE_MESSAGE.to_string()))
        }
    }

    /// The number as entered, e.g. `0912345678`
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// E.164 form, e.g. `+886912345678`
    #[must_use]
    pub fn to_e164(&self) -> String {
        format!("+886{}", &self.0[1..])
    }

    /// The number with all but the last three digits hidden, for logs
    #[must_use]
    pub fn masked(&self) -> String {
        format!("*******{}", &self.0[7..])
    }
}

impl TryFrom<String> for Phone {
    type Error = VoucherError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque ticket identifier assigned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(pub(crate) String);

impl Token {
    /// Parse a token from a route or ledger field, trimming whitespace
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The token text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the token, for logs
    #[must_use]
    pub fn prefix(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(6)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl TryFrom<String> for Token {
    type Error = VoucherError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| VoucherError::network("blank token in ledger response"))
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The physical experience a ticket is redeemed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    /// Carousel ride
    Carousel,
    /// Bumper car ride
    BumperCar,
}

impl Item {
    /// Both items, in display order
    pub const ALL: [Self; 2] = [Self::Carousel, Self::BumperCar];

    /// Wire code used by the ledger
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Carousel => "carousel",
            Self::BumperCar => "bumper_car",
        }
    }

    /// Parse a ledger wire code
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "carousel" => Some(Self::Carousel),
            "bumper_car" => Some(Self::BumperCar),
            _ => None,
        }
    }

    /// Human-readable name
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Carousel => "Carousel",
            Self::BumperCar => "Bumper car",
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Item {
    type Err = VoucherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| {
            VoucherError::Validation(format!("unknown item {s:?}, expected carousel or bumper_car"))
        })
    }
}

/// Redemption status of a ticket. Only ever moves from `Unused` to `Used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Not redeemed yet
    Unused,
    /// Redeemed; terminal
    Used,
}

/// Redemption time as the ledger reported it
///
/// The ledger is spreadsheet-backed and may answer with a formatted date
/// instead of RFC 3339. Such text is kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsedAt {
    /// RFC 3339 timestamp
    At(DateTime<Utc>),
    /// Anything else the ledger sent
    Text(String),
}

impl UsedAt {
    /// Read a ledger `usedAt` value, keeping unrecognised formats as text
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        DateTime::parse_from_rfc3339(raw).map_or_else(
            |_| Self::Text(raw.to_string()),
            |t| Self::At(t.with_timezone(&Utc)),
        )
    }

    /// The timestamp, when the ledger sent a parseable one
    #[must_use]
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(t) => Some(*t),
            Self::Text(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for UsedAt {
    fn from(t: DateTime<Utc>) -> Self {
        Self::At(t)
    }
}

impl fmt::Display for UsedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Text(raw) => write!(f, "{raw}"),
        }
    }
}

/// Read-only client copy of a ledger ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    /// Canonical token as returned by the ledger
    pub token: Token,
    /// Redemption status
    pub status: TicketStatus,
    /// Item chosen at redemption
    pub item: Option<Item>,
    /// Redemption time
    pub used_at: Option<UsedAt>,
}

/// Result of merging a ledger snapshot into a local one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The incoming snapshot was merged
    Applied,
    /// The incoming snapshot was older than what is already known and was dropped
    IgnoredStale,
}

impl TicketSnapshot {
    /// Snapshot of a fresh, unredeemed ticket
    #[must_use]
    pub const fn unused(token: Token) -> Self {
        Self {
            token,
            status: TicketStatus::Unused,
            item: None,
            used_at: None,
        }
    }

    /// Whether the ticket has been redeemed
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.status == TicketStatus::Used
    }

    /// Merge a snapshot fetched from the ledger into this one
    ///
    /// Status never regresses from `Used` to `Unused`: a response that does
    /// so was issued before a redemption we already know about. Ledger-supplied
    /// `item`/`used_at` replace locally assumed values; missing ones keep what
    /// is already known.
    pub fn reconcile(&mut self, incoming: Self) -> Reconciled {
        if self.is_used() && !incoming.is_used() {
            return Reconciled::IgnoredStale;
        }

        self.token = incoming.token;
        self.status = incoming.status;
        if incoming.item.is_some() {
            self.item = incoming.item;
        }
        if incoming.used_at.is_some() {
            self.used_at = incoming.used_at;
        }
        Reconciled::Applied
    }
}

/// Ledger acknowledgement of a successful redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemReceipt {
    /// Item the ledger recorded
    pub item: Item,
}

/// Local record tying this device to one issued ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    /// Phone the ticket was issued for
    pub phone: Phone,
    /// Token of that ticket
    pub token: Token,
}
