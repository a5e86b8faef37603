//! In-process ledger with the full contract of the remote one.

use super::{LedgerClient, LedgerFuture, LedgerResult};
use crate::error::VoucherError;
use crate::types::{Item, Phone, RedeemReceipt, TicketSnapshot, TicketStatus, Token, UsedAt};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use voucher_core::environment::Clock;

/// How the in-memory ledger names new tickets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenScheme {
    /// Random UUIDs without hyphens
    Random,
    /// `<prefix>1`, `<prefix>2`, ... in issuance order
    Sequential(String),
}

#[derive(Debug, Clone)]
struct TicketRecord {
    phone: Phone,
    status: TicketStatus,
    item: Option<Item>,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Book {
    by_phone: HashMap<Phone, Token>,
    tickets: HashMap<Token, TicketRecord>,
    rejected_phones: HashSet<Phone>,
    issued: u64,
}

/// Ledger kept in process memory
///
/// Every operation runs under one lock, which makes redemption first-writer-
/// wins across any number of concurrent callers.
#[derive(Clone)]
pub struct InMemoryLedger {
    book: Arc<Mutex<Book>>,
    clock: Arc<dyn Clock>,
    scheme: TokenScheme,
}

impl InMemoryLedger {
    /// Create an empty ledger stamping redemptions with `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            book: Arc::new(Mutex::new(Book::default())),
            clock,
            scheme: TokenScheme::Random,
        }
    }

    /// Choose how new tokens are generated
    #[must_use]
    pub fn with_token_scheme(mut self, scheme: TokenScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Refuse issuance for `phone` from now on
    ///
    /// # Errors
    ///
    /// Returns [`VoucherError::Network`] if the ledger lock is poisoned.
    pub fn reject_phone(&self, phone: Phone) -> LedgerResult<()> {
        lock(&self.book)?.rejected_phones.insert(phone);
        Ok(())
    }

    /// Current state of a ticket, bypassing the async interface
    #[must_use]
    pub fn ticket(&self, token: &Token) -> Option<TicketSnapshot> {
        let book = lock(&self.book).ok()?;
        book.tickets
            .get(token)
            .map(|record| snapshot(token.clone(), record))
    }

    /// Phone a ticket was issued to
    #[must_use]
    pub fn owner(&self, token: &Token) -> Option<Phone> {
        let book = lock(&self.book).ok()?;
        book.tickets.get(token).map(|record| record.phone.clone())
    }

    /// Number of tickets issued so far
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        lock(&self.book).map_or(0, |book| book.tickets.len())
    }

    fn next_token(scheme: &TokenScheme, issued: u64) -> Token {
        let raw = match scheme {
            TokenScheme::Random => uuid::Uuid::new_v4().simple().to_string(),
            TokenScheme::Sequential(prefix) => format!("{prefix}{issued}"),
        };
        Token(raw)
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("scheme", &self.scheme)
            .field("tickets", &self.ticket_count())
            .finish_non_exhaustive()
    }
}

impl LedgerClient for InMemoryLedger {
    fn issue_ticket(&self, phone: &Phone) -> LedgerFuture<Token> {
        let book = Arc::clone(&self.book);
        let scheme = self.scheme.clone();
        let phone = phone.clone();

        Box::pin(async move {
            let mut book = lock(&book)?;

            if book.rejected_phones.contains(&phone) {
                tracing::debug!(phone = %phone.masked(), "Issuance refused by phone policy");
                return Err(VoucherError::domain("This phone number is not eligible for a ticket"));
            }

            if let Some(existing) = book.by_phone.get(&phone) {
                return Ok(existing.clone());
            }

            book.issued += 1;
            let token = Self::next_token(&scheme, book.issued);
            book.by_phone.insert(phone.clone(), token.clone());
            book.tickets.insert(
                token.clone(),
                TicketRecord {
                    phone,
                    status: TicketStatus::Unused,
                    item: None,
                    used_at: None,
                },
            );

            tracing::debug!(token = token.prefix(), "Ticket issued");
            Ok(token)
        })
    }

    fn get_ticket(&self, token: &Token) -> LedgerFuture<TicketSnapshot> {
        let book = Arc::clone(&self.book);
        let token = token.clone();

        Box::pin(async move {
            let book = lock(&book)?;
            book.tickets
                .get(&token)
                .map(|record| snapshot(token.clone(), record))
                .ok_or_else(|| VoucherError::domain("Ticket not found"))
        })
    }

    fn redeem_ticket(&self, token: &Token, item: Item) -> LedgerFuture<RedeemReceipt> {
        let book = Arc::clone(&self.book);
        let clock = Arc::clone(&self.clock);
        let token = token.clone();

        Box::pin(async move {
            let mut book = lock(&book)?;
            let record = book
                .tickets
                .get_mut(&token)
                .ok_or_else(|| VoucherError::domain("Ticket not found"))?;

            if record.status == TicketStatus::Used {
                tracing::debug!(token = token.prefix(), "Redemption refused, ticket already used");
                return Err(VoucherError::domain("This ticket has already been used"));
            }

            record.status = TicketStatus::Used;
            record.item = Some(item);
            record.used_at = Some(clock.now());

            tracing::debug!(token = token.prefix(), item = item.code(), "Ticket redeemed");
            Ok(RedeemReceipt { item })
        })
    }
}

fn snapshot(token: Token, record: &TicketRecord) -> TicketSnapshot {
    TicketSnapshot {
        token,
        status: record.status,
        item: record.item,
        used_at: record.used_at.map(UsedAt::from),
    }
}

fn lock(book: &Mutex<Book>) -> LedgerResult<MutexGuard<'_, Book>> {
    book.lock()
        .map_err(|_| VoucherError::network("in-memory ledger lock poisoned"))
}
