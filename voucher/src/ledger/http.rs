//! HTTP ledger client.
//!
//! The ledger exposes one endpoint; the operation is chosen with an `action`
//! query parameter and every answer is a JSON object with a `success` flag.

use super::{LedgerClient, LedgerFuture, LedgerResult};
use crate::error::VoucherError;
use crate::types::{Item, Phone, RedeemReceipt, TicketSnapshot, TicketStatus, Token, UsedAt};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Raw ledger answer, shared by all three actions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerResponse {
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    item: Option<String>,
    #[serde(default)]
    used_at: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Ledger client speaking the `?action=` HTTP protocol
#[derive(Clone, Debug)]
pub struct HttpLedgerClient {
    client: Client,
    endpoint: String,
    source: Option<String>,
}

impl HttpLedgerClient {
    /// Create a client for `endpoint` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`VoucherError::Network`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoucherError::network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            source: None,
        })
    }

    /// Campaign tag sent along with `issue`
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn call(
        &self,
        action: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> impl std::future::Future<Output = LedgerResult<LedgerResponse>> + Send + use<> {
        let request = self
            .client
            .get(&self.endpoint)
            .query(&[("action", action)])
            .query(&params);

        async move {
            tracing::debug!(action, "Calling ledger");

            let response = request.send().await.map_err(|e| {
                tracing::warn!(action, error = %e, "Ledger request failed");
                VoucherError::network(e.to_string())
            })?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(action, status = status.as_u16(), "Ledger returned non-success status");
                return Err(VoucherError::network(format!("HTTP {status}")));
            }

            let body = response.json::<LedgerResponse>().await.map_err(|e| {
                tracing::warn!(action, error = %e, "Ledger returned a malformed body");
                VoucherError::network(format!("malformed ledger response: {e}"))
            })?;

            if body.success {
                Ok(body)
            } else {
                tracing::debug!(action, message = ?body.message, "Ledger rejected request");
                Err(VoucherError::domain_from(body.message))
            }
        }
    }
}

impl LedgerClient for HttpLedgerClient {
    fn issue_ticket(&self, phone: &Phone) -> LedgerFuture<Token> {
        let mut params = vec![("phone", phone.as_str().to_string())];
        if let Some(source) = &self.source {
            params.push(("source", source.clone()));
        }
        let call = self.call("issue", params);

        Box::pin(async move {
            let body = call.await?;
            body.token
                .as_deref()
                .and_then(Token::parse)
                .ok_or_else(|| VoucherError::network("issue response carries no token"))
        })
    }

    fn get_ticket(&self, token: &Token) -> LedgerFuture<TicketSnapshot> {
        let call = self.call("getTicket", vec![("token", token.as_str().to_string())]);

        Box::pin(async move { snapshot_from(call.await?) })
    }

    fn redeem_ticket(&self, token: &Token, item: Item) -> LedgerFuture<RedeemReceipt> {
        let call = self.call(
            "redeem",
            vec![
                ("token", token.as_str().to_string()),
                ("item", item.code().to_string()),
            ],
        );

        Box::pin(async move {
            let body = call.await?;
            let recorded = parse_item(body.item.as_deref()).unwrap_or(item);
            Ok(RedeemReceipt { item: recorded })
        })
    }
}

fn snapshot_from(body: LedgerResponse) -> LedgerResult<TicketSnapshot> {
    let token = body
        .token
        .as_deref()
        .and_then(Token::parse)
        .ok_or_else(|| VoucherError::network("ticket response carries no token"))?;

    let status = match body.status.as_deref().map(str::trim) {
        Some("unused") => TicketStatus::Unused,
        Some("used") => TicketStatus::Used,
        other => {
            return Err(VoucherError::network(format!("unknown ticket status {other:?}")));
        },
    };

    Ok(TicketSnapshot {
        token,
        status,
        item: parse_item(body.item.as_deref()),
        used_at: non_blank(body.used_at.as_deref()).map(UsedAt::parse),
    })
}

/// Empty strings mean "not set"; the ledger is spreadsheet-backed.
fn non_blank(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|s| !s.is_empty())
}

/// Item codes are display detail; an unknown one never fails the answer.
fn parse_item(field: Option<&str>) -> Option<Item> {
    let code = non_blank(field)?;
    let item = Item::from_code(code);
    if item.is_none() {
        tracing::warn!(code, "Ledger returned an unknown item code");
    }
    item
}
