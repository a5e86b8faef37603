//! Route surface and the scannable redemption code.
//!
//! Three routes exist: the issuance entry, a ticket view keyed by token in the
//! path, and the staff redemption page keyed by a `token` query parameter.
//! Controllers never call each other; they hand over through a [`Navigator`].

use crate::types::Token;
use std::borrow::Cow;
use std::fmt;

/// A screen the application can show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// "Get my ticket" entry page
    Issuance,
    /// Ticket view; the token is the raw path segment
    Ticket {
        /// Token as it appears in the route, possibly blank
        token: String,
    },
    /// Staff redemption page; only reached by scanning a ticket's code
    Redeem {
        /// Raw `token` query parameter, `None` when absent or blank
        token: Option<String>,
    },
}

impl Route {
    /// Ticket view for a known token
    #[must_use]
    pub fn ticket(token: &Token) -> Self {
        Self::Ticket {
            token: token.as_str().to_string(),
        }
    }

    /// Redemption page for a known token
    #[must_use]
    pub fn redeem(token: &Token) -> Self {
        Self::Redeem {
            token: Some(token.as_str().to_string()),
        }
    }

    /// Path and query for this route under `base_path`, percent-encoded
    #[must_use]
    pub fn path(&self, base_path: &str) -> String {
        let base = base_path.trim_end_matches('/');
        match self {
            Self::Issuance => format!("{base}/"),
            Self::Ticket { token } => format!("{base}/ticket/{}", urlencoding::encode(token)),
            Self::Redeem { token: Some(token) } => {
                format!("{base}/redeem?token={}", urlencoding::encode(token))
            },
            Self::Redeem { token: None } => format!("{base}/redeem"),
        }
    }

    /// Parse a path and query produced by [`Route::path`] or typed by hand
    ///
    /// Returns `None` for paths outside `base_path` or unknown pages.
    #[must_use]
    pub fn parse(path_and_query: &str, base_path: &str) -> Option<Self> {
        let base = base_path.trim_end_matches('/');
        let rest = path_and_query.strip_prefix(base)?;
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

        match path.trim_end_matches('/') {
            "" => Some(Self::Issuance),
            "/redeem" => {
                let token = query_param(query, "token")
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
                Some(Self::Redeem { token })
            },
            other => {
                let segment = other.strip_prefix("/ticket/")?;
                if segment.contains('/') {
                    return None;
                }
                let token = urlencoding::decode(segment).ok()?.into_owned();
                Some(Self::Ticket { token })
            },
        }
    }
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| {
            urlencoding::decode(&v.replace('+', " "))
                .ok()
                .map(Cow::into_owned)
        })
}

/// Payload of the code shown on an unused ticket
///
/// Always built from the token the ledger returned, so scanning it opens the
/// redemption page for the canonical ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCode {
    /// Absolute redemption URL
    pub payload: String,
}

impl ScanCode {
    /// Code for `token`, served from `origin` under `base_path`
    #[must_use]
    pub fn for_ticket(origin: &str, base_path: &str, token: &Token) -> Self {
        Self {
            payload: format!(
                "{}{}",
                origin.trim_end_matches('/'),
                Route::redeem(token).path(base_path)
            ),
        }
    }
}

impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload)
    }
}

/// Hands control from one controller to another
pub trait Navigator: Send + Sync {
    /// Show `route`, replacing the current screen
    fn navigate(&self, route: Route);
}

/// Navigator that only logs the destination
#[derive(Debug, Clone)]
pub struct LoggingNavigator {
    base_path: String,
}

impl LoggingNavigator {
    /// Log paths under `base_path`
    #[must_use]
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Navigator for LoggingNavigator {
    fn navigate(&self, route: Route) {
        tracing::info!(path = %route.path(&self.base_path), "Navigating");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BASE: &str = "/kuangsan-ticket";

    #[test]
    fn paths_are_percent_encoded() {
        let route = Route::Ticket {
            token: "a b/c".to_string(),
        };
        assert_eq!(route.path(BASE), "/kuangsan-ticket/ticket/a%20b%2Fc");
        assert_eq!(Route::parse(&route.path(BASE), BASE), Some(route));
    }

    #[test]
    fn redeem_route_reads_token_query() {
        assert_eq!(
            Route::parse("/kuangsan-ticket/redeem?token=T1", BASE),
            Some(Route::Redeem {
                token: Some("T1".to_string())
            })
        );
        assert_eq!(
            Route::parse("/kuangsan-ticket/redeem?token=%20%20", BASE),
            Some(Route::Redeem { token: None })
        );
        assert_eq!(
            Route::parse("/kuangsan-ticket/redeem", BASE),
            Some(Route::Redeem { token: None })
        );
    }

    #[test]
    fn redeem_token_query_is_decoded() {
        assert_eq!(
            Route::parse("/kuangsan-ticket/redeem?from=scan&token=a%2Fb+c", BASE),
            Some(Route::Redeem {
                token: Some("a/b c".to_string())
            })
        );
    }

    #[test]
    fn issuance_and_unknown_routes() {
        assert_eq!(Route::parse("/kuangsan-ticket/", BASE), Some(Route::Issuance));
        assert_eq!(Route::parse("/kuangsan-ticket", BASE), Some(Route::Issuance));
        assert_eq!(Route::parse("/elsewhere/ticket/T1", BASE), None);
        assert_eq!(Route::parse("/kuangsan-ticket/admin", BASE), None);
    }

    #[test]
    fn blank_ticket_segment_is_kept_for_the_view_to_reject() {
        assert_eq!(
            Route::parse("/kuangsan-ticket/ticket/", BASE),
            None,
            "a trailing slash is trimmed, leaving no ticket segment"
        );
        assert_eq!(
            Route::parse("/kuangsan-ticket/ticket/%20", BASE),
            Some(Route::Ticket {
                token: " ".to_string()
            })
        );
    }

    #[test]
    fn scan_code_points_at_redemption_page() {
        let token = Token::parse("T 1").unwrap();
        let code = ScanCode::for_ticket("https://promo.example/", BASE, &token);
        assert_eq!(
            code.payload,
            "https://promo.example/kuangsan-ticket/redeem?token=T%201"
        );
    }
}
