//! Voucher command line.
//!
//! Drives the three controllers against the configured ledger, one
//! controller instance per invocation.
//!
//! # Usage
//!
//! ```bash
//! VOUCHER_LEDGER_URL=https://ledger.example/exec voucher issue 0912345678
//! voucher show <token>
//! voucher redeem <token> carousel carousel      # arm, then confirm
//! VOUCHER_DIAGNOSTICS=true voucher reset
//! ```
//!
//! Every item argument to `redeem` is one tap on that item's button.

use anyhow::{bail, Context};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voucher::issuance::IssuanceAction;
use voucher::redemption::{RedemptionAction, RedemptionPhase};
use voucher::ticket_view::{TicketViewAction, TicketViewPhase};
use voucher::{Config, Item, VoucherApp};

/// Upper bound for one controller transition that involves the ledger
const STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for in-flight effects when a command finishes
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const USAGE: &str = "usage: voucher <issue PHONE | show TOKEN | redeem TOKEN ITEM... | reset>";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voucher=info,voucher_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let app = VoucherApp::new(config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["issue", phone] => issue(&app, phone).await,
        ["show", token] => show(&app, token).await,
        ["redeem", token, items @ ..] if !items.is_empty() => redeem(&app, token, items).await,
        ["reset"] => {
            app.reset_device_binding()?;
            println!("Device binding cleared");
            Ok(())
        },
        _ => bail!(USAGE),
    }
}

async fn issue(app: &VoucherApp, phone: &str) -> anyhow::Result<()> {
    let store = app.issuance();

    store
        .send_and_wait_for(
            IssuanceAction::Load,
            |a| matches!(a, IssuanceAction::BindingLoaded { .. }),
            STEP_TIMEOUT,
        )
        .await?;
    store.send(IssuanceAction::PhoneChanged(phone.to_string())).await?;
    store.send(IssuanceAction::Submit).await?;
    store.wait_until(|s| !s.is_busy(), STEP_TIMEOUT).await?;

    let (token, error) = store
        .state(|s| (s.bound_token().cloned(), s.error.clone()))
        .await;
    store.shutdown(SHUTDOWN_TIMEOUT).await?;

    match token {
        Some(token) => {
            info!(token = token.prefix(), "Issuance finished");
            println!("Ticket: {token}");
            println!("Code:   {}", app.environment().scan_code(&token));
            Ok(())
        },
        None => bail!(error.unwrap_or_else(|| "Ticket was not issued".to_string())),
    }
}

async fn show(app: &VoucherApp, token: &str) -> anyhow::Result<()> {
    let store = app.ticket_view();

    store
        .send(TicketViewAction::Activate {
            token: token.to_string(),
        })
        .await?;
    store
        .wait_until(|s| s.phase != TicketViewPhase::Loading, STEP_TIMEOUT)
        .await?;

    let phase = store.state(|s| s.phase.clone()).await;
    store.shutdown(SHUTDOWN_TIMEOUT).await?;

    match phase {
        TicketViewPhase::Unused { code } => {
            println!("Unused ticket");
            println!("Code: {code}");
        },
        TicketViewPhase::Used { item, used_at } => {
            println!("Used ticket");
            if let Some(item) = item {
                println!("Item:    {}", item.label());
            }
            if let Some(used_at) = used_at {
                println!("Used at: {used_at}");
            }
        },
        TicketViewPhase::Failed { message } => bail!(message),
        TicketViewPhase::Idle | TicketViewPhase::Loading => bail!("Ticket did not load"),
    }
    Ok(())
}

async fn redeem(app: &VoucherApp, token: &str, items: &[&str]) -> anyhow::Result<()> {
    let taps = items
        .iter()
        .map(|code| code.parse::<Item>())
        .collect::<Result<Vec<_>, _>>()?;

    let store = app.redemption();
    store
        .send(RedemptionAction::Load {
            token: Some(token.to_string()),
        })
        .await?;
    store
        .wait_until(|s| s.phase != RedemptionPhase::Loading, STEP_TIMEOUT)
        .await?;

    for item in taps {
        store.send(RedemptionAction::ItemTapped(item)).await?;
        store
            .wait_until(|s| !matches!(s.phase, RedemptionPhase::Submitting(_)), STEP_TIMEOUT)
            .await?;
        let (phase, error) = store.state(|s| (s.phase, s.error.clone())).await;
        info!(item = item.code(), ?phase, "Tap handled");
        if let Some(error) = error {
            println!("Error: {error}");
        }
    }

    let phase = store.state(|s| s.phase).await;
    match phase {
        RedemptionPhase::Succeeded(item) => println!("Redeemed for {}", item.label()),
        RedemptionPhase::LockedUsed => println!("Ticket was already used"),
        RedemptionPhase::MissingToken | RedemptionPhase::LoadFailed => {
            let error = store.state(|s| s.error.clone()).await;
            store.shutdown(SHUTDOWN_TIMEOUT).await?;
            bail!(error.unwrap_or_else(|| "Ticket could not be loaded".to_string()));
        },
        phase => {
            println!("Not redeemed ({phase:?})");
            store.shutdown(SHUTDOWN_TIMEOUT).await?;
            return Ok(());
        },
    }

    let return_delay = app.config().controllers.return_delay;
    store
        .wait_until(|s| s.returned, return_delay + STEP_TIMEOUT)
        .await?;
    store.shutdown(SHUTDOWN_TIMEOUT).await?;
    Ok(())
}
