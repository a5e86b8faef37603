//! Voucher Demo
//!
//! Walks one ticket through its whole life against the in-memory ledger:
//! - Issuance for a phone number, then an idempotent re-issue
//! - Double-confirm redemption for the carousel
//! - A second redemption attempt for the bumper car, rejected
//! - The ticket view rendering the redemption record
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin demo
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voucher::issuance::{IssuanceAction, IssuanceReducer, IssuanceState};
use voucher::ledger::LedgerClient;
use voucher::mocks::TestEnvironment;
use voucher::redemption::{RedemptionAction, RedemptionPhase, RedemptionReducer, RedemptionState};
use voucher::ticket_view::{TicketViewAction, TicketViewPhase, TicketViewReducer, TicketViewState};
use voucher::{Item, Phone};
use voucher_core::environment::SystemClock;
use voucher_runtime::Store;

const STEP: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,voucher=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n🎟️  ============================================");
    println!("   Voucher Tickets - Live Demo");
    println!("============================================\n");

    let mut test = TestEnvironment::new(Arc::new(SystemClock));
    test.env.settings.return_delay = Duration::from_millis(500);
    let env = test.env.clone();

    // ========== Issuance ==========

    println!("1️⃣  Requesting a ticket for 0987654321...");

    let issuance = Store::new(IssuanceState::default(), IssuanceReducer::new(), env.clone());
    issuance
        .send_and_wait_for(
            IssuanceAction::Load,
            |a| matches!(a, IssuanceAction::BindingLoaded { .. }),
            STEP,
        )
        .await?;
    issuance
        .send(IssuanceAction::PhoneChanged("0987654321".to_string()))
        .await?;
    issuance.send(IssuanceAction::Submit).await?;
    issuance.wait_until(|s| !s.is_busy(), STEP).await?;

    let Some(token) = issuance.state(|s| s.bound_token().cloned()).await else {
        return Err("issuance did not bind a ticket".into());
    };
    println!("   ✓ Ticket issued: {token}");
    println!("   ✓ Scannable code: {}", env.scan_code(&token));

    let phone = Phone::parse("0987654321")?;
    let again = test.backing.issue_ticket(&phone).await?;
    println!("   ✓ Re-issuing for the same phone returns {again}\n");
    issuance.shutdown(STEP).await?;

    // ========== Redemption ==========

    println!("2️⃣  Staff redeem the ticket for the carousel...");

    let redemption = Store::new(RedemptionState::default(), RedemptionReducer::new(), env.clone());
    redemption
        .send(RedemptionAction::Load {
            token: Some(token.to_string()),
        })
        .await?;
    redemption
        .wait_until(|s| s.phase != RedemptionPhase::Loading, STEP)
        .await?;

    redemption.send(RedemptionAction::ItemTapped(Item::Carousel)).await?;
    println!("   • First tap arms {}", Item::Carousel.label());
    redemption.send(RedemptionAction::ItemTapped(Item::Carousel)).await?;
    println!("   • Second tap confirms");
    redemption
        .wait_until(|s| s.phase.is_finished(), STEP)
        .await?;

    let snapshot = redemption.state(|s| s.snapshot.clone()).await;
    if let Some(snapshot) = snapshot {
        println!(
            "   ✓ Ticket {} is {:?}, item {:?}",
            snapshot.token, snapshot.status, snapshot.item
        );
    }

    redemption.wait_until(|s| s.returned, STEP).await?;
    println!("   ✓ Returned to the ticket view\n");
    redemption.shutdown(STEP).await?;

    // ========== Second attempt ==========

    println!("3️⃣  Trying to redeem the same ticket for the bumper car...");

    match test.ledger.redeem_ticket(&token, Item::BumperCar).await {
        Ok(_) => println!("   ✗ Ledger accepted a second redemption"),
        Err(e) => println!("   ✓ Ledger refused: {}", e.user_message()),
    }

    let second = Store::new(RedemptionState::default(), RedemptionReducer::new(), env.clone());
    second
        .send(RedemptionAction::Load {
            token: Some(token.to_string()),
        })
        .await?;
    second
        .wait_until(|s| s.phase != RedemptionPhase::Loading, STEP)
        .await?;
    let phase = second.state(|s| s.phase).await;
    println!("   ✓ A fresh redemption page opens as {phase:?}, item buttons disabled\n");
    second.send(RedemptionAction::Teardown).await?;
    second.shutdown(STEP).await?;

    // ========== Ticket view ==========

    println!("4️⃣  Opening the ticket view...");

    let view = Store::new(TicketViewState::default(), TicketViewReducer::new(), env);
    view.send(TicketViewAction::Activate {
        token: token.to_string(),
    })
    .await?;
    view.wait_until(|s| s.phase != TicketViewPhase::Loading, STEP)
        .await?;

    match view.state(|s| s.phase.clone()).await {
        TicketViewPhase::Used { item, used_at } => {
            println!("   ✓ Used for {item:?} at {used_at:?}");
            println!("   ✓ No scannable code shown");
        },
        phase => println!("   ✗ Unexpected view: {phase:?}"),
    }
    view.shutdown(STEP).await?;

    println!("\n📊 Ledger calls");
    println!("   issue:  {}", test.ledger.issue_calls());
    println!("   get:    {}", test.ledger.get_calls());
    println!("   redeem: {}", test.ledger.redeem_calls());
    println!("   navigation: {:?}", test.navigator.routes());

    println!("\n============================================");
    println!("   Demo complete");
    println!("============================================\n");

    Ok(())
}
