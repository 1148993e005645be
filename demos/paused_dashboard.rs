//! A dashboard that pauses rendering while the user scrolls.
//!
//! Quotes keep arriving while paused; they are released as one combined set
//! on resume, or after the pause timeout at the latest.

use change_kit::{error::Result, source, ChangeSetAggregator, ChangeSetBuilder, ChangeSetConfig};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Debug)]
struct Quote {
    symbol: String,
    price: f64,
}

fn quote(symbol: &str, price: f64) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        price,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    println!("\n=== Change Kit - Paused Dashboard ===\n");

    // The gate falls back to the configured pause timeout.
    let config = ChangeSetConfig::from_json(r#"{ "pause_timeout": { "secs": 1, "nanos": 0 } }"#)?;

    let (sender, batches) = source::channel::<Quote>();
    let (scrolling, paused) = watch::channel(false);

    let changes = ChangeSetBuilder::new()
        .key_selector(|q: &Quote| q.symbol.clone())
        .with_config(config.clone())
        .observe(batches)?
        .buffer_if(paused, None)?;
    let view = ChangeSetAggregator::spawn(changes);

    sender.send(vec![quote("ACME", 10.0), quote("INIT", 4.2)])?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("1. Live: {} renders", view.message_count());

    println!("2. User starts scrolling...");
    scrolling.send(true).ok();
    for tick in 1..=5 {
        sender.send_one(quote("ACME", 10.0 + tick as f64))?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    println!("   Still {} renders while paused", view.message_count());

    println!("3. User stops scrolling");
    scrolling.send(false).ok();
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!(
        "   {} renders, ACME at {:.2}",
        view.message_count(),
        view.get(&"ACME".to_string()).map(|q| q.price).unwrap_or_default()
    );

    println!("4. User scrolls and never stops; timeout releases after 1s");
    scrolling.send(true).ok();
    sender.send_one(quote("INIT", 5.0))?;
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    println!("   {} renders, totals {}", view.message_count(), view.summary());

    println!("\n=== Example Complete ===\n");
    Ok(())
}
