//! Replays a short scripted feed through the subscription engine.
//!
//! Run with: `RUST_LOG=info cargo run --example replay`

use granbook::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Transport that accepts every request.
struct ReplayTransport;

impl FeedTransport for ReplayTransport {
    async fn subscribe_depth(&self, alias: &Alias) -> Result<(), TransportError> {
        tracing::info!("[venue] depth subscribed: {}", alias);
        Ok(())
    }

    async fn subscribe_trades(&self, alias: &Alias) -> Result<(), TransportError> {
        tracing::info!("[venue] trades subscribed: {}", alias);
        Ok(())
    }

    async fn unsubscribe_depth(&self, alias: &Alias) -> Result<(), TransportError> {
        tracing::info!("[venue] depth unsubscribed: {}", alias);
        Ok(())
    }

    async fn unsubscribe_trades(&self, alias: &Alias) -> Result<(), TransportError> {
        tracing::info!("[venue] trades unsubscribed: {}", alias);
        Ok(())
    }

    async fn request_snapshot(&self, alias: &Alias) -> Result<(), TransportError> {
        tracing::info!("[venue] snapshot requested: {}", alias);
        Ok(())
    }
}

fn print_top(feed: &FeedHandler, alias: &Alias, granularity: GranularityMultiplier) {
    let Some(top) = feed.top_of_book(alias) else {
        println!("{alias}: not subscribed");
        return;
    };
    let render = |quote: Option<granbook::marketdata::Quote>| match quote {
        Some(q) => format!("{} x {}", granularity.format_price(q.ticks), q.size),
        None => "-".to_string(),
    };
    println!(
        "{alias}: bid {} / ask {} (spread {:?} ticks)",
        render(top.bid),
        render(top.ask),
        top.spread_ticks()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let instruments: InstrumentTable = [
        InstrumentGeneric::contract("futures", "BTC-USD-190628", "OKEX", 0.01),
        InstrumentGeneric::spot("BTC-USDT", "OKEX", 0.1, 0.001),
    ]
    .into_iter()
    .collect();

    let (listener, events) = ChannelListener::unbounded();
    let (coordinator, handle, feed) =
        CoordinatorBuilder::new(Arc::new(ReplayTransport), Arc::new(instruments))
            .listener(Arc::new(listener))
            .transport_timeout(Duration::from_secs(1))
            .build();
    let worker = tokio::spawn(coordinator.run());

    let coarse = GranularityMultiplier::new(1.0);
    let futures = handle
        .subscribe(SubscribeRequest::new("futures", "BTC-USD-190628", "OKEX").granularity(coarse))
        .await?;
    let spot = handle
        .subscribe(SubscribeRequest::new("spot", "BTC-USDT", "OKEX"))
        .await?;

    if let Err(err) = handle
        .subscribe(SubscribeRequest::new("swap", "BTC-USD-SWAP", "OKEX"))
        .await
    {
        println!("expected failure: {err}");
    }

    feed.on_depth(
        &futures,
        DepthAction::Partial,
        &[RawLevel::new(3_890.37, 12.0), RawLevel::new(3_890.80, 4.0)],
        &[RawLevel::new(3_889.92, 7.0), RawLevel::new(3_889.10, 3.0)],
    );
    feed.on_depth(
        &futures,
        DepthAction::Update,
        &[RawLevel::new(3_890.37, 0.0)],
        &[RawLevel::new(3_889.95, 5.0)],
    );
    feed.on_trade(&futures, 3_890.40, 2.0, TradeSide::Buy);
    print_top(&feed, &futures, coarse);

    let spot_tick = GranularityMultiplier::new(0.1);
    feed.on_depth(
        &spot,
        DepthAction::Partial,
        &[RawLevel::new(3_895.2, 0.015)],
        &[RawLevel::new(3_895.1, 0.004), RawLevel::new(3_895.0, 1.25)],
    );
    print_top(&feed, &spot, spot_tick);

    handle.on_connection_lost();
    handle.on_connection_restored();
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.unsubscribe(&spot).await?;
    handle.shutdown().await;
    worker.await?;

    for event in events.try_iter() {
        println!("{event:?}");
    }
    Ok(())
}
