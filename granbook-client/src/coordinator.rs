//! Serialized subscription worker.
//!
//! Every subscription transition runs on one task. Commands from handles
//! arrive over a bounded queue with a oneshot reply each; connection and
//! resync notices from the network thread arrive over an unbounded queue so
//! the sender never blocks.
//!
//! A fresh subscription is installed as pending before the transport is
//! asked, so feed messages racing the venue's acknowledgement are kept. A
//! replacement only takes effect once the transport accepts it; until then
//! the previous entry keeps serving.
//!
//! A handle's subscribe carries the instant its caller stops waiting. Transport
//! calls are cut short at that instant, and a subscribe that completes too
//! late is rolled back instead of activated.

use crate::builder::SubscribeRequest;
use crate::error::{SubscriptionError, TransportError};
use crate::reconnect::{ReconnectConfig, ResubscribeBackoff};
use crate::transport::FeedTransport;
use granbook_core::{Alias, GranularityMultiplier};
use granbook_marketdata::{
    AliasBooks, FeedHandler, InstrumentInfo, ResyncSink, Subscription, SubscriptionState,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Requests sent by a [`CoordinatorHandle`](crate::CoordinatorHandle).
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe {
        request: SubscribeRequest,
        deadline: Instant,
        reply: oneshot::Sender<Result<(), SubscriptionError>>,
    },
    Unsubscribe {
        alias: Alias,
        reply: oneshot::Sender<Result<(), SubscriptionError>>,
    },
    Shutdown,
}

/// Notices from the network side.
#[derive(Debug)]
pub(crate) enum Internal {
    ConnectionLost,
    ConnectionRestored,
    Resync(Alias),
}

/// Resync sink feeding the worker's notice queue.
pub(crate) struct ResyncSender {
    tx: mpsc::UnboundedSender<Internal>,
}

impl ResyncSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Internal>) -> Self {
        Self { tx }
    }
}

impl ResyncSink for ResyncSender {
    fn request_resync(&self, alias: &Alias) {
        if self.tx.send(Internal::Resync(alias.clone())).is_err() {
            tracing::warn!("coordinator stopped, resync of {} not requested", alias);
        }
    }
}

/// Whether a subscribe is announced downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Announce {
    Yes,
    Silent,
}

struct PendingRetry {
    granularity: GranularityMultiplier,
    backoff: ResubscribeBackoff,
    due: Instant,
}

/// The subscription worker. Drive it with [`run`](Self::run).
pub struct SubscriptionCoordinator<T> {
    transport: Arc<T>,
    handler: Arc<FeedHandler>,
    cmd_rx: mpsc::Receiver<Command>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    transport_timeout: Duration,
    resubscribe: ReconnectConfig,
    recovery_check: Duration,
    retries: HashMap<Alias, PendingRetry>,
}

impl<T: FeedTransport> SubscriptionCoordinator<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        handler: Arc<FeedHandler>,
        cmd_rx: mpsc::Receiver<Command>,
        internal_rx: mpsc::UnboundedReceiver<Internal>,
        transport_timeout: Duration,
        resubscribe: ReconnectConfig,
        recovery_check: Duration,
    ) -> Self {
        Self {
            transport,
            handler,
            cmd_rx,
            internal_rx,
            transport_timeout,
            resubscribe,
            recovery_check: recovery_check.max(Duration::from_millis(1)),
            retries: HashMap::new(),
        }
    }

    /// Processes commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("subscription coordinator started");
        let mut recovery_tick = tokio::time::interval(self.recovery_check);

        loop {
            let next_retry = self.retries.values().map(|r| r.due).min();

            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.on_command(cmd).await,
                    }
                }

                Some(notice) = self.internal_rx.recv() => {
                    self.on_internal(notice).await;
                }

                _ = recovery_tick.tick() => {
                    self.handler.retry_expired_resyncs();
                }

                _ = sleep_until_opt(next_retry), if next_retry.is_some() => {
                    self.run_due_retries().await;
                }
            }
        }

        tracing::info!("subscription coordinator stopped");
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Subscribe {
                request,
                deadline,
                reply,
            } => {
                let result = self.subscribe(&request, Announce::Yes, Some(deadline)).await;
                let _ = reply.send(result);
            }
            Command::Unsubscribe { alias, reply } => {
                let result = self.unsubscribe(&alias).await;
                let _ = reply.send(result);
            }
            Command::Shutdown => {}
        }
    }

    async fn on_internal(&mut self, notice: Internal) {
        match notice {
            Internal::ConnectionLost => {
                tracing::warn!("feed connection lost");
                self.retries.clear();
                self.handler.listener().on_connection_lost();
            }
            Internal::ConnectionRestored => self.resubscribe_all().await,
            Internal::Resync(alias) => {
                if self.handler.subscriptions().state(&alias).is_none() {
                    return;
                }
                let result = self
                    .with_timeout(&alias, self.transport.request_snapshot(&alias))
                    .await;
                if let Err(err) = result {
                    tracing::warn!("snapshot request for {} failed: {}", alias, err);
                }
            }
        }
    }

    async fn subscribe(
        &mut self,
        request: &SubscribeRequest,
        announce: Announce,
        deadline: Option<Instant>,
    ) -> Result<(), SubscriptionError> {
        let alias = request.alias();
        let listener = Arc::clone(self.handler.listener());

        if expired(deadline) {
            tracing::warn!("subscribe to {} expired while queued", alias);
            return Err(SubscriptionError::Timeout { alias });
        }

        let instrument = match self.handler.instruments().resolve(&alias) {
            Ok(instrument) => Arc::clone(instrument),
            Err(miss) => {
                tracing::info!("subscribe to {} refused: {:?}", alias, miss);
                listener.on_instrument_not_found(
                    &request.symbol,
                    &request.exchange,
                    &request.instrument_type,
                );
                return Err(SubscriptionError::InstrumentNotFound { alias });
            }
        };

        let granularity = request
            .granularity
            .unwrap_or_else(|| instrument.default_granularity());
        if !instrument.has_usable_tick() || !instrument.has_usable_lot() || !granularity.is_usable()
        {
            tracing::warn!(
                "no usable granularity for {} (tick {}, lot {:?}, display tick {})",
                alias,
                instrument.tick_size,
                instrument.kind.min_size(),
                granularity.display_tick
            );
            return Err(SubscriptionError::GranularityUnavailable { alias });
        }

        let existing = self.handler.subscriptions().get(&alias);
        if existing.is_some() && !request.allow_replace {
            tracing::info!("already subscribed to {}", alias);
            listener.on_instrument_already_subscribed(
                &request.symbol,
                &request.exchange,
                &request.instrument_type,
            );
            return Err(SubscriptionError::AlreadySubscribed { alias });
        }
        self.retries.remove(&alias);

        match existing {
            None => {
                let books = Arc::new(AliasBooks::new(alias.clone(), instrument, granularity));
                self.handler
                    .subscriptions()
                    .install(Arc::clone(&books), SubscriptionState::Pending);

                let mut opened = self.open_channels(&alias, true, deadline).await;
                let late = opened.is_ok() && expired(deadline);
                if late {
                    opened = Err(SubscriptionError::Timeout {
                        alias: alias.clone(),
                    });
                }
                if let Err(err) = opened {
                    self.handler.subscriptions().remove(&alias);
                    books.retire();
                    self.handler.forget(&alias);
                    tracing::warn!("failed to subscribe to {}: {}", alias, err);
                    if late {
                        self.close_channels(&alias).await;
                    }
                    if announce == Announce::Yes {
                        listener.on_instrument_not_found(
                            &request.symbol,
                            &request.exchange,
                            &request.instrument_type,
                        );
                    }
                    return Err(err);
                }

                self.handler.subscriptions().activate(&alias);
                tracing::info!("now subscribed to {}", alias);
                if announce == Announce::Yes {
                    listener.on_instrument_added(&alias, &instrument_info(&books));
                }
            }
            Some(previous) => {
                let opened = match self.open_channels(&alias, false, deadline).await {
                    Ok(()) if expired(deadline) => Err(SubscriptionError::Timeout {
                        alias: alias.clone(),
                    }),
                    other => other,
                };
                if let Err(err) = opened {
                    tracing::warn!(
                        "failed to resubscribe to {}, keeping previous granularity: {}",
                        alias,
                        err
                    );
                    return Err(err);
                }

                let books = self.replace(previous, granularity);
                tracing::info!("resubscribed to {}", alias);
                match announce {
                    Announce::Yes => {
                        listener.on_instrument_added(&alias, &instrument_info(&books));
                    }
                    Announce::Silent => {
                        if let Some(extension) = self.handler.extension() {
                            extension.on_resubscribed(&alias);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn replace(&self, previous: Subscription, granularity: GranularityMultiplier) -> Arc<AliasBooks> {
        if previous.books.granularity() == granularity {
            return previous.books;
        }
        self.handler.regranulate(&previous.books, granularity)
    }

    async fn unsubscribe(&mut self, alias: &Alias) -> Result<(), SubscriptionError> {
        let Some(removed) = self.handler.subscriptions().remove(alias) else {
            return Err(SubscriptionError::NotSubscribed {
                alias: alias.clone(),
            });
        };
        removed.books.retire();
        self.handler.forget(alias);
        self.retries.remove(alias);
        self.close_channels(alias).await;

        tracing::info!("unsubscribed from {}", alias);
        self.handler.listener().on_instrument_removed(alias);
        Ok(())
    }

    async fn resubscribe_all(&mut self) {
        tracing::info!("feed connection restored, resubscribing");
        if let Some(extension) = self.handler.extension() {
            extension.on_reconnect();
        }

        for (alias, granularity) in self.handler.subscriptions().active() {
            if let Err(err) = self.resubscribe(&alias, granularity).await {
                let backoff = ResubscribeBackoff::new(self.resubscribe.clone());
                self.schedule_retry(alias, granularity, backoff, &err);
            }
        }

        self.handler.listener().on_connection_restored();
    }

    async fn run_due_retries(&mut self) {
        let now = Instant::now();
        let due: Vec<Alias> = self
            .retries
            .iter()
            .filter(|(_, r)| r.due <= now)
            .map(|(alias, _)| alias.clone())
            .collect();

        for alias in due {
            let Some(retry) = self.retries.remove(&alias) else {
                continue;
            };
            if let Err(err) = self.resubscribe(&alias, retry.granularity).await {
                self.schedule_retry(alias, retry.granularity, retry.backoff, &err);
            }
        }
    }

    async fn resubscribe(
        &mut self,
        alias: &Alias,
        granularity: GranularityMultiplier,
    ) -> Result<(), SubscriptionError> {
        let Some(instrument) = self.handler.instruments().get(alias).cloned() else {
            return Err(SubscriptionError::InstrumentNotFound {
                alias: alias.clone(),
            });
        };
        let request = SubscribeRequest {
            symbol: instrument.symbol.clone(),
            exchange: instrument.exchange.clone(),
            instrument_type: instrument.instrument_type.clone(),
            granularity: Some(granularity),
            allow_replace: true,
        };
        self.subscribe(&request, Announce::Silent, None).await
    }

    fn schedule_retry(
        &mut self,
        alias: Alias,
        granularity: GranularityMultiplier,
        mut backoff: ResubscribeBackoff,
        err: &SubscriptionError,
    ) {
        match backoff.on_failure() {
            Some(delay) => {
                tracing::warn!(
                    "resubscribe to {} failed ({}), retrying in {:?}",
                    alias,
                    err,
                    delay
                );
                self.retries.insert(
                    alias,
                    PendingRetry {
                        granularity,
                        backoff,
                        due: Instant::now() + delay,
                    },
                );
            }
            None => {
                tracing::error!(
                    "resubscribe to {} failed after {} attempts, dropping subscription",
                    alias,
                    backoff.attempts()
                );
                if let Some(removed) = self.handler.subscriptions().remove(&alias) {
                    removed.books.retire();
                    self.handler.forget(&alias);
                    self.handler.listener().on_instrument_removed(&alias);
                }
            }
        }
    }

    async fn open_channels(
        &self,
        alias: &Alias,
        fresh: bool,
        deadline: Option<Instant>,
    ) -> Result<(), SubscriptionError> {
        self.with_deadline(alias, self.transport.subscribe_depth(alias), deadline)
            .await?;
        if let Err(err) = self
            .with_deadline(alias, self.transport.subscribe_trades(alias), deadline)
            .await
        {
            if fresh {
                let _ = self
                    .with_timeout(alias, self.transport.unsubscribe_depth(alias))
                    .await;
            }
            return Err(err);
        }
        Ok(())
    }

    async fn close_channels(&self, alias: &Alias) {
        let depth = self
            .with_timeout(alias, self.transport.unsubscribe_depth(alias))
            .await;
        let trades = self
            .with_timeout(alias, self.transport.unsubscribe_trades(alias))
            .await;
        if let Err(err) = depth.and(trades) {
            tracing::warn!("unsubscribe from {} not confirmed: {}", alias, err);
        }
    }

    async fn with_timeout(
        &self,
        alias: &Alias,
        call: impl Future<Output = Result<(), TransportError>>,
    ) -> Result<(), SubscriptionError> {
        self.with_deadline(alias, call, None).await
    }

    async fn with_deadline(
        &self,
        alias: &Alias,
        call: impl Future<Output = Result<(), TransportError>>,
        deadline: Option<Instant>,
    ) -> Result<(), SubscriptionError> {
        let limit = deadline.map_or(self.transport_timeout, |deadline| {
            self.transport_timeout
                .min(deadline.saturating_duration_since(Instant::now()))
        });
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(SubscriptionError::Rejected {
                alias: alias.clone(),
                source,
            }),
            Err(_) => Err(SubscriptionError::Timeout {
                alias: alias.clone(),
            }),
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn instrument_info(books: &AliasBooks) -> InstrumentInfo {
    let instrument = books.instrument();
    let granularity = books.granularity();
    InstrumentInfo {
        symbol: instrument.symbol.clone(),
        exchange: instrument.exchange.clone(),
        instrument_type: instrument.instrument_type.clone(),
        display_tick: granularity.display_tick,
        size_multiplier: granularity.size_multiplier,
        alias: books.alias().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CoordinatorBuilder, CoordinatorHandle};
    use granbook_marketdata::{
        ChannelListener, DepthAction, InstrumentGeneric, InstrumentTable, MarketDataEvent,
        RawLevel, TradingExtension,
    };
    use granbook_core::TradeSide;
    use crossbeam_channel::Receiver;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockTransport {
        reject: Mutex<HashSet<Alias>>,
        stall: AtomicBool,
        latency: Mutex<Duration>,
        calls: Mutex<Vec<(&'static str, Alias)>>,
    }

    impl MockTransport {
        async fn call(&self, op: &'static str, alias: &Alias) -> Result<(), TransportError> {
            self.calls.lock().push((op, alias.clone()));
            if self.stall.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let latency = *self.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let rejected = op.starts_with("subscribe") && self.reject.lock().contains(alias);
            if rejected {
                return Err(TransportError::Rejected("unknown channel".to_string()));
            }
            Ok(())
        }

        fn count(&self, op: &str) -> usize {
            self.calls.lock().iter().filter(|(o, _)| *o == op).count()
        }
    }

    impl FeedTransport for MockTransport {
        async fn subscribe_depth(&self, alias: &Alias) -> Result<(), TransportError> {
            self.call("subscribe_depth", alias).await
        }

        async fn subscribe_trades(&self, alias: &Alias) -> Result<(), TransportError> {
            self.call("subscribe_trades", alias).await
        }

        async fn unsubscribe_depth(&self, alias: &Alias) -> Result<(), TransportError> {
            self.call("unsubscribe_depth", alias).await
        }

        async fn unsubscribe_trades(&self, alias: &Alias) -> Result<(), TransportError> {
            self.call("unsubscribe_trades", alias).await
        }

        async fn request_snapshot(&self, alias: &Alias) -> Result<(), TransportError> {
            self.call("request_snapshot", alias).await
        }
    }

    #[derive(Default)]
    struct CountingExtension {
        reconnects: AtomicUsize,
        resubscribed: AtomicUsize,
        prints: AtomicUsize,
    }

    impl TradingExtension for CountingExtension {
        fn on_trade_print(&self, _alias: &Alias, _side: TradeSide, _raw_price: f64) {
            self.prints.fetch_add(1, Ordering::SeqCst);
        }

        fn on_reconnect(&self) {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn on_resubscribed(&self, _alias: &Alias) {
            self.resubscribed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        transport: Arc<MockTransport>,
        handle: CoordinatorHandle,
        handler: Arc<FeedHandler>,
        events: Receiver<MarketDataEvent>,
        extension: Arc<CountingExtension>,
    }

    fn instruments() -> Arc<InstrumentTable> {
        Arc::new(
            [
                InstrumentGeneric::contract("futures", "BTC-USD-190628", "OKEX", 0.01),
                InstrumentGeneric::spot("BTC-USDT", "OKEX", 0.1, 0.001),
                InstrumentGeneric::spot("DUST-USDT", "OKEX", 0.1, 0.0),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn start(configure: impl FnOnce(CoordinatorBuilder<MockTransport>) -> CoordinatorBuilder<MockTransport>) -> Harness {
        let transport = Arc::new(MockTransport::default());
        let (listener, events) = ChannelListener::unbounded();
        let extension = Arc::new(CountingExtension::default());

        let builder = CoordinatorBuilder::new(Arc::clone(&transport), instruments())
            .listener(Arc::new(listener))
            .trading_extension(Arc::clone(&extension) as Arc<dyn TradingExtension>)
            .transport_timeout(Duration::from_millis(100));
        let (coordinator, handle, handler) = configure(builder).build();
        tokio::spawn(coordinator.run());

        Harness {
            transport,
            handle,
            handler,
            events,
            extension,
        }
    }

    fn futures_request() -> SubscribeRequest {
        SubscribeRequest::new("futures", "BTC-USD-190628", "OKEX")
    }

    async fn next_event(events: &Receiver<MarketDataEvent>) -> MarketDataEvent {
        for _ in 0..200 {
            if let Ok(event) = events.try_recv() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no event received");
    }

    fn is_added(event: &MarketDataEvent) -> bool {
        matches!(event, MarketDataEvent::InstrumentAdded(_))
    }

    fn depth(events: &Receiver<MarketDataEvent>) -> Vec<(bool, i64, i64)> {
        events
            .try_iter()
            .filter_map(|e| match e {
                MarketDataEvent::Depth {
                    is_bid, price, size, ..
                } => Some((is_bid, price, size)),
                _ => None,
            })
            .collect()
    }

    async fn wait_for(transport: &MockTransport, op: &str, count: usize) {
        for _ in 0..200 {
            if transport.count(op) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{op} was not called {count} times");
    }

    #[tokio::test]
    async fn test_subscribe_announces_once() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();

        assert_eq!(h.handle.state(&alias), Some(SubscriptionState::Active));
        assert_eq!(h.transport.count("subscribe_depth"), 1);
        assert_eq!(h.transport.count("subscribe_trades"), 1);

        match h.events.try_recv().unwrap() {
            MarketDataEvent::InstrumentAdded(info) => {
                assert_eq!(info.alias, alias);
                assert_eq!(info.display_tick, 0.01);
                assert_eq!(info.size_multiplier, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_instrument() {
        let h = start(|b| b);
        let err = h
            .handle
            .subscribe(SubscribeRequest::new("swap", "BTC-USD-SWAP", "OKEX"))
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::InstrumentNotFound { .. }));
        assert!(matches!(
            h.events.try_recv().unwrap(),
            MarketDataEvent::InstrumentNotFound { .. }
        ));
        assert_eq!(h.transport.count("subscribe_depth"), 0);
    }

    #[tokio::test]
    async fn test_already_subscribed() {
        let h = start(|b| b);
        h.handle.subscribe(futures_request()).await.unwrap();
        let _ = h.events.try_iter().count();

        let err = h.handle.subscribe(futures_request()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadySubscribed { .. }));
        assert!(matches!(
            h.events.try_recv().unwrap(),
            MarketDataEvent::InstrumentAlreadySubscribed { .. }
        ));
        assert_eq!(h.transport.count("subscribe_depth"), 1);
    }

    #[tokio::test]
    async fn test_unusable_granularity() {
        let h = start(|b| b);
        let err = h
            .handle
            .subscribe(futures_request().granularity(GranularityMultiplier::new(0.0)))
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::GranularityUnavailable { .. }));
        assert_eq!(h.transport.count("subscribe_depth"), 0);
    }

    #[tokio::test]
    async fn test_spot_without_lot_size_is_refused() {
        let h = start(|b| b);
        let err = h
            .handle
            .subscribe(SubscribeRequest::new("spot", "DUST-USDT", "OKEX"))
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::GranularityUnavailable { .. }));
        assert_eq!(h.transport.count("subscribe_depth"), 0);
        assert!(h.handle.active().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_subscribe_rolls_back() {
        let h = start(|b| b);
        let alias = futures_request().alias();
        h.transport.reject.lock().insert(alias.clone());

        let err = h.handle.subscribe(futures_request()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Rejected { .. }));
        assert_eq!(h.handle.state(&alias), None);
        assert!(matches!(
            h.events.try_recv().unwrap(),
            MarketDataEvent::InstrumentNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_replace_changes_granularity_and_rolls_back_on_rejection() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();

        h.handle
            .subscribe(
                futures_request()
                    .granularity(GranularityMultiplier::new(1.0))
                    .allow_replace(true),
            )
            .await
            .unwrap();
        assert_eq!(h.handle.active()[0].1.display_tick, 1.0);

        h.transport.reject.lock().insert(alias.clone());
        let err = h
            .handle
            .subscribe(
                futures_request()
                    .granularity(GranularityMultiplier::new(5.0))
                    .allow_replace(true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::Rejected { .. }));
        assert_eq!(h.handle.active()[0].1.display_tick, 1.0);
        assert_eq!(h.handle.state(&alias), Some(SubscriptionState::Active));
    }

    #[tokio::test]
    async fn test_replace_rebuilds_books_at_new_granularity() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();
        h.handler.on_depth(
            &alias,
            DepthAction::Partial,
            &[RawLevel::new(100.05, 3.0)],
            &[],
        );
        assert!(is_added(&h.events.try_recv().unwrap()));
        assert_eq!(depth(&h.events), vec![(false, 10005, 3)]);

        h.handle
            .subscribe(
                futures_request()
                    .granularity(GranularityMultiplier::new(1.0))
                    .allow_replace(true),
            )
            .await
            .unwrap();

        assert_eq!(
            h.events.try_recv().unwrap(),
            MarketDataEvent::Depth {
                alias: alias.clone(),
                is_bid: false,
                price: 10005,
                size: 0,
            }
        );
        match h.events.try_recv().unwrap() {
            MarketDataEvent::InstrumentAdded(info) => assert_eq!(info.display_tick, 1.0),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(h.handler.top_of_book(&alias).unwrap().ask.is_none());
        wait_for(&h.transport, "request_snapshot", 1).await;
        assert!(h.handler.is_recovering(&alias));

        h.handler.on_depth(
            &alias,
            DepthAction::Update,
            &[RawLevel::new(100.2, 1.0)],
            &[],
        );
        assert!(depth(&h.events).is_empty());

        h.handler.on_depth(
            &alias,
            DepthAction::Partial,
            &[RawLevel::new(100.05, 3.0)],
            &[],
        );
        let top = h.handler.top_of_book(&alias).unwrap();
        assert_eq!(top.ask.map(|q| q.ticks), Some(101));
        assert_eq!(top.ask.map(|q| q.price), Some(101.0));
        assert_eq!(depth(&h.events), vec![(false, 101, 3)]);

        h.handler.on_depth(
            &alias,
            DepthAction::Update,
            &[RawLevel::new(100.05, 0.0)],
            &[],
        );
        assert_eq!(depth(&h.events), vec![(false, 101, 0)]);
        assert!(h.handler.top_of_book(&alias).unwrap().ask.is_none());
    }

    #[tokio::test]
    async fn test_late_subscribe_is_rolled_back() {
        let h = start(|b| {
            b.transport_timeout(Duration::from_millis(400))
                .request_timeout(Duration::from_millis(1200))
        });
        *h.transport.latency.lock() = Duration::from_millis(350);

        let spot = SubscribeRequest::new("spot", "BTC-USDT", "OKEX");
        let (first, second) = tokio::join!(
            h.handle.subscribe(spot),
            h.handle.subscribe(futures_request())
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(SubscriptionError::Timeout { .. })));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let alias = futures_request().alias();
        assert_eq!(h.handle.state(&alias), None);
        assert!(h.transport.count("unsubscribe_depth") >= 1);
        assert_eq!(h.events.try_iter().filter(is_added).count(), 1);
        assert_eq!(h.handle.active().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes_silently() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();
        assert!(is_added(&h.events.try_recv().unwrap()));

        h.handle.on_connection_lost();
        assert_eq!(next_event(&h.events).await, MarketDataEvent::ConnectionLost);

        h.handle.on_connection_restored();
        assert_eq!(
            next_event(&h.events).await,
            MarketDataEvent::ConnectionRestored
        );

        assert_eq!(h.transport.count("subscribe_depth"), 2);
        assert_eq!(h.extension.reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(h.extension.resubscribed.load(Ordering::SeqCst), 1);
        assert_eq!(h.handle.state(&alias), Some(SubscriptionState::Active));
        assert!(h.events.try_iter().all(|e| !is_added(&e)));
    }

    #[tokio::test]
    async fn test_reconnect_keeps_books() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();
        h.handler.on_depth(
            &alias,
            DepthAction::Partial,
            &[RawLevel::new(100.05, 3.0)],
            &[],
        );

        h.handle.on_connection_lost();
        h.handle.on_connection_restored();
        loop {
            if next_event(&h.events).await == MarketDataEvent::ConnectionRestored {
                break;
            }
        }

        let top = h.handler.top_of_book(&alias).unwrap();
        assert_eq!(top.ask.map(|q| q.ticks), Some(10005));
    }

    #[tokio::test]
    async fn test_exhausted_resubscribe_drops_subscription() {
        let h = start(|b| {
            b.resubscribe(ReconnectConfig {
                enabled: true,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                backoff_multiplier: 1.0,
                max_attempts: 2,
            })
        });
        let alias = h.handle.subscribe(futures_request()).await.unwrap();
        let _ = h.events.try_iter().count();

        h.transport.reject.lock().insert(alias.clone());
        h.handle.on_connection_restored();

        assert_eq!(
            next_event(&h.events).await,
            MarketDataEvent::ConnectionRestored
        );
        assert_eq!(
            next_event(&h.events).await,
            MarketDataEvent::InstrumentRemoved(alias.clone())
        );
        assert_eq!(h.handle.state(&alias), None);
        assert_eq!(h.transport.count("subscribe_depth"), 3);
    }

    #[tokio::test]
    async fn test_transport_timeout() {
        let h = start(|b| b);
        h.transport.stall.store(true, Ordering::SeqCst);

        let err = h.handle.subscribe(futures_request()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Timeout { .. }));
        assert_eq!(h.handle.state(&futures_request().alias()), None);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();
        let _ = h.events.try_iter().count();

        h.handle.unsubscribe(&alias).await.unwrap();
        assert_eq!(h.handle.state(&alias), None);
        assert_eq!(
            h.events.try_recv().unwrap(),
            MarketDataEvent::InstrumentRemoved(alias.clone())
        );
        assert_eq!(h.transport.count("unsubscribe_depth"), 1);
        assert_eq!(h.transport.count("unsubscribe_trades"), 1);

        let err = h.handle.unsubscribe(&alias).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NotSubscribed { .. }));
    }

    #[tokio::test]
    async fn test_forced_resync_requests_snapshot() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();

        h.handler.force_resync(&alias);
        for _ in 0..200 {
            if h.transport.count("request_snapshot") > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.transport.count("request_snapshot"), 1);
        assert!(h.handler.is_recovering(&alias));
    }

    #[tokio::test]
    async fn test_trade_reaches_extension() {
        let h = start(|b| b);
        let alias = h.handle.subscribe(futures_request()).await.unwrap();
        h.handler.on_trade(&alias, 100.0, 2.0, TradeSide::Buy);
        assert_eq!(h.extension.prints.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let h = start(|b| b);
        h.handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = h.handle.subscribe(futures_request()).await.unwrap_err();
        assert_eq!(err, SubscriptionError::WorkerStopped);
    }
}
