//! Coordinator builder and handle.

use crate::coordinator::{Command, Internal, ResyncSender, SubscriptionCoordinator};
use crate::error::SubscriptionError;
use crate::reconnect::ReconnectConfig;
use crate::transport::FeedTransport;
use granbook_core::{Alias, GranularityMultiplier};
use granbook_marketdata::{
    FeedHandler, InstrumentTable, ListenerSet, MarketDataListener, SubscriptionState,
    SubscriptionTable, TradingExtension,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Builder for configuring and creating a subscription coordinator.
pub struct CoordinatorBuilder<T> {
    transport: Arc<T>,
    instruments: Arc<InstrumentTable>,
    listeners: ListenerSet,
    extension: Option<Arc<dyn TradingExtension>>,
    request_timeout: Duration,
    transport_timeout: Duration,
    command_capacity: usize,
    resubscribe: ReconnectConfig,
    recovery_timeout: Duration,
}

impl<T: FeedTransport> CoordinatorBuilder<T> {
    /// Creates a builder over a transport and a populated instrument table.
    #[must_use]
    pub fn new(transport: Arc<T>, instruments: Arc<InstrumentTable>) -> Self {
        Self {
            transport,
            instruments,
            listeners: ListenerSet::new(),
            extension: None,
            request_timeout: Duration::from_secs(10),
            transport_timeout: Duration::from_secs(5),
            command_capacity: 256,
            resubscribe: ReconnectConfig::default(),
            recovery_timeout: Duration::from_secs(5),
        }
    }

    /// Registers a downstream listener. May be called more than once.
    #[must_use]
    pub fn listener(self, listener: Arc<dyn MarketDataListener>) -> Self {
        self.listeners.add(listener);
        self
    }

    /// Attaches a trading extension.
    #[must_use]
    pub fn trading_extension(mut self, extension: Arc<dyn TradingExtension>) -> Self {
        self.extension = Some(extension);
        self
    }

    /// Sets how long a handle call waits for the worker's answer.
    ///
    /// Raised at build time to cover a subscribe's worst case of three
    /// transport calls.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how long the worker waits for each transport call.
    #[must_use]
    pub fn transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    /// Sets the command queue capacity.
    #[must_use]
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    /// Sets the retry policy for resubscribing after a reconnect.
    #[must_use]
    pub fn resubscribe(mut self, config: ReconnectConfig) -> Self {
        self.resubscribe = config;
        self
    }

    /// Sets how long a forced resync may wait for its full refresh.
    #[must_use]
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Builds the worker, its handle and the feed handler the transport
    /// should deliver messages to.
    #[must_use]
    pub fn build(self) -> (SubscriptionCoordinator<T>, CoordinatorHandle, Arc<FeedHandler>) {
        let request_timeout = self.effective_request_timeout();
        let (cmd_tx, cmd_rx) = mpsc::channel(self.command_capacity);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let mut handler = FeedHandler::new(
            self.instruments,
            Arc::new(self.listeners),
            Arc::new(ResyncSender::new(internal_tx.clone())),
            self.recovery_timeout,
        );
        if let Some(extension) = self.extension {
            handler = handler.with_extension(extension);
        }
        let handler = Arc::new(handler);

        let handle = CoordinatorHandle {
            cmd_tx,
            internal_tx,
            subscriptions: Arc::clone(handler.subscriptions()),
            request_timeout,
        };

        let coordinator = SubscriptionCoordinator::new(
            self.transport,
            Arc::clone(&handler),
            cmd_rx,
            internal_rx,
            self.transport_timeout,
            self.resubscribe,
            self.recovery_timeout / 2,
        );

        (coordinator, handle, handler)
    }

    fn effective_request_timeout(&self) -> Duration {
        let floor = self.transport_timeout.saturating_mul(3);
        if self.request_timeout < floor {
            tracing::warn!(
                "request timeout {:?} below three transport timeouts, using {:?}",
                self.request_timeout,
                floor
            );
            return floor;
        }
        self.request_timeout
    }
}

/// Subscribe request for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeRequest {
    /// Venue symbol.
    pub symbol: String,
    /// Exchange name.
    pub exchange: String,
    /// Instrument type.
    pub instrument_type: String,
    /// Display granularity; `None` uses the native tick.
    pub granularity: Option<GranularityMultiplier>,
    /// Replace an active subscription instead of reporting it.
    pub allow_replace: bool,
}

impl SubscribeRequest {
    /// Creates a request at the native granularity.
    #[must_use]
    pub fn new(instrument_type: &str, symbol: &str, exchange: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            instrument_type: instrument_type.to_lowercase(),
            granularity: None,
            allow_replace: false,
        }
    }

    /// Requests a display granularity.
    #[must_use]
    pub fn granularity(mut self, granularity: GranularityMultiplier) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// Allows replacing an active subscription.
    #[must_use]
    pub fn allow_replace(mut self, allow: bool) -> Self {
        self.allow_replace = allow;
        self
    }

    /// Alias this request subscribes.
    #[must_use]
    pub fn alias(&self) -> Alias {
        Alias::new(&self.instrument_type, &self.symbol)
    }
}

/// Handle for driving the coordinator from outside.
#[derive(Clone)]
pub struct CoordinatorHandle {
    cmd_tx: mpsc::Sender<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    subscriptions: Arc<SubscriptionTable>,
    request_timeout: Duration,
}

impl CoordinatorHandle {
    /// Subscribes to an instrument and waits for the outcome.
    ///
    /// A timed-out subscribe leaves no subscription behind: the worker rolls
    /// back anything that completes after the caller stopped waiting.
    ///
    /// # Errors
    /// Returns `SubscriptionError` if the instrument is unknown, already
    /// subscribed, has no usable granularity, is rejected by the venue, or
    /// if the request times out.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<Alias, SubscriptionError> {
        let alias = request.alias();
        let (reply, rx) = oneshot::channel();
        let command = Command::Subscribe {
            request,
            deadline: Instant::now() + self.request_timeout,
            reply,
        };
        self.call(&alias, command, rx).await?;
        Ok(alias)
    }

    /// Unsubscribes an alias and waits for the teardown.
    ///
    /// # Errors
    /// Returns `SubscriptionError::NotSubscribed` if the alias is not subscribed.
    pub async fn unsubscribe(&self, alias: &Alias) -> Result<(), SubscriptionError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Unsubscribe {
            alias: alias.clone(),
            reply,
        };
        self.call(alias, command, rx).await
    }

    /// Lifecycle state of an alias; `None` means unsubscribed.
    #[must_use]
    pub fn state(&self, alias: &Alias) -> Option<SubscriptionState> {
        self.subscriptions.state(alias)
    }

    /// Active aliases with their granularity.
    #[must_use]
    pub fn active(&self) -> Vec<(Alias, GranularityMultiplier)> {
        self.subscriptions.active()
    }

    /// Reports that the feed connection dropped. Never blocks.
    pub fn on_connection_lost(&self) {
        let _ = self.internal_tx.send(Internal::ConnectionLost);
    }

    /// Reports that the feed connection is back. Never blocks.
    ///
    /// Every active subscription is reissued silently.
    pub fn on_connection_restored(&self) {
        let _ = self.internal_tx.send(Internal::ConnectionRestored);
    }

    /// Stops the worker.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }

    async fn call(
        &self,
        alias: &Alias,
        command: Command,
        rx: oneshot::Receiver<Result<(), SubscriptionError>>,
    ) -> Result<(), SubscriptionError> {
        let exchange = async {
            self.cmd_tx
                .send(command)
                .await
                .map_err(|_| SubscriptionError::WorkerStopped)?;
            rx.await.map_err(|_| SubscriptionError::WorkerStopped)?
        };
        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| SubscriptionError::Timeout {
                alias: alias.clone(),
            })?
    }
}
