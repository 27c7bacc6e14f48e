//! Connection lifecycle manager.
//!
//! A periodic pacer drives the state machine: on each tick it attempts to
//! establish a session, counts down the confirmation grace period, and
//! recovers from remote shutdowns. Inbound data arrives through the signal
//! pump (or the host's own message loop) and is serialized against
//! connect/teardown by the handle gate, so at most one of the two execution
//! contexts touches the channel handle at a time.

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{DeliveryMode, LinkConfig};
use crate::error::Result;
use crate::gateway::{ChannelEvent, SimChannel, SimGateway, SimMessage, SimVersion};
use crate::ids::{CorrelationId, IdAllocator};
use crate::pump::{PumpHandler, SignalPump};
use crate::sync::{HandleGate, lock};

use super::state::{ConnectionState, LifecycleEvent};

use futures::FutureExt;

/// Pacer ticks a fresh session may remain unconfirmed before the attempt is
/// abandoned.
pub(crate) const GRACE_PERIOD_TICKS: i32 = 10;

/// Manages one connection to the simulator process.
///
/// Constructed once per client; [`connect`](Self::connect) and
/// [`disconnect`](Self::disconnect) may be called repeatedly. Dropping the
/// manager cancels its background tasks.
pub struct ConnectionManager {
    inner: Arc<LinkInner>,
}

struct LinkInner {
    config: LinkConfig,
    gateway: Arc<dyn SimGateway>,
    gate: HandleGate,
    pump: SignalPump,
    events: broadcast::Sender<LifecycleEvent>,
    messages: broadcast::Sender<SimMessage>,
    correlation: IdAllocator,
    shared: Mutex<Shared>,
    pacer: Mutex<Option<CancellationToken>>,
}

/// The only mutable state shared between the pacer task and the pump's
/// delivery context. Always accessed under the lock, never across an await.
struct Shared {
    state: ConnectionState,
    channel: Option<Arc<dyn SimChannel>>,
    grace_ticks: i32,
    correlation: Option<CorrelationId>,
    version: Option<SimVersion>,
}

impl ConnectionManager {
    pub fn new(gateway: Arc<dyn SimGateway>, config: LinkConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let (messages, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(LinkInner {
                config,
                gateway,
                gate: HandleGate::new(),
                pump: SignalPump::new(),
                events,
                messages,
                correlation: IdAllocator::connection_attempts(),
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    channel: None,
                    grace_ticks: 0,
                    correlation: None,
                    version: None,
                }),
                pacer: Mutex::new(None),
            }),
        }
    }

    /// Start the connection lifecycle.
    ///
    /// Returns `false` without effect unless currently
    /// [`ConnectionState::Disconnected`], preventing duplicate connect
    /// sequences. Otherwise transitions to `Idle` and starts the pacer; the
    /// first connection attempt happens on the first tick.
    pub fn connect(&self) -> bool {
        self.inner.begin()
    }

    /// Stop the pacer, shut the pump down, and tear the session down.
    ///
    /// Idempotent: repeated calls fire [`LifecycleEvent::Disconnected`] at
    /// most once per teardown and never double-dispose the session handle.
    /// Safe to call even if never connected. Returns `true` if a teardown
    /// actually happened.
    ///
    /// If the handle gate cannot be acquired within its bound, the suspected
    /// deadlock is logged and teardown deliberately proceeds without the
    /// gate, so disconnect completes in bounded time either way.
    pub async fn disconnect(&self) -> bool {
        self.inner.shutdown().await
    }

    /// Current state of the lifecycle state machine.
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.shared).state
    }

    /// True iff the connection is confirmed and a session handle exists.
    pub fn is_connected(&self) -> bool {
        let shared = lock(&self.inner.shared);
        shared.state == ConnectionState::ConfirmedConnection && shared.channel.is_some()
    }

    /// The current session handle, if any.
    ///
    /// The reference may go stale at any time; callers must re-fetch rather
    /// than cache it, and must tolerate calls on it failing.
    pub fn channel(&self) -> Option<Arc<dyn SimChannel>> {
        lock(&self.inner.shared).channel.clone()
    }

    /// The API generation detected by the most recent successful probe.
    pub fn detected_version(&self) -> Option<SimVersion> {
        lock(&self.inner.shared).version
    }

    /// Correlation id of the connection attempt that produced the current
    /// session, if one is active. Shows up in log output as `#xxxxxxxx`.
    pub fn correlation(&self) -> Option<CorrelationId> {
        lock(&self.inner.shared).correlation
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Lifecycle events as a stream.
    pub fn events(&self) -> BroadcastStream<LifecycleEvent> {
        BroadcastStream::new(self.inner.events.subscribe())
    }

    /// Non-lifecycle inbound messages as a stream.
    pub fn messages(&self) -> BroadcastStream<SimMessage> {
        BroadcastStream::new(self.inner.messages.subscribe())
    }

    /// Pump one batch of inbound events.
    ///
    /// This is the delivery entry point for [`DeliveryMode::HostDriven`];
    /// with the signal-driven transport the pump calls the same path
    /// internally and hosts never need it.
    pub async fn deliver_pending(&self) -> Result<()> {
        self.inner.deliver_pending().await
    }

    /// Drive one pacer tick directly, bypassing the timer.
    #[cfg(test)]
    pub(crate) async fn pace_once(&self) {
        self.inner.on_pace_tick().await;
    }

    /// Hold the handle gate, standing in for a delivery context that never
    /// returns it.
    #[cfg(test)]
    pub(crate) async fn seize_gate(&self) -> crate::sync::GateGuard<'_> {
        self.inner.gate.acquire().await.expect("gate should be free")
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        debug!("dropping connection manager");
        if let Some(cancel) = lock(&self.inner.pacer).take() {
            cancel.cancel();
        }
        self.inner.pump.cancel();
    }
}

impl LinkInner {
    fn shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    fn emit(&self, event: LifecycleEvent) {
        trace!(?event, "lifecycle event");
        // No subscribers is fine; the send error only means nobody listened.
        let _ = self.events.send(event);
    }

    fn begin(self: &Arc<Self>) -> bool {
        {
            let mut shared = self.shared();
            if shared.state != ConnectionState::Disconnected {
                debug!(state = ?shared.state, "connect ignored; lifecycle already active");
                return false;
            }
            shared.state = ConnectionState::Idle;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("connect requires a tokio runtime for the pacer task");
            self.shared().state = ConnectionState::Disconnected;
            return false;
        };

        let cancel = CancellationToken::new();
        if let Some(previous) = lock(&self.pacer).replace(cancel.clone()) {
            previous.cancel();
        }

        let period = self.config.pace_interval();
        info!(interval = ?period, "connect requested; pacer started");

        let inner = Arc::clone(self);
        runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => inner.on_pace_tick().await,
                }
            }
            debug!("pacer task exited");
        });
        true
    }

    async fn shutdown(&self) -> bool {
        if let Some(cancel) = lock(&self.pacer).take() {
            cancel.cancel();
            debug!("pacer stopped");
        }
        self.pump.shutdown().await;

        // Serialize the teardown against any in-flight delivery. On gate
        // timeout we proceed anyway: disconnect must stay bounded.
        let _guard = match self.gate.acquire().await {
            Ok(guard) => Some(guard),
            Err(e) => {
                error!(error = %e, "disconnecting without the handle gate");
                None
            }
        };

        let was_active = {
            let mut shared = self.shared();
            if shared.state == ConnectionState::Disconnected {
                false
            } else {
                shared.state = ConnectionState::Disconnected;
                shared.version = None;
                shared.correlation = None;
                true
            }
        };

        // Published before disposal so observers can still reach the handle.
        if was_active {
            self.emit(LifecycleEvent::Disconnected);
        }

        let channel = self.shared().channel.take();
        if let Some(channel) = channel {
            channel.close();
            debug!("session handle disposed");
        }

        if was_active {
            info!("disconnected");
        }
        was_active
    }

    async fn on_pace_tick(self: &Arc<Self>) {
        let state = self.shared().state;
        trace!(?state, "pace tick");
        match state {
            ConnectionState::Idle => {
                let _ = self.connect_low().await;
            }
            ConnectionState::ConnectionClosed => {
                // Re-arm only; the fresh attempt happens on the next tick.
                let mut shared = self.shared();
                if shared.state == ConnectionState::ConnectionClosed {
                    shared.state = ConnectionState::Idle;
                }
            }
            ConnectionState::Connecting => {
                let expired = {
                    let mut shared = self.shared();
                    shared.state == ConnectionState::Connecting && {
                        shared.grace_ticks -= 1;
                        shared.grace_ticks <= 0
                    }
                };
                if expired {
                    self.abandon_unconfirmed().await;
                }
            }
            ConnectionState::Connected => {
                enum Outcome {
                    Confirmed,
                    Expired,
                    Moved,
                }
                let outcome = {
                    let mut shared = self.shared();
                    if shared.state != ConnectionState::Connected {
                        Outcome::Moved
                    } else {
                        shared.grace_ticks -= 1;
                        if shared.grace_ticks <= 0 {
                            Outcome::Expired
                        } else {
                            // TODO: replace with a real confirmation
                            // handshake; for now any tick in Connected
                            // confirms the session.
                            shared.state = ConnectionState::ConfirmedConnection;
                            Outcome::Confirmed
                        }
                    }
                };
                match outcome {
                    Outcome::Confirmed => {
                        info!("connection confirmed");
                        self.emit(LifecycleEvent::Connected);
                    }
                    Outcome::Expired => self.abandon_unconfirmed().await,
                    Outcome::Moved => {}
                }
            }
            ConnectionState::ConfirmedConnection => {} // steady state
            ConnectionState::Disconnected => {}        // pacer about to stop
        }
    }

    /// One low-level connection attempt.
    ///
    /// Failures are folded into state transitions and never propagate: a
    /// missing or rejecting simulator leaves the machine in a state the
    /// pacer retries from.
    async fn connect_low(self: &Arc<Self>) -> bool {
        {
            let shared = self.shared();
            if matches!(
                shared.state,
                ConnectionState::Connected | ConnectionState::ConfirmedConnection
            ) && shared.channel.is_some()
            {
                trace!("already connected; skipping attempt");
                return true;
            }
        }

        let _guard = match self.gate.acquire().await {
            Ok(guard) => guard,
            Err(e) => {
                error!(error = %e, "could not serialize connection attempt");
                return false;
            }
        };

        if let Some(stale) = self.shared().channel.take() {
            debug!("disposing stale session handle before reconnect");
            stale.close();
        }

        let correlation = self.correlation.allocate();
        debug!(%correlation, client = %self.config.client_name, "attempting simulator connection");

        let data_ready = match self.config.delivery {
            DeliveryMode::SignalDriven => {
                // Recycle the pump so this attempt gets a fresh
                // signal/token pair.
                self.pump.shutdown().await;
                if !self.pump.start(self.delivery_handler()) {
                    warn!(%correlation, "signal pump refused to start; will retry on next tick");
                    return false;
                }
                Some(self.pump.signal())
            }
            DeliveryMode::HostDriven => None,
        };

        let opened = self
            .gateway
            .open(&self.config.client_name, data_ready, self.config.config_index)
            .await;
        let channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                warn!(%correlation, error = %e, "simulator connection attempt failed");
                self.pump.cancel();
                self.fold_failure();
                return false;
            }
        };

        {
            let mut shared = self.shared();
            shared.channel = Some(channel);
            shared.grace_ticks = GRACE_PERIOD_TICKS;
            shared.correlation = Some(correlation);
        }

        match self.gateway.probe().await {
            Some(version) => {
                {
                    let mut shared = self.shared();
                    shared.state = ConnectionState::Connecting;
                    shared.version = Some(version);
                }
                info!(%correlation, ?version, "simulator reachable; awaiting open confirmation");
                self.emit(LifecycleEvent::Establishing);
                true
            }
            None => {
                debug!(%correlation, "simulator not reachable; closing attempt");
                if let Some(channel) = self.shared().channel.take() {
                    channel.close();
                }
                self.pump.cancel();
                self.fold_failure();
                false
            }
        }
    }

    /// Fold a failed attempt into `ConnectionClosed` so the pacer retries.
    fn fold_failure(&self) {
        let mut shared = self.shared();
        if shared.state != ConnectionState::Disconnected {
            shared.state = ConnectionState::ConnectionClosed;
        }
    }

    /// Give up on a session that was never confirmed within the grace
    /// period: forced disconnect, then back to `Idle` for a fresh attempt.
    async fn abandon_unconfirmed(&self) {
        warn!("no open confirmation within grace period; abandoning attempt");
        let _guard = match self.gate.acquire().await {
            Ok(guard) => Some(guard),
            Err(e) => {
                error!(error = %e, "abandoning attempt without the handle gate");
                None
            }
        };
        self.pump.cancel();
        if let Some(channel) = self.shared().channel.take() {
            channel.close();
        }
        let mut shared = self.shared();
        shared.version = None;
        if shared.state != ConnectionState::Disconnected {
            shared.state = ConnectionState::Idle;
        }
    }

    fn delivery_handler(self: &Arc<Self>) -> PumpHandler {
        let inner = Arc::clone(self);
        Arc::new(move || {
            let inner = Arc::clone(&inner);
            async move { inner.deliver_pending().await }.boxed()
        })
    }

    async fn deliver_pending(&self) -> Result<()> {
        let _guard = self.gate.acquire().await?;
        let Some(channel) = self.shared().channel.clone() else {
            trace!("delivery signal with no live session; ignoring");
            return Ok(());
        };
        for event in channel.receive()? {
            match event {
                ChannelEvent::OpenConfirmed { app_name, app_version } => {
                    self.on_open_confirmed(&app_name, &app_version);
                }
                ChannelEvent::Quit => self.on_quit(),
                ChannelEvent::Message(message) => {
                    let _ = self.messages.send(message);
                }
            }
        }
        Ok(())
    }

    fn on_open_confirmed(&self, app_name: &str, app_version: &str) {
        let mut shared = self.shared();
        match shared.state {
            ConnectionState::Connecting => {
                shared.state = ConnectionState::Connected;
                shared.grace_ticks = GRACE_PERIOD_TICKS;
                info!(app_name, app_version, "simulator confirmed open");
            }
            state => debug!(?state, "open confirmation in unexpected state; ignored"),
        }
    }

    /// Forced disconnect on the simulator's quit notification, even if
    /// callers still believe they are connected.
    fn on_quit(&self) {
        info!("simulator requested quit; forcing disconnect");
        // Published before disposal so observers can still reach the handle.
        self.emit(LifecycleEvent::Disconnected);
        let channel = {
            let mut shared = self.shared();
            shared.state = ConnectionState::ConnectionClosed;
            shared.version = None;
            shared.channel.take()
        };
        if let Some(channel) = channel {
            channel.close();
        }
        self.pump.cancel();
    }
}
