//! Scripted fakes standing in for a simulator process in tests.
//!
//! The fake gateway and channel implement the public gateway traits and let
//! tests script inbound events, flip reachability, and detect concurrent
//! handle access.

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, SimlinkError};
use crate::gateway::{ChannelEvent, SimChannel, SimGateway, SimMessage, SimVersion};
use crate::sync::{WaitableSignal, lock};

/// Scripted gateway: reachability and open failures are flipped by the test,
/// and every opened channel is retained so events can be injected.
pub struct FakeGateway {
    reachable: AtomicBool,
    fail_open: AtomicBool,
    opens: AtomicU32,
    last: Mutex<Option<Arc<FakeChannel>>>,
    version: SimVersion,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
            opens: AtomicU32::new(0),
            last: Mutex::new(None),
            version: SimVersion::Msfs,
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// How many sessions were opened so far.
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// The most recently opened channel, for injecting events.
    pub fn last_channel(&self) -> Option<Arc<FakeChannel>> {
        lock(&self.last).clone()
    }
}

#[async_trait]
impl SimGateway for FakeGateway {
    async fn probe(&self) -> Option<SimVersion> {
        self.reachable.load(Ordering::SeqCst).then_some(self.version)
    }

    async fn open(
        &self,
        client_name: &str,
        data_ready: Option<Arc<WaitableSignal>>,
        _config_index: u32,
    ) -> Result<Arc<dyn SimChannel>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SimlinkError::connection_failed("simulator process not found"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let channel = Arc::new(FakeChannel::new(client_name, data_ready, self.version));
        *lock(&self.last) = Some(Arc::clone(&channel));
        Ok(channel)
    }
}

/// Scripted session handle.
///
/// `receive` and `close` mark the handle "busy" for their duration and panic
/// if they ever observe each other running, which turns any mutual-exclusion
/// violation into a test failure.
pub struct FakeChannel {
    #[allow(dead_code)]
    client_name: String,
    version: SimVersion,
    open: AtomicBool,
    busy: AtomicBool,
    queue: Mutex<VecDeque<ChannelEvent>>,
    data_ready: Option<Arc<WaitableSignal>>,
}

impl FakeChannel {
    fn new(
        client_name: &str,
        data_ready: Option<Arc<WaitableSignal>>,
        version: SimVersion,
    ) -> Self {
        Self {
            client_name: client_name.to_string(),
            version,
            open: AtomicBool::new(true),
            busy: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            data_ready,
        }
    }

    /// Queue an inbound event and raise the data-ready signal, as the real
    /// transport would.
    pub fn push(&self, event: ChannelEvent) {
        lock(&self.queue).push_back(event);
        if let Some(signal) = &self.data_ready {
            signal.set();
        }
    }

    pub fn confirm_open(&self) {
        self.push(ChannelEvent::OpenConfirmed {
            app_name: "Fake Simulator".to_string(),
            app_version: "1.0".to_string(),
        });
    }

    pub fn quit(&self) {
        self.push(ChannelEvent::Quit);
    }

    pub fn send_message(&self, kind: u32, payload: Vec<u8>) {
        self.push(ChannelEvent::Message(SimMessage { kind, payload }));
    }

    fn enter(&self, operation: &str) {
        assert!(
            !self.busy.swap(true, Ordering::SeqCst),
            "concurrent access to session handle during {operation}"
        );
    }

    fn exit(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl SimChannel for FakeChannel {
    fn version(&self) -> SimVersion {
        self.version
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn receive(&self) -> Result<Vec<ChannelEvent>> {
        if !self.is_open() {
            return Err(SimlinkError::ChannelClosed);
        }
        self.enter("receive");
        // Widen the window so overlapping access is actually observed.
        std::thread::sleep(std::time::Duration::from_millis(1));
        let drained = lock(&self.queue).drain(..).collect();
        self.exit();
        Ok(drained)
    }

    fn close(&self) {
        self.enter("close");
        std::thread::sleep(std::time::Duration::from_millis(1));
        self.open.store(false, Ordering::SeqCst);
        self.exit();
    }
}
