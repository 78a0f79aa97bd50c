//! Bridge supervisor - drives one session at a time from scan to teardown.
//!
//! Transport callbacks arrive as [`BridgeEvent`]s through [`EventQueues`] and
//! are handled one at a time by [`BridgeSupervisor::handle`], so the session
//! is only ever touched from one place.  Time only matters for the rescan
//! backoff, which [`BridgeSupervisor::poll`] checks on every tick.

mod queue;
#[cfg(test)]
mod tests;

pub use queue::EventQueues;

use heapless::Vec;

use crate::ble::metadata::{self, Discovery};
use crate::ble::selector::PeripheralSelector;
use crate::ble::{Central, Characteristic, PeripheralHandle, MAX_ATT_VALUE, MAX_NOTIFICATION_LEN};
use crate::config;
use crate::error::BleError;
use crate::hid::{ForwardStats, ReportForwarder, WiredHid};
use crate::session::{Session, SessionState, SessionStateMachine, Trigger};

/// Everything the wireless transport reports back to the supervisor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeEvent {
    /// One advertising report during a scan window.
    Discovered(PeripheralHandle),
    /// The scan window closed.
    ScanEnded,
    /// The connection attempt succeeded.
    Connected,
    ConnectFailed(BleError),
    /// The link is gone (HCI reason code).
    Disconnected { reason: u8 },
    /// Numeric comparison requested during pairing.
    PasskeyRequested { passkey: u32 },
    /// Pairing finished; `encrypted` tells whether the link ended up secure.
    AuthenticationComplete { encrypted: bool },
    /// Notification on a subscribed characteristic.
    Notification {
        characteristic: Characteristic,
        data: Vec<u8, MAX_NOTIFICATION_LEN>,
    },
    BatteryUpdate { level: u8 },
}

/// What the status display shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Idle,
    Scanning,
    Connecting,
    Pairing,
    /// Numeric comparison value being auto-confirmed.
    Passkey(u32),
    Discovering,
    /// Reports are flowing; `monitor_only` when nothing reaches USB.
    Bridging { monitor_only: bool },
    Battery(u8),
    Disconnected,
    Error,
}

/// Renders status updates.  Must not block.
pub trait StatusSink {
    fn show(&mut self, status: Status);
}

/// Whether the rescan backoff that started at `idle_since` has elapsed.
pub fn rescan_due(idle_since: u64, now_ms: u64, delay_ms: u64) -> bool {
    now_ms.saturating_sub(idle_since) >= delay_ms
}

/// Owns the session and the single state machine driving it.
pub struct BridgeSupervisor<C, W, S> {
    central: C,
    wired: W,
    status: S,
    machine: SessionStateMachine,
    selector: PeripheralSelector,
    session: Option<Session>,
    /// Descriptor handed to the wired transport; set at most once.
    registered: Option<Vec<u8, MAX_ATT_VALUE>>,
    forwarder: ReportForwarder,
    /// A session or scan window has ended, so the next scan waits.
    backoff: bool,
    /// Tick at which the current backoff started, stamped by `poll`.
    idle_since: Option<u64>,
}

impl<C, W, S> BridgeSupervisor<C, W, S>
where
    C: Central,
    W: WiredHid,
    S: StatusSink,
{
    pub fn new(central: C, wired: W, status: S) -> Self {
        Self {
            central,
            wired,
            status,
            machine: SessionStateMachine::new(),
            selector: PeripheralSelector::new(),
            session: None,
            registered: None,
            forwarder: ReportForwarder::new(),
            backoff: false,
            idle_since: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn stats(&self) -> ForwardStats {
        self.forwarder.stats()
    }

    /// The descriptor registered with the wired transport, if any.
    pub fn registered_descriptor(&self) -> Option<&[u8]> {
        self.registered.as_deref()
    }

    pub fn central(&self) -> &C {
        &self.central
    }

    pub fn wired(&self) -> &W {
        &self.wired
    }

    pub fn status_sink(&self) -> &S {
        &self.status
    }

    /// Periodic tick.  Opens a scan window when idle: right away the first
    /// time, otherwise once [`config::RESCAN_DELAY_MS`] has passed.
    pub async fn poll(&mut self, now_ms: u64) {
        if self.machine.state() != SessionState::Idle {
            return;
        }
        if self.backoff {
            let since = *self.idle_since.get_or_insert(now_ms);
            if !rescan_due(since, now_ms, config::RESCAN_DELAY_MS) {
                return;
            }
        }
        self.start_scan().await;
    }

    /// Handle one transport event.
    pub async fn handle(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Discovered(handle) => {
                if self.machine.state() == SessionState::Scanning {
                    self.selector.offer(handle);
                }
            }
            BridgeEvent::ScanEnded => self.on_scan_ended().await,
            BridgeEvent::Connected => self.on_connected().await,
            BridgeEvent::ConnectFailed(e) => {
                if self.machine.state() == SessionState::Connecting {
                    warn!("Connection failed: {}", e);
                    self.fail();
                }
            }
            BridgeEvent::Disconnected { reason } => self.on_disconnected(reason),
            BridgeEvent::PasskeyRequested { passkey } => self.on_passkey(passkey).await,
            BridgeEvent::AuthenticationComplete { encrypted } => {
                if self.machine.state() == SessionState::Securing {
                    self.resolve_security(encrypted).await;
                }
            }
            BridgeEvent::Notification {
                characteristic,
                data,
            } => self.on_notification(characteristic, &data),
            BridgeEvent::BatteryUpdate { level } => self.on_battery(&[level]),
        }
    }

    fn transition(&mut self, trigger: Trigger) -> bool {
        match self.machine.apply(trigger) {
            Ok(_) => true,
            Err(e) => {
                warn!("Ignoring {}", e);
                false
            }
        }
    }

    fn enter_idle(&mut self, status: Status) {
        self.selector.clear();
        self.backoff = true;
        self.idle_since = None;
        self.status.show(status);
    }

    async fn start_scan(&mut self) {
        if !self.transition(Trigger::StartScan) {
            return;
        }
        self.selector.clear();
        self.idle_since = None;
        self.status.show(Status::Scanning);
        info!("Scanning for HID peripherals ({} ms window)", config::SCAN.duration_ms);

        if let Err(e) = self.central.start_scan(&config::SCAN).await {
            warn!("Scan failed to start: {}", e);
            self.transition(Trigger::ScanWindowEmpty);
            self.enter_idle(Status::Error);
        }
    }

    async fn on_scan_ended(&mut self) {
        if self.machine.state() != SessionState::Scanning {
            return;
        }
        let Some(peer) = self.selector.take() else {
            info!("No HID peripheral found, rescanning in {} ms", config::RESCAN_DELAY_MS);
            self.transition(Trigger::ScanWindowEmpty);
            self.enter_idle(Status::Idle);
            return;
        };

        self.transition(Trigger::CandidateReady);
        self.status.show(Status::Connecting);
        info!("Connecting to {}", peer.address);
        let session = self.session.insert(Session::new(peer, config::CONNECTION));

        if let Err(e) = self.central.connect(&session.peer, &config::CONNECTION).await {
            warn!("Connection could not start: {}", e);
            self.fail();
        }
    }

    async fn on_connected(&mut self) {
        if !self.transition(Trigger::LinkUp) {
            return;
        }
        info!("Connected, securing link");
        self.status.show(Status::Pairing);

        match self.central.secure(&config::SECURITY).await {
            Ok(()) => {}
            Err(e) if e.is_link_loss() => {
                warn!("Link lost while securing");
                self.fail();
            }
            Err(e) => {
                warn!("Security request failed ({}), continuing unencrypted", e);
                self.resolve_security(false).await;
            }
        }
    }

    async fn on_passkey(&mut self, passkey: u32) {
        if self.machine.state() != SessionState::Securing {
            return;
        }
        info!("Passkey {} - confirming", passkey);
        self.status.show(Status::Passkey(passkey));
        if let Err(e) = self.central.confirm_passkey(true).await {
            warn!("Passkey confirmation failed: {}", e);
        }
    }

    async fn resolve_security(&mut self, encrypted: bool) {
        if encrypted {
            info!("Link encrypted");
        } else {
            warn!("Link not encrypted, continuing anyway");
        }
        if let Some(session) = self.session.as_mut() {
            session.encrypted = Some(encrypted);
        }
        if !self.transition(Trigger::SecurityResolved) {
            return;
        }
        self.status.show(Status::Discovering);
        self.discover().await;
    }

    async fn discover(&mut self) {
        let Discovery {
            metadata,
            schema,
            link_lost,
        } = metadata::extract(&mut self.central).await;

        if link_lost {
            self.fail();
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.metadata = metadata;
        session.schema = schema;

        if let Some(schema) = session.schema.as_ref() {
            let descriptor = schema.descriptor();
            match self.registered.as_ref() {
                None => {
                    if self.wired.register_descriptor(descriptor) {
                        info!("USB report descriptor registered ({} bytes)", descriptor.len());
                        self.registered = Vec::from_slice(descriptor).ok();
                    } else {
                        warn!("USB transport refused the report descriptor");
                    }
                }
                Some(prev) if prev.as_slice() == descriptor => {
                    debug!("USB report descriptor already registered");
                }
                Some(_) => {
                    warn!("Report descriptor differs from the registered one, keeping the first");
                }
            }
        }
        let monitor_only = !self.is_forwarding();

        if !self.transition(Trigger::DiscoveryComplete) {
            return;
        }
        match self.central.subscribe(Characteristic::Report).await {
            Ok(n) => info!("Subscribed to {} input report(s)", n),
            Err(e) => error!("Could not subscribe to input reports: {}", e),
        }
        if monitor_only {
            warn!("Bridging in monitor-only mode");
        } else {
            info!("Bridging");
        }
        self.status.show(Status::Bridging { monitor_only });
    }

    /// The session has a schema and a descriptor is up on USB.
    fn is_forwarding(&self) -> bool {
        self.registered.is_some() && self.session.as_ref().is_some_and(|s| !s.is_monitor_only())
    }

    fn on_notification(&mut self, characteristic: Characteristic, data: &[u8]) {
        match characteristic {
            Characteristic::Report => {
                if self.machine.state() != SessionState::Bridging {
                    return;
                }
                let wired = if self.is_forwarding() {
                    Some(&mut self.wired)
                } else {
                    None
                };
                self.forwarder.forward(wired, data);
            }
            Characteristic::BatteryLevel => self.on_battery(data),
            _ => {}
        }
    }

    fn on_battery(&mut self, data: &[u8]) {
        let Some(level) = self
            .session
            .as_mut()
            .and_then(|session| session.metadata.update_battery(data))
        else {
            return;
        };
        info!("Battery: {}%", level);
        self.status.show(Status::Battery(level));
    }

    fn on_disconnected(&mut self, reason: u8) {
        if self.machine.state() == SessionState::Idle {
            return;
        }
        info!("Disconnected (reason {=u8:#x})", reason);
        self.transition(Trigger::LinkDown);
        self.release();
        self.enter_idle(Status::Disconnected);
    }

    /// Connection attempt or setup failed: drop the session and go idle.
    fn fail(&mut self) {
        self.transition(Trigger::Fault);
        self.release();
        self.enter_idle(Status::Error);
    }

    fn release(&mut self) {
        self.session = None;
        self.transition(Trigger::Released);
    }
}
