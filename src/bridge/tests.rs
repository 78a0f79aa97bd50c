//! Supervisor tests against in-memory transports.

use embassy_futures::block_on;
use heapless::Vec;

use super::*;
use crate::ble::{
    AttValue, ConnParams, PeerAddress, PeripheralHandle, ScanParams, SecurityParams,
};

// ═══════════════════════════════════════════════════════════════════════════
// Fakes
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Call {
    StartScan,
    Connect([u8; 6]),
    Secure,
    Confirm(bool),
    Subscribe(Characteristic),
}

struct FakeCentral {
    values: Vec<(Characteristic, AttValue), 8>,
    calls: Vec<Call, 64>,
    connect_result: Result<(), BleError>,
    secure_result: Result<(), BleError>,
    /// Every read fails with this error when set.
    read_error: Option<BleError>,
}

impl FakeCentral {
    fn empty() -> Self {
        Self {
            values: Vec::new(),
            calls: Vec::new(),
            connect_result: Ok(()),
            secure_result: Ok(()),
            read_error: None,
        }
    }

    fn keyboard() -> Self {
        let mut central = Self::empty();
        central.set(Characteristic::DeviceName, b"K380");
        central.set(Characteristic::ManufacturerName, b"Logi");
        central.set(Characteristic::PnpId, &[0x02, 0x6D, 0x04, 0x42, 0xB3, 0x01, 0x00]);
        central.set(Characteristic::BatteryLevel, &[90]);
        central.set(Characteristic::HidInformation, &[0x11, 0x01, 0x00, 0x02]);
        central.set(Characteristic::ReportMap, &KEYBOARD_MAP);
        central
    }

    fn set(&mut self, characteristic: Characteristic, value: &[u8]) {
        self.values.retain(|(c, _)| *c != characteristic);
        self.values
            .push((characteristic, Vec::from_slice(value).unwrap()))
            .unwrap();
    }

    fn remove(&mut self, characteristic: Characteristic) {
        self.values.retain(|(c, _)| *c != characteristic);
    }

    fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn record(&mut self, call: Call) {
        self.calls.push(call).unwrap();
    }
}

impl Central for FakeCentral {
    async fn start_scan(&mut self, _params: &ScanParams) -> Result<(), BleError> {
        self.record(Call::StartScan);
        Ok(())
    }

    async fn connect(
        &mut self,
        peer: &PeripheralHandle,
        _params: &ConnParams,
    ) -> Result<(), BleError> {
        self.record(Call::Connect(peer.address.bytes));
        self.connect_result
    }

    async fn secure(&mut self, _params: &SecurityParams) -> Result<(), BleError> {
        self.record(Call::Secure);
        self.secure_result
    }

    async fn confirm_passkey(&mut self, accept: bool) -> Result<(), BleError> {
        self.record(Call::Confirm(accept));
        Ok(())
    }

    async fn read(&mut self, characteristic: Characteristic) -> Result<AttValue, BleError> {
        if let Some(e) = self.read_error {
            return Err(e);
        }
        self.values
            .iter()
            .find(|(c, _)| *c == characteristic)
            .map(|(_, v)| v.clone())
            .ok_or(BleError::NotFound)
    }

    async fn subscribe(&mut self, characteristic: Characteristic) -> Result<usize, BleError> {
        self.record(Call::Subscribe(characteristic));
        Ok(1)
    }
}

#[derive(Default)]
struct FakeWired {
    registrations: Vec<Vec<u8, MAX_ATT_VALUE>, 4>,
    sent: Vec<(u8, Vec<u8, 64>), 16>,
}

impl WiredHid for FakeWired {
    fn register_descriptor(&mut self, descriptor: &[u8]) -> bool {
        self.registrations
            .push(Vec::from_slice(descriptor).unwrap())
            .unwrap();
        true
    }

    fn send_report(&mut self, report: &crate::hid::WireReport<'_>) -> bool {
        let payload = Vec::from_slice(report.payload).unwrap();
        self.sent.push((report.report_id, payload)).unwrap();
        true
    }
}

#[derive(Default)]
struct FakeStatus {
    last: Option<Status>,
    history: Vec<Status, 64>,
}

impl StatusSink for FakeStatus {
    fn show(&mut self, status: Status) {
        self.last = Some(status);
        let _ = self.history.push(status);
    }
}

type Supervisor = BridgeSupervisor<FakeCentral, FakeWired, FakeStatus>;

// Keyboard application collection with report id 1.
const KEYBOARD_MAP: [u8; 16] = [
    0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0x85, 0x01, 0x05, 0x07, 0x75, 0x01, 0x95, 0x08, 0x81,
    0x02,
];

// Mouse application collection with report id 2.
const MOUSE_MAP: [u8; 16] = [
    0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0x85, 0x02, 0x09, 0x01, 0xA1, 0x00, 0x05, 0x09, 0x81,
    0x02,
];

const HID_AD: [u8; 4] = [0x03, 0x03, 0x12, 0x18];

fn hid_peer(last: u8) -> PeripheralHandle {
    PeripheralHandle::from_advertisement(PeerAddress::new(0, [last, 1, 2, 3, 4, 5]), -55, &HID_AD)
}

fn supervisor(central: FakeCentral) -> Supervisor {
    BridgeSupervisor::new(central, FakeWired::default(), FakeStatus::default())
}

fn notification(characteristic: Characteristic, data: &[u8]) -> BridgeEvent {
    BridgeEvent::Notification {
        characteristic,
        data: Vec::from_slice(data).unwrap(),
    }
}

/// Run one scan-to-bridging cycle, opening the scan window at `now_ms`.
fn bring_up(sup: &mut Supervisor, now_ms: u64, peer: u8) {
    block_on(async {
        sup.poll(now_ms).await;
        assert_eq!(sup.state(), SessionState::Scanning);
        sup.handle(BridgeEvent::Discovered(hid_peer(peer))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
        assert_eq!(sup.state(), SessionState::Connecting);
        sup.handle(BridgeEvent::Connected).await;
        assert_eq!(sup.state(), SessionState::Securing);
        sup.handle(BridgeEvent::AuthenticationComplete { encrypted: true })
            .await;
    });
}

/// Disconnect and wait out the backoff; returns the time the next scan may
/// start.
fn tear_down(sup: &mut Supervisor, now_ms: u64) -> u64 {
    block_on(async {
        sup.handle(BridgeEvent::Disconnected { reason: 0x13 }).await;
        sup.poll(now_ms).await;
    });
    now_ms + config::RESCAN_DELAY_MS
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn first_poll_opens_scan_window_immediately() {
    let mut sup = supervisor(FakeCentral::keyboard());
    assert_eq!(sup.state(), SessionState::Idle);

    block_on(sup.poll(0));
    assert_eq!(sup.state(), SessionState::Scanning);
    assert_eq!(sup.central().count(Call::StartScan), 1);
    assert_eq!(sup.status_sink().last, Some(Status::Scanning));

    // Further ticks while scanning do nothing.
    block_on(sup.poll(5_000));
    assert_eq!(sup.central().count(Call::StartScan), 1);
}

#[test]
fn full_session_reaches_bridging() {
    let mut sup = supervisor(FakeCentral::keyboard());
    bring_up(&mut sup, 0, 7);

    assert_eq!(sup.state(), SessionState::Bridging);
    assert_eq!(sup.central().count(Call::Connect([7, 1, 2, 3, 4, 5])), 1);
    assert_eq!(sup.central().count(Call::Secure), 1);

    let session = sup.session().unwrap();
    assert_eq!(session.encrypted, Some(true));
    assert_eq!(session.conn_params, config::CONNECTION);
    assert_eq!(session.metadata.name.as_deref(), Some("K380"));
    assert_eq!(session.metadata.manufacturer.as_deref(), Some("Logi"));
    assert_eq!(session.metadata.pnp_id.unwrap().vendor_id, 0x046D);
    assert_eq!(session.metadata.battery_percent, Some(90));
    assert_eq!(session.metadata.hid_info.unwrap().flags, 0x02);
    assert!(session.schema.as_ref().unwrap().usages().has_keyboard);

    assert_eq!(sup.registered_descriptor(), Some(&KEYBOARD_MAP[..]));
    assert_eq!(sup.central().count(Call::Subscribe(Characteristic::Report)), 1);
    assert_eq!(
        sup.central().count(Call::Subscribe(Characteristic::BatteryLevel)),
        1
    );
    assert_eq!(
        sup.status_sink().last,
        Some(Status::Bridging { monitor_only: false })
    );
}

#[test]
fn first_hid_advertiser_in_window_is_used() {
    let mut sup = supervisor(FakeCentral::keyboard());
    block_on(async {
        sup.poll(0).await;
        let other = PeripheralHandle::from_advertisement(
            PeerAddress::new(0, [9; 6]),
            -30,
            &[0x03, 0x03, 0x0F, 0x18],
        );
        sup.handle(BridgeEvent::Discovered(other)).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(1))).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(2))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
    });
    assert_eq!(sup.central().count(Call::Connect([1, 1, 2, 3, 4, 5])), 1);
    assert_eq!(sup.session().unwrap().peer.address.bytes[0], 1);
}

#[test]
fn empty_scan_window_rescans_after_backoff() {
    let mut sup = supervisor(FakeCentral::keyboard());
    block_on(async {
        sup.poll(0).await;
        sup.handle(BridgeEvent::ScanEnded).await;
        assert_eq!(sup.state(), SessionState::Idle);
        assert!(sup.session().is_none());

        sup.poll(2_000).await;
        sup.poll(3_999).await;
        assert_eq!(sup.state(), SessionState::Idle);
        sup.poll(4_000).await;
    });
    assert_eq!(sup.state(), SessionState::Scanning);
    assert_eq!(sup.central().count(Call::StartScan), 2);
}

#[test]
fn connect_failure_releases_peer_and_goes_idle() {
    let mut sup = supervisor(FakeCentral::keyboard());
    block_on(async {
        sup.poll(0).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(3))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
        sup.handle(BridgeEvent::ConnectFailed(BleError::ConnectFailed))
            .await;
    });
    assert_eq!(sup.state(), SessionState::Idle);
    assert!(sup.session().is_none());
    assert_eq!(sup.status_sink().last, Some(Status::Error));
    assert!(sup.status_sink().history.contains(&Status::Connecting));
}

#[test]
fn connect_that_cannot_start_is_a_failure() {
    let mut central = FakeCentral::keyboard();
    central.connect_result = Err(BleError::Raw(0x11));
    let mut sup = supervisor(central);
    block_on(async {
        sup.poll(0).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(3))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
    });
    assert_eq!(sup.state(), SessionState::Idle);
    assert!(sup.session().is_none());
}

#[test]
fn security_failure_is_not_fatal() {
    let mut central = FakeCentral::keyboard();
    central.secure_result = Err(BleError::SecurityFailed);
    let mut sup = supervisor(central);
    block_on(async {
        sup.poll(0).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(4))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
        sup.handle(BridgeEvent::Connected).await;
    });
    assert_eq!(sup.state(), SessionState::Bridging);
    assert_eq!(sup.session().unwrap().encrypted, Some(false));
}

#[test]
fn unencrypted_completion_still_bridges() {
    let mut sup = supervisor(FakeCentral::keyboard());
    block_on(async {
        sup.poll(0).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(4))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
        sup.handle(BridgeEvent::Connected).await;
        sup.handle(BridgeEvent::AuthenticationComplete { encrypted: false })
            .await;
    });
    assert_eq!(sup.state(), SessionState::Bridging);
    assert_eq!(sup.session().unwrap().encrypted, Some(false));
}

#[test]
fn passkey_request_is_auto_confirmed() {
    let mut sup = supervisor(FakeCentral::keyboard());
    block_on(async {
        sup.poll(0).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(5))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
        sup.handle(BridgeEvent::Connected).await;
        sup.handle(BridgeEvent::PasskeyRequested { passkey: 123_456 })
            .await;
    });
    assert_eq!(sup.central().count(Call::Confirm(true)), 1);
    assert_eq!(sup.status_sink().last, Some(Status::Passkey(123_456)));
    assert_eq!(sup.state(), SessionState::Securing);
}

#[test]
fn link_loss_during_discovery_ends_session() {
    let mut central = FakeCentral::keyboard();
    central.read_error = Some(BleError::NotConnected);
    let mut sup = supervisor(central);
    bring_up(&mut sup, 0, 6);

    assert_eq!(sup.state(), SessionState::Idle);
    assert!(sup.session().is_none());
    assert!(sup.registered_descriptor().is_none());
    assert_eq!(sup.status_sink().last, Some(Status::Error));

    // The stack's own disconnect event arrives afterwards and is ignored.
    block_on(sup.handle(BridgeEvent::Disconnected { reason: 0x08 }));
    assert_eq!(sup.state(), SessionState::Idle);
}

#[test]
fn disconnect_during_bridging_clears_session_and_rescans() {
    let mut sup = supervisor(FakeCentral::keyboard());
    bring_up(&mut sup, 0, 7);

    block_on(sup.handle(BridgeEvent::Disconnected { reason: 0x13 }));
    assert_eq!(sup.state(), SessionState::Idle);
    assert!(sup.session().is_none());
    assert_eq!(sup.status_sink().last, Some(Status::Disconnected));

    block_on(async {
        sup.poll(10_000).await;
        sup.poll(11_999).await;
    });
    assert_eq!(sup.state(), SessionState::Idle);
    assert_eq!(sup.central().count(Call::StartScan), 1);

    block_on(sup.poll(12_000));
    assert_eq!(sup.state(), SessionState::Scanning);
    assert_eq!(sup.central().count(Call::StartScan), 2);
}

#[test]
fn disconnect_while_connecting_goes_idle() {
    let mut sup = supervisor(FakeCentral::keyboard());
    block_on(async {
        sup.poll(0).await;
        sup.handle(BridgeEvent::Discovered(hid_peer(8))).await;
        sup.handle(BridgeEvent::ScanEnded).await;
        sup.handle(BridgeEvent::Disconnected { reason: 0x3E }).await;
    });
    assert_eq!(sup.state(), SessionState::Idle);
    assert!(sup.session().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// Descriptor registration
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn descriptor_registered_once_across_sessions() {
    let mut sup = supervisor(FakeCentral::keyboard());
    bring_up(&mut sup, 0, 1);
    let next = tear_down(&mut sup, 100);
    bring_up(&mut sup, next, 1);

    assert_eq!(sup.state(), SessionState::Bridging);
    assert_eq!(sup.wired().registrations.len(), 1);
}

#[test]
fn different_descriptor_is_not_reregistered() {
    let mut sup = supervisor(FakeCentral::keyboard());
    bring_up(&mut sup, 0, 1);
    let next = tear_down(&mut sup, 100);

    sup.central.set(Characteristic::ReportMap, &MOUSE_MAP);
    bring_up(&mut sup, next, 2);

    assert_eq!(sup.state(), SessionState::Bridging);
    assert_eq!(sup.wired().registrations.len(), 1);
    assert_eq!(sup.registered_descriptor(), Some(&KEYBOARD_MAP[..]));
    // The new session still keeps its own schema.
    let schema = sup.session().unwrap().schema.as_ref().unwrap();
    assert!(schema.usages().has_mouse);

    // Reports keep flowing through the first registration.
    block_on(sup.handle(notification(Characteristic::Report, &[0x01, 0x02, 0x03])));
    assert_eq!(sup.wired().sent.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Forwarding
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn notifications_are_forwarded_in_order() {
    let mut sup = supervisor(FakeCentral::keyboard());
    bring_up(&mut sup, 0, 1);

    block_on(async {
        sup.handle(notification(
            Characteristic::Report,
            &[0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00],
        ))
        .await;
        sup.handle(notification(Characteristic::Report, &[0x01, 0x10, 0xF0]))
            .await;
        sup.handle(notification(Characteristic::Report, &[0xE9, 0x00]))
            .await;
        sup.handle(notification(
            Characteristic::Report,
            &[0x03, 0xAB, 0xCD, 0xEF, 0x01, 0x02],
        ))
        .await;
    });

    let ids: Vec<u8, 8> = sup.wired().sent.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids.as_slice(), &[1, 2, 3, 3]);
    assert_eq!(
        sup.wired().sent[3].1.as_slice(),
        &[0xAB, 0xCD, 0xEF, 0x01, 0x02]
    );
    assert_eq!(sup.stats().forwarded, 4);
}

#[test]
fn missing_report_map_bridges_monitor_only() {
    let mut central = FakeCentral::keyboard();
    central.remove(Characteristic::ReportMap);
    let mut sup = supervisor(central);
    bring_up(&mut sup, 0, 1);

    assert_eq!(sup.state(), SessionState::Bridging);
    assert!(sup.session().unwrap().is_monitor_only());
    assert!(sup.wired().registrations.is_empty());
    assert_eq!(
        sup.status_sink().last,
        Some(Status::Bridging { monitor_only: true })
    );

    block_on(sup.handle(notification(Characteristic::Report, &[0x01, 0x10, 0xF0])));
    assert!(sup.wired().sent.is_empty());
    assert_eq!(sup.stats().monitored, 1);
}

#[test]
fn reports_outside_bridging_are_dropped() {
    let mut sup = supervisor(FakeCentral::keyboard());
    block_on(async {
        sup.handle(notification(Characteristic::Report, &[0x01, 0x10, 0xF0]))
            .await;
        sup.handle(BridgeEvent::Connected).await;
    });
    assert_eq!(sup.state(), SessionState::Idle);
    assert!(sup.wired().sent.is_empty());
    assert_eq!(sup.stats(), ForwardStats::default());
}

#[test]
fn battery_updates_overwrite_metadata() {
    let mut sup = supervisor(FakeCentral::keyboard());
    bring_up(&mut sup, 0, 1);

    block_on(async {
        sup.handle(BridgeEvent::BatteryUpdate { level: 75 }).await;
        assert_eq!(sup.session().unwrap().metadata.battery_percent, Some(75));
        sup.handle(notification(Characteristic::BatteryLevel, &[60]))
            .await;
    });
    assert_eq!(sup.session().unwrap().metadata.battery_percent, Some(60));
    assert_eq!(sup.status_sink().last, Some(Status::Battery(60)));

    // An empty battery notification changes nothing.
    block_on(sup.handle(notification(Characteristic::BatteryLevel, &[])));
    assert_eq!(sup.session().unwrap().metadata.battery_percent, Some(60));
    assert_eq!(sup.status_sink().last, Some(Status::Battery(60)));
    // Battery values never reach the report path.
    assert!(sup.wired().sent.is_empty());
}

#[test]
fn rescan_due_is_inclusive() {
    assert!(!rescan_due(1_000, 2_999, 2_000));
    assert!(rescan_due(1_000, 3_000, 2_000));
    // A clock that went backwards never underflows.
    assert!(!rescan_due(5_000, 1_000, 2_000));
}
