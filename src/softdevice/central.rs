//! [`Central`] on top of the SoftDevice.
//!
//! Scans and connection attempts run in the radio task so the supervisor
//! never waits on them; their outcome comes back through [`EVENTS`].  GATT
//! reads and CCCD writes are short and run inline on the supervisor.

use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use heapless::Vec;
use nrf_softdevice::ble::{central, gatt_client, Address, AddressType, Connection, EncryptError};
use nrf_softdevice::{raw, Softdevice};

use hogp_bridge::ble::link::{LinkCommand, LinkCommands, SecurityWatch, WatchList};
use hogp_bridge::ble::{
    uuid, AttValue, Central, Characteristic, ConnParams, PeerAddress, PeripheralHandle,
    ScanParams, SecurityParams, MAX_ATT_VALUE,
};
use hogp_bridge::config::{
    BLE_ATT_MTU, BLE_CONNECT_TIMEOUT_MS, BLE_SCAN_DEDUP_CAPACITY, BLE_SECURITY_POLL_MS,
    BLE_SECURITY_POLL_STEPS,
};
use hogp_bridge::{BleError, BridgeEvent};

use super::client::{
    enable_cccd, Attribute, BatteryClient, DeviceInfoClient, GapClient, HidClient,
    NotificationRouter, RoutedNotification, ServiceClient,
};
use super::{current_link, link_down, link_up, push_event, security, EVENTS};

/// The SoftDevice does not hand the HCI reason to `gatt_client::run`.
const DISCONNECT_REASON_UNKNOWN: u8 = 0;

enum RadioCommand {
    Scan(ScanParams),
    Connect {
        address: PeerAddress,
        params: ConnParams,
    },
}

static RADIO: Channel<CriticalSectionRawMutex, RadioCommand, 2> = Channel::new();
static LINK_COMMANDS: LinkCommands<CriticalSectionRawMutex> = LinkCommands::new();
static LINK_UP: Signal<CriticalSectionRawMutex, Connection> = Signal::new();

/// Supervisor-side handle on the SoftDevice central role.
#[derive(Default)]
pub struct SoftdeviceCentral {
    gap: Option<GapClient>,
    device_info: Option<DeviceInfoClient>,
    battery: Option<BatteryClient>,
    hid: Option<HidClient>,
    watch: WatchList,
}

impl SoftdeviceCentral {
    pub fn new() -> Self {
        Self::default()
    }

    fn link() -> Result<Connection, BleError> {
        current_link()
            .filter(|conn| conn.handle().is_some())
            .ok_or(BleError::NotConnected)
    }

    async fn attribute(
        &mut self,
        conn: &Connection,
        characteristic: Characteristic,
    ) -> Result<Attribute, BleError> {
        let uuid = characteristic.uuid();
        let found = match characteristic.service() {
            uuid::GAP_SERVICE => service(&mut self.gap, conn).await?.find(uuid),
            uuid::DEVICE_INFO_SERVICE => service(&mut self.device_info, conn).await?.find(uuid),
            uuid::BATTERY_SERVICE => service(&mut self.battery, conn).await?.find(uuid),
            _ => service(&mut self.hid, conn).await?.find(uuid),
        };
        found.ok_or(BleError::NotFound)
    }

    async fn subscribe_reports(&mut self, conn: &Connection) -> Result<usize, BleError> {
        // Output and feature reports share the UUID but cannot notify.
        let reports: Vec<Attribute, 8> = service(&mut self.hid, conn)
            .await?
            .all(uuid::REPORT)
            .filter(|a| a.notify || a.indicate)
            .take(8)
            .copied()
            .collect();

        for report in &reports {
            match enable_cccd(conn, report).await {
                Ok(()) => {
                    info!("Subscribed to Report (handle {=u16:#x})", report.value_handle);
                    let _ = self.watch.reports.push(report.value_handle);
                }
                Err(BleError::NotConnected) => return Err(BleError::NotConnected),
                Err(e) => warn!("Report {=u16:#x}: {}", report.value_handle, e),
            }
        }

        if !LINK_COMMANDS.watch(self.watch.clone()) {
            warn!("Link task busy - notifications not routed");
        }
        Ok(self.watch.reports.len())
    }
}

async fn service<'a, const S: u16>(
    slot: &'a mut Option<ServiceClient<S>>,
    conn: &Connection,
) -> Result<&'a ServiceClient<S>, BleError> {
    if slot.is_none() {
        let client = gatt_client::discover::<ServiceClient<S>>(conn)
            .await
            .map_err(|e| match e {
                gatt_client::DiscoverError::ServiceNotFound => BleError::NotFound,
                _ if conn.handle().is_none() => BleError::NotConnected,
                _ => BleError::ReadFailed,
            })?;
        *slot = Some(client);
    }
    slot.as_ref().ok_or(BleError::NotFound)
}

impl Central for SoftdeviceCentral {
    async fn start_scan(&mut self, params: &ScanParams) -> Result<(), BleError> {
        RADIO
            .try_send(RadioCommand::Scan(*params))
            .map_err(|_| BleError::ScanFailed)
    }

    async fn connect(
        &mut self,
        peer: &PeripheralHandle,
        params: &ConnParams,
    ) -> Result<(), BleError> {
        // New peer: nothing discovered so far applies.
        *self = Self::default();
        RADIO
            .try_send(RadioCommand::Connect {
                address: peer.address,
                params: *params,
            })
            .map_err(|_| BleError::ConnectFailed)
    }

    /// The pairing policy itself is fixed by the security handler.
    async fn secure(&mut self, _params: &SecurityParams) -> Result<(), BleError> {
        let conn = Self::link()?;
        match conn.encrypt() {
            Ok(()) => info!("Re-encrypting with stored bond"),
            Err(EncryptError::PeerKeysNotFound) => {
                info!("No bond for peer, pairing");
                conn.request_pairing()
                    .map_err(|_| BleError::SecurityFailed)?;
            }
            Err(_) => return Err(BleError::SecurityFailed),
        }
        if LINK_COMMANDS.await_security() {
            Ok(())
        } else {
            Err(BleError::SecurityFailed)
        }
    }

    async fn confirm_passkey(&mut self, accept: bool) -> Result<(), BleError> {
        let handle = Self::link()?.handle().ok_or(BleError::NotConnected)?;
        let key_type = if accept {
            raw::BLE_GAP_AUTH_KEY_TYPE_PASSKEY
        } else {
            raw::BLE_GAP_AUTH_KEY_TYPE_NONE
        };
        // SAFETY: a null key confirms (or rejects) a numeric comparison.
        let ret = unsafe { raw::sd_ble_gap_auth_key_reply(handle, key_type as u8, core::ptr::null()) };
        if ret == raw::NRF_SUCCESS {
            Ok(())
        } else {
            Err(BleError::Raw(ret))
        }
    }

    async fn read(&mut self, characteristic: Characteristic) -> Result<AttValue, BleError> {
        let conn = Self::link()?;
        let attribute = self.attribute(&conn, characteristic).await?;
        let mut buf = [0u8; MAX_ATT_VALUE];
        let len = gatt_client::read(&conn, attribute.value_handle, &mut buf)
            .await
            .map_err(|e| match e {
                gatt_client::ReadError::Disconnected => BleError::NotConnected,
                _ => BleError::ReadFailed,
            })?;
        Vec::from_slice(&buf[..len]).map_err(|_| BleError::ReadFailed)
    }

    async fn subscribe(&mut self, characteristic: Characteristic) -> Result<usize, BleError> {
        let conn = Self::link()?;
        match characteristic {
            Characteristic::Report => self.subscribe_reports(&conn).await,
            Characteristic::BatteryLevel => {
                let attribute = self.attribute(&conn, characteristic).await?;
                enable_cccd(&conn, &attribute).await?;
                self.watch.battery = Some(attribute.value_handle);
                Ok(1)
            }
            _ => Err(BleError::NotifyUnsupported),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Radio task
// ═══════════════════════════════════════════════════════════════════════════

/// Execute scan and connect requests one at a time.
pub async fn run_radio(sd: &'static Softdevice) -> ! {
    let bonder = security::bonder();
    loop {
        match RADIO.receive().await {
            RadioCommand::Scan(params) => scan(sd, &params).await,
            RadioCommand::Connect { address, params } => connect(sd, bonder, address, &params).await,
        }
    }
}

async fn scan(sd: &Softdevice, params: &ScanParams) {
    info!("BLE scan starting ({} ms window)", params.duration_ms);

    let config = central::ScanConfig {
        active: params.active,
        interval: params.interval.into(),
        window: params.window.into(),
        // 10 ms units.
        timeout: (params.duration_ms / 10) as u16,
        ..Default::default()
    };

    let mut seen: Vec<Address, BLE_SCAN_DEDUP_CAPACITY> = Vec::new();
    let result = central::scan(sd, &config, |report| {
        let address = Address::from_raw(report.peer_addr);
        if params.filter_duplicates {
            if seen.contains(&address) {
                return None;
            }
            // Once the list is full every report gets through.
            let _ = seen.push(address);
        }

        // SAFETY: the SoftDevice guarantees `p_data` is valid for `len`
        // bytes for the duration of the callback.
        let data = unsafe { core::slice::from_raw_parts(report.data.p_data, report.data.len as usize) };
        let peer = PeerAddress::new(address.address_type() as u8, address.bytes());
        push_event(BridgeEvent::Discovered(PeripheralHandle::from_advertisement(
            peer,
            report.rssi,
            data,
        )));
        None::<()>
    })
    .await;

    match result {
        Ok(()) | Err(central::ScanError::Timeout) => {}
        Err(e) => warn!("BLE scan ended with error: {}", e),
    }
    info!("BLE scan complete - {} advertisers", seen.len());
    EVENTS.push(BridgeEvent::ScanEnded).await;
}

async fn connect(
    sd: &'static Softdevice,
    bonder: &'static security::Bonder,
    address: PeerAddress,
    params: &ConnParams,
) {
    let Ok(kind) = AddressType::try_from(address.kind) else {
        warn!("Unsupported address type {}", address.kind);
        EVENTS
            .push(BridgeEvent::ConnectFailed(BleError::ConnectFailed))
            .await;
        return;
    };
    let target = Address::new(kind, address.bytes);
    let whitelist = [&target];

    let config = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            timeout: (BLE_CONNECT_TIMEOUT_MS / 10) as u16,
            ..Default::default()
        },
        conn_params: raw::ble_gap_conn_params_t {
            min_conn_interval: params.min_interval,
            max_conn_interval: params.max_interval,
            slave_latency: params.slave_latency,
            conn_sup_timeout: params.supervision_timeout,
        },
        att_mtu: Some(BLE_ATT_MTU),
        ..Default::default()
    };

    match central::connect_with_security(sd, &config, bonder).await {
        Ok(conn) => {
            // Before `Connected`: the supervisor queues link commands as
            // soon as it sees it.
            LINK_COMMANDS.open();
            link_up(conn.clone());
            EVENTS.push(BridgeEvent::Connected).await;
            LINK_UP.signal(conn);
        }
        Err(e) => {
            warn!("Connect failed: {}", e);
            EVENTS
                .push(BridgeEvent::ConnectFailed(BleError::ConnectFailed))
                .await;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Link task
// ═══════════════════════════════════════════════════════════════════════════

/// Follow each connection from link-up to disconnect.
pub async fn run_link() -> ! {
    loop {
        let conn = LINK_UP.wait().await;

        if let Some(watch) = await_watch_list(&conn).await {
            forward_notifications(&conn, watch).await;
        }

        link_down();
        info!("BLE link closed");
        EVENTS
            .push(BridgeEvent::Disconnected {
                reason: DISCONNECT_REASON_UNKNOWN,
            })
            .await;
    }
}

/// Until discovery is over: watch for the disconnect and report the
/// pairing outcome.  Returns `None` if the link dropped first.
async fn await_watch_list(conn: &Connection) -> Option<WatchList> {
    let mut pairing = SecurityWatch::new();

    loop {
        match select(LINK_COMMANDS.receive(), Timer::after_millis(BLE_SECURITY_POLL_MS)).await {
            Either::First(LinkCommand::AwaitSecurity) => pairing.arm(BLE_SECURITY_POLL_STEPS),
            Either::First(LinkCommand::Watch(watch)) => return Some(watch),
            Either::Second(()) => {
                conn.handle()?;
                if let Some(encrypted) = pairing.poll(security::is_encrypted(conn)) {
                    EVENTS
                        .push(BridgeEvent::AuthenticationComplete { encrypted })
                        .await;
                }
            }
        }
    }
}

async fn forward_notifications(conn: &Connection, watch: WatchList) {
    info!(
        "Forwarding {} report handle(s), battery: {}",
        watch.reports.len(),
        watch.battery.is_some()
    );
    let router = NotificationRouter { watch };
    let _ = gatt_client::run(conn, &router, |notification| match notification {
        RoutedNotification::Report(data) => push_event(BridgeEvent::Notification {
            characteristic: Characteristic::Report,
            data,
        }),
        RoutedNotification::Battery(level) => push_event(BridgeEvent::BatteryUpdate { level }),
    })
    .await;
}
