//! Pairing and bonding.
//!
//! Bonds live in RAM only; a power cycle forgets them and the peer is
//! paired again on the next connection.  Numeric-comparison requests are
//! turned into `PasskeyRequested` events and answered by the supervisor.

use core::cell::RefCell;

use defmt::{info, warn};
use heapless::Vec;
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{Connection, EncryptionInfo, IdentityKey, MasterId, SecurityMode};
use static_cell::StaticCell;

use hogp_bridge::ble::IoCapability;
use hogp_bridge::config::{BLE_MAX_BONDS, SECURITY};
use hogp_bridge::BridgeEvent;

use super::push_event;

struct PeerBond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
}

pub struct Bonder {
    peers: RefCell<Vec<PeerBond, BLE_MAX_BONDS>>,
}

impl Bonder {
    fn new() -> Self {
        Self {
            peers: RefCell::new(Vec::new()),
        }
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        match SECURITY.io_capability {
            IoCapability::NoInputNoOutput => IoCapabilities::None,
            IoCapability::DisplayOnly => IoCapabilities::DisplayOnly,
            IoCapability::DisplayYesNo => IoCapabilities::DisplayYesNo,
        }
    }

    fn request_mitm_protection(&self) -> bool {
        SECURITY.mitm
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        SECURITY.bond
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        let value = passkey
            .iter()
            .fold(0u32, |acc, digit| acc * 10 + u32::from(digit.wrapping_sub(b'0') % 10));
        push_event(BridgeEvent::PasskeyRequested { passkey: value });
    }

    fn on_bonded(
        &self,
        _conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        info!("Bonded with peer");
        let mut peers = self.peers.borrow_mut();
        if let Some(existing) = peers.iter_mut().find(|p| p.master_id == master_id) {
            existing.key = key;
            existing.peer_id = peer_id;
            return;
        }

        if peers.is_full() {
            peers.remove(0);
        }

        let _ = peers.push(PeerBond {
            master_id,
            key,
            peer_id,
        });
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.peers
            .borrow()
            .iter()
            .find_map(|p| (p.master_id == master_id).then_some(p.key))
    }

    fn get_peripheral_key(&self, conn: &Connection) -> Option<(MasterId, EncryptionInfo)> {
        self.peers.borrow().iter().find_map(|p| {
            p.peer_id
                .is_match(conn.peer_address())
                .then_some((p.master_id, p.key))
        })
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        match mode {
            SecurityMode::NoAccess | SecurityMode::Open => warn!("BLE security mode: {}", mode),
            _ => info!("BLE security mode: {}", mode),
        }
    }
}

pub fn bonder() -> &'static Bonder {
    static BONDER: StaticCell<Bonder> = StaticCell::new();
    BONDER.init(Bonder::new())
}

/// Whether the link has reached an encrypted security mode.
pub fn is_encrypted(conn: &Connection) -> bool {
    !matches!(conn.security_mode(), SecurityMode::NoAccess | SecurityMode::Open)
}
