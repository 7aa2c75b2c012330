//! ESP-NOW pairing state.
//!
//! Controller side: a roster of up to ten paired remotes acting as the
//! receive allow-list. Remote side: the single controller MAC commands are
//! sent to. Both are persisted as raw blobs.

use crate::app::ports::StoragePort;
use crate::persist;

pub const MAX_REMOTE_DEVICES: usize = 10;
/// Wire size of the name field, terminator included.
pub const NAME_FIELD_LEN: usize = 24;
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// One paired remote.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EspNowDevice {
    pub name: heapless::String<MAX_NAME_LEN>,
    pub mac: [u8; 6],
}

// ── controller side ──────────────────────────────────────────────

/// Allow-list of paired remotes. Frames from any other MAC are dropped
/// before their payload is even looked at.
#[derive(Default)]
pub struct EspNowRoster {
    devices: heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES>,
}

impl EspNowRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES> {
        &self.devices
    }

    pub fn is_allowed(&self, mac: &[u8; 6]) -> bool {
        self.devices.iter().any(|d| &d.mac == mac)
    }

    /// Replace the roster and persist it.
    pub fn apply(
        &mut self,
        devices: heapless::Vec<EspNowDevice, MAX_REMOTE_DEVICES>,
        storage: &mut dyn StoragePort,
    ) {
        self.devices = devices;
        if let Err(e) = persist::save_roster(storage, &self.devices) {
            log::warn!("espnow: persisting roster failed: {e}");
        }
        log::info!("espnow: roster updated, {} remotes", self.devices.len());
    }

    pub fn restore(&mut self, storage: &dyn StoragePort) {
        if let Some(devices) = persist::load_roster(storage) {
            self.devices = devices;
        }
    }
}

// ── remote side ──────────────────────────────────────────────────

/// The one controller this remote talks to.
#[derive(Default)]
pub struct PeerAddress {
    mac: [u8; 6],
}

impl PeerAddress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    /// A pairing is valid only when every byte is nonzero.
    pub fn is_paired(&self) -> bool {
        self.mac.iter().all(|b| *b != 0)
    }

    pub fn set(&mut self, mac: [u8; 6], storage: &mut dyn StoragePort) {
        self.mac = mac;
        if let Err(e) = persist::save_controller_mac(storage, &mac) {
            log::warn!("espnow: persisting controller MAC failed: {e}");
        }
        log::info!(
            "espnow: paired controller {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            mac[0],
            mac[1],
            mac[2],
            mac[3],
            mac[4],
            mac[5]
        );
    }

    /// Restore from storage; a blob of any other length is ignored.
    pub fn restore(&mut self, storage: &dyn StoragePort) {
        if let Some(mac) = persist::load_controller_mac(storage) {
            self.mac = mac;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;

    fn device(name: &str, mac: [u8; 6]) -> EspNowDevice {
        EspNowDevice {
            name: heapless::String::try_from(name).unwrap(),
            mac,
        }
    }

    #[test]
    fn allow_list_matches_exact_mac_only() {
        let mut roster = EspNowRoster::new();
        let mut nvs = NvsAdapter::new_sim();
        let mut devices = heapless::Vec::new();
        devices.push(device("kitchen", [1, 2, 3, 4, 5, 6])).unwrap();
        roster.apply(devices, &mut nvs);

        assert!(roster.is_allowed(&[1, 2, 3, 4, 5, 6]));
        assert!(!roster.is_allowed(&[1, 2, 3, 4, 5, 7]));
    }

    #[test]
    fn roster_round_trips_through_storage() {
        let mut nvs = NvsAdapter::new_sim();
        {
            let mut roster = EspNowRoster::new();
            let mut devices = heapless::Vec::new();
            devices.push(device("a", [1; 6])).unwrap();
            devices.push(device("b", [2; 6])).unwrap();
            roster.apply(devices, &mut nvs);
        }
        let mut restored = EspNowRoster::new();
        restored.restore(&nvs);
        assert_eq!(restored.devices().len(), 2);
        assert_eq!(restored.devices()[1].name.as_str(), "b");
        assert!(restored.is_allowed(&[1; 6]));
    }

    #[test]
    fn pairing_requires_every_byte_nonzero() {
        let mut peer = PeerAddress::new();
        assert!(!peer.is_paired());
        let mut nvs = NvsAdapter::new_sim();
        peer.set([0xAA, 0, 0xBB, 1, 2, 3], &mut nvs);
        assert!(!peer.is_paired(), "a zero byte anywhere is unpaired");
        peer.set([0xAA, 0xBB, 0xCC, 1, 2, 3], &mut nvs);
        assert!(peer.is_paired());
    }

    #[test]
    fn controller_mac_round_trips_through_storage() {
        let mut nvs = NvsAdapter::new_sim();
        {
            let mut peer = PeerAddress::new();
            peer.set([9, 8, 7, 6, 5, 4], &mut nvs);
        }
        let mut restored = PeerAddress::new();
        restored.restore(&nvs);
        assert_eq!(restored.mac(), [9, 8, 7, 6, 5, 4]);
    }
}
