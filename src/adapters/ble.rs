//! BLE GATT backend adapter.
//!
//! Implements [`BleBackend`] — the boundary the BLE transport controller
//! drives.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw
//!   `esp_idf_svc::sys` calls. Services and characteristics are registered
//!   sequentially from the GATTS callback, one `ADD_CHAR` event at a time.
//! - **all other targets**: [`SimBleBackend`], an in-memory stack whose
//!   [`SimBleHandle`] lets tests play the central side (connect, disconnect,
//!   fail a notify) and inspect everything the firmware pushed.
//!
//! Characteristic values carry the same tagged frames as the WebSocket, so
//! a client can share one decoder across both transports.

use crate::transport::ble::{BleBackend, Characteristic, Service};
use crate::error::TransportError;

// ── GATT layout ──────────────────────────────────────────────────

/// Registration order: every characteristic under its owning service.
#[allow(dead_code)]
const GATT_LAYOUT: [(Service, Characteristic); 14] = [
    (Service::Device, Characteristic::Restart),
    (Service::Device, Characteristic::DeviceName),
    (Service::Device, Characteristic::FirmwareVersion),
    (Service::Device, Characteristic::Heap),
    (Service::Device, Characteristic::Voltage),
    (Service::Http, Characteristic::HttpCredentials),
    (Service::Output, Characteristic::OutputColor),
    (Service::Alexa, Characteristic::AlexaSettings),
    (Service::EspNowController, Characteristic::EspNowRemotes),
    (Service::EspNowRemote, Characteristic::EspNowController),
    (Service::Wifi, Characteristic::WifiDetails),
    (Service::Wifi, Characteristic::WifiStatus),
    (Service::Wifi, Characteristic::WifiScanStatus),
    (Service::Wifi, Characteristic::WifiScanResult),
];

fn layout_index(characteristic: Characteristic) -> usize {
    GATT_LAYOUT
        .iter()
        .position(|(_, c)| *c == characteristic)
        .unwrap_or(0)
}

/// Parse a canonical UUID string into the 16-byte little-endian form the
/// Bluedroid API expects.
#[allow(dead_code)]
fn uuid128_le(uuid: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut nibbles = uuid.bytes().filter_map(|b| match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    });
    for i in 0..16 {
        let hi = nibbles.next().unwrap_or(0);
        let lo = nibbles.next().unwrap_or(0);
        // Bluedroid wants the UUID reversed.
        out[15 - i] = (hi << 4) | lo;
    }
    out
}

// ── ESP-IDF backend ──────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These atomics bridge the callback context to the adapter;
// inbound GATT writes are pushed onto the event queue and drained from
// the tick loop.

#[cfg(target_os = "espidf")]
mod espidf {
    use super::*;
    use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use esp_idf_svc::sys::*;
    use log::{error, info, warn};

    static GATTS_IF: AtomicU32 = AtomicU32::new(0);
    static CONN_ID: AtomicU32 = AtomicU32::new(0);
    static CONNECTED: AtomicUsize = AtomicUsize::new(0);
    /// Next GATT_LAYOUT entry to register.
    static REG_STEP: AtomicUsize = AtomicUsize::new(0);
    static SERVICE_HANDLE: AtomicU32 = AtomicU32::new(0);
    static CHAR_HANDLES: [AtomicU32; 14] = [const { AtomicU32::new(0) }; 14];

    fn create_service(gatts_if: esp_gatt_if_t, service: Service) {
        let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        uuid.len = 16;
        uuid.uuid.uuid128 = uuid128_le(service.uuid());
        let mut svc_id = esp_gatt_srvc_id_t {
            id: esp_gatt_id_t { uuid, inst_id: 0 },
            is_primary: true,
        };
        // Handle budget: service + (decl + value) per characteristic.
        unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 12) };
    }

    fn add_char(service_handle: u16, characteristic: Characteristic) {
        let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        uuid.len = 16;
        uuid.uuid.uuid128 = uuid128_le(characteristic.uuid());
        let perm = (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t;
        let prop = (ESP_GATT_CHAR_PROP_BIT_READ
            | ESP_GATT_CHAR_PROP_BIT_WRITE
            | ESP_GATT_CHAR_PROP_BIT_NOTIFY) as esp_gatt_char_prop_t;
        unsafe {
            esp_ble_gatts_add_char(
                service_handle,
                &mut uuid,
                perm,
                prop,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    /// Register the next layout entry; creates the next service first when
    /// the owning service changes.
    fn register_next(gatts_if: esp_gatt_if_t) {
        let step = REG_STEP.load(Ordering::Relaxed);
        let Some((service, _)) = GATT_LAYOUT.get(step) else {
            info!("ble: all GATT characteristics registered");
            return;
        };
        let new_service = step == 0 || GATT_LAYOUT[step - 1].0 != *service;
        if new_service {
            create_service(gatts_if, *service);
        } else {
            add_char(SERVICE_HANDLE.load(Ordering::Relaxed) as u16, GATT_LAYOUT[step].1);
        }
    }

    unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                info!("ble: advertising started");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                info!("ble: advertising stopped");
            }
            _ => {}
        }
    }

    unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        GATTS_IF.store(gatts_if as u32, Ordering::Relaxed);

        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                REG_STEP.store(0, Ordering::Relaxed);
                register_next(gatts_if);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let p = unsafe { &(*param).create };
                SERVICE_HANDLE.store(p.service_handle as u32, Ordering::Relaxed);
                unsafe { esp_ble_gatts_start_service(p.service_handle) };
                let step = REG_STEP.load(Ordering::Relaxed);
                if let Some((_, characteristic)) = GATT_LAYOUT.get(step) {
                    add_char(p.service_handle, *characteristic);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let p = unsafe { &(*param).add_char };
                let step = REG_STEP.load(Ordering::Relaxed);
                if let Some(slot) = CHAR_HANDLES.get(step) {
                    slot.store(p.attr_handle as u32, Ordering::Relaxed);
                }
                REG_STEP.store(step + 1, Ordering::Relaxed);
                register_next(gatts_if);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let p = unsafe { &(*param).connect };
                CONN_ID.store(p.conn_id as u32, Ordering::Relaxed);
                CONNECTED.fetch_add(1, Ordering::Relaxed);
                info!("ble: central connected (conn_id={})", p.conn_id);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                CONNECTED.store(0, Ordering::Relaxed);
                info!("ble: central disconnected");
                crate::events::push(crate::events::Event::BleDisconnected);
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
                let handle = p.handle as u32;
                for (i, slot) in CHAR_HANDLES.iter().enumerate() {
                    if slot.load(Ordering::Relaxed) == handle {
                        let mut payload = heapless::Vec::new();
                        if payload.extend_from_slice(data).is_err() {
                            warn!("ble: oversized write ({} bytes) dropped", data.len());
                            return;
                        }
                        crate::events::push(crate::events::Event::GattWrite {
                            characteristic: GATT_LAYOUT[i].1,
                            payload,
                        });
                        return;
                    }
                }
            }
            _ => {}
        }
    }

    /// Bluedroid-backed [`BleBackend`].
    pub struct BluedroidBackend {
        manufacturer_data: [u8; 4],
    }

    impl BluedroidBackend {
        pub fn new() -> Self {
            Self {
                manufacturer_data: [0; 4],
            }
        }
    }

    impl Default for BluedroidBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BleBackend for BluedroidBackend {
        fn power_on(&mut self, device_name: &str) -> Result<(), TransportError> {
            unsafe {
                // BLE-only mode releases the classic BT memory.
                esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

                let mut bt_cfg = esp_bt_controller_config_t::default();
                if esp_bt_controller_init(&mut bt_cfg) != ESP_OK {
                    error!("ble: bt_controller_init failed");
                    return Err(TransportError::NotReady);
                }
                if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK {
                    error!("ble: bt_controller_enable failed");
                    return Err(TransportError::NotReady);
                }
                if esp_bluedroid_init() != ESP_OK || esp_bluedroid_enable() != ESP_OK {
                    error!("ble: bluedroid init failed");
                    return Err(TransportError::NotReady);
                }

                esp_ble_gap_register_callback(Some(gap_event_handler));
                esp_ble_gatts_register_callback(Some(gatts_event_handler));
                esp_ble_gatts_app_register(0);

                let mut name_buf = [0u8; 32];
                let nb = device_name.as_bytes();
                let nl = nb.len().min(31);
                name_buf[..nl].copy_from_slice(&nb[..nl]);
                esp_ble_gap_set_device_name(name_buf.as_ptr() as *const _);
            }
            Ok(())
        }

        fn start_advertising(&mut self, manufacturer_data: [u8; 4]) -> Result<(), TransportError> {
            self.manufacturer_data = manufacturer_data;
            unsafe {
                let mut adv_data: esp_ble_adv_data_t = core::mem::zeroed();
                adv_data.set_type = false;
                adv_data.include_name = true;
                adv_data.manufacturer_len = self.manufacturer_data.len() as i32;
                adv_data.p_manufacturer_data = self.manufacturer_data.as_mut_ptr();
                adv_data.flag = (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8;
                if esp_ble_gap_config_adv_data(&mut adv_data) != ESP_OK {
                    return Err(TransportError::NotReady);
                }

                let mut adv_params = esp_ble_adv_params_t {
                    adv_int_min: 0x20,
                    adv_int_max: 0x40,
                    adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                    own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                    channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                    adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                    ..core::mem::zeroed()
                };
                if esp_ble_gap_start_advertising(&mut adv_params) != ESP_OK {
                    return Err(TransportError::NotReady);
                }
            }
            Ok(())
        }

        fn connected_count(&self) -> usize {
            CONNECTED.load(Ordering::Relaxed)
        }

        fn notify(
            &mut self,
            characteristic: Characteristic,
            value: &[u8],
        ) -> Result<(), TransportError> {
            let handle = CHAR_HANDLES[layout_index(characteristic)].load(Ordering::Relaxed);
            if handle == 0 || CONNECTED.load(Ordering::Relaxed) == 0 {
                return Err(TransportError::NotReady);
            }
            let ret = unsafe {
                esp_ble_gatts_send_indicate(
                    GATTS_IF.load(Ordering::Relaxed) as u8,
                    CONN_ID.load(Ordering::Relaxed) as u16,
                    handle as u16,
                    value.len() as u16,
                    value.as_ptr() as *mut u8,
                    false,
                )
            };
            if ret == ESP_OK {
                Ok(())
            } else {
                Err(TransportError::NotifyFailed)
            }
        }

        fn disconnect_all(&mut self) {
            // The stack drops the link on deinit; nothing to do per-client.
            CONNECTED.store(0, Ordering::Relaxed);
        }

        fn power_off(&mut self) {
            unsafe {
                esp_ble_gap_stop_advertising();
                esp_bluedroid_disable();
                esp_bluedroid_deinit();
                esp_bt_controller_disable();
                esp_bt_controller_deinit();
            }
            REG_STEP.store(0, Ordering::Relaxed);
            for slot in &CHAR_HANDLES {
                slot.store(0, Ordering::Relaxed);
            }
            info!("ble: stack shut down");
        }
    }
}

#[cfg(target_os = "espidf")]
pub use espidf::BluedroidBackend;

// ── simulation backend ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct SimBleState {
        powered: bool,
        advertising: bool,
        device_name: String,
        manufacturer_data: [u8; 4],
        connected: usize,
        fail_next_notify: bool,
        notifies: Vec<(Characteristic, Vec<u8>)>,
    }

    /// In-memory BLE stack. [`handle()`](SimBleBackend::handle) yields the
    /// central's side of the link.
    pub struct SimBleBackend {
        state: Rc<RefCell<SimBleState>>,
    }

    impl SimBleBackend {
        pub fn new() -> Self {
            Self {
                state: Rc::new(RefCell::new(SimBleState::default())),
            }
        }

        pub fn handle(&self) -> SimBleHandle {
            SimBleHandle {
                state: Rc::clone(&self.state),
            }
        }
    }

    impl Default for SimBleBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BleBackend for SimBleBackend {
        fn power_on(&mut self, device_name: &str) -> Result<(), TransportError> {
            let mut state = self.state.borrow_mut();
            state.powered = true;
            state.device_name = device_name.to_string();
            Ok(())
        }

        fn start_advertising(&mut self, manufacturer_data: [u8; 4]) -> Result<(), TransportError> {
            let mut state = self.state.borrow_mut();
            if !state.powered {
                return Err(TransportError::NotReady);
            }
            state.advertising = true;
            state.manufacturer_data = manufacturer_data;
            Ok(())
        }

        fn connected_count(&self) -> usize {
            self.state.borrow().connected
        }

        fn notify(
            &mut self,
            characteristic: Characteristic,
            value: &[u8],
        ) -> Result<(), TransportError> {
            let mut state = self.state.borrow_mut();
            if !state.powered {
                return Err(TransportError::NotReady);
            }
            if state.fail_next_notify {
                state.fail_next_notify = false;
                return Err(TransportError::NotifyFailed);
            }
            state.notifies.push((characteristic, value.to_vec()));
            Ok(())
        }

        fn disconnect_all(&mut self) {
            self.state.borrow_mut().connected = 0;
        }

        fn power_off(&mut self) {
            let mut state = self.state.borrow_mut();
            state.powered = false;
            state.advertising = false;
            state.connected = 0;
        }
    }

    /// The central's side of the simulated link.
    #[derive(Clone)]
    pub struct SimBleHandle {
        state: Rc<RefCell<SimBleState>>,
    }

    impl SimBleHandle {
        pub fn connect_central(&self) {
            self.state.borrow_mut().connected += 1;
        }

        pub fn disconnect_central(&self) {
            let mut state = self.state.borrow_mut();
            state.connected = state.connected.saturating_sub(1);
        }

        /// The next notify on any characteristic fails once.
        pub fn fail_next_notify(&self) {
            self.state.borrow_mut().fail_next_notify = true;
        }

        pub fn notify_count(&self, characteristic: Characteristic) -> usize {
            self.state
                .borrow()
                .notifies
                .iter()
                .filter(|(c, _)| *c == characteristic)
                .count()
        }

        /// Last payload pushed to a characteristic.
        pub fn last_notify(&self, characteristic: Characteristic) -> Option<Vec<u8>> {
            self.state
                .borrow()
                .notifies
                .iter()
                .rev()
                .find(|(c, _)| *c == characteristic)
                .map(|(_, v)| v.clone())
        }

        pub fn is_advertising(&self) -> bool {
            self.state.borrow().advertising && self.state.borrow().powered
        }

        pub fn manufacturer_data(&self) -> [u8; 4] {
            self.state.borrow().manufacturer_data
        }

        pub fn device_name(&self) -> String {
            self.state.borrow().device_name.clone()
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimBleBackend, SimBleHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_parses_little_endian() {
        let bytes = uuid128_le("aaaaaaaa-bbbb-cccc-dddd-eeeeeeee0001");
        assert_eq!(bytes[0], 0x01, "last UUID byte comes first");
        assert_eq!(bytes[15], 0xAA);
    }

    #[test]
    fn layout_covers_every_characteristic() {
        // One entry per Characteristic variant, no duplicates.
        for (i, (_, c)) in GATT_LAYOUT.iter().enumerate() {
            assert_eq!(layout_index(*c), i);
        }
    }

    #[test]
    fn sim_backend_rejects_use_while_off() {
        let mut backend = SimBleBackend::new();
        assert!(backend.start_advertising([0; 4]).is_err());
        assert!(backend.notify(Characteristic::Heap, &[0]).is_err());
    }

    #[test]
    fn sim_handle_sees_pushed_values() {
        let mut backend = SimBleBackend::new();
        let handle = backend.handle();
        backend.power_on("lamp").unwrap();
        backend.start_advertising([1, 2, 3, 4]).unwrap();
        handle.connect_central();

        backend.notify(Characteristic::Heap, &[9, 9]).unwrap();
        assert_eq!(handle.notify_count(Characteristic::Heap), 1);
        assert_eq!(handle.last_notify(Characteristic::Heap), Some(vec![9, 9]));
        assert_eq!(handle.manufacturer_data(), [1, 2, 3, 4]);
        assert_eq!(handle.device_name(), "lamp");
    }

    #[test]
    fn sim_notify_failure_is_one_shot() {
        let mut backend = SimBleBackend::new();
        let handle = backend.handle();
        backend.power_on("lamp").unwrap();
        handle.fail_next_notify();
        assert!(backend.notify(Characteristic::Heap, &[0]).is_err());
        assert!(backend.notify(Characteristic::Heap, &[0]).is_ok());
    }
}
