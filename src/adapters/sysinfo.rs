//! System information and chip control.
//!
//! Free-heap telemetry, the station MAC (seed for the default device name
//! and the ESP-NOW identity) and the restart primitive.

#[cfg(not(target_os = "espidf"))]
const SIM_MAC: [u8; 6] = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE];

/// Free heap in bytes.
#[cfg(target_os = "espidf")]
pub fn free_heap() -> u32 {
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

#[cfg(not(target_os = "espidf"))]
pub fn free_heap() -> u32 {
    220_000
}

/// Station MAC address.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> [u8; 6] {
    let mut mac = [0u8; 6];
    // SAFETY: esp_read_mac writes exactly 6 bytes for the WIFI_STA type.
    unsafe {
        esp_idf_svc::sys::esp_read_mac(
            mac.as_mut_ptr(),
            esp_idf_svc::sys::esp_mac_type_t_ESP_MAC_WIFI_STA,
        );
    }
    mac
}

#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> [u8; 6] {
    SIM_MAC
}

/// Reboot the chip. On the host this only logs, so tests that reach a
/// restart path keep running.
#[cfg(target_os = "espidf")]
pub fn restart() {
    log::warn!("sysinfo: restarting");
    unsafe { esp_idf_svc::sys::esp_restart() };
}

#[cfg(not(target_os = "espidf"))]
pub fn restart() {
    log::warn!("sysinfo(sim): restart requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_mac_is_stable_and_nonzero() {
        let mac = read_mac();
        assert_eq!(mac, read_mac());
        assert!(mac.iter().any(|b| *b != 0));
    }
}
