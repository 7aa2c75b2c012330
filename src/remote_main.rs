//! Battery remote firmware — main entry point.
//!
//! Same tick-loop skeleton as the controller binary, but the aggregate is
//! the much smaller [`Remote`]: button and encoder gestures out over
//! ESP-NOW, BLE for configuration and pairing, status pixel for feedback.
//!
//! [`Remote`]: rgbwctrl::app::remote::Remote

#![deny(unused_must_use)]

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use log::info;
    use rgbwctrl::adapters::ble::BluedroidBackend;
    use rgbwctrl::adapters::espnow_radio::EspNowRadio;
    use rgbwctrl::adapters::nvs::NvsAdapter;
    use rgbwctrl::adapters::sysinfo;
    use rgbwctrl::adapters::time::Esp32TimeAdapter;
    use rgbwctrl::adapters::wifi::EspWifiRadio;
    use rgbwctrl::app::remote::{Remote, RemotePorts};
    use rgbwctrl::drivers::hw_init;

    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("rgbw-ctrl v{} (remote)", env!("CARGO_PKG_VERSION"));

    if let Err(e) = hw_init::init_peripherals() {
        log::error!("peripheral init failed: {e} — halting");
        #[allow(clippy::empty_loop)]
        loop {}
    }

    let storage = match NvsAdapter::new() {
        Ok(nvs) => nvs,
        Err(e) => {
            log::warn!("NVS unavailable ({e}); nothing persists this session");
            NvsAdapter::new_sim()
        }
    };

    // The station interface carries no traffic on the remote; it exists so
    // ESP-NOW has a radio to attach to.
    let _wifi = EspWifiRadio::new().map_err(|e| anyhow::anyhow!("wifi init: {e}"))?;
    let espnow = EspNowRadio::new().map_err(|e| anyhow::anyhow!("espnow init: {e}"))?;

    let mut remote = Remote::new(RemotePorts {
        storage,
        mac: sysinfo::read_mac(),
        ble: Box::new(BluedroidBackend::new()),
        espnow: Box::new(espnow),
    });

    let time = Esp32TimeAdapter::new();
    let tick_ms = remote.config().tick_interval_ms;

    remote.boot(time.now_ms());
    info!("entering tick loop ({tick_ms} ms)");

    loop {
        remote.tick(time.now_ms());
        std::thread::sleep(std::time::Duration::from_millis(u64::from(tick_ms)));
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("rgbwctrl-remote runs on ESP32-S3 hardware; use `cargo test` on the host");
}
