//! Light controller firmware — main entry point.
//!
//! Hexagonal layout: every peripheral and radio reaches the application
//! through a port trait, and the [`Controller`] aggregate runs the whole
//! device from one cooperative tick loop.
//!
//! ```text
//!   Bluedroid GATT ─┐                      ┌─ LEDC PWM (RGBW + board LED)
//!   ESP-NOW recv  ──┤  event queue         ├─ NVS persistence
//!   Wi-Fi events  ──┴──▶ Controller::tick ─┼─ BLE notifies
//!   button/encoder ────▶ (10 ms)           ├─ WebSocket fanout
//!                                          └─ ESP-NOW announce
//! ```
//!
//! [`Controller`]: rgbwctrl::app::controller::Controller

#![deny(unused_must_use)]

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use log::{info, warn};
    use rgbwctrl::adapters::ble::BluedroidBackend;
    use rgbwctrl::adapters::espnow_radio::EspNowRadio;
    use rgbwctrl::adapters::nvs::NvsAdapter;
    use rgbwctrl::adapters::ota_flash::EspOtaFlash;
    use rgbwctrl::adapters::rgbw_pwm::LedcPwm;
    use rgbwctrl::adapters::time::Esp32TimeAdapter;
    use rgbwctrl::adapters::voltage::AdcVoltageSense;
    use rgbwctrl::adapters::wifi::EspWifiRadio;
    use rgbwctrl::adapters::sysinfo;
    use rgbwctrl::app::controller::{Controller, ControllerPorts};
    use rgbwctrl::drivers::hw_init;
    use rgbwctrl::error::TransportError;
    use rgbwctrl::fanout::{ClientId, FanoutSink};

    /// Stands in for the HTTP server's WebSocket hub. The hub treats a
    /// sink with zero clients as "nothing to push".
    struct IdleFanout;

    impl FanoutSink for IdleFanout {
        fn broadcast(&mut self, _frame: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
        fn unicast(&mut self, _client: ClientId, _frame: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
        fn send_text(&mut self, _client: ClientId, _text: &str) -> Result<(), TransportError> {
            Ok(())
        }
        fn client_count(&self) -> usize {
            0
        }
    }

    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("rgbw-ctrl v{} (controller)", env!("CARGO_PKG_VERSION"));

    if let Err(e) = hw_init::init_peripherals() {
        // Without peripherals there is nothing to run; the task watchdog
        // resets the chip out of this loop.
        log::error!("peripheral init failed: {e} — halting");
        #[allow(clippy::empty_loop)]
        loop {}
    }

    let storage = match NvsAdapter::new() {
        Ok(nvs) => nvs,
        Err(e) => {
            warn!("NVS unavailable ({e}); nothing persists this session");
            NvsAdapter::new_sim()
        }
    };

    // The Wi-Fi driver must be up before ESP-NOW can attach to the
    // station interface.
    let wifi = EspWifiRadio::new().map_err(|e| anyhow::anyhow!("wifi init: {e}"))?;
    let espnow = EspNowRadio::new().map_err(|e| anyhow::anyhow!("espnow init: {e}"))?;

    let mut controller = Controller::new(ControllerPorts {
        storage,
        mac: sysinfo::read_mac(),
        output: Box::new(LedcPwm::new()),
        voltage: Box::new(AdcVoltageSense::new()),
        wifi: Box::new(wifi),
        ble: Box::new(BluedroidBackend::new()),
        espnow: Box::new(espnow),
        ota_flash: Box::new(EspOtaFlash::new()),
        ws_sink: Box::new(IdleFanout),
    });

    let time = Esp32TimeAdapter::new();
    let tick_ms = controller.config().tick_interval_ms;

    controller.boot(time.now_ms());
    info!("entering tick loop ({tick_ms} ms)");

    loop {
        controller.tick(time.now_ms());
        std::thread::sleep(std::time::Duration::from_millis(u64::from(tick_ms)));
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    // The firmware entry point only makes sense on the device; host builds
    // exercise the library and its simulation adapters through the tests.
    eprintln!("rgbwctrl runs on ESP32-S3 hardware; use `cargo test` on the host");
}
