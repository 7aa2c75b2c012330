//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! Each module carries two backends behind `cfg(target_os = "espidf")`: the
//! device implementation over raw ESP-IDF calls, and a host-side simulation
//! the test suite drives through a cloneable handle.
//!
//! | Adapter        | Implements        | Connects to                  |
//! |----------------|-------------------|------------------------------|
//! | `ble`          | BleBackend        | Bluedroid GATT server        |
//! | `espnow_radio` | EspNowRadioPort   | ESP-NOW peer table / send    |
//! | `nvs`          | StoragePort       | NVS flash / in-memory store  |
//! |                | ConfigPort        |                              |
//! | `ota_flash`    | OtaFlashPort      | Inactive app partition       |
//! | `rgbw_pwm`     | OutputPort        | LEDC channels 0-3            |
//! | `sysinfo`      | (free functions)  | Heap, MAC, restart           |
//! | `time`         | Esp32TimeAdapter  | esp_timer monotonic clock    |
//! | `voltage`      | VoltagePort       | ADC1 oneshot read            |
//! | `wifi`         | WifiRadioPort     | ESP-IDF Wi-Fi STA            |

pub mod ble;
pub mod espnow_radio;
pub mod nvs;
pub mod ota_flash;
pub mod rgbw_pwm;
pub mod sysinfo;
pub mod time;
pub mod voltage;
pub mod wifi;
