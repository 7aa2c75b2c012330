//! Callback-to-tick event queue.
//!
//! ESP-IDF delivers radio traffic on its own tasks: ESP-NOW frames arrive on
//! the Wi-Fi task, GATT writes and connection changes on the Bluedroid task.
//! None of those contexts may touch the state owners, so callbacks push an
//! [`Event`] here and the main loop drains the queue at the top of each tick.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ ESP-NOW recv cb  │────▶│              │     │              │
//! │ GATTS write cb   │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Wi-Fi event cb   │────▶│  (static)    │     │  (consumer)  │
//! └──────────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Producers run on FreeRTOS tasks, never ISRs, so a `std::sync::Mutex`
//! around a fixed-capacity deque is safe and keeps payloads heap-free.

use crate::transport::ble::Characteristic;
use crate::wire::MAX_FRAME_LEN;

/// Maximum number of pending events; later pushes are dropped.
const EVENT_QUEUE_CAP: usize = 16;

/// Largest inbound GATT value (a tagged connection-details frame).
pub const MAX_GATT_WRITE: usize = MAX_FRAME_LEN;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// ESP-NOW frame received (allow-list not yet checked).
    EspNowFrame {
        sender: [u8; 6],
        payload: heapless::Vec<u8, 8>,
    },
    /// A client wrote a characteristic value.
    GattWrite {
        characteristic: Characteristic,
        payload: heapless::Vec<u8, MAX_GATT_WRITE>,
    },
    /// The connected central dropped the link.
    BleDisconnected,
    /// Wi-Fi stack status change.
    WifiStatus(crate::state::wifi::WifiStatus),
    /// Station got an IP lease.
    WifiGotIp(crate::state::wifi::WifiDetails),
}

static QUEUE: std::sync::Mutex<heapless::Deque<Event, EVENT_QUEUE_CAP>> =
    std::sync::Mutex::new(heapless::Deque::new());

/// Push an event. Returns `false` when the queue is full (event dropped).
pub fn push(event: Event) -> bool {
    let Ok(mut queue) = QUEUE.lock() else {
        return false;
    };
    queue.push_back(event).is_ok()
}

/// Pop the oldest pending event. Main-loop side.
pub fn pop() -> Option<Event> {
    QUEUE.lock().ok()?.pop_front()
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop() {
        handler(event);
    }
}

pub fn len() -> usize {
    QUEUE.lock().map(|queue| queue.len()).unwrap_or(0)
}
