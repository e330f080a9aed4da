//! GPIO button input with async debouncing.
//!
//! Two physical buttons (active-low with internal pull-up):
//!   - A - device 1
//!   - B - device 2
//!
//! Each button is handled by an async task that waits for a GPIO edge,
//! debounces it, and queues the device id. The coordinator drains the
//! queue through [`ChannelInput`] once per loop tick.

use defmt::{info, warn};
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::{Duration, Timer};

use signal_bridge::config::BUTTON_DEBOUNCE_MS;
use signal_bridge::LocalInput;

/// Presses not yet picked up by the coordinator.
pub const PRESS_QUEUE: usize = 4;

pub type PressChannel = Channel<CriticalSectionRawMutex, i64, PRESS_QUEUE>;

/// Run a single button polling loop.
///
/// Waits for the pin to go low (pressed), debounces, queues the device id,
/// then waits for release before repeating. A full queue drops the press.
pub async fn button_task(
    pin: AnyPin,
    device_id: i64,
    tx: Sender<'static, CriticalSectionRawMutex, i64, PRESS_QUEUE>,
) -> ! {
    let mut btn = Input::new(pin, Pull::Up);

    loop {
        btn.wait_for_falling_edge().await;
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        if btn.is_low() {
            info!("Button: device {}", device_id);
            if tx.try_send(device_id).is_err() {
                warn!("Button: queue full, press dropped");
            }

            btn.wait_for_rising_edge().await;
            Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;
        }
    }
}

/// Coordinator side of the press queue.
pub struct ChannelInput {
    rx: Receiver<'static, CriticalSectionRawMutex, i64, PRESS_QUEUE>,
}

impl ChannelInput {
    pub fn new(rx: Receiver<'static, CriticalSectionRawMutex, i64, PRESS_QUEUE>) -> Self {
        Self { rx }
    }
}

impl LocalInput for ChannelInput {
    fn take_pressed(&mut self) -> Option<i64> {
        self.rx.try_receive().ok()
    }
}
