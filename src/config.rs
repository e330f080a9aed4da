//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters, protocol constants, and indicator colors live
//! here so they can be tuned in one place. [`BridgeConfig`] bundles the
//! runtime-relevant subset for the [`Coordinator`](crate::coordinator::Coordinator).

use core::time::Duration;

use crate::indicator::Rgb;
use crate::network::RetryPolicy;
use crate::signal::DeviceMapping;

// Network

/// Number of join attempts before the bridge gives up and restarts.
pub const WIFI_MAX_ATTEMPTS: u8 = 3;

/// Pause between failed join attempts (ms).
pub const WIFI_RETRY_BACKOFF_MS: u64 = 2_000;

/// How long a single join attempt may take before it counts as failed (ms).
pub const WIFI_JOIN_TIMEOUT_MS: u64 = 10_000;

/// Host used for the optional reachability probe after joining.
pub const PROBE_HOST: &str = "wifitest.adafruit.com";

// HTTP control server

/// TCP port of the control server.
pub const HTTP_PORT: u16 = 80;

/// Largest request (head + body) the server will buffer.
pub const HTTP_MAX_REQUEST: usize = 1024;

/// Maximum number of request headers parsed.
pub const HTTP_MAX_HEADERS: usize = 16;

/// Server polls a client gets to deliver a complete request before it is
/// answered with 408. At the serve period this is about three seconds.
pub const HTTP_REQUEST_POLLS: u16 = 300;

// Coordinator timing

/// Loop period while serving requests (ms).
pub const SERVE_POLL_MS: u64 = 10;

/// Pause after a poll error before the loop continues (ms).
pub const POLL_ERROR_BACKOFF_MS: u64 = 500;

/// Cooldown between entering the fatal state and requesting a restart (ms).
pub const RESTART_COOLDOWN_MS: u64 = 5_000;

// Status indicator

/// Brightness change per ramp step (percent).
pub const RAMP_STEP: u8 = 5;

/// Duration of one ramp step; also the loop period while advertising (ms).
pub const RAMP_STEP_MS: u64 = 20;

/// Color pulsed while waiting for the radio peer.
pub const ADVERTISING_COLOR: Rgb = Rgb::new(0, 0, 255);

/// Color held while the radio peer is connected.
pub const CONNECTED_COLOR: Rgb = Rgb::new(0, 255, 0);

/// Fixed brightness while connected (percent).
pub const CONNECTED_BRIGHTNESS: u8 = 50;

// BLE (Nordic UART Service)

/// Name broadcast in the scan response.
pub const BLE_DEVICE_NAME: &str = "SignalBridge";

/// NUS primary service UUID.
pub const NUS_SERVICE_UUID: u128 = 0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E;

/// NUS RX characteristic (central → bridge, write).
pub const NUS_RX_UUID: u128 = 0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E;

/// NUS TX characteristic (bridge → central, notify). Signal codes go here.
pub const NUS_TX_UUID: u128 = 0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E;

/// Largest payload a single TX notification carries (default ATT MTU - 3).
pub const NUS_MAX_PAYLOAD: usize = 20;

/// Advertising interval (in 0.625 ms units). 400 = 250 ms.
pub const BLE_ADV_INTERVAL: u32 = 400;

/// Pause before a failed advertise start is retried (ms).
pub const BLE_ADV_RETRY_MS: u64 = 1_000;

// Local trigger buttons
//
// Logical names; concrete `embassy_nrf` pins are picked in `main.rs`.
//
//   Button A       → P1.15  (device 1)
//   Button B       → P1.02  (device 2)
//   RGB LED R/G/B  → P0.06 / P0.08 / P1.09  (PWM0, active high)
//   AirLift SCK / MOSI / MISO → P0.14 / P0.13 / P0.15  (SPIM3)
//   AirLift CS / BUSY / RESET → P0.26 / P0.27 / P0.04

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Device id forwarded when local button A is pressed.
pub const BUTTON_A_DEVICE: i64 = 1;

/// Device id forwarded when local button B is pressed.
pub const BUTTON_B_DEVICE: i64 = 2;

/// Whether the HTTP server is polled only while the radio peer is connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServePolicy {
    /// Serve only in the `Serving` state; the endpoint goes quiet while
    /// the peer is away.
    WhileLinked,
    /// Poll the server on every loop tick regardless of the link phase.
    Always,
}

/// Runtime configuration consumed by the coordinator.
#[derive(Clone, Copy, Debug)]
pub struct BridgeConfig {
    pub retry: RetryPolicy,
    pub port: u16,
    pub serve_policy: ServePolicy,
    pub mapping: DeviceMapping,
    pub serve_poll: Duration,
    pub poll_error_backoff: Duration,
    pub restart_cooldown: Duration,
    pub ramp_step: Duration,
    /// Host for the post-join reachability probe, `None` to skip it.
    pub probe_host: Option<&'static str>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(
                WIFI_MAX_ATTEMPTS,
                Duration::from_millis(WIFI_RETRY_BACKOFF_MS),
            ),
            port: HTTP_PORT,
            serve_policy: ServePolicy::WhileLinked,
            mapping: DeviceMapping::DEFAULT,
            serve_poll: Duration::from_millis(SERVE_POLL_MS),
            poll_error_backoff: Duration::from_millis(POLL_ERROR_BACKOFF_MS),
            restart_cooldown: Duration::from_millis(RESTART_COOLDOWN_MS),
            ramp_step: Duration::from_millis(RAMP_STEP_MS),
            probe_host: Some(PROBE_HOST),
        }
    }
}
