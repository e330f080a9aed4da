//! signal-bridge: HTTP → BLE signal relay.
//!
//! A small control server on WiFi accepts `POST /send-signal` with a JSON
//! device id and forwards the mapped one-byte code to a paired BLE central
//! over the Nordic UART Service. A status LED shows the link phase.
//!
//! Everything in this library is hardware-independent and runs on the
//! host: the hardware (AirLift WiFi co-processor, SoftDevice, PWM LED) sits
//! behind the capability traits in [`network`], [`link`], [`socket`] and
//! [`indicator`]. The embedded binary in `main.rs` supplies the nRF52840
//! implementations.
//!
//! Usage: `cargo test --lib` on the host, `cargo run --release --features
//! embedded` for the board.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod config;
pub mod coordinator;
pub mod error;
pub mod indicator;
pub mod link;
pub mod network;
pub mod server;
pub mod signal;
pub mod socket;

#[cfg(test)]
mod mock;

pub use coordinator::{Coordinator, CoordinatorState, LocalInput, Peripherals, Supervisor};
pub use error::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Wire formats shared with the embedded drivers
// ═══════════════════════════════════════════════════════════════════════════

#[path = "ble/adv_data.rs"]
mod ble_adv_data_impl;
#[path = "wifi/frame.rs"]
mod wifi_frame_impl;

pub mod ble {
    pub mod adv_data {
        pub use crate::ble_adv_data_impl::*;
    }
}

pub mod wifi {
    pub mod frame {
        pub use crate::wifi_frame_impl::*;
    }
}
