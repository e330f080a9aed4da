//! Bluetooth Low Energy subsystem.
//!
//! This module drives the Nordic SoftDevice S140 in **Peripheral** role
//! and exposes the Nordic UART Service:
//!
//! 1. **Advertiser** - connectable undirected advertising with the NUS
//!    UUID, started on request from the coordinator.
//! 2. **GATT server** - NUS RX (write) and TX (notify). Signal codes go
//!    out as TX notifications.
//! 3. **Link** - [`nus::NusLink`] adapts the above to the library's
//!    `LinkTransport` seam.
//!
//! The BLE task and the coordinator share only a signal (start
//! advertising) and the current connection handle.

pub mod nus;
