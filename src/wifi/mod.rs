//! WiFi subsystem - ESP32 AirLift co-processor on SPIM3.
//!
//! The ESP32 runs the NINA firmware and owns the whole TCP/IP stack. We
//! talk to it with framed commands (see [`signal_bridge::wifi::frame`])
//! and see sockets only as small integers it hands out.
//!
//! - [`driver::NinaRadio`] - join, address, probe (`WifiRadio`)
//! - [`driver::NinaSockets`] / [`driver::NinaListener`] /
//!   [`driver::NinaStream`] - the TCP server used by the control server

pub mod driver;
