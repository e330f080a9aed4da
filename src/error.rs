//! Error types for signal-bridge.
//!
//! We avoid `alloc` here - all error variants carry only fixed-size data,
//! so every error is `Copy` and cheap to log. `defmt::Format` is derived
//! for on-target logging when the `defmt` feature is enabled.

use thiserror::Error;

/// Failure to bring the WiFi link up.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkError {
    /// Every attempt allowed by the retry policy failed.
    #[error("network join failed after {attempts} attempts")]
    Exhausted { attempts: u8 },
}

/// Errors reported by the WiFi radio capability.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The access point was not found.
    #[error("no such SSID")]
    NoSuchSsid,
    /// Association or authentication was rejected.
    #[error("failed to connect")]
    ConnectFailed,
    /// The radio did not reach a final state in time.
    #[error("radio timed out")]
    Timeout,
    /// Host name resolution failed.
    #[error("host lookup failed")]
    Resolve,
    /// The co-processor returned a malformed or unexpected reply.
    #[error("radio protocol error")]
    Protocol,
}

/// Errors from the radio (BLE) link.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Write attempted while the phase is not `Connected`.
    #[error("link not connected")]
    NotConnected,
    /// The transport refused the bytes (e.g. notify failed, payload too big).
    #[error("link write failed")]
    WriteFailed,
    /// Advertising could not be started.
    #[error("advertising failed")]
    AdvertiseFailed,
}

/// Why a `send-signal` request was rejected before reaching the link.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// The body is not valid JSON.
    #[error("invalid JSON body")]
    BadBody,
    /// `device` is absent or not an integer.
    #[error("missing device ID")]
    MissingDevice,
    /// `device` is an integer with no entry in the device mapping.
    #[error("unknown device ID {0}")]
    UnknownDevice(i64),
    /// `device` is an integer too large for any mapping entry.
    #[error("unknown device ID {0}")]
    DeviceOutOfRange(u64),
}

/// Socket-level failures from the network stack.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketError {
    /// No free socket on the network stack.
    #[error("no free socket")]
    NoSocket,
    /// Listening on the port was refused.
    #[error("listen failed")]
    ListenFailed,
    /// Reading from or writing to the connection failed.
    #[error("socket I/O failed")]
    Io,
    /// The peer did not send or accept data in time.
    #[error("socket timed out")]
    Timeout,
}

/// Transport-level failure while servicing one request. Never fatal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollError {
    /// Accepting a pending client failed.
    #[error("accept failed: {0}")]
    Accept(SocketError),
    /// The client closed the connection before a full request arrived.
    #[error("client disconnected mid-request")]
    Disconnected,
    /// Reading the request failed.
    #[error("read failed")]
    Read,
    /// Writing the response failed.
    #[error("write failed")]
    Write,
}

/// Control server construction failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServerError {
    #[error("bind to port {port} failed: {source}")]
    Bind { port: u16, source: SocketError },
}

/// Unrecoverable errors. Each one ends in a restart request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Server(#[from] ServerError),
}
