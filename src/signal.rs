//! Signal commands and the device → link-code mapping.
//!
//! A `send-signal` request names a device by integer id. The id is looked
//! up in a [`DeviceMapping`] table to find the single ASCII byte written
//! to the radio link. Adding a device is a new table row.

use serde_json::Value;

use crate::error::RequestError;

/// A decoded `{"device": <int>}` request body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalCommand {
    pub device_id: i64,
}

impl SignalCommand {
    /// Decode a request body.
    ///
    /// Malformed JSON is [`RequestError::BadBody`]; valid JSON without an
    /// integer `device` field (including non-object bodies and `"x"`) is
    /// [`RequestError::MissingDevice`]. An integer above `i64::MAX` is
    /// [`RequestError::DeviceOutOfRange`].
    pub fn from_json(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| RequestError::BadBody)?;
        let device = value.get("device").ok_or(RequestError::MissingDevice)?;
        if let Some(device_id) = device.as_i64() {
            return Ok(Self { device_id });
        }
        match device.as_u64() {
            Some(id) => Err(RequestError::DeviceOutOfRange(id)),
            None => Err(RequestError::MissingDevice),
        }
    }
}

/// Static table from device id to the byte written to the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceMapping {
    entries: &'static [(i64, u8)],
}

impl DeviceMapping {
    /// Four instruments, codes `A`..`D`.
    pub const DEFAULT: Self = Self::new(&[(1, b'A'), (2, b'B'), (3, b'C'), (4, b'D')]);

    pub const fn new(entries: &'static [(i64, u8)]) -> Self {
        Self { entries }
    }

    /// Link code for `device_id`, if the device is known.
    pub fn code_for(&self, device_id: i64) -> Option<u8> {
        self.entries
            .iter()
            .find_map(|&(id, code)| (id == device_id).then_some(code))
    }

    /// Resolve a decoded command to its link code.
    pub fn resolve(&self, command: SignalCommand) -> Result<u8, RequestError> {
        self.code_for(command.device_id)
            .ok_or(RequestError::UnknownDevice(command.device_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeviceMapping {
    fn default() -> Self {
        Self::DEFAULT
    }
}
