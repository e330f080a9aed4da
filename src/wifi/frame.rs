//! Command framing for the ESP32 "NINA" WiFi co-processor.
//!
//! Request on the wire:
//!
//! ```text
//! E0 | cmd | nparams | (len data)* | EE | pad to 4
//! ```
//!
//! `len` is one byte, or two bytes big-endian for the bulk data commands.
//! The reply echoes `cmd | 0x80` and carries its own parameter list. An
//! `EF` in place of the start byte means the co-processor rejected the
//! command.

use heapless::Vec;
use thiserror::Error;

pub const START_CMD: u8 = 0xE0;
pub const END_CMD: u8 = 0xEE;
pub const ERR_CMD: u8 = 0xEF;
pub const REPLY_FLAG: u8 = 0x80;

/// Most parameters any reply we issue carries.
pub const MAX_REPLY_PARAMS: usize = 8;

/// `GET_SOCKET` reply when every socket is taken.
pub const NO_SOCKET: u8 = 255;

/// Co-processor TCP state for an open connection.
pub const TCP_ESTABLISHED: u8 = 4;

/// Connection protocol byte for plain TCP.
pub const TCP_MODE: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    SetPassphrase = 0x11,
    GetConnStatus = 0x20,
    GetIpAddr = 0x21,
    GetMacAddr = 0x22,
    StartServerTcp = 0x28,
    GetStateTcp = 0x29,
    DataSentTcp = 0x2A,
    AvailDataTcp = 0x2B,
    StartClientTcp = 0x2D,
    StopClientTcp = 0x2E,
    GetClientStateTcp = 0x2F,
    ReqHostByName = 0x34,
    GetHostByName = 0x35,
    GetSocket = 0x3F,
    SendDataTcp = 0x44,
    GetDatabufTcp = 0x45,
}

impl Command {
    /// Request parameters carry 16-bit lengths.
    pub fn wide_request(self) -> bool {
        matches!(self, Command::SendDataTcp | Command::GetDatabufTcp)
    }

    /// Reply parameters carry 16-bit lengths.
    pub fn wide_reply(self) -> bool {
        self == Command::GetDatabufTcp
    }
}

/// Station status as reported by `GET_CONN_STATUS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WlStatus {
    Idle,
    NoSsidAvailable,
    ScanCompleted,
    Connected,
    ConnectFailed,
    ConnectionLost,
    Disconnected,
    Other(u8),
}

impl From<u8> for WlStatus {
    fn from(raw: u8) -> Self {
        match raw {
            0 => WlStatus::Idle,
            1 => WlStatus::NoSsidAvailable,
            2 => WlStatus::ScanCompleted,
            3 => WlStatus::Connected,
            4 => WlStatus::ConnectFailed,
            5 => WlStatus::ConnectionLost,
            6 => WlStatus::Disconnected,
            other => WlStatus::Other(other),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Encoded request or decoded reply does not fit the buffer.
    #[error("frame buffer overflow")]
    Overflow,
    /// A parameter is longer than its length field can express.
    #[error("parameter too long")]
    ParamTooLong,
    /// The co-processor answered with an error frame.
    #[error("co-processor rejected command")]
    Rejected,
    /// The reply echoes a different command.
    #[error("reply to command {0:#04x}")]
    WrongCommand(u8),
    #[error("malformed reply")]
    Malformed,
}

/// Encode `command` with `params` into `out`, replacing its contents.
pub fn encode<const N: usize>(
    command: Command,
    params: &[&[u8]],
    out: &mut Vec<u8, N>,
) -> Result<(), FrameError> {
    out.clear();
    let wide = command.wide_request();
    let count = u8::try_from(params.len()).map_err(|_| FrameError::ParamTooLong)?;

    push(out, &[START_CMD, command as u8 & !REPLY_FLAG, count])?;
    for param in params {
        if wide {
            let len = u16::try_from(param.len()).map_err(|_| FrameError::ParamTooLong)?;
            push(out, &len.to_be_bytes())?;
        } else {
            let len = u8::try_from(param.len()).map_err(|_| FrameError::ParamTooLong)?;
            push(out, &[len])?;
        }
        push(out, param)?;
    }
    push(out, &[END_CMD])?;

    while out.len() % 4 != 0 {
        push(out, &[0xFF])?;
    }
    Ok(())
}

fn push<const N: usize>(out: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), FrameError> {
    out.extend_from_slice(bytes).map_err(|_| FrameError::Overflow)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Start,
    Command,
    Count,
    LenHigh,
    Len,
    Data,
    End,
    Done,
}

/// Byte-at-a-time decoder for one reply.
///
/// Idle filler before the start byte is skipped. Parameters are stored
/// back to back in an `N`-byte buffer.
pub struct ReplyDecoder<const N: usize> {
    command: u8,
    wide: bool,
    state: State,
    remaining: u8,
    len: usize,
    data: Vec<u8, N>,
    spans: Vec<(usize, usize), MAX_REPLY_PARAMS>,
}

impl<const N: usize> ReplyDecoder<N> {
    pub fn new(command: Command) -> Self {
        Self {
            command: command as u8 | REPLY_FLAG,
            wide: command.wide_reply(),
            state: State::Start,
            remaining: 0,
            len: 0,
            data: Vec::new(),
            spans: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Feed one byte. Returns `true` once the end byte has been seen.
    pub fn feed(&mut self, byte: u8) -> Result<bool, FrameError> {
        match self.state {
            State::Start => match byte {
                START_CMD => self.state = State::Command,
                ERR_CMD => return Err(FrameError::Rejected),
                _ => {}
            },
            State::Command => {
                if byte != self.command {
                    return Err(FrameError::WrongCommand(byte & !REPLY_FLAG));
                }
                self.state = State::Count;
            }
            State::Count => {
                if usize::from(byte) > MAX_REPLY_PARAMS {
                    return Err(FrameError::Overflow);
                }
                self.remaining = byte;
                self.state = self.next_param_state();
            }
            State::LenHigh => {
                self.len = usize::from(byte) << 8;
                self.state = State::Len;
            }
            State::Len => {
                self.len = if self.wide {
                    self.len | usize::from(byte)
                } else {
                    usize::from(byte)
                };
                if self.len == 0 {
                    self.finish_param()?;
                } else {
                    self.state = State::Data;
                }
            }
            State::Data => {
                self.data.push(byte).map_err(|_| FrameError::Overflow)?;
                self.len -= 1;
                if self.len == 0 {
                    self.finish_param()?;
                }
            }
            State::End => {
                if byte != END_CMD {
                    return Err(FrameError::Malformed);
                }
                self.state = State::Done;
            }
            State::Done => return Err(FrameError::Malformed),
        }
        Ok(self.is_done())
    }

    /// Number of parameters decoded so far.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn param(&self, index: usize) -> Option<&[u8]> {
        self.spans
            .get(index)
            .map(|&(start, end)| &self.data[start..end])
    }

    /// First byte of parameter `index`, the common single-status reply.
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.param(index).and_then(|p| p.first().copied())
    }

    fn next_param_state(&self) -> State {
        match (self.remaining, self.wide) {
            (0, _) => State::End,
            (_, true) => State::LenHigh,
            (_, false) => State::Len,
        }
    }

    fn finish_param(&mut self) -> Result<(), FrameError> {
        let start = self.spans.last().map_or(0, |&(_, end)| end);
        self.spans
            .push((start, self.data.len()))
            .map_err(|_| FrameError::Overflow)?;
        self.remaining -= 1;
        self.state = self.next_param_state();
        Ok(())
    }
}
