//! Host-side doubles for the hardware seams.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

use crate::coordinator::{LocalInput, Supervisor};
use crate::error::{LinkError, RadioError, SocketError};
use crate::indicator::{Frame, StatusLed};
use crate::link::{LinkChannel, LinkTransport};
use crate::network::{Credentials, Ipv4, WifiRadio};
use crate::socket::{Connection, Listener, SocketFactory};

/// Records every requested sleep in milliseconds and returns at once.
#[derive(Default)]
pub struct MockDelay {
    pub sleeps_ms: Vec<u32>,
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleeps_ms.push(ns / 1_000_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.sleeps_ms.push(us / 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.sleeps_ms.push(ms);
    }
}

#[derive(Default)]
pub struct MockLink {
    pub peer: bool,
    pub fail_advertise: bool,
    pub fail_send: bool,
    /// Report a peer once `peer_connected` has been asked more than this
    /// many times.
    pub connect_after_polls: Option<u32>,
    /// Bump to simulate a central that attached (and maybe left) unseen.
    pub sessions: u32,
    pub advertise_calls: u32,
    pub send_calls: u32,
    pub written: Vec<u8>,
    pub(crate) polls: Cell<u32>,
}

impl LinkTransport for MockLink {
    async fn advertise(&mut self) -> Result<(), LinkError> {
        if self.fail_advertise {
            return Err(LinkError::AdvertiseFailed);
        }
        self.advertise_calls += 1;
        Ok(())
    }

    fn peer_connected(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        self.peer || self.connect_after_polls.is_some_and(|n| polls > n)
    }

    fn sessions(&self) -> u32 {
        self.sessions
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.fail_send {
            return Err(LinkError::WriteFailed);
        }
        self.send_calls += 1;
        self.written.extend_from_slice(bytes);
        Ok(())
    }
}

/// A link that has advertised and picked up a peer.
pub fn connected_link() -> LinkChannel<MockLink> {
    let mut link = LinkChannel::new(MockLink::default());
    embassy_futures::block_on(link.start_advertising()).unwrap();
    link.transport_mut().peer = true;
    link.refresh();
    link
}

#[derive(Default)]
pub struct MockLed {
    pub frames: Vec<Frame>,
}

impl StatusLed for MockLed {
    fn show(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

#[derive(Default)]
pub struct MockSupervisor {
    pub restarts: u32,
}

impl Supervisor for MockSupervisor {
    fn request_restart(&mut self) {
        self.restarts += 1;
    }
}

#[derive(Default)]
pub struct MockInput {
    pub pressed: VecDeque<i64>,
}

impl LocalInput for MockInput {
    fn take_pressed(&mut self) -> Option<i64> {
        self.pressed.pop_front()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Sockets
// ════════════════════════════════════════════════════════════════════════════

type Sink = Rc<RefCell<Vec<Vec<u8>>>>;

/// Client connection fed from canned chunks. On close, everything the
/// server wrote is appended to the owning listener's `closed` list.
pub struct MockConn {
    chunks: VecDeque<Vec<u8>>,
    /// After the last chunk: stay open and silent instead of hanging up.
    stall: bool,
    reads: Rc<Cell<usize>>,
    out: Vec<u8>,
    sink: Option<Sink>,
}

impl MockConn {
    /// Each chunk is returned by one `read`; after the last one the peer
    /// has hung up.
    pub fn chunked(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            stall: false,
            reads: Rc::default(),
            out: Vec::new(),
            sink: None,
        }
    }

    /// One byte per `read`.
    pub fn trickle(request: &str) -> Self {
        let mut conn = Self::chunked(&[]);
        conn.chunks = request.bytes().map(|b| vec![b]).collect();
        conn
    }

    /// Sends `head` and then nothing more, without closing.
    pub fn stalled_after(head: &str) -> Self {
        let mut conn = Self::chunked(&[head]);
        conn.stall = true;
        conn
    }

    /// Counter of `read` calls, readable after the connection moved.
    pub fn reads(&self) -> Rc<Cell<usize>> {
        self.reads.clone()
    }
}

impl ErrorType for MockConn {
    type Error = ErrorKind;
}

impl Read for MockConn {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.reads.set(self.reads.get() + 1);
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for MockConn {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }
}

impl Connection for MockConn {
    async fn readable(&mut self) -> Result<bool, SocketError> {
        Ok(!self.chunks.is_empty() || !self.stall)
    }

    async fn close(self) -> Result<(), SocketError> {
        if let Some(sink) = self.sink {
            sink.borrow_mut().push(self.out);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockListener {
    pub pending: VecDeque<MockConn>,
    /// Response bytes of every closed connection, in close order.
    pub closed: Sink,
    pub fail_accept: bool,
}

impl MockListener {
    pub fn push(&mut self, mut conn: MockConn) {
        conn.sink = Some(self.closed.clone());
        self.pending.push_back(conn);
    }

    fn take(&mut self) -> Result<Option<MockConn>, SocketError> {
        if self.fail_accept {
            return Err(SocketError::Io);
        }
        Ok(self.pending.pop_front())
    }
}

impl Listener for MockListener {
    type Connection = MockConn;

    async fn accept(&mut self) -> Result<Option<MockConn>, SocketError> {
        self.take()
    }
}

/// Listener shared with the test body so clients can arrive mid-run.
pub type SharedListener = Rc<RefCell<MockListener>>;

impl Listener for SharedListener {
    type Connection = MockConn;

    async fn accept(&mut self) -> Result<Option<MockConn>, SocketError> {
        self.borrow_mut().take()
    }
}

/// Hands out its one listener, or refuses to listen at all.
pub struct MockSockets<L> {
    listener: Option<L>,
    refuse: bool,
}

impl<L> MockSockets<L> {
    pub fn with_listener(listener: L) -> Self {
        Self {
            listener: Some(listener),
            refuse: false,
        }
    }
}

impl MockSockets<MockListener> {
    pub fn refusing() -> Self {
        Self {
            listener: None,
            refuse: true,
        }
    }
}

impl<L: Listener> SocketFactory for MockSockets<L> {
    type Listener = L;

    async fn listen(&mut self, _port: u16) -> Result<L, SocketError> {
        if self.refuse {
            return Err(SocketError::ListenFailed);
        }
        self.listener.take().ok_or(SocketError::NoSocket)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Radio
// ════════════════════════════════════════════════════════════════════════════

pub struct MockRadio {
    /// Join attempts that fail before one succeeds.
    fail_joins: u32,
    pub join_calls: u32,
    pub joined: bool,
    pub probe_ok: bool,
    pub probe_calls: u32,
    pub refuse_listen: bool,
    pub listener: SharedListener,
}

impl MockRadio {
    pub const ADDRESS: Ipv4 = [192, 168, 1, 42];

    pub fn joining_after(failures: u32) -> Self {
        Self {
            fail_joins: failures,
            join_calls: 0,
            joined: false,
            probe_ok: true,
            probe_calls: 0,
            refuse_listen: false,
            listener: SharedListener::default(),
        }
    }

    pub fn never_joining() -> Self {
        Self::joining_after(u32::MAX)
    }
}

impl WifiRadio for MockRadio {
    type Sockets = MockSockets<SharedListener>;

    async fn is_joined(&mut self) -> bool {
        self.joined
    }

    async fn join(&mut self, _credentials: &Credentials<'_>) -> Result<Ipv4, RadioError> {
        self.join_calls += 1;
        if self.join_calls > self.fail_joins {
            self.joined = true;
            Ok(Self::ADDRESS)
        } else {
            Err(RadioError::ConnectFailed)
        }
    }

    async fn address(&mut self) -> Result<Ipv4, RadioError> {
        if self.joined {
            Ok(Self::ADDRESS)
        } else {
            Err(RadioError::Protocol)
        }
    }

    async fn mac_address(&mut self) -> Result<[u8; 6], RadioError> {
        Ok([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01])
    }

    async fn probe(&mut self, _host: &str) -> Result<(), RadioError> {
        self.probe_calls += 1;
        if self.probe_ok {
            Ok(())
        } else {
            Err(RadioError::Resolve)
        }
    }

    fn sockets(&mut self) -> Self::Sockets {
        MockSockets {
            listener: Some(self.listener.clone()),
            refuse: self.refuse_listen,
        }
    }
}
