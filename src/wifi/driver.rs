//! NINA co-processor driver.
//!
//! Every exchange is: wait for BUSY low, clock the request out under CS,
//! wait for BUSY low again, clock the reply in byte by byte. One
//! [`Mutex`] guards the bus so the radio, the listener and open streams
//! can share it.

use core::fmt::Write as _;

use defmt::{debug, info, warn};
use embassy_nrf::gpio::{Input, Output};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Instant, Timer};
use embedded_hal_async::spi::SpiBus;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use heapless::{String, Vec};

use signal_bridge::config::WIFI_JOIN_TIMEOUT_MS;
use signal_bridge::error::{RadioError, SocketError};
use signal_bridge::network::{Credentials, Ipv4, WifiRadio};
use signal_bridge::socket::{Connection, Listener, SocketFactory};
use signal_bridge::wifi::frame::{
    self, Command, FrameError, ReplyDecoder, WlStatus, NO_SOCKET, TCP_ESTABLISHED, TCP_MODE,
};

/// Largest encoded request (SEND_DATA header + one chunk).
const TX_MAX: usize = 128;

/// Payload bytes moved per SEND_DATA / GET_DATABUF exchange.
const CHUNK: usize = 64;

/// Reply bytes we clock in before giving up on a start byte.
const REPLY_MAX_BYTES: usize = 512;

const BUSY_TIMEOUT: Duration = Duration::from_millis(1_000);
const STATUS_POLL: Duration = Duration::from_millis(100);
const READ_IDLE_POLL: Duration = Duration::from_millis(5);
const READ_TIMEOUT: Duration = Duration::from_millis(3_000);
const CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3_000);

pub type SharedNina<S> = Mutex<CriticalSectionRawMutex, Nina<S>>;

fn protocol(e: FrameError) -> RadioError {
    warn!("nina: {}", e);
    RadioError::Protocol
}

fn socket_io(_: RadioError) -> SocketError {
    SocketError::Io
}

// ════════════════════════════════════════════════════════════════════════════
// Bus
// ════════════════════════════════════════════════════════════════════════════

pub struct Nina<S> {
    spi: S,
    cs: Output<'static>,
    busy: Input<'static>,
    reset: Output<'static>,
    tx: Vec<u8, TX_MAX>,
}

impl<S: SpiBus> Nina<S> {
    pub fn new(spi: S, cs: Output<'static>, busy: Input<'static>, reset: Output<'static>) -> Self {
        Self {
            spi,
            cs,
            busy,
            reset,
            tx: Vec::new(),
        }
    }

    /// Hardware reset; the firmware needs most of a second to boot.
    pub async fn reset(&mut self) {
        self.cs.set_high();
        self.reset.set_low();
        Timer::after_millis(10).await;
        self.reset.set_high();
        Timer::after_millis(750).await;
        info!("nina: reset done");
    }

    async fn wait_ready(&mut self) -> Result<(), RadioError> {
        with_timeout(BUSY_TIMEOUT, self.busy.wait_for_low())
            .await
            .map_err(|_| RadioError::Timeout)
    }

    /// One request/reply exchange.
    pub async fn command<const N: usize>(
        &mut self,
        command: Command,
        params: &[&[u8]],
    ) -> Result<ReplyDecoder<N>, RadioError> {
        frame::encode(command, params, &mut self.tx).map_err(protocol)?;

        self.wait_ready().await?;
        self.cs.set_low();
        let sent = self.spi.write(&self.tx).await;
        self.cs.set_high();
        sent.map_err(|_| RadioError::Protocol)?;

        self.wait_ready().await?;
        self.cs.set_low();
        let reply = self.read_reply(command).await;
        self.cs.set_high();
        reply
    }

    async fn read_reply<const N: usize>(
        &mut self,
        command: Command,
    ) -> Result<ReplyDecoder<N>, RadioError> {
        let mut decoder = ReplyDecoder::new(command);
        for _ in 0..REPLY_MAX_BYTES {
            let mut byte = [0xFF];
            self.spi
                .transfer_in_place(&mut byte)
                .await
                .map_err(|_| RadioError::Protocol)?;
            if decoder.feed(byte[0]).map_err(protocol)? {
                return Ok(decoder);
            }
        }
        Err(RadioError::Timeout)
    }

    /// Command whose reply is a single status byte.
    async fn status(&mut self, command: Command, params: &[&[u8]]) -> Result<u8, RadioError> {
        let reply: ReplyDecoder<8> = self.command(command, params).await?;
        reply.byte(0).ok_or(RadioError::Protocol)
    }

    /// Command whose reply is one little-endian u16.
    async fn word(&mut self, command: Command, params: &[&[u8]]) -> Result<u16, RadioError> {
        let reply: ReplyDecoder<8> = self.command(command, params).await?;
        match reply.param(0) {
            Some([lo, hi]) => Ok(u16::from_le_bytes([*lo, *hi])),
            Some([lo]) => Ok(u16::from(*lo)),
            _ => Err(RadioError::Protocol),
        }
    }

    async fn conn_status(&mut self) -> Result<WlStatus, RadioError> {
        self.status(Command::GetConnStatus, &[]).await.map(WlStatus::from)
    }

    async fn ip_address(&mut self) -> Result<Ipv4, RadioError> {
        let reply: ReplyDecoder<16> = self.command(Command::GetIpAddr, &[&[0xFF]]).await?;
        reply
            .param(0)
            .and_then(|p| <Ipv4>::try_from(p).ok())
            .ok_or(RadioError::Protocol)
    }

    async fn socket(&mut self) -> Result<u8, SocketError> {
        match self.status(Command::GetSocket, &[]).await {
            Ok(NO_SOCKET) => Err(SocketError::NoSocket),
            Ok(sock) => Ok(sock),
            Err(_) => Err(SocketError::Io),
        }
    }

    async fn available(&mut self, sock: u8) -> Result<u16, RadioError> {
        self.word(Command::AvailDataTcp, &[&[sock]]).await
    }

    async fn client_state(&mut self, sock: u8) -> Result<u8, RadioError> {
        self.status(Command::GetClientStateTcp, &[&[sock]]).await
    }

    async fn send(&mut self, sock: u8, data: &[u8]) -> Result<usize, RadioError> {
        let data = &data[..data.len().min(CHUNK)];
        let sent = self.word(Command::SendDataTcp, &[&[sock], data]).await?;
        if self.status(Command::DataSentTcp, &[&[sock]]).await? != 1 {
            return Err(RadioError::Protocol);
        }
        Ok(usize::from(sent))
    }

    async fn receive(&mut self, sock: u8, buf: &mut [u8]) -> Result<usize, RadioError> {
        let want = buf.len().min(CHUNK) as u16;
        let reply: ReplyDecoder<CHUNK> = self
            .command(Command::GetDatabufTcp, &[&[sock], &want.to_le_bytes()])
            .await?;
        let data = reply.param(0).ok_or(RadioError::Protocol)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    async fn stop(&mut self, sock: u8) -> Result<(), RadioError> {
        match self.status(Command::StopClientTcp, &[&[sock]]).await? {
            1 => Ok(()),
            _ => Err(RadioError::Protocol),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Radio
// ════════════════════════════════════════════════════════════════════════════

pub struct NinaRadio<S: 'static> {
    nina: &'static SharedNina<S>,
}

impl<S: SpiBus + 'static> NinaRadio<S> {
    pub fn new(nina: &'static SharedNina<S>) -> Self {
        Self { nina }
    }

    /// HTTP GET `/` against `host:80` and wait for any reply bytes.
    async fn http_get(nina: &mut Nina<S>, host: &str) -> Result<(), RadioError> {
        if nina.status(Command::ReqHostByName, &[host.as_bytes()]).await? != 1 {
            return Err(RadioError::Resolve);
        }
        let reply: ReplyDecoder<8> = nina.command(Command::GetHostByName, &[]).await?;
        let ip = reply.param(0).filter(|p| p.len() == 4).ok_or(RadioError::Resolve)?;
        let ip: [u8; 4] = [ip[0], ip[1], ip[2], ip[3]];

        let sock = nina.socket().await.map_err(|_| RadioError::Protocol)?;
        let port = 80u16.to_be_bytes();
        if nina
            .status(Command::StartClientTcp, &[&ip, &port, &[sock], &[TCP_MODE]])
            .await?
            != 1
        {
            return Err(RadioError::ConnectFailed);
        }

        let result = Self::exchange(nina, sock, host).await;
        if let Err(e) = nina.stop(sock).await {
            debug!("nina: stop after probe failed: {}", e);
        }
        result
    }

    async fn exchange(nina: &mut Nina<S>, sock: u8, host: &str) -> Result<(), RadioError> {
        let deadline = Instant::now() + CLIENT_CONNECT_TIMEOUT;
        while nina.client_state(sock).await? != TCP_ESTABLISHED {
            if Instant::now() > deadline {
                return Err(RadioError::Timeout);
            }
            Timer::after(READ_IDLE_POLL).await;
        }

        let mut request: String<128> = String::new();
        write!(request, "GET / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", host)
            .map_err(|_| RadioError::Protocol)?;
        let mut rest = request.as_bytes();
        while !rest.is_empty() {
            let n = nina.send(sock, rest).await?;
            rest = &rest[n..];
        }

        let deadline = Instant::now() + READ_TIMEOUT;
        while nina.available(sock).await? == 0 {
            if Instant::now() > deadline {
                return Err(RadioError::Timeout);
            }
            Timer::after(READ_IDLE_POLL).await;
        }
        Ok(())
    }
}

impl<S: SpiBus + 'static> WifiRadio for NinaRadio<S> {
    type Sockets = NinaSockets<S>;

    async fn is_joined(&mut self) -> bool {
        let mut nina = self.nina.lock().await;
        matches!(nina.conn_status().await, Ok(WlStatus::Connected))
    }

    async fn join(&mut self, credentials: &Credentials<'_>) -> Result<Ipv4, RadioError> {
        let mut nina = self.nina.lock().await;
        let accepted = nina
            .status(
                Command::SetPassphrase,
                &[credentials.ssid.as_bytes(), credentials.password.as_bytes()],
            )
            .await?;
        if accepted != 1 {
            return Err(RadioError::ConnectFailed);
        }

        let deadline = Instant::now() + Duration::from_millis(WIFI_JOIN_TIMEOUT_MS);
        loop {
            match nina.conn_status().await? {
                WlStatus::Connected => break,
                WlStatus::NoSsidAvailable => return Err(RadioError::NoSuchSsid),
                WlStatus::ConnectFailed => return Err(RadioError::ConnectFailed),
                status => debug!("nina: join status {:?}", status),
            }
            if Instant::now() > deadline {
                return Err(RadioError::Timeout);
            }
            Timer::after(STATUS_POLL).await;
        }

        nina.ip_address().await
    }

    async fn address(&mut self) -> Result<Ipv4, RadioError> {
        self.nina.lock().await.ip_address().await
    }

    async fn mac_address(&mut self) -> Result<[u8; 6], RadioError> {
        let mut nina = self.nina.lock().await;
        let reply: ReplyDecoder<8> = nina.command(Command::GetMacAddr, &[&[0xFF]]).await?;
        let raw = reply.param(0).filter(|p| p.len() == 6).ok_or(RadioError::Protocol)?;
        // Firmware reports the MAC least significant byte first.
        let mut mac = [0u8; 6];
        for (dst, src) in mac.iter_mut().zip(raw.iter().rev()) {
            *dst = *src;
        }
        Ok(mac)
    }

    async fn probe(&mut self, host: &str) -> Result<(), RadioError> {
        let mut nina = self.nina.lock().await;
        Self::http_get(&mut nina, host).await
    }

    fn sockets(&mut self) -> NinaSockets<S> {
        NinaSockets { nina: self.nina }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Sockets
// ════════════════════════════════════════════════════════════════════════════

pub struct NinaSockets<S: 'static> {
    nina: &'static SharedNina<S>,
}

impl<S: SpiBus + 'static> SocketFactory for NinaSockets<S> {
    type Listener = NinaListener<S>;

    async fn listen(&mut self, port: u16) -> Result<NinaListener<S>, SocketError> {
        let mut nina = self.nina.lock().await;
        let sock = nina.socket().await?;
        let port_be = port.to_be_bytes();
        let ok = nina
            .status(Command::StartServerTcp, &[&port_be, &[sock], &[TCP_MODE]])
            .await
            .map_err(socket_io)?;
        if ok != 1 {
            return Err(SocketError::ListenFailed);
        }
        // Server sockets report LISTEN (1) once bound.
        let state = nina
            .status(Command::GetStateTcp, &[&[sock]])
            .await
            .map_err(socket_io)?;
        debug!("nina: server socket {} state {}", sock, state);
        Ok(NinaListener {
            nina: self.nina,
            sock,
        })
    }
}

pub struct NinaListener<S: 'static> {
    nina: &'static SharedNina<S>,
    sock: u8,
}

impl<S: SpiBus + 'static> Listener for NinaListener<S> {
    type Connection = NinaStream<S>;

    async fn accept(&mut self) -> Result<Option<NinaStream<S>>, SocketError> {
        // On a server socket AVAIL_DATA returns a waiting client's socket.
        let client = self
            .nina
            .lock()
            .await
            .available(self.sock)
            .await
            .map_err(socket_io)?;
        match u8::try_from(client) {
            Ok(NO_SOCKET) | Err(_) => Ok(None),
            Ok(sock) => Ok(Some(NinaStream {
                nina: self.nina,
                sock,
            })),
        }
    }
}

pub struct NinaStream<S: 'static> {
    nina: &'static SharedNina<S>,
    sock: u8,
}

impl<S: 'static> ErrorType for NinaStream<S> {
    type Error = ErrorKind;
}

impl<S: SpiBus + 'static> Read for NinaStream<S> {
    /// Returns `Ok(0)` once the client has closed and nothing is left.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + READ_TIMEOUT;
        loop {
            {
                let mut nina = self.nina.lock().await;
                let pending = nina.available(self.sock).await.map_err(|_| ErrorKind::Other)?;
                if pending > 0 {
                    return nina
                        .receive(self.sock, buf)
                        .await
                        .map_err(|_| ErrorKind::Other);
                }
                let state = nina.client_state(self.sock).await.map_err(|_| ErrorKind::Other)?;
                if state != TCP_ESTABLISHED {
                    return Ok(0);
                }
            }
            if Instant::now() > deadline {
                return Err(ErrorKind::TimedOut);
            }
            Timer::after(READ_IDLE_POLL).await;
        }
    }
}

impl<S: SpiBus + 'static> Write for NinaStream<S> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sent = self
            .nina
            .lock()
            .await
            .send(self.sock, buf)
            .await
            .map_err(|_| ErrorKind::Other)?;
        if sent == 0 {
            return Err(ErrorKind::WriteZero);
        }
        Ok(sent)
    }
}

impl<S: SpiBus + 'static> Connection for NinaStream<S> {
    async fn readable(&mut self) -> Result<bool, SocketError> {
        let mut nina = self.nina.lock().await;
        if nina.available(self.sock).await.map_err(socket_io)? > 0 {
            return Ok(true);
        }
        let state = nina.client_state(self.sock).await.map_err(socket_io)?;
        Ok(state != TCP_ESTABLISHED)
    }

    async fn close(self) -> Result<(), SocketError> {
        self.nina.lock().await.stop(self.sock).await.map_err(socket_io)
    }
}
