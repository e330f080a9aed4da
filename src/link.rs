//! Radio link channel - the advertise/connect state machine in front of
//! the BLE transport.
//!
//! The transport (SoftDevice NUS server on target, mocks on host) only
//! knows how to advertise, report whether a central is attached, and push
//! bytes. [`LinkChannel`] layers the phase machine on top:
//!
//! ```text
//! Disconnected --start_advertising--> Advertising --peer--> Connected
//!      ^                                                        |
//!      +---------------------- peer lost ----------------------+
//! ```
//!
//! Phase changes are observed by polling [`LinkChannel::refresh`]; the
//! transport never pushes them. A central that attaches and leaves between
//! two refreshes is caught through the transport's session counter and
//! counts as peer loss.

use core::time::Duration;

use embedded_hal_async::delay::DelayNs;

use crate::error::LinkError;

/// Connection phase of the radio link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionPhase {
    Disconnected,
    Advertising,
    Connected,
}

/// Capability interface to the BLE stack.
#[allow(async_fn_in_trait)]
pub trait LinkTransport {
    /// Begin broadcasting presence. Returns once advertising is requested.
    async fn advertise(&mut self) -> Result<(), LinkError>;

    /// Whether a peer is attached right now.
    fn peer_connected(&self) -> bool;

    /// Number of peer sessions begun since boot. Wraps.
    fn sessions(&self) -> u32;

    /// Hand `bytes` to the stack. Success means accepted, not delivered.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Phase machine wrapping a [`LinkTransport`].
pub struct LinkChannel<T> {
    transport: T,
    phase: ConnectionPhase,
    /// Session count when advertising was last requested.
    advertised_at: u32,
}

impl<T: LinkTransport> LinkChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            phase: ConnectionPhase::Disconnected,
            advertised_at: 0,
        }
    }

    /// Current phase as of the last [`refresh`](Self::refresh).
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Start advertising. No-op unless the phase is `Disconnected`.
    pub async fn start_advertising(&mut self) -> Result<(), LinkError> {
        if self.phase != ConnectionPhase::Disconnected {
            return Ok(());
        }
        self.advertised_at = self.transport.sessions();
        self.transport.advertise().await?;
        self.set_phase(ConnectionPhase::Advertising);
        Ok(())
    }

    /// Sample the transport and advance the phase machine.
    ///
    /// `Disconnected` is sticky until advertising is restarted, so the
    /// sequence never jumps straight from `Disconnected` to `Connected`.
    /// While advertising, a session that began and ended unseen also
    /// drops the link to `Disconnected`; the transport stopped advertising
    /// when that peer attached.
    pub fn refresh(&mut self) -> ConnectionPhase {
        let peer = self.transport.peer_connected();
        match (self.phase, peer) {
            (ConnectionPhase::Advertising, true) => self.set_phase(ConnectionPhase::Connected),
            (ConnectionPhase::Advertising, false)
                if self.transport.sessions() != self.advertised_at =>
            {
                warn!("link: missed a peer session while advertising");
                self.set_phase(ConnectionPhase::Disconnected);
            }
            (ConnectionPhase::Connected, false) => self.set_phase(ConnectionPhase::Disconnected),
            _ => {}
        }
        self.phase
    }

    /// Wait until a peer connects, sleeping `interval` between checks.
    ///
    /// `on_tick` runs once per iteration with the sampled phase so callers
    /// can keep other work (the status LED) moving while they wait.
    /// Starts advertising first if the link is idle.
    pub async fn await_connection<D, F>(
        &mut self,
        delay: &mut D,
        interval: Duration,
        mut on_tick: F,
    ) -> Result<(), LinkError>
    where
        D: DelayNs,
        F: FnMut(ConnectionPhase),
    {
        loop {
            if self.phase == ConnectionPhase::Disconnected {
                self.start_advertising().await?;
            }
            let phase = self.refresh();
            on_tick(phase);
            if phase == ConnectionPhase::Connected {
                return Ok(());
            }
            delay.delay_ms(duration_ms(interval)).await;
        }
    }

    /// Write `bytes` to the peer.
    ///
    /// Fails fast with [`LinkError::NotConnected`] unless the phase is
    /// `Connected`; the transport is not touched in that case.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.phase != ConnectionPhase::Connected {
            return Err(LinkError::NotConnected);
        }
        self.transport.send(bytes).await
    }

    fn set_phase(&mut self, next: ConnectionPhase) {
        if next != self.phase {
            info!("link: {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}

/// Saturating conversion for `DelayNs::delay_ms`.
pub(crate) fn duration_ms(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}
