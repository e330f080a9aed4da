//! Top-level orchestration loop.
//!
//! ```text
//! Init → ConnectingNetwork → ServerReady → Advertising ⇄ Serving
//!               │                 │
//!               └──────┬──────────┘
//!                      ▼
//!                    Fatal ──cooldown──▶ request restart
//! ```
//!
//! Everything runs from one cooperative context. The coordinator is the
//! only mutator of the network state, the link phase and the server, and
//! every wait goes through the injected [`DelayNs`].

use embedded_hal_async::delay::DelayNs;

use crate::config::{BridgeConfig, ServePolicy};
use crate::error::Error;
use crate::indicator::{StatusIndicator, StatusLed};
use crate::link::{duration_ms, ConnectionPhase, LinkChannel, LinkTransport};
use crate::network::{Credentials, NetworkConnector, WifiRadio};
use crate::server::ControlServer;
use crate::socket::SocketFactory;

/// Coordinator lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoordinatorState {
    Init,
    ConnectingNetwork,
    ServerReady,
    Advertising,
    Serving,
    Fatal,
}

/// The external process supervisor.
pub trait Supervisor {
    /// Ask for a full restart. On hardware this does not return.
    fn request_restart(&mut self);
}

/// Signals raised on the bridge itself (local buttons).
pub trait LocalInput {
    /// Next pending device id, if any. Must not block.
    fn take_pressed(&mut self) -> Option<i64>;
}

/// No local buttons.
impl LocalInput for () {
    fn take_pressed(&mut self) -> Option<i64> {
        None
    }
}

type ServerOf<R> =
    ControlServer<<<R as WifiRadio>::Sockets as SocketFactory>::Listener>;

/// Hardware seams owned by the coordinator.
pub struct Peripherals<R, T, L, S, D, I = ()> {
    pub radio: R,
    pub link: T,
    pub led: L,
    pub supervisor: S,
    pub delay: D,
    pub input: I,
}

pub struct Coordinator<'a, R, T, L, S, D, I = ()>
where
    R: WifiRadio,
{
    config: BridgeConfig,
    credentials: Credentials<'a>,
    network: NetworkConnector<R>,
    link: LinkChannel<T>,
    indicator: StatusIndicator<L>,
    supervisor: S,
    delay: D,
    input: I,
    server: Option<ServerOf<R>>,
    state: CoordinatorState,
    polls: u32,
    restarts_requested: u32,
}

impl<'a, R, T, L, S, D, I> Coordinator<'a, R, T, L, S, D, I>
where
    R: WifiRadio,
    T: LinkTransport,
    L: StatusLed,
    S: Supervisor,
    D: DelayNs,
    I: LocalInput,
{
    pub fn new(
        config: BridgeConfig,
        credentials: Credentials<'a>,
        peripherals: Peripherals<R, T, L, S, D, I>,
    ) -> Self {
        Self {
            config,
            credentials,
            network: NetworkConnector::new(peripherals.radio),
            link: LinkChannel::new(peripherals.link),
            indicator: StatusIndicator::new(peripherals.led),
            supervisor: peripherals.supervisor,
            delay: peripherals.delay,
            input: peripherals.input,
            server: None,
            state: CoordinatorState::Init,
            polls: 0,
            restarts_requested: 0,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn network(&self) -> &NetworkConnector<R> {
        &self.network
    }

    pub fn link(&self) -> &LinkChannel<T> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkChannel<T> {
        &mut self.link
    }

    pub fn indicator(&self) -> &StatusIndicator<L> {
        &self.indicator
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    /// Number of times the control server has been polled.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn restarts_requested(&self) -> u32 {
        self.restarts_requested
    }

    /// Run until a fatal error. Returns that error after the restart has
    /// been requested (on hardware the restart does not return).
    pub async fn run(&mut self) -> Error {
        if let Err(e) = self.start().await {
            self.fail(e).await;
            return e;
        }
        loop {
            self.step().await;
        }
    }

    /// Bring the network and server up and start advertising.
    pub async fn start(&mut self) -> Result<(), Error> {
        self.enter(CoordinatorState::ConnectingNetwork);
        let mut sockets = self
            .network
            .connect(
                &self.credentials,
                &self.config.retry,
                self.config.probe_host,
                &mut self.delay,
            )
            .await?;

        let server = ControlServer::bind(&mut sockets, self.config.port, self.config.mapping).await?;
        self.server = Some(server);
        self.enter(CoordinatorState::ServerReady);

        self.begin_advertising().await;
        Ok(())
    }

    /// One loop iteration: sample the link, update the LED, serve if
    /// allowed, then sleep for the state's period.
    pub async fn step(&mut self) {
        let phase = self.link.refresh();

        match (self.state, phase) {
            (CoordinatorState::Advertising, ConnectionPhase::Connected) => {
                info!("link: peer connected");
                self.enter(CoordinatorState::Serving);
            }
            (CoordinatorState::Serving, ConnectionPhase::Connected) => {}
            (CoordinatorState::Serving, _) => {
                info!("link: peer lost, advertising again");
                self.begin_advertising().await;
            }
            (CoordinatorState::Advertising, ConnectionPhase::Disconnected) => {
                // Advertise request failed, or a peer came and went unseen.
                self.begin_advertising().await;
            }
            _ => {}
        }

        self.indicator.render(self.link.phase());
        self.forward_local_input().await;

        let period = match self.state {
            CoordinatorState::Serving => {
                self.poll_server().await;
                self.config.serve_poll
            }
            CoordinatorState::Advertising => {
                if self.config.serve_policy == ServePolicy::Always {
                    self.poll_server().await;
                }
                self.config.ramp_step
            }
            _ => self.config.ramp_step,
        };

        self.delay.delay_ms(duration_ms(period)).await;
    }

    async fn begin_advertising(&mut self) {
        if let Err(e) = self.link.start_advertising().await {
            warn!("link: {}", e);
        }
        self.enter(CoordinatorState::Advertising);
    }

    async fn poll_server(&mut self) {
        let Some(server) = self.server.as_mut() else {
            return;
        };
        self.polls = self.polls.wrapping_add(1);
        if let Err(e) = server.poll(&mut self.link).await {
            warn!("http: poll error: {}", e);
            self.delay
                .delay_ms(duration_ms(self.config.poll_error_backoff))
                .await;
        }
    }

    async fn forward_local_input(&mut self) {
        while let Some(device_id) = self.input.take_pressed() {
            let Some(code) = self.config.mapping.code_for(device_id) else {
                warn!("button: no code for device {}", device_id);
                continue;
            };
            match self.link.write(&[code]).await {
                Ok(()) => info!("button: device {} -> '{}'", device_id, code as char),
                Err(e) => warn!("button: device {} not sent: {}", device_id, e),
            }
        }
    }

    async fn fail(&mut self, e: Error) {
        self.enter(CoordinatorState::Fatal);
        error!("fatal: {}; restarting in {} ms", e, duration_ms(self.config.restart_cooldown));
        self.delay
            .delay_ms(duration_ms(self.config.restart_cooldown))
            .await;
        self.restarts_requested += 1;
        self.supervisor.request_restart();
    }

    fn enter(&mut self, next: CoordinatorState) {
        if next != self.state {
            debug!("coordinator: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
