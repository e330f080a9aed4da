//! WiFi network connector with bounded retry.
//!
//! Joins the configured access point through a [`WifiRadio`], retrying up
//! to [`RetryPolicy::max_attempts`] times with a fixed backoff between
//! attempts, and hands back the radio's [`SocketFactory`] once online.

use core::time::Duration;

use embedded_hal_async::delay::DelayNs;

use crate::error::{NetworkError, RadioError};
use crate::link::duration_ms;
use crate::socket::SocketFactory;

/// IPv4 address as four octets.
pub type Ipv4 = [u8; 4];

/// Access point credentials.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl core::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How hard to try before declaring the network unreachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u8, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

/// Connectivity as seen by the connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkState {
    Offline,
    Connecting,
    Online(Ipv4),
    Failed,
}

/// Capability interface to the WiFi radio.
#[allow(async_fn_in_trait)]
pub trait WifiRadio {
    type Sockets: SocketFactory;

    /// True if the radio is already associated (e.g. after a warm reset).
    async fn is_joined(&mut self) -> bool;

    /// One join attempt. Returns the leased address.
    async fn join(&mut self, credentials: &Credentials<'_>) -> Result<Ipv4, RadioError>;

    /// Current station address, if any.
    async fn address(&mut self) -> Result<Ipv4, RadioError>;

    async fn mac_address(&mut self) -> Result<[u8; 6], RadioError>;

    /// Reachability check: HTTP GET against `host`.
    async fn probe(&mut self, host: &str) -> Result<(), RadioError>;

    /// Socket factory bound to the joined network.
    fn sockets(&mut self) -> Self::Sockets;
}

pub struct NetworkConnector<R> {
    radio: R,
    state: NetworkState,
}

impl<R: WifiRadio> NetworkConnector<R> {
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            state: NetworkState::Offline,
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Join the network, retrying per `policy`.
    ///
    /// Makes exactly `policy.max_attempts` join attempts on persistent
    /// failure and sleeps `policy.backoff` between consecutive attempts.
    /// A failing `probe_host` check only logs a warning.
    pub async fn connect<D: DelayNs>(
        &mut self,
        credentials: &Credentials<'_>,
        policy: &RetryPolicy,
        probe_host: Option<&str>,
        delay: &mut D,
    ) -> Result<R::Sockets, NetworkError> {
        self.state = NetworkState::Connecting;

        if let Ok(mac) = self.radio.mac_address().await {
            info!("wifi: MAC address {:?}", mac);
        }

        let address = match self.join_with_retry(credentials, policy, delay).await {
            Ok(address) => address,
            Err(e) => {
                self.state = NetworkState::Failed;
                error!("wifi: {}", e);
                return Err(e);
            }
        };

        info!(
            "wifi: connected, IP {}.{}.{}.{}",
            address[0],
            address[1],
            address[2],
            address[3]
        );
        self.state = NetworkState::Online(address);

        if let Some(host) = probe_host {
            match self.radio.probe(host).await {
                Ok(()) => info!("wifi: probe of {} ok", host),
                Err(e) => warn!("wifi: probe of {} failed: {:?}", host, e),
            }
        }

        Ok(self.radio.sockets())
    }

    async fn join_with_retry<D: DelayNs>(
        &mut self,
        credentials: &Credentials<'_>,
        policy: &RetryPolicy,
        delay: &mut D,
    ) -> Result<Ipv4, NetworkError> {
        if self.radio.is_joined().await {
            if let Ok(address) = self.radio.address().await {
                info!("wifi: already joined");
                return Ok(address);
            }
        }

        for attempt in 1..=policy.max_attempts {
            info!(
                "wifi: connecting to {} (attempt {}/{})",
                credentials.ssid,
                attempt,
                policy.max_attempts
            );
            match self.radio.join(credentials).await {
                Ok(address) => return Ok(address),
                Err(e) => {
                    warn!("wifi: attempt {} failed: {:?}", attempt, e);
                    if attempt < policy.max_attempts {
                        delay.delay_ms(duration_ms(policy.backoff)).await;
                    }
                }
            }
        }

        Err(NetworkError::Exhausted {
            attempts: policy.max_attempts,
        })
    }
}
