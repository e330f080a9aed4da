//! Nordic UART Service peripheral.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use defmt::{info, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use heapless::Vec;
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::Softdevice;

use signal_bridge::ble::adv_data;
use signal_bridge::config::{
    BLE_ADV_INTERVAL, BLE_ADV_RETRY_MS, BLE_DEVICE_NAME, NUS_MAX_PAYLOAD, NUS_SERVICE_UUID,
};
use signal_bridge::error::LinkError;
use signal_bridge::link::LinkTransport;

#[nrf_softdevice::gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct NusService {
    /// Central → bridge. Accepted and logged; nothing acts on it.
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write, write_without_response)]
    rx: Vec<u8, NUS_MAX_PAYLOAD>,

    /// Bridge → central.
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    tx: Vec<u8, NUS_MAX_PAYLOAD>,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub nus: NusService,
}

/// Raised by [`NusLink::advertise`], consumed by [`ble_task`].
static ADVERTISE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// The attached central, if any.
static PEER: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));

/// Centrals accepted since boot.
static SESSIONS: AtomicU32 = AtomicU32::new(0);

fn set_peer(conn: Option<Connection>) {
    PEER.lock(|peer| *peer.borrow_mut() = conn);
}

fn peer() -> Option<Connection> {
    PEER.lock(|peer| peer.borrow().clone())
}

/// Advertise on request, then serve the GATT server until the central
/// leaves. A request stays open until a central is accepted, so a failed
/// advertise start is retried here. Runs forever as its own task.
pub async fn ble_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    let adv = adv_data::advertisement(NUS_SERVICE_UUID);
    let scan = adv_data::scan_response(BLE_DEVICE_NAME);
    let config = peripheral::Config {
        interval: BLE_ADV_INTERVAL,
        ..Default::default()
    };

    loop {
        ADVERTISE.wait().await;
        info!("BLE: advertising as {}", BLE_DEVICE_NAME);

        let conn = loop {
            let advertisement = peripheral::ConnectableAdvertisement::ScannableUndirected {
                adv_data: &adv,
                scan_data: &scan,
            };
            match peripheral::advertise_connectable(sd, advertisement, &config).await {
                Ok(conn) => break conn,
                Err(e) => {
                    warn!("BLE: advertise failed: {:?}, retrying", e);
                    Timer::after(Duration::from_millis(BLE_ADV_RETRY_MS)).await;
                }
            }
        };

        info!("BLE: central connected");
        set_peer(Some(conn.clone()));
        SESSIONS.fetch_add(1, Ordering::Release);

        let reason = gatt_server::run(&conn, server, |event| match event {
            ServerEvent::Nus(NusServiceEvent::RxWrite(data)) => {
                info!("BLE: RX {} bytes (ignored)", data.len());
            }
            ServerEvent::Nus(NusServiceEvent::TxCccdWrite { notifications }) => {
                info!("BLE: TX notifications {}", notifications);
            }
        })
        .await;

        set_peer(None);
        info!("BLE: central disconnected: {:?}", reason);
    }
}

/// `LinkTransport` over the NUS TX characteristic.
pub struct NusLink {
    server: &'static Server,
}

impl NusLink {
    pub fn new(server: &'static Server) -> Self {
        Self { server }
    }
}

impl LinkTransport for NusLink {
    async fn advertise(&mut self) -> Result<(), LinkError> {
        ADVERTISE.signal(());
        Ok(())
    }

    fn peer_connected(&self) -> bool {
        peer().is_some()
    }

    fn sessions(&self) -> u32 {
        SESSIONS.load(Ordering::Acquire)
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let conn = peer().ok_or(LinkError::NotConnected)?;
        let payload = Vec::from_slice(bytes).map_err(|_| LinkError::WriteFailed)?;
        self.server.nus.tx_notify(&conn, &payload).map_err(|e| {
            warn!("BLE: notify failed: {:?}", e);
            LinkError::WriteFailed
        })
    }
}
