//! signal-bridge firmware entry point.
//!
//! nRF52840 + SoftDevice S140 (BLE peripheral, NUS) + ESP32 AirLift
//! (WiFi over SPIM3) + RGB LED on PWM0 + two buttons.
//!
//! Task layout:
//!   - `softdevice_task` - SoftDevice event pump
//!   - `ble_runner`      - advertise on request, serve the NUS GATT server
//!   - `button_runner`×2 - debounce A/B, queue device ids
//!   - main              - the coordinator loop (WiFi, HTTP server, LED)
//!
//! WiFi credentials are baked in at build time:
//!   `WIFI_SSID=... WIFI_PASSWORD=... cargo run --release --features embedded`

#![no_std]
#![no_main]

mod ble;
mod ui;
mod wifi;

use core::mem;

use defmt::{error, info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{AnyPin, Input, Level, Output, OutputDrive, Pin as _, Pull};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::pwm::SimplePwm;
use embassy_nrf::{bind_interrupts, peripherals, spim};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_sync::mutex::Mutex;
use embassy_time::Delay;
use embedded_alloc::LlffHeap as Heap;
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use signal_bridge::config::{BridgeConfig, BLE_DEVICE_NAME, BUTTON_A_DEVICE, BUTTON_B_DEVICE};
use signal_bridge::network::Credentials;
use signal_bridge::{Coordinator, Peripherals, Supervisor};

use ble::nus::{NusLink, Server};
use ui::buttons::{ChannelInput, PressChannel, PRESS_QUEUE};
use ui::led::PwmLed;
use wifi::driver::{Nina, NinaRadio, SharedNina};

/// JSON request bodies are parsed into `serde_json::Value`.
const HEAP_SIZE: usize = 8 * 1024;

#[global_allocator]
static HEAP: Heap = Heap::empty();

bind_interrupts!(struct Irqs {
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
});

type AirLiftSpi = spim::Spim<'static, peripherals::SPI3>;

static NINA: StaticCell<SharedNina<AirLiftSpi>> = StaticCell::new();
static SERVER: StaticCell<Server> = StaticCell::new();
static PRESSES: PressChannel = PressChannel::new();

/// Restart through the Cortex-M system reset request.
struct SysReset;

impl Supervisor for SysReset {
    fn request_restart(&mut self) {
        info!("Requesting system reset");
        cortex_m::peripheral::SCB::sys_reset();
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn ble_runner(sd: &'static Softdevice, server: &'static Server) -> ! {
    ble::nus::ble_task(sd, server).await
}

#[embassy_executor::task(pool_size = 2)]
async fn button_runner(
    pin: AnyPin,
    device_id: i64,
    tx: Sender<'static, CriticalSectionRawMutex, i64, PRESS_QUEUE>,
) -> ! {
    ui::buttons::button_task(pin, device_id, tx).await
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: BLE_DEVICE_NAME.as_ptr() as _,
            current_len: BLE_DEVICE_NAME.len() as u16,
            max_len: BLE_DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    {
        use core::mem::MaybeUninit;
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
    }

    info!("signal-bridge starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);
    interrupt::SPIM3.set_priority(Priority::P3);

    // BLE
    let sd = Softdevice::enable(&softdevice_config());
    let server = SERVER.init(unwrap!(Server::new(sd)));
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(ble_runner(sd, server)));

    // Buttons
    unwrap!(spawner.spawn(button_runner(
        p.P1_15.degrade(),
        BUTTON_A_DEVICE,
        PRESSES.sender()
    )));
    unwrap!(spawner.spawn(button_runner(
        p.P1_02.degrade(),
        BUTTON_B_DEVICE,
        PRESSES.sender()
    )));

    // LED
    let led = PwmLed::new(SimplePwm::new_3ch(p.PWM0, p.P0_06, p.P0_08, p.P1_09));

    // AirLift
    let mut spi_config = spim::Config::default();
    spi_config.frequency = spim::Frequency::M8;
    let spi = spim::Spim::new(p.SPI3, Irqs, p.P0_14, p.P0_15, p.P0_13, spi_config);
    let cs = Output::new(p.P0_26, Level::High, OutputDrive::Standard);
    let busy = Input::new(p.P0_27, Pull::None);
    let reset = Output::new(p.P0_04, Level::High, OutputDrive::Standard);
    let nina = NINA.init(Mutex::new(Nina::new(spi, cs, busy, reset)));
    nina.lock().await.reset().await;

    let credentials = Credentials {
        ssid: env!("WIFI_SSID"),
        password: env!("WIFI_PASSWORD"),
    };

    let mut coordinator = Coordinator::new(
        BridgeConfig::default(),
        credentials,
        Peripherals {
            radio: NinaRadio::new(nina),
            link: NusLink::new(server),
            led,
            supervisor: SysReset,
            delay: Delay,
            input: ChannelInput::new(PRESSES.receiver()),
        },
    );

    let err = coordinator.run().await;
    error!("coordinator stopped: {}", err);
}
