#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::{info, warn};
use static_cell::StaticCell;
use weather_core::app_state::AppState;
use weather_core::config::HTTP_WORKER_COUNT;
use weather_core::http::{Router, weather_routes};
use weather_firmware::{hardware, tasks, wifi, wifi_secrets};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static APP: AppState = AppState::new();
static ROUTER: StaticCell<Router<'static>> = StaticCell::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let led = hardware::init_led(peripherals.GPIO2);
    spawner
        .spawn(tasks::heartbeat_task(led))
        .expect("Failed to spawn heartbeat task");

    let sensors = hardware::init_sensors(peripherals.I2C0, peripherals.GPIO21, peripherals.GPIO22)
        .expect("Failed to configure I2C0");
    spawner
        .spawn(tasks::pressure_task(sensors.pressure, &APP))
        .expect("Failed to spawn pressure task");
    spawner
        .spawn(tasks::magnetic_task(sensors.magnetometer, &APP))
        .expect("Failed to spawn magnetic task");

    let router = ROUTER.init(weather_routes(&APP.visitors).expect("Failed to build routes"));
    info!("{} routes registered", router.len());

    match wifi::start(&spawner, peripherals.WIFI, wifi_secrets::network_config()) {
        Ok(stack) => {
            for id in 0..HTTP_WORKER_COUNT as u8 {
                spawner
                    .spawn(tasks::http_worker(stack, &APP, router, id))
                    .expect("Failed to spawn HTTP worker");
            }
        }
        // Sensors and the heartbeat keep running without a network
        Err(e) => warn!("network disabled: {}", e),
    }

    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
