//! Wi-Fi station and network stack
//!
//! The connection task joins the configured network, waits for DHCP and then
//! sleeps until the access point drops us, at which point it starts over.

use alloc::string::String;
use embassy_executor::{SpawnError, Spawner};
use embassy_net::{Config as NetConfig, DhcpConfig, Runner, Stack, StackResources};
use embassy_time::{Duration, Timer};
use esp_hal::peripherals::WIFI;
use esp_hal::rng::Rng;
use esp_radio::Controller;
use esp_radio::wifi::{self, ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent};
use log::{info, warn};
use static_cell::StaticCell;
use thiserror_no_std::Error;
use weather_core::config::{Config, HOSTNAME, HTTP_WORKER_COUNT};

/// Sockets: one per HTTP worker plus DHCP and DNS
const SOCKET_COUNT: usize = HTTP_WORKER_COUNT + 2;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const DHCP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("radio initialization failed: {0:?}")]
    Radio(esp_radio::InitializationError),
    #[error("wifi driver failed: {0:?}")]
    Wifi(wifi::WifiError),
    #[error("could not spawn network task: {0:?}")]
    Spawn(SpawnError),
}

/// Bring up the radio and the IP stack, and spawn the tasks driving them.
pub fn start(
    spawner: &Spawner,
    wifi_peripheral: WIFI<'static>,
    config: Config<'static>,
) -> Result<Stack<'static>, NetworkError> {
    static RADIO: StaticCell<Controller<'static>> = StaticCell::new();
    static RESOURCES: StaticCell<StackResources<SOCKET_COUNT>> = StaticCell::new();

    let radio = RADIO.init(esp_radio::init().map_err(NetworkError::Radio)?);
    let (controller, interfaces) =
        wifi::new(radio, wifi_peripheral, Default::default()).map_err(NetworkError::Wifi)?;

    let mut dhcp = DhcpConfig::default();
    dhcp.hostname = HOSTNAME.try_into().ok();

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        NetConfig::dhcpv4(dhcp),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner
        .spawn(connection_task(controller, stack, config))
        .map_err(NetworkError::Spawn)?;
    spawner.spawn(net_task(runner)).map_err(NetworkError::Spawn)?;
    Ok(stack)
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

#[embassy_executor::task]
async fn connection_task(
    mut controller: WifiController<'static>,
    stack: Stack<'static>,
    config: Config<'static>,
) {
    let ssid = config.internet.ssid;
    if ssid.is_empty() {
        warn!("no SSID configured, staying offline");
        return;
    }
    info!("wifi task starting (ssid=\"{}\", hostname={})", ssid, HOSTNAME);

    let client_config = ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(String::from(ssid))
            .with_password(String::from(config.internet.password)),
    );

    loop {
        if !matches!(controller.is_started(), Ok(true)) {
            if let Err(e) = controller.set_config(&client_config) {
                warn!("wifi set_config failed: {:?}", e);
                Timer::after(RETRY_DELAY).await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                warn!("wifi start failed: {:?}", e);
                Timer::after(RETRY_DELAY).await;
                continue;
            }
            info!("wifi station started");
        }

        if let Err(e) = controller.connect_async().await {
            warn!("connecting to \"{}\" failed: {:?}", ssid, e);
            Timer::after(RETRY_DELAY).await;
            continue;
        }
        info!("associated with \"{}\", waiting for DHCP", ssid);

        match embassy_time::with_timeout(DHCP_TIMEOUT, stack.wait_config_up()).await {
            Ok(()) => {
                if let Some(v4) = stack.config_v4() {
                    info!("network up: http://{}/", v4.address.address());
                }
            }
            Err(_) => warn!("no DHCP lease after {}s", DHCP_TIMEOUT.as_secs()),
        }

        controller.wait_for_event(WifiEvent::StaDisconnected).await;
        warn!("wifi disconnected, reconnecting");
        Timer::after(RETRY_DELAY).await;
    }
}
