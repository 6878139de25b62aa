// NV7 Controller — Wi-Fi station + MQTT transport (firmware only)

use anyhow::anyhow;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::mqtt::client::{EspMqttClient, MqttClientConfiguration, QoS};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::config::MqttConfig;
use crate::publisher::MqttTransport;

/// Join the access point baked in at build time. The returned driver must
/// be kept alive for the connection to stay up.
pub fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let ssid = option_env!("WIFI_SSID").ok_or_else(|| anyhow!("WIFI_SSID was not set at build time"))?;
    let pass = option_env!("WIFI_PASS").unwrap_or("");

    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), Some(nvs))?, sys_loop)?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow!("WIFI_SSID is too long"))?,
        password: pass.try_into().map_err(|_| anyhow!("WIFI_PASS is too long"))?,
        auth_method: if pass.is_empty() { AuthMethod::None } else { AuthMethod::WPA2Personal },
        ..Default::default()
    }))?;

    wifi.start()?;
    log::info!("Wi-Fi started, connecting to '{}'", ssid);
    wifi.connect()?;
    wifi.wait_netif_up()?;
    log::info!("Wi-Fi connected");

    Ok(wifi)
}

pub struct EspMqttTransport {
    client: EspMqttClient<'static>,
}

impl EspMqttTransport {
    pub fn connect(cfg: &MqttConfig) -> anyhow::Result<Self> {
        let url = cfg.url();
        let client = EspMqttClient::new_cb(&url, &MqttClientConfiguration::default(), |event| {
            log::debug!("MQTT: {:?}", event.payload());
        })?;
        log::info!("MQTT client created for {}", url);
        Ok(Self { client })
    }
}

impl MqttTransport for EspMqttTransport {
    fn enqueue(&mut self, topic: &str, retain: bool, payload: &[u8]) -> anyhow::Result<()> {
        // Enqueue rather than publish: the poll thread must not wait on the broker.
        self.client.enqueue(topic, QoS::AtLeastOnce, retain, payload)?;
        Ok(())
    }
}
