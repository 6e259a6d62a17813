use std::{path::Path, time::Duration};

use cardvault_ccid::UsbConfig;
use cardvault_openpgp::CardConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Prefix of environment variables overriding the config file
const ENV_PREFIX: &str = "CARDVAULT_";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) usb: UsbSettings,
    pub(crate) card: CardConfig,
}

/// USB device settings as they appear in the config file
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct UsbSettings {
    vendor_id: u16,
    configuration: u8,
    interface: u8,
    endpoint_out: u8,
    endpoint_in: u8,
    timeout_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        let defaults = UsbConfig::default();
        Self {
            vendor_id: defaults.vendor_id,
            configuration: defaults.configuration,
            interface: defaults.interface,
            endpoint_out: defaults.endpoint_out,
            endpoint_in: defaults.endpoint_in,
            timeout_ms: defaults.timeout.as_millis() as u64,
        }
    }
}

impl From<&UsbSettings> for UsbConfig {
    fn from(settings: &UsbSettings) -> Self {
        Self::new()
            .with_vendor_id(settings.vendor_id)
            .with_configuration(settings.configuration)
            .with_interface(settings.interface)
            .with_endpoints(settings.endpoint_out, settings.endpoint_in)
            .with_timeout(Duration::from_millis(settings.timeout_ms))
    }
}

/// Built-in defaults, then `path` if it exists, then `CARDVAULT_*` variables
///
/// Nested keys use a double underscore, e.g. `CARDVAULT_CARD__POLL_ATTEMPTS=30`.
pub(crate) fn load_config(path: &Path) -> eyre::Result<Config> {
    Ok(Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?)
}
