use bon::Builder;
use serde::{Deserialize, Serialize};

fn default_transport() -> String {
    "le".to_string()
}

fn default_root_path() -> String {
    "/org/bluez/".to_string()
}

fn default_connect_retries() -> u32 {
    3
}

/// Static configuration the hub is constructed from.
///
/// The hosting process owns loading; this crate only defines the shape.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct HubConfig {
    /// Hub name used in log output.
    pub name: String,
    /// Adapter name, e.g. `hci0`.
    pub hci: String,
    /// Discovery transport filter mode.
    #[serde(default = "default_transport")]
    #[builder(default = default_transport())]
    pub transport: String,
    /// Root bus path prefix the adapter path is derived under.
    #[serde(default = "default_root_path")]
    #[builder(default = default_root_path())]
    pub root_path: String,
    /// Retry budget for each device connect.
    #[serde(default = "default_connect_retries")]
    #[builder(default = default_connect_retries())]
    pub connect_retries: u32,
    /// Peripherals the hub owns.
    #[serde(default)]
    #[builder(default)]
    pub devices: Vec<DeviceDescriptor>,
}

impl HubConfig {
    /// Returns the adapter path, `<root_path><hci>`.
    #[must_use]
    pub fn adapter_path(&self) -> String {
        format!("{}{}", self.root_path, self.hci)
    }
}

/// One configured peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Builder)]
pub struct DeviceDescriptor {
    /// Device type tag resolved through the registry.
    #[serde(rename = "type")]
    pub kind: String,
    /// Logical device name.
    pub name: String,
    /// MAC-like hardware address, colon-delimited.
    pub mac: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn config_fills_defaults_when_deserialized() {
        let config: HubConfig = serde_json::from_str(
            r#"{
                "name": "bathroom",
                "hci": "hci0",
                "devices": [{"type": "OralBToothbrush", "name": "brush", "mac": "AA:BB:CC:DD:EE:FF"}]
            }"#,
        )
        .expect("minimal config should deserialize");

        assert_eq!("le", config.transport);
        assert_eq!("/org/bluez/", config.root_path);
        assert_eq!(3, config.connect_retries);
        assert_eq!("/org/bluez/hci0", config.adapter_path());
        assert_eq!("OralBToothbrush", config.devices[0].kind);
    }

    #[test]
    fn builder_applies_the_same_defaults() {
        let config = HubConfig::builder()
            .name("bathroom".to_string())
            .hci("hci1".to_string())
            .build();

        assert_eq!("le", config.transport);
        assert_eq!("/org/bluez/hci1", config.adapter_path());
        assert_eq!(3, config.connect_retries);
        assert!(config.devices.is_empty());
    }
}
