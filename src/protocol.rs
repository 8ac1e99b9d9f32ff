use strum_macros::{Display, EnumString};

/// Adapter interface resolved at the adapter path.
pub(crate) const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
/// Device interface resolved at each peripheral path.
pub(crate) const DEVICE_INTERFACE: &str = "org.bluez.Device1";
/// GATT application manager interface at the adapter path.
pub(crate) const GATT_MANAGER_INTERFACE: &str = "org.bluez.GattManager1";

/// Failure message BlueZ returns for a connect aborted by the local stack.
/// The only connect failure that is retried.
pub(crate) const CONNECTION_ABORT: &str = "Software caused connection abort";
/// Failure message BlueZ returns when stopping discovery that never started.
/// Treated as success.
pub(crate) const NO_DISCOVERY_STARTED: &str = "No discovery started";

/// Signal interfaces the hub routes.
///
/// Parsing an interface name that is not listed here is an error the
/// dispatcher logs and drops; the bus emits more interfaces than the hub
/// handles.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, EnumString)]
pub enum InterfaceKind {
    /// Peripheral advertising and connection state.
    #[strum(to_string = "org.bluez.Device1")]
    Device,
    /// Characteristic value notifications.
    #[strum(to_string = "org.bluez.GattCharacteristic1")]
    Characteristic,
    /// Adapter-level state, watched for power loss.
    #[strum(to_string = "org.bluez.Adapter1")]
    Adapter,
}
