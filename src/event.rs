use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::bus::BusMessage;
use crate::variant::PropertySet;

/// Identity fields of one configured device, attached to every event it
/// produces.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, derive_more::Display)]
#[display("{name} ({mac})")]
pub struct DeviceIdentity {
    /// Logical device name from configuration.
    pub name: String,
    /// Hardware address from configuration.
    pub mac: String,
    /// Device type tag the registry constructed this device from.
    pub kind: String,
}

/// Which wire interface a device update originated from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum UpdateSource {
    /// Advertising properties from the device interface.
    #[strum(to_string = "advertising")]
    Advertising,
    /// Characteristic value notifications.
    #[strum(to_string = "notification")]
    Notification,
}

/// Events emitted by the hub and its devices over the outbound channel.
///
/// The channel replaces broadcaster inheritance: consumers receive one typed
/// stream instead of subscribing to each entity.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// The setup pipeline ran to completion.
    SetupCompleted,
    /// A device accepted a routed signal and re-emitted its decoded
    /// properties.
    DeviceUpdate {
        device: DeviceIdentity,
        source: UpdateSource,
        properties: PropertySet,
    },
    /// A device connect operation succeeded.
    DeviceConnected { device: DeviceIdentity },
    /// A device was released during hub teardown.
    DeviceDestroyed { device: DeviceIdentity },
    /// The adapter reported its radio powered off. Fatal; delivered
    /// out-of-band because it can occur long after setup completed.
    AdapterPoweredOff { message: BusMessage },
}
