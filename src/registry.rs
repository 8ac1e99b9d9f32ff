use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::DeviceDescriptor;
use crate::device::Device;
use crate::error::HubError;
use crate::event::{DeviceIdentity, HubEvent};

/// Constructor for one device type.
pub type DeviceConstructor = fn(DeviceDescriptor, UnboundedSender<HubEvent>) -> Device;

/// Maps device-type tags to constructors. Pure dispatch: no caching, no
/// retry.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    constructors: HashMap<String, DeviceConstructor>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in device types.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("OralBToothbrush", construct_plain_device);
        registry
    }

    /// Registers a constructor for a type tag, replacing any previous one.
    pub fn register(&mut self, kind: &str, constructor: DeviceConstructor) {
        self.constructors.insert(kind.to_string(), constructor);
    }

    /// Constructs a device for a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDeviceType`] when the descriptor's type
    /// tag has no registered constructor.
    pub fn create(
        &self,
        descriptor: DeviceDescriptor,
        events: UnboundedSender<HubEvent>,
    ) -> Result<Device, HubError> {
        let constructor =
            self.constructors
                .get(&descriptor.kind)
                .ok_or_else(|| HubError::UnknownDeviceType {
                    kind: descriptor.kind.clone(),
                })?;
        Ok(constructor(descriptor, events))
    }
}

/// Default constructor: business decoding of characteristic bytes lives
/// with the consumer, so every built-in type is a plain state holder.
fn construct_plain_device(
    descriptor: DeviceDescriptor,
    events: UnboundedSender<HubEvent>,
) -> Device {
    Device::new(
        DeviceIdentity {
            name: descriptor.name,
            mac: descriptor.mac,
            kind: descriptor.kind,
        },
        events,
    )
}
