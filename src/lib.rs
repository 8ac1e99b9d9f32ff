//! Bus-signal routing and payload decoding for known BLE peripherals.
//!
//! The hub multiplexes property-changed signals from the system bus to the
//! correct logical device, decodes the bus's nested variant-array encoding
//! into flat property sets, drives a bounded-retry connect per device and
//! surfaces adapter power loss as a fatal event. The bus transport itself
//! is a trait boundary; see [`bus`].

mod config;
mod device;
mod error;
mod event;
mod hub;
mod protocol;
mod registry;
mod time_service;
mod variant;

pub mod bus;

pub use config::{DeviceDescriptor, HubConfig};
pub use device::{Device, derive_path_segment};
pub use error::{BusError, ConnectError, FixtureError, HubError, MethodError};
pub use event::{DeviceIdentity, HubEvent, UpdateSource};
pub use hub::Hub;
pub use protocol::InterfaceKind;
pub use registry::{DeviceConstructor, DeviceRegistry};
pub use time_service::CurrentTimeService;
pub use variant::{PropertySet, PropertyValue, Variant, decode_properties};
