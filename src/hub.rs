use futures::future::join_all;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, trace, warn};

use crate::bus::{BusConnection, BusMessage, InterfaceProxy, MessageBody};
use crate::config::HubConfig;
use crate::device::Device;
use crate::error::HubError;
use crate::event::HubEvent;
use crate::protocol::{self, InterfaceKind};
use crate::registry::DeviceRegistry;
use crate::time_service::CurrentTimeService;
use crate::variant::{PropertySet, PropertyValue, Variant, decode_properties};

/// Owns the adapter lifecycle and signal routing for all configured
/// devices.
///
/// One hub per process: the hosting glue constructs it once, runs `setup`
/// and feeds the signal receiver it returns through `run` (or message by
/// message through `dispatch`). Telemetry flows bus → dispatch → decoder →
/// device → event channel; control flows the other way during setup.
#[derive(Debug)]
pub struct Hub {
    name: String,
    path: String,
    transport: String,
    connect_retries: u32,
    devices: Vec<Device>,
    time_service: CurrentTimeService,
    events: UnboundedSender<HubEvent>,
}

impl Hub {
    /// Constructs a hub and its outbound event channel from configuration,
    /// using the built-in device registry.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDeviceType`] when configuration names a
    /// type the registry does not know.
    pub fn new(config: HubConfig) -> Result<(Self, UnboundedReceiver<HubEvent>), HubError> {
        Self::with_registry(config, &DeviceRegistry::with_builtins())
    }

    /// Constructs a hub with an explicit device registry.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDeviceType`] when configuration names a
    /// type the registry does not know.
    pub fn with_registry(
        config: HubConfig,
        registry: &DeviceRegistry,
    ) -> Result<(Self, UnboundedReceiver<HubEvent>), HubError> {
        let (events, receiver) = mpsc::unbounded_channel();
        let path = config.adapter_path();
        let devices = config
            .devices
            .into_iter()
            .map(|descriptor| registry.create(descriptor, events.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let hub = Self {
            name: config.name,
            time_service: CurrentTimeService::new(&path),
            path,
            transport: config.transport,
            connect_retries: config.connect_retries,
            devices,
            events,
        };
        Ok((hub, receiver))
    }

    /// Returns the adapter path every owned device path is a child of.
    #[must_use]
    pub fn adapter_path(&self) -> &str {
        &self.path
    }

    /// Returns the owned devices.
    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Runs the setup pipeline: signal subscription, auxiliary service,
    /// discovery restart with the transport filter, then all device
    /// connects.
    ///
    /// The subscription is taken before discovery starts, so signals
    /// emitted while the rest of setup is still running are buffered in the
    /// returned receiver rather than lost. Hand the receiver to [`Hub::run`]
    /// or drain it through [`Hub::dispatch`].
    ///
    /// # Errors
    ///
    /// Fails on auxiliary-service registration failure, adapter proxy
    /// resolution failure, a discovery failure other than "no discovery
    /// started", or any device connect failing after its retries. Setup
    /// failure is fatal to the hosting process.
    #[instrument(skip(self, bus), level = "info", fields(hub = %self.name, adapter = %self.path))]
    pub async fn setup(
        &mut self,
        bus: &dyn BusConnection,
    ) -> Result<UnboundedReceiver<BusMessage>, HubError> {
        let signals = bus.subscribe();

        self.time_service.initialize(bus).await?;

        let adapter = bus
            .interface_proxy(&self.path, protocol::ADAPTER_INTERFACE)
            .await?;
        self.stop_discovery(adapter.as_ref()).await?;
        self.start_discovery(adapter.as_ref()).await?;
        self.connect_devices(bus).await?;

        self.emit(HubEvent::SetupCompleted);
        info!("setup completed");
        Ok(signals)
    }

    /// Routes one inbound signal to the matching devices.
    ///
    /// Signals outside the adapter path, without a body, or for an
    /// unhandled interface are dropped; the bus emits more shapes than the
    /// hub can enumerate, so dropping is silent by design.
    pub fn dispatch(&mut self, message: &BusMessage) {
        if !message.path.starts_with(&self.path) {
            return;
        }
        let Some(body) = &message.body else {
            trace!(path = %message.path, "signal without body ignored");
            return;
        };

        match body.interface.parse::<InterfaceKind>() {
            Ok(InterfaceKind::Device) => self.dispatch_device_signal(&message.path, body),
            Ok(InterfaceKind::Characteristic) => {
                self.dispatch_characteristic_signal(&message.path, body);
            }
            Ok(InterfaceKind::Adapter) => self.dispatch_adapter_signal(message, body),
            Err(_) => {
                debug!(path = %message.path, interface = %body.interface, "unhandled signal interface");
            }
        }
    }

    /// Drains a signal receiver through `dispatch`, one message at a time
    /// in arrival order, until the channel closes.
    pub async fn run(&mut self, mut messages: UnboundedReceiver<BusMessage>) {
        while let Some(message) = messages.recv().await {
            self.dispatch(&message);
        }
        debug!(hub = %self.name, "bus signal stream closed");
    }

    /// Releases every device, then the auxiliary service, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error when unregistering the auxiliary service fails.
    #[instrument(skip(self, bus), level = "info", fields(hub = %self.name))]
    pub async fn destroy(&mut self, bus: &dyn BusConnection) -> Result<(), HubError> {
        for device in &self.devices {
            device.destroy();
        }
        self.time_service.destroy(bus).await?;
        Ok(())
    }

    /// Stops any in-progress discovery. "No discovery started" counts as
    /// success; everything else aborts setup.
    async fn stop_discovery(&self, adapter: &dyn InterfaceProxy) -> Result<(), HubError> {
        match adapter.call("StopDiscovery", &[]).await {
            Ok(_) => Ok(()),
            Err(error) if error.message() == protocol::NO_DISCOVERY_STARTED => {
                debug!("no discovery in progress");
                Ok(())
            }
            Err(error) => Err(HubError::AdapterDiscovery {
                reason: error.message(),
            }),
        }
    }

    /// Starts discovery restricted to the configured transport.
    async fn start_discovery(&self, adapter: &dyn InterfaceProxy) -> Result<(), HubError> {
        let filter = Variant::Seq(vec![Variant::Seq(vec![
            Variant::from("Transport"),
            Variant::Seq(vec![
                Variant::from("s"),
                Variant::from(self.transport.as_str()),
            ]),
        ])]);
        adapter.call("SetDiscoveryFilter", &[filter]).await?;
        adapter.call("StartDiscovery", &[]).await?;
        Ok(())
    }

    /// Connects every device concurrently, each with its own retry budget.
    ///
    /// All connects run to completion before the outcome is decided; when
    /// any failed, the first failure is returned after the rest have
    /// settled.
    #[instrument(skip(self, bus), level = "debug", fields(devices = self.devices.len()))]
    async fn connect_devices(&mut self, bus: &dyn BusConnection) -> Result<(), HubError> {
        let adapter_path = self.path.clone();
        let retries = self.connect_retries;

        let connects = self.devices.iter_mut().map(|device| {
            let device_path = format!("{adapter_path}/{}", device.path_segment());
            async move {
                let proxy = bus
                    .interface_proxy(&device_path, protocol::DEVICE_INTERFACE)
                    .await?;
                device.connect(proxy.as_ref(), retries).await?;
                Ok::<(), HubError>(())
            }
        });

        let mut first_failure = None;
        for result in join_all(connects).await {
            if let Err(error) = result {
                warn!(%error, "device connect failed");
                if first_failure.is_none() {
                    first_failure = Some(error);
                }
            }
        }
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn dispatch_device_signal(&mut self, path: &str, body: &MessageBody) {
        let Some(segment) = path.rsplit('/').next() else {
            return;
        };
        let properties = decode_properties(&body.changed);
        for device in &mut self.devices {
            device.update(InterfaceKind::Device, segment, &properties);
        }
    }

    fn dispatch_characteristic_signal(&mut self, path: &str, body: &MessageBody) {
        let components: Vec<&str> = path.split('/').collect();
        let (Some(segment), Some(service), Some(characteristic)) =
            (components.get(4), components.get(5), components.get(6))
        else {
            debug!(path, "characteristic signal path too short");
            return;
        };

        let decoded = decode_properties(&body.changed);
        if decoded.len() != 1 {
            trace!(path, "characteristic signal without a sole changed property ignored");
            return;
        }
        let Some(value) = decoded.get("Value") else {
            trace!(path, "characteristic signal did not change Value");
            return;
        };

        let mut properties = PropertySet::new();
        properties.insert(format!("{service}/{characteristic}"), value.clone());
        for device in &mut self.devices {
            device.update(InterfaceKind::Characteristic, segment, &properties);
        }
    }

    fn dispatch_adapter_signal(&mut self, message: &BusMessage, body: &MessageBody) {
        let powered_off = decode_properties(&body.changed)
            .get("Powered")
            .and_then(PropertyValue::as_bool)
            == Some(false);

        if powered_off {
            warn!(path = %message.path, "adapter powered off");
            self.emit(HubEvent::AdapterPoweredOff {
                message: message.clone(),
            });
        } else {
            trace!(path = %message.path, "unhandled adapter signal");
        }
    }

    fn emit(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            trace!(hub = %self.name, "event receiver dropped");
        }
    }
}
