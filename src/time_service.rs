use tracing::{debug, info, instrument};

use crate::bus::BusConnection;
use crate::error::HubError;
use crate::protocol;
use crate::variant::Variant;

/// Object path the current-time application is exported under.
const APPLICATION_PATH: &str = "/current_time_service";

/// A current-time GATT service exposed to connected peripherals.
///
/// A sibling subsystem the hub starts during setup: peripherals that want
/// wall-clock time read it from this service. Registration goes through the
/// adapter's GATT manager.
#[derive(Debug)]
pub struct CurrentTimeService {
    adapter_path: String,
    initialized: bool,
}

impl CurrentTimeService {
    /// Creates the service for one adapter.
    #[must_use]
    pub fn new(adapter_path: impl Into<String>) -> Self {
        Self {
            adapter_path: adapter_path.into(),
            initialized: false,
        }
    }

    /// Registers the service application with the adapter's GATT manager.
    ///
    /// # Errors
    ///
    /// Returns an error when the manager proxy cannot be resolved or the
    /// registration call fails.
    #[instrument(skip(self, bus), level = "debug", fields(adapter = %self.adapter_path))]
    pub async fn initialize(&mut self, bus: &dyn BusConnection) -> Result<(), HubError> {
        let manager = bus
            .interface_proxy(&self.adapter_path, protocol::GATT_MANAGER_INTERFACE)
            .await?;
        manager
            .call(
                "RegisterApplication",
                &[Variant::from(APPLICATION_PATH), Variant::unit()],
            )
            .await?;
        self.initialized = true;
        info!(adapter = %self.adapter_path, "current-time service registered");
        Ok(())
    }

    /// Unregisters the service application. A no-op when initialization
    /// never ran.
    ///
    /// # Errors
    ///
    /// Returns an error when the manager proxy cannot be resolved or the
    /// unregistration call fails.
    #[instrument(skip(self, bus), level = "debug", fields(adapter = %self.adapter_path))]
    pub async fn destroy(&mut self, bus: &dyn BusConnection) -> Result<(), HubError> {
        if !self.initialized {
            debug!("current-time service was never initialized");
            return Ok(());
        }

        let manager = bus
            .interface_proxy(&self.adapter_path, protocol::GATT_MANAGER_INTERFACE)
            .await?;
        manager
            .call("UnregisterApplication", &[Variant::from(APPLICATION_PATH)])
            .await?;
        self.initialized = false;
        Ok(())
    }
}
