use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tracing::{debug, info, instrument, trace};

use crate::bus::InterfaceProxy;
use crate::error::ConnectError;
use crate::event::{DeviceIdentity, HubEvent, UpdateSource};
use crate::protocol::{self, InterfaceKind};
use crate::variant::PropertySet;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Derives the bus path segment for a hardware address.
///
/// A pure function of the address: delimiters become underscores, every
/// other character passes through unchanged. Inbound signals are matched to
/// devices by this segment alone, without a live lookup table.
#[must_use]
pub fn derive_path_segment(mac: &str) -> String {
    format!("dev_{}", mac.replace(':', "_"))
}

/// Per-peripheral state holder.
///
/// Owns the two connection flags and a bounded-retry connect operation;
/// filters inbound signals by its own derived path segment and re-emits
/// accepted updates over the hub event channel.
#[derive(Debug)]
pub struct Device {
    identity: DeviceIdentity,
    path_segment: String,
    connected: bool,
    services_resolved: bool,
    events: UnboundedSender<HubEvent>,
}

impl Device {
    /// Creates a device from its identity fields.
    #[must_use]
    pub fn new(identity: DeviceIdentity, events: UnboundedSender<HubEvent>) -> Self {
        let path_segment = derive_path_segment(&identity.mac);
        Self {
            identity,
            path_segment,
            connected: false,
            services_resolved: false,
            events,
        }
    }

    /// Returns the device identity.
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Returns the derived bus path segment.
    #[must_use]
    pub fn path_segment(&self) -> &str {
        &self.path_segment
    }

    /// Returns whether the peripheral is connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Returns whether service resolution completed.
    #[must_use]
    pub fn services_resolved(&self) -> bool {
        self.services_resolved
    }

    /// Applies a routed signal to this device.
    ///
    /// A no-op unless `path_segment` matches this device's derived segment.
    /// On a match the connection flags are folded in and the full property
    /// set is re-emitted as a device update tagged with its source
    /// interface.
    pub(crate) fn update(
        &mut self,
        interface: InterfaceKind,
        path_segment: &str,
        properties: &PropertySet,
    ) {
        if path_segment != self.path_segment {
            return;
        }

        for (name, value) in properties {
            match name.as_str() {
                "Connected" => {
                    if let Some(flag) = value.as_bool() {
                        self.connected = flag;
                    }
                }
                "ServicesResolved" => {
                    if let Some(flag) = value.as_bool() {
                        self.services_resolved = flag;
                    }
                }
                _ => {}
            }
        }

        let source = match interface {
            InterfaceKind::Device => UpdateSource::Advertising,
            InterfaceKind::Characteristic => UpdateSource::Notification,
            InterfaceKind::Adapter => return,
        };

        trace!(device = %self.identity, %source, properties = properties.len(), "device accepted update");
        self.emit(HubEvent::DeviceUpdate {
            device: self.identity.clone(),
            source,
            properties: properties.clone(),
        });
    }

    /// Connects the peripheral through its device interface proxy.
    ///
    /// Retries only the transient abort failure, up to `max_tries` total
    /// attempts; any other failure is returned immediately. The attempt
    /// counter lives in this call alone, so concurrent or later connects
    /// never observe it.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Exhausted`] when the retry budget runs out
    /// and [`ConnectError::Failed`] for a non-retryable failure.
    #[instrument(skip(self, proxy), level = "debug", fields(device = %self.identity, max_tries))]
    pub(crate) async fn connect(
        &mut self,
        proxy: &dyn InterfaceProxy,
        max_tries: u32,
    ) -> Result<(), ConnectError> {
        let mut attempt = ConnectAttempt::new(max_tries);
        loop {
            match proxy.call("Connect", &[]).await {
                Ok(_) => {
                    self.connected = true;
                    info!(device = %self.identity, "connected");
                    self.emit(HubEvent::DeviceConnected {
                        device: self.identity.clone(),
                    });
                    return Ok(());
                }
                Err(error) if error.message() == protocol::CONNECTION_ABORT => {
                    if !attempt.retry() {
                        return Err(ConnectError::Exhausted {
                            device: self.identity.name.clone(),
                            attempts: attempt.tries(),
                        });
                    }
                    debug!(
                        device = %self.identity,
                        attempt = attempt.tries(),
                        max_tries,
                        "retrying after connection abort"
                    );
                    sleep(RETRY_BACKOFF).await;
                }
                Err(error) => {
                    return Err(ConnectError::Failed {
                        device: self.identity.name.clone(),
                        reason: error.message(),
                    });
                }
            }
        }
    }

    /// Releases the device. Emits the destroyed event; bus teardown is the
    /// caller's responsibility.
    pub(crate) fn destroy(&self) {
        self.emit(HubEvent::DeviceDestroyed {
            device: self.identity.clone(),
        });
    }

    fn emit(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            trace!(device = %self.identity, "event receiver dropped");
        }
    }
}

/// Attempt counter scoped to one connect invocation chain.
#[derive(Debug)]
struct ConnectAttempt {
    tries: u32,
    max_tries: u32,
}

impl ConnectAttempt {
    fn new(max_tries: u32) -> Self {
        Self { tries: 1, max_tries }
    }

    /// Consumes one retry; returns whether the budget allows another
    /// attempt.
    fn retry(&mut self) -> bool {
        if self.tries < self.max_tries {
            self.tries += 1;
            true
        } else {
            false
        }
    }

    fn tries(&self) -> u32 {
        self.tries
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;
    use crate::bus::fake::FakeProxy;
    use crate::variant::{PropertyValue, Variant};

    fn test_device(mac: &str) -> (Device, UnboundedReceiver<HubEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let identity = DeviceIdentity {
            name: "brush".to_string(),
            mac: mac.to_string(),
            kind: "OralBToothbrush".to_string(),
        };
        (Device::new(identity, sender), receiver)
    }

    fn bool_properties(name: &str, value: bool) -> PropertySet {
        let mut properties = PropertySet::new();
        properties.insert(
            name.to_string(),
            PropertyValue::Value(Variant::Bool(value)),
        );
        properties
    }

    #[rstest]
    #[case("AA:BB:CC:DD:EE:FF", "dev_AA_BB_CC_DD_EE_FF")]
    #[case("aa:bb:cc:dd:ee:ff", "dev_aa_bb_cc_dd_ee_ff")]
    #[case("AABBCC", "dev_AABBCC")]
    fn path_segment_replaces_every_delimiter_and_only_delimiters(
        #[case] mac: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(expected, derive_path_segment(mac));
        // Pure: deriving twice yields the same result.
        assert_eq!(derive_path_segment(mac), derive_path_segment(mac));
    }

    #[test]
    fn update_ignores_other_path_segments() {
        let (mut device, mut events) = test_device("AA:BB:CC:DD:EE:FF");
        device.update(
            InterfaceKind::Device,
            "dev_11_22_33_44_55_66",
            &bool_properties("Connected", true),
        );

        assert_eq!(false, device.connected());
        assert_matches!(events.try_recv(), Err(_));
    }

    #[test]
    fn update_sets_flags_and_emits_advertising_update() {
        let (mut device, mut events) = test_device("AA:BB:CC:DD:EE:FF");
        let mut properties = bool_properties("Connected", true);
        properties.extend(bool_properties("ServicesResolved", true));

        device.update(InterfaceKind::Device, "dev_AA_BB_CC_DD_EE_FF", &properties);

        assert_eq!(true, device.connected());
        assert_eq!(true, device.services_resolved());
        assert_matches!(
            events.try_recv(),
            Ok(HubEvent::DeviceUpdate {
                source: UpdateSource::Advertising,
                ..
            })
        );
    }

    #[test]
    fn update_tags_characteristic_signals_as_notifications() {
        let (mut device, mut events) = test_device("AA:BB:CC:DD:EE:FF");
        let mut properties = PropertySet::new();
        properties.insert(
            "service0001/char0002".to_string(),
            PropertyValue::Value(Variant::Bytes(vec![0x01])),
        );

        device.update(
            InterfaceKind::Characteristic,
            "dev_AA_BB_CC_DD_EE_FF",
            &properties,
        );

        assert_matches!(
            events.try_recv(),
            Ok(HubEvent::DeviceUpdate {
                source: UpdateSource::Notification,
                ..
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_succeeds_on_third_attempt_within_budget() -> anyhow::Result<()> {
        let (mut device, mut events) = test_device("AA:BB:CC:DD:EE:FF");
        let proxy = FakeProxy::default();
        proxy.fail_times("Connect", protocol::CONNECTION_ABORT, 2);
        proxy.push_reply("Connect", Ok(Variant::unit()));

        device.connect(&proxy, 3).await?;

        assert_eq!(true, device.connected());
        assert_eq!(3, proxy.calls().len());
        assert_matches!(events.try_recv(), Ok(HubEvent::DeviceConnected { .. }));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn connect_exhausts_retry_budget_after_repeated_aborts() {
        let (mut device, _events) = test_device("AA:BB:CC:DD:EE:FF");
        let proxy = FakeProxy::default();
        proxy.fail_times("Connect", protocol::CONNECTION_ABORT, 3);

        let error = device
            .connect(&proxy, 3)
            .await
            .expect_err("third abort should exhaust the budget");

        assert_eq!(
            ConnectError::Exhausted {
                device: "brush".to_string(),
                attempts: 3,
            },
            error
        );
        assert_eq!(3, proxy.calls().len());
        assert_eq!(false, device.connected());
    }

    #[tokio::test]
    async fn connect_fails_immediately_on_non_abort_failure() {
        let (mut device, _events) = test_device("AA:BB:CC:DD:EE:FF");
        let proxy = FakeProxy::default();
        proxy.fail_times("Connect", "le-connection-abort-by-local", 1);

        let error = device
            .connect(&proxy, 3)
            .await
            .expect_err("non-abort failures should not retry");

        assert_matches!(error, ConnectError::Failed { reason, .. } if reason == "le-connection-abort-by-local");
        assert_eq!(1, proxy.calls().len());
    }

    #[test]
    fn destroy_emits_destroyed_event() {
        let (device, mut events) = test_device("AA:BB:CC:DD:EE:FF");
        device.destroy();
        assert_matches!(events.try_recv(), Ok(HubEvent::DeviceDestroyed { .. }));
    }
}
