use assert_matches::assert_matches;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio_stream::wrappers::UnboundedReceiverStream;

use bluehub::bus::fake::{self, FakeBus};
use bluehub::bus::BusConnection;
use bluehub::{
    DeviceDescriptor, Hub, HubConfig, HubEvent, PropertyValue, UpdateSource, Variant,
};

fn hub_with_one_brush() -> anyhow::Result<(Hub, UnboundedReceiverStream<HubEvent>)> {
    let config = HubConfig::builder()
        .name("bathroom".to_string())
        .hci("hci0".to_string())
        .devices(vec![DeviceDescriptor {
            kind: "OralBToothbrush".to_string(),
            name: "brush".to_string(),
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
        }])
        .build();
    let (hub, events) = Hub::new(config)?;
    Ok((hub, UnboundedReceiverStream::new(events)))
}

#[tokio::test]
async fn run_routes_signals_in_arrival_order_until_the_bus_closes() -> anyhow::Result<()> {
    let bus = FakeBus::new();
    let signals = bus.subscribe();
    let (mut hub, events) = hub_with_one_brush()?;

    bus.emit_signal(fake::manufacturer_data_signal(
        "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF",
        0x00DC,
        "012200",
    )?);
    bus.emit_signal(fake::powered_off_signal("/org/bluez/hci0"));
    drop(bus);

    hub.run(signals).await;

    let collected: Vec<HubEvent> = events.take(2).collect().await;
    assert_matches!(collected[0], HubEvent::DeviceUpdate { .. });
    assert_matches!(collected[1], HubEvent::AdapterPoweredOff { .. });
    Ok(())
}

#[tokio::test]
async fn advertising_payload_flows_through_to_a_device_update() -> anyhow::Result<()> {
    let bus = FakeBus::new();
    let signals = bus.subscribe();
    let (mut hub, events) = hub_with_one_brush()?;

    bus.emit_signal(fake::manufacturer_data_signal(
        "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF",
        0x00DC,
        "012200",
    )?);
    drop(bus);
    hub.run(signals).await;

    let collected: Vec<HubEvent> = events.take(1).collect().await;
    assert_matches!(
        &collected[0],
        HubEvent::DeviceUpdate { device, source: UpdateSource::Advertising, properties }
        if device.name == "brush"
            && properties.get("ManufacturerData")
                == Some(&PropertyValue::Value(Variant::Bytes(vec![0x01, 0x22, 0x00])))
    );
    Ok(())
}

#[tokio::test]
async fn notification_payload_flows_through_keyed_by_characteristic() -> anyhow::Result<()> {
    let bus = FakeBus::new();
    let signals = bus.subscribe();
    let (mut hub, events) = hub_with_one_brush()?;

    bus.emit_signal(fake::characteristic_value_signal(
        "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service0021/char0022",
        "07",
    )?);
    drop(bus);
    hub.run(signals).await;

    let collected: Vec<HubEvent> = events.take(1).collect().await;
    assert_matches!(
        &collected[0],
        HubEvent::DeviceUpdate { source: UpdateSource::Notification, properties, .. }
        if properties.get("service0021/char0022")
            == Some(&PropertyValue::Value(Variant::Bytes(vec![0x07])))
    );
    Ok(())
}

#[tokio::test]
async fn powered_off_signal_surfaces_as_a_fatal_event() -> anyhow::Result<()> {
    let bus = FakeBus::new();
    let signals = bus.subscribe();
    let (mut hub, events) = hub_with_one_brush()?;

    let message = fake::powered_off_signal("/org/bluez/hci0");
    bus.emit_signal(message.clone());
    drop(bus);
    hub.run(signals).await;

    let collected: Vec<HubEvent> = events.take(1).collect().await;
    assert_eq!(HubEvent::AdapterPoweredOff { message }, collected[0]);
    Ok(())
}

#[tokio::test]
async fn connection_flags_follow_device_signals() -> anyhow::Result<()> {
    let bus = FakeBus::new();
    let signals = bus.subscribe();
    let (mut hub, _events) = hub_with_one_brush()?;

    bus.emit_signal(fake::device_properties_signal(
        "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF",
        &[
            ("Connected", Variant::Seq(vec![Variant::Bool(true)])),
            ("ServicesResolved", Variant::Seq(vec![Variant::Bool(true)])),
        ],
    ));
    drop(bus);
    hub.run(signals).await;

    assert_eq!(true, hub.devices()[0].connected());
    assert_eq!(true, hub.devices()[0].services_resolved());
    Ok(())
}
