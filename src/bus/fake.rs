//! Scripted in-memory bus used in tests and non-hardware environments.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use super::{BusConnection, BusMessage, InterfaceProxy};
use crate::error::{BusError, FixtureError, MethodError};
use crate::variant::Variant;

/// An in-memory bus with scripted proxies and injectable signals.
///
/// Proxies are created on first lookup and reply `Ok` to every method until
/// replies are scripted, so setup flows only script the calls under test.
#[derive(Debug, Default)]
pub struct FakeBus {
    proxies: Mutex<HashMap<(String, String), Arc<FakeProxy>>>,
    unresolvable: Mutex<Vec<(String, String)>>,
    subscribers: Mutex<Vec<UnboundedSender<BusMessage>>>,
}

impl FakeBus {
    /// Creates an empty fake bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the proxy for a path and interface, creating it when absent.
    #[must_use]
    pub fn proxy(&self, path: &str, interface: &str) -> Arc<FakeProxy> {
        lock(&self.proxies)
            .entry((path.to_string(), interface.to_string()))
            .or_default()
            .clone()
    }

    /// Makes proxy resolution fail for a path and interface.
    pub fn make_unresolvable(&self, path: &str, interface: &str) {
        lock(&self.unresolvable).push((path.to_string(), interface.to_string()));
    }

    /// Delivers a signal to every subscriber.
    pub fn emit_signal(&self, message: BusMessage) {
        lock(&self.subscribers).retain(|subscriber| subscriber.send(message.clone()).is_ok());
    }
}

#[async_trait]
impl BusConnection for FakeBus {
    async fn interface_proxy(
        &self,
        path: &str,
        interface: &str,
    ) -> Result<Arc<dyn InterfaceProxy>, BusError> {
        let key = (path.to_string(), interface.to_string());
        if lock(&self.unresolvable).contains(&key) {
            return Err(BusError::MissingInterface {
                path: path.to_string(),
                interface: interface.to_string(),
            });
        }
        Ok(self.proxy(path, interface))
    }

    fn subscribe(&self) -> UnboundedReceiver<BusMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(sender);
        receiver
    }
}

/// A scripted interface proxy recording every invocation.
#[derive(Debug, Default)]
pub struct FakeProxy {
    replies: Mutex<HashMap<String, VecDeque<Result<Variant, MethodError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// One recorded method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Invoked method name.
    pub method: String,
    /// Arguments the caller passed.
    pub args: Vec<Variant>,
}

impl FakeProxy {
    /// Scripts the next reply for a method. Replies are consumed in the
    /// order they were pushed; once exhausted the proxy replies `Ok` again.
    pub fn push_reply(&self, method: &str, reply: Result<Variant, MethodError>) {
        lock(&self.replies)
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Scripts the next `count` replies for a method to fail with a joined
    /// message.
    pub fn fail_times(&self, method: &str, message: &str, count: usize) {
        for _ in 0..count {
            self.push_reply(method, Err(MethodError::new(message)));
        }
    }

    /// Returns every invocation recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Returns recorded method names, in invocation order.
    #[must_use]
    pub fn called_methods(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|call| call.method.clone())
            .collect()
    }
}

#[async_trait]
impl InterfaceProxy for FakeProxy {
    async fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, MethodError> {
        lock(&self.calls).push(RecordedCall {
            method: method.to_string(),
            args: args.to_vec(),
        });

        let reply = lock(&self.replies)
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => reply,
            None => {
                trace!(method, "unscripted fake method call replies ok");
                Ok(Variant::unit())
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds a device property-changed signal with scalar properties.
#[must_use]
pub fn device_properties_signal(path: &str, properties: &[(&str, Variant)]) -> BusMessage {
    let entries = properties
        .iter()
        .map(|(name, value)| {
            Variant::Seq(vec![
                Variant::from(*name),
                Variant::Seq(vec![Variant::from("v"), value.clone()]),
            ])
        })
        .collect();
    BusMessage::property_changed(path, "org.bluez.Device1", Variant::Seq(entries))
}

/// Builds a device signal carrying manufacturer data in the canonical
/// nesting, with the payload given as hex.
pub fn manufacturer_data_signal(
    path: &str,
    company_id: u16,
    payload_hex: &str,
) -> Result<BusMessage, FixtureError> {
    let payload = Variant::Bytes(hex::decode(payload_hex)?);
    let changed = Variant::Seq(vec![Variant::Seq(vec![
        Variant::from("ManufacturerData"),
        Variant::Seq(vec![
            Variant::from("a{qv}"),
            Variant::Seq(vec![Variant::Seq(vec![Variant::Seq(vec![
                Variant::U16(company_id),
                Variant::Seq(vec![
                    Variant::Seq(vec![Variant::from("ay")]),
                    Variant::Seq(vec![payload]),
                ]),
            ])])]),
        ]),
    ])]);
    Ok(BusMessage::property_changed(path, "org.bluez.Device1", changed))
}

/// Builds a characteristic value notification signal with the payload given
/// as hex.
pub fn characteristic_value_signal(path: &str, payload_hex: &str) -> Result<BusMessage, FixtureError> {
    let payload = Variant::Bytes(hex::decode(payload_hex)?);
    let changed = Variant::Seq(vec![Variant::Seq(vec![
        Variant::from("Value"),
        Variant::Seq(vec![
            Variant::from("ay"),
            Variant::Seq(vec![payload]),
        ]),
    ])]);
    Ok(BusMessage::property_changed(
        path,
        "org.bluez.GattCharacteristic1",
        changed,
    ))
}

/// Builds the adapter signal announcing the radio powered off.
#[must_use]
pub fn powered_off_signal(adapter_path: &str) -> BusMessage {
    let changed = Variant::Seq(vec![Variant::Seq(vec![
        Variant::from("Powered"),
        Variant::Seq(vec![
            Variant::Seq(vec![Variant::from("b")]),
            Variant::Seq(vec![Variant::Bool(false)]),
        ]),
    ])]);
    BusMessage::property_changed(adapter_path, "org.bluez.Adapter1", changed)
}
