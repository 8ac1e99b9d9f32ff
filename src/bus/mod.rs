//! Boundary with the bus transport.
//!
//! The hub treats the system bus as a black box: something that resolves
//! interface proxies, invokes remote methods and delivers signals. Real
//! transports implement these traits; [`fake`] provides the scripted
//! implementation used in tests and non-hardware environments.

pub mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{BusError, MethodError};
use crate::variant::Variant;

/// An inbound bus signal.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Object path the signal was emitted for.
    pub path: String,
    /// Signal body; absent for messages without arguments.
    pub body: Option<MessageBody>,
}

/// The body of a property-changed signal.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody {
    /// Interface whose properties changed.
    pub interface: String,
    /// Changed property entries as nested variants.
    pub changed: Variant,
    /// Names of invalidated properties. Carried for completeness; the hub
    /// does not act on invalidations.
    pub invalidated: Variant,
}

impl BusMessage {
    /// Creates a property-changed signal message.
    #[must_use]
    pub fn property_changed(path: impl Into<String>, interface: impl Into<String>, changed: Variant) -> Self {
        Self {
            path: path.into(),
            body: Some(MessageBody {
                interface: interface.into(),
                changed,
                invalidated: Variant::unit(),
            }),
        }
    }
}

/// A resolved remote interface at one object path.
#[async_trait]
pub trait InterfaceProxy: Send + Sync {
    /// Invokes a remote method and returns its result variant.
    async fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, MethodError>;
}

impl std::fmt::Debug for dyn InterfaceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InterfaceProxy")
    }
}

/// A live connection to the system bus.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Resolves the proxy for an interface at an object path.
    async fn interface_proxy(
        &self,
        path: &str,
        interface: &str,
    ) -> Result<Arc<dyn InterfaceProxy>, BusError>;

    /// Registers a wildcard signal match and returns the delivery channel.
    fn subscribe(&self) -> UnboundedReceiver<BusMessage>;
}
