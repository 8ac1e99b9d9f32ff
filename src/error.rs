use thiserror::Error;

/// Errors returned by hub construction, setup and teardown.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("unknown device type `{kind}`")]
    UnknownDeviceType { kind: String },
    #[error("stopping discovery failed: {reason}")]
    AdapterDiscovery { reason: String },
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("bus method call failed: {0}")]
    Method(#[from] MethodError),
}

/// Errors returned by one device connect invocation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConnectError {
    #[error("couldn't connect to `{device}` after {attempts} tries")]
    Exhausted { device: String, attempts: u32 },
    #[error("connecting to `{device}` failed: {reason}")]
    Failed { device: String, reason: String },
}

/// Errors returned by the bus transport boundary.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("no interface `{interface}` at `{path}`")]
    MissingInterface { path: String, interface: String },
    #[error("bus transport failure: {reason}")]
    Transport { reason: String },
}

/// Errors returned when building fake bus fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture hex payload is invalid")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A remote method-call failure as delivered by the transport.
///
/// The transport may report the failure as a single string or as several
/// name segments; sentinel comparison always happens against the joined
/// message.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("{}", .parts.join("."))]
pub struct MethodError {
    parts: Vec<String>,
}

impl MethodError {
    /// Creates a failure from one message string.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            parts: vec![message.into()],
        }
    }

    /// Creates a failure from transport-delivered message segments.
    #[must_use]
    pub fn from_parts(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// Returns the joined failure message.
    #[must_use]
    pub fn message(&self) -> String {
        self.parts.join(".")
    }
}
