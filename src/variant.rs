use std::collections::BTreeMap;

use tracing::debug;

/// Property name carrying vendor advertising payloads.
const MANUFACTURER_DATA: &str = "ManufacturerData";
/// Property name carrying per-service advertising payloads.
const SERVICE_DATA: &str = "ServiceData";

/// A self-describing typed value as carried on the bus.
///
/// BlueZ property-changed signals arrive as deeply nested heterogeneous
/// arrays. This tagged union replaces positional index chains with explicit
/// pattern matching; extraction helpers return `Option` so unknown shapes
/// degrade to "no value" instead of failing the dispatcher.
#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum Variant {
    Bool(bool),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Variant>),
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl Variant {
    /// An empty sequence, used as the unit result of bus method calls.
    #[must_use]
    pub fn unit() -> Self {
        Self::Seq(Vec::new())
    }

    /// Returns the contained sequence, if this value is one.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[Variant]> {
        match self {
            Self::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the contained string, if this value is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the contained boolean, if this value is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

/// One decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A scalar or pass-through sequence value.
    Value(Variant),
    /// A decoded `ServiceData` record.
    ServiceData { uuid: String, data: Variant },
}

impl PropertyValue {
    /// Returns the contained boolean, if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Value(variant) => variant.as_bool(),
            Self::ServiceData { .. } => None,
        }
    }

    /// Returns the plain variant, if this is not a service-data record.
    #[must_use]
    pub fn as_variant(&self) -> Option<&Variant> {
        match self {
            Self::Value(variant) => Some(variant),
            Self::ServiceData { .. } => None,
        }
    }
}

/// Flat property name to decoded value mapping produced per signal.
pub type PropertySet = BTreeMap<String, PropertyValue>;

/// Decodes the changed-properties payload of a property-changed signal into
/// a flat property set.
///
/// Entries that do not match the expected `(name, (signature, value))` shape
/// are dropped. `ManufacturerData` and `ServiceData` receive their
/// type-specific nested extraction; any structural mismatch there is logged
/// and the property omitted. This function never fails past its own
/// boundary.
pub fn decode_properties(changed: &Variant) -> PropertySet {
    let mut properties = PropertySet::new();
    let Some(entries) = changed.as_seq() else {
        debug!("changed-properties payload is not a sequence");
        return properties;
    };

    for entry in entries {
        let Some((name, value)) = property_entry(entry) else {
            debug!("dropping property entry with unsupported shape");
            continue;
        };

        let decoded = match value {
            Variant::Seq(items) => match name {
                MANUFACTURER_DATA => match nested_payload(items) {
                    Some(payload) => PropertyValue::Value(payload.clone()),
                    None => {
                        debug!(property = name, "nested payload shape mismatch");
                        continue;
                    }
                },
                SERVICE_DATA => match service_data_entry(items) {
                    Some((uuid, data)) => PropertyValue::ServiceData {
                        uuid: uuid.to_string(),
                        data: data.clone(),
                    },
                    None => {
                        debug!(property = name, "service-data shape mismatch");
                        continue;
                    }
                },
                _ if items.len() == 1 => PropertyValue::Value(items[0].clone()),
                _ => PropertyValue::Value(value.clone()),
            },
            scalar => PropertyValue::Value(scalar.clone()),
        };

        properties.insert(name.to_string(), decoded);
    }

    properties
}

/// Splits one property entry into its name and unwrapped value slot.
///
/// An entry is accepted only when it is a 2-element sequence whose second
/// element is itself a `(signature, value)` sequence.
fn property_entry(entry: &Variant) -> Option<(&str, &Variant)> {
    let pair = entry.as_seq()?;
    if pair.len() != 2 {
        return None;
    }
    let name = pair[0].as_str()?;
    let value = pair[1].as_seq()?.get(1)?;
    Some((name, value))
}

/// Drills the fixed nesting of keyed advertising payloads down to the
/// innermost value: first entry, its first element, its value slot, the
/// inner value sequence, first element.
fn nested_payload(items: &[Variant]) -> Option<&Variant> {
    items
        .first()?
        .as_seq()?
        .first()?
        .as_seq()?
        .get(1)?
        .as_seq()?
        .get(1)?
        .as_seq()?
        .first()
}

/// Extracts the UUID and payload of the first service-data entry.
fn service_data_entry(items: &[Variant]) -> Option<(&str, &Variant)> {
    let uuid = items.first()?.as_seq()?.first()?.as_seq()?.first()?.as_str()?;
    let data = nested_payload(items)?;
    Some((uuid, data))
}
