//! Bridging JSON value trees to other serde formats
//!
//! Numbers are kept as their literal text, so integers wider than 64 bits
//! survive a YAML round trip. [`Lossless`] decodes a YAML document into a
//! [`JsonValue`] without coercing numbers, and [`Native`] serializes
//! one back out with numbers as plain integers and floats, which is what
//! YAML emitters and the template engine expect.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;

/// A [`JsonValue`] decoded without numeric coercion
///
/// Integers keep every digit up to 128 bits. Non-finite floats (`.inf`,
/// `.nan`) have no JSON representation and are rejected instead of
/// silently turning into `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lossless(pub JsonValue);

impl<'de> Deserialize<'de> for Lossless {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LosslessVisitor).map(Lossless)
    }
}

struct LosslessVisitor;

impl<'de> Visitor<'de> for LosslessVisitor {
    type Value = JsonValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<JsonValue, E> {
        Ok(JsonValue::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<JsonValue, E> {
        Ok(JsonValue::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<JsonValue, E> {
        Ok(JsonValue::Number(v.into()))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<JsonValue, E> {
        Number::from_i128(v)
            .map(JsonValue::Number)
            .ok_or_else(|| E::custom(format!("integer {v} is out of range")))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<JsonValue, E> {
        Number::from_u128(v)
            .map(JsonValue::Number)
            .ok_or_else(|| E::custom(format!("integer {v} is out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<JsonValue, E> {
        Number::from_f64(v)
            .map(JsonValue::Number)
            .ok_or_else(|| E::custom(format!("non-finite number {v} cannot be represented")))
    }

    fn visit_str<E>(self, v: &str) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v))
    }

    fn visit_unit<E>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_none<E>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<JsonValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        Lossless::deserialize(deserializer).map(|value| value.0)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<JsonValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(Lossless(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(JsonValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<JsonValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut table = Map::new();
        while let Some((key, Lossless(value))) = map.next_entry::<String, Lossless>()? {
            table.insert(key, value);
        }
        Ok(JsonValue::Object(table))
    }
}

/// Serializes a [`JsonValue`] with numbers as native integers and floats
#[derive(Debug, Clone, Copy)]
pub struct Native<'a>(pub &'a JsonValue);

impl Serialize for Native<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            JsonValue::Null => serializer.serialize_unit(),
            JsonValue::Bool(b) => serializer.serialize_bool(*b),
            JsonValue::Number(n) => serialize_number(n, serializer),
            JsonValue::String(s) => serializer.serialize_str(s),
            JsonValue::Array(items) => serializer.collect_seq(items.iter().map(Native)),
            JsonValue::Object(table) => serialize_table(table, serializer),
        }
    }
}

pub(crate) fn serialize_table<S>(table: &Map<String, JsonValue>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(table.iter().map(|(key, value)| (key, Native(value))))
}

fn serialize_number<S>(n: &Number, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if let Some(u) = n.as_u64() {
        serializer.serialize_u64(u)
    } else if let Some(i) = n.as_i64() {
        serializer.serialize_i64(i)
    } else if let Some(u) = n.as_u128() {
        serializer.serialize_u128(u)
    } else if let Some(i) = n.as_i128() {
        serializer.serialize_i128(i)
    } else if let Some(f) = n.as_f64() {
        serializer.serialize_f64(f)
    } else {
        serializer.serialize_str(&n.to_string())
    }
}
