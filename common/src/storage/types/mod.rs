use std::fmt;

use serde::{
    de::{self, DeserializeOwned, Visitor},
    Deserialize, Deserializer,
};
use serde_json::Value;

use crate::storage::dataset::{Table, TableName};

/// A typed view over one row of a dataset table.
pub trait GraphRecord: DeserializeOwned {
    fn table_name() -> TableName;
    fn get_id(&self) -> &str;

    /// Parses every row of `table`. The first malformed row fails the parse.
    fn from_table(table: &Table) -> Result<Vec<Self>, serde_json::Error> {
        table
            .rows()
            .iter()
            .map(|row| serde_json::from_value(Value::Object(row.clone())))
            .collect()
    }
}

macro_rules! graph_record {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),* $(,)?}) => {
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            #[serde(deserialize_with = "crate::storage::types::deserialize_flexible_id")]
            pub id: String,
            #[serde(default, deserialize_with = "crate::storage::types::deserialize_optional_int")]
            pub human_readable_id: Option<i64>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl $crate::storage::types::GraphRecord for $name {
            fn table_name() -> $crate::storage::dataset::TableName {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}

pub mod community;
pub mod community_report;
pub mod covariate;
pub mod entity;
pub mod relationship;
pub mod text_unit;

struct FlexibleIdVisitor;

impl<'de> Visitor<'de> for FlexibleIdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string or an integer id")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        // Community numbers sometimes arrive as floats (2.0).
        if value.fract() == 0.0 && value.is_finite() {
            Ok(format!("{value:.0}"))
        } else {
            Ok(value.to_string())
        }
    }
}

/// Accepts ids stored either as strings or as numbers.
pub fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FlexibleIdVisitor)
}

pub fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => deserialize_flexible_id(other)
            .map(Some)
            .map_err(de::Error::custom),
    }
}

/// Lists of ids. Null becomes empty and a lone scalar becomes a single element.
pub fn deserialize_flexible_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(|item| deserialize_flexible_id(item).map_err(de::Error::custom))
            .collect(),
        scalar => Ok(vec![deserialize_flexible_id(scalar).map_err(de::Error::custom)?]),
    }
}

pub fn deserialize_flexible_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_int(&value)
        .ok_or_else(|| de::Error::custom(format!("expected an integer, got {value}")))
}

pub fn deserialize_optional_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => value_to_int(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected an integer, got {value}"))),
    }
}

pub fn deserialize_optional_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected a number, got {other}"))),
    }
}

/// Free text. Null reads as an empty string.
pub fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|text| !text.is_empty()))
}

fn value_to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
