//! Typed attribute values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean earth radius used for haversine distances, in kilometres.
const EARTH_RADIUS_KM: f64 = 6372.8;

/// The type of an attribute in a data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Boolean flag.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Double precision float.
    Double,
    /// UTF-8 string.
    String,
    /// Latitude/longitude pair.
    Location,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::Location => "location",
        };
        f.write_str(name)
    }
}

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance to `other` in kilometres.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let sin_lat = (dlat * 0.5).sin();
        let sin_lon = (dlon * 0.5).sin();
        let h = sin_lat * sin_lat + sin_lon * sin_lon * lat1.cos() * lat2.cos();

        2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
    }
}

/// A single typed value in a [`crate::Description`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Geographic position.
    Location(Location),
}

impl AttributeValue {
    /// Returns the type of this value.
    #[must_use]
    pub const fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Int(_) => AttributeType::Int,
            Self::Double(_) => AttributeType::Double,
            Self::String(_) => AttributeType::String,
            Self::Location(_) => AttributeType::Location,
        }
    }

    /// Returns the value as an integer, if it is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Location> for AttributeValue {
    fn from(v: Location) -> Self {
        Self::Location(v)
    }
}
