//! # oef-schema
//!
//! Data models exchanged during OEF negotiations.
//!
//! This crate provides:
//!
//! - **Attribute values**: [`AttributeValue`] and [`Location`] with their [`AttributeType`]
//! - **Data models**: [`AttributeSchema`] and [`DataModel`] describing the shape of a description
//! - **Descriptions**: [`Description`], a set of typed values checked against a data model
//! - **Payloads**: [`CfpPayload`], [`Proposal`] and [`Query`] carried by negotiation steps
//!
//! ## Example
//!
//! ```rust
//! use oef_schema::{AttributeSchema, AttributeType, AttributeValue, DataModel, Description};
//!
//! let model = DataModel::new(
//!     "weather_data",
//!     vec![
//!         AttributeSchema::new("temperature", AttributeType::Bool, true),
//!         AttributeSchema::new("wind_speed", AttributeType::Bool, false),
//!     ],
//! )
//! .unwrap();
//!
//! let description = Description::builder()
//!     .with("temperature", AttributeValue::Bool(true))
//!     .build_with_model(model)
//!     .unwrap();
//!
//! assert_eq!(description.get("temperature"), Some(&AttributeValue::Bool(true)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod description;
pub mod error;
pub mod model;
pub mod payload;
pub mod value;

pub use description::{Description, DescriptionBuilder};
pub use error::SchemaError;
pub use model::{AttributeSchema, DataModel};
pub use payload::{CfpPayload, Proposal, Query};
pub use value::{AttributeType, AttributeValue, Location};
