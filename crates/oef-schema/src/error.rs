//! Error types for oef-schema.

use thiserror::Error;

use crate::value::AttributeType;

/// Errors raised while building data models and descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two attributes of a data model share a name.
    #[error("data model '{model}' has duplicated attribute '{attribute}'")]
    DuplicateAttribute {
        /// Name of the data model.
        model: String,
        /// The duplicated attribute name.
        attribute: String,
    },

    /// A required attribute has no value in the description.
    #[error("missing required attribute '{0}'")]
    MissingAttribute(String),

    /// A value does not have the type declared by its schema.
    #[error("attribute '{attribute}' has type {actual}, expected {expected}")]
    TypeMismatch {
        /// The attribute name.
        attribute: String,
        /// Type declared in the data model.
        expected: AttributeType,
        /// Type of the supplied value.
        actual: AttributeType,
    },

    /// The description holds a value the data model does not declare.
    #[error("attribute '{0}' is not part of the data model")]
    UnknownAttribute(String),
}
