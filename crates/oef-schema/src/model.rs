//! Attribute schemas and data models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SchemaError;
use crate::value::{AttributeType, AttributeValue};

/// Declaration of one attribute in a [`DataModel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    /// Attribute name.
    pub name: String,
    /// Declared value type.
    pub attribute_type: AttributeType,
    /// Whether a description must carry this attribute.
    pub required: bool,
    /// Optional human-readable explanation.
    pub description: Option<String>,
}

impl AttributeSchema {
    /// Creates a new attribute schema without a description.
    #[must_use]
    pub fn new(name: impl Into<String>, attribute_type: AttributeType, required: bool) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            required,
            description: None,
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named set of attribute schemas.
///
/// Attributes are kept sorted by name so two models declaring the same
/// attributes in a different order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    name: String,
    attributes: Vec<AttributeSchema>,
    description: Option<String>,
}

impl DataModel {
    /// Creates a data model.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateAttribute`] if two attributes share a name.
    pub fn new(
        name: impl Into<String>,
        mut attributes: Vec<AttributeSchema>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        attributes.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(pair) = attributes.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(SchemaError::DuplicateAttribute {
                model: name,
                attribute: pair[0].name.clone(),
            });
        }

        Ok(Self {
            name,
            attributes,
            description: None,
        })
    }

    /// Generates a model matching `values`, with every attribute required.
    #[must_use]
    pub fn generate(name: impl Into<String>, values: &BTreeMap<String, AttributeValue>) -> Self {
        // BTreeMap keys are unique and already sorted.
        let attributes = values
            .iter()
            .map(|(k, v)| AttributeSchema::new(k.clone(), v.attribute_type(), true))
            .collect();
        Self {
            name: name.into(),
            attributes,
            description: None,
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attributes, sorted by name.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeSchema] {
        &self.attributes
    }

    /// Returns the model description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes
            .binary_search_by(|a| a.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.attributes[i])
    }
}
