//! Descriptions of agents, services and proposals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SchemaError;
use crate::model::DataModel;
use crate::value::AttributeValue;

/// A set of attribute values conforming to a [`DataModel`].
///
/// A description built against an explicit model is checked for consistency;
/// without one, a model is generated from the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    values: BTreeMap<String, AttributeValue>,
    model: DataModel,
}

impl Description {
    /// Creates a description from values and an optional model.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if the values do not satisfy `model`.
    pub fn new(
        values: BTreeMap<String, AttributeValue>,
        model: Option<DataModel>,
    ) -> Result<Self, SchemaError> {
        match model {
            Some(model) => {
                check_consistency(&values, &model)?;
                Ok(Self { values, model })
            }
            None => Ok(Self::generated(values, "")),
        }
    }

    /// Starts a [`DescriptionBuilder`].
    #[must_use]
    pub fn builder() -> DescriptionBuilder {
        DescriptionBuilder::default()
    }

    fn generated(values: BTreeMap<String, AttributeValue>, model_name: &str) -> Self {
        let model = DataModel::generate(model_name, &values);
        Self { values, model }
    }

    /// Returns the value of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Returns all values, keyed by attribute name.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, AttributeValue> {
        &self.values
    }

    /// Returns the data model this description conforms to.
    #[must_use]
    pub const fn model(&self) -> &DataModel {
        &self.model
    }
}

fn check_consistency(
    values: &BTreeMap<String, AttributeValue>,
    model: &DataModel,
) -> Result<(), SchemaError> {
    for schema in model.attributes() {
        match values.get(&schema.name) {
            None if schema.required => {
                return Err(SchemaError::MissingAttribute(schema.name.clone()));
            }
            None => {}
            Some(value) if value.attribute_type() != schema.attribute_type => {
                return Err(SchemaError::TypeMismatch {
                    attribute: schema.name.clone(),
                    expected: schema.attribute_type,
                    actual: value.attribute_type(),
                });
            }
            Some(_) => {}
        }
    }

    if let Some(extra) = values.keys().find(|k| model.attribute(k).is_none()) {
        return Err(SchemaError::UnknownAttribute(extra.clone()));
    }

    Ok(())
}

/// Builder for [`Description`].
#[derive(Debug, Clone, Default)]
pub struct DescriptionBuilder {
    values: BTreeMap<String, AttributeValue>,
    model_name: String,
}

impl DescriptionBuilder {
    /// Adds an attribute value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Names the generated model.
    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Builds a description with a model generated from the values.
    #[must_use]
    pub fn build(self) -> Description {
        Description::generated(self.values, &self.model_name)
    }

    /// Builds a description checked against `model`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if the values do not satisfy `model`.
    pub fn build_with_model(self, model: DataModel) -> Result<Description, SchemaError> {
        Description::new(self.values, Some(model))
    }
}
