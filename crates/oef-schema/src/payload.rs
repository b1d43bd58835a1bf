//! Payloads attached to negotiation steps.
//!
//! The negotiation core treats these as opaque; they are defined here so
//! applications on both sides of a dialogue agree on their shape.

use serde::{Deserialize, Serialize};

use crate::description::Description;
use crate::model::DataModel;

/// A search or CFP query.
///
/// The constraint expression is carried pre-encoded; evaluating it is the
/// broker's business.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Query {
    /// Data model the query is expressed against.
    pub model: Option<DataModel>,
    /// Encoded constraint expression.
    pub constraints: Vec<u8>,
}

impl Query {
    /// A query matching every service.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// A query over a data model, with no constraints.
    #[must_use]
    pub fn for_model(model: DataModel) -> Self {
        Self {
            model: Some(model),
            constraints: Vec::new(),
        }
    }

    /// Sets the encoded constraint expression.
    #[must_use]
    pub fn with_constraints(mut self, constraints: Vec<u8>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Name of the data model the query targets, if any.
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().map(DataModel::name)
    }
}

/// Content of a Call-For-Proposal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CfpPayload {
    /// "Propose whatever you have."
    #[default]
    Nothing,
    /// Application-defined bytes.
    Content(Vec<u8>),
    /// A structured query.
    Query(Query),
}

/// Content of a Propose step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Proposal {
    /// An ordered list of offered descriptions.
    Descriptions(Vec<Description>),
    /// Application-defined bytes.
    Content(Vec<u8>),
}

impl Proposal {
    /// A proposal made of a single description.
    #[must_use]
    pub fn single(description: Description) -> Self {
        Self::Descriptions(vec![description])
    }

    /// Returns the offered descriptions, or an empty slice for raw content.
    #[must_use]
    pub fn descriptions(&self) -> &[Description] {
        match self {
            Self::Descriptions(d) => d,
            Self::Content(_) => &[],
        }
    }
}
