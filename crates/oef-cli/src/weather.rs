//! Weather station and weather client agents.
//!
//! Stations register a weather service and answer every CFP with a priced
//! proposal. The client searches for stations, sends each a CFP, accepts the
//! cheapest offer once every station has answered and declines the rest.
//! The winning station then sends its measurement and both sides complete.

use std::collections::{BTreeMap, BTreeSet};

use oef_dialogue::{Action, AgentAddress, AgentHandler, Dialogue, DialogueId, NegotiationError};
use oef_schema::{
    AttributeSchema, AttributeType, AttributeValue, CfpPayload, DataModel, Description, Location,
    Proposal, Query,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Service id under which stations register.
pub const WEATHER_SERVICE: &str = "weather";

/// Data model of the weather service.
#[must_use]
pub fn weather_data_model() -> DataModel {
    let attributes = vec![
        AttributeSchema::new("wind_speed", AttributeType::Bool, true)
            .with_description("Provides wind speed measurements."),
        AttributeSchema::new("temperature", AttributeType::Bool, true)
            .with_description("Provides temperature measurements."),
        AttributeSchema::new("air_pressure", AttributeType::Bool, true)
            .with_description("Provides air pressure measurements."),
        AttributeSchema::new("humidity", AttributeType::Bool, true)
            .with_description("Provides humidity measurements."),
        AttributeSchema::new("location", AttributeType::Location, false)
            .with_description("Where the station is."),
    ];

    // The attribute names above are distinct.
    DataModel::new("weather_data", attributes)
        .map(|m| m.with_description("All possible weather data."))
        .unwrap_or_else(|_| DataModel::generate("weather_data", &BTreeMap::new()))
}

/// A measurement sent by a station after an accept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, 0 to 1.
    pub humidity: f64,
    /// Hectopascal.
    pub air_pressure: f64,
}

impl Default for Measurement {
    fn default() -> Self {
        Self {
            temperature: 15.0,
            humidity: 0.7,
            air_pressure: 1019.0,
        }
    }
}

/// Agent selling weather measurements.
#[derive(Debug, Clone)]
pub struct WeatherStation {
    price: i64,
    location: Option<Location>,
    measurement: Measurement,
    served: usize,
}

impl WeatherStation {
    /// Creates a station asking `price` per measurement.
    #[must_use]
    pub fn new(price: i64, location: Option<Location>) -> Self {
        Self {
            price,
            location,
            measurement: Measurement::default(),
            served: 0,
        }
    }

    /// Returns the number of measurements delivered.
    #[must_use]
    pub const fn served(&self) -> usize {
        self.served
    }

    /// Description registered with the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the description does not fit the weather model.
    pub fn service_description(&self) -> Result<Description, oef_schema::SchemaError> {
        let mut builder = Description::builder()
            .with("wind_speed", false)
            .with("temperature", true)
            .with("air_pressure", true)
            .with("humidity", true);
        if let Some(location) = self.location {
            builder = builder.with("location", location);
        }
        builder.build_with_model(weather_data_model())
    }
}

impl AgentHandler for WeatherStation {
    fn on_cfp(&mut self, dialogue: &Dialogue, _payload: &CfpPayload) -> Vec<Action> {
        info!(dialogue_id = %dialogue.id(), from = %dialogue.counterparty(), price = self.price, "proposing");
        let proposal = Description::builder().with("price", self.price).build();
        vec![Action::Propose {
            dialogue_id: dialogue.id(),
            proposal: Proposal::single(proposal),
        }]
    }

    fn on_accept(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        let content = match serde_json::to_vec(&self.measurement) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "failed to encode measurement");
                return vec![Action::Cancel {
                    dialogue_id: dialogue.id(),
                }];
            }
        };

        self.served += 1;
        info!(dialogue_id = %dialogue.id(), to = %dialogue.counterparty(), "sending measurement");
        vec![
            Action::Message {
                dialogue_id: dialogue.id(),
                content,
            },
            Action::Complete {
                dialogue_id: dialogue.id(),
            },
        ]
    }

    fn on_decline(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        debug!(dialogue_id = %dialogue.id(), "offer declined");
        Vec::new()
    }
}

/// Result of a client run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Station whose offer was accepted.
    pub station: String,
    /// Accepted price.
    pub price: i64,
    /// Number of proposals received.
    pub proposals: usize,
    /// Measurement received.
    pub measurement: Measurement,
}

/// Agent buying one measurement at the lowest price.
#[derive(Debug)]
pub struct WeatherClient {
    search_id: Option<u32>,
    outstanding: usize,
    answered: BTreeSet<DialogueId>,
    offers: BTreeMap<DialogueId, (AgentAddress, i64)>,
    accepted: Option<(DialogueId, AgentAddress, i64)>,
    done: Option<oneshot::Sender<Outcome>>,
}

impl WeatherClient {
    /// Creates a client reporting its outcome on `done`.
    #[must_use]
    pub fn new(done: oneshot::Sender<Outcome>) -> Self {
        Self {
            search_id: None,
            outstanding: 0,
            answered: BTreeSet::new(),
            offers: BTreeMap::new(),
            accepted: None,
            done: Some(done),
        }
    }

    /// Records the id of the search whose results should be negotiated with.
    pub fn expect_search(&mut self, search_id: u32) {
        self.search_id = Some(search_id);
    }

    /// Query used to find stations.
    #[must_use]
    pub fn query() -> Query {
        Query::for_model(weather_data_model())
    }

    fn decide(&mut self) -> Vec<Action> {
        if self.accepted.is_some() || self.outstanding > 0 {
            return Vec::new();
        }

        let Some((&winner, (station, price))) = self
            .offers
            .iter()
            .min_by_key(|(id, (_, price))| (*price, **id))
        else {
            return Vec::new();
        };
        let (station, price) = (station.clone(), *price);
        info!(station = %station, price, offers = self.offers.len(), "accepting cheapest offer");

        let mut actions = vec![Action::Accept {
            dialogue_id: winner,
        }];
        actions.extend(
            self.offers
                .keys()
                .filter(|id| **id != winner)
                .map(|id| Action::Decline { dialogue_id: *id }),
        );
        self.accepted = Some((winner, station, price));
        actions
    }

    /// Marks a station as having answered, once per dialogue.
    fn settle(&mut self, dialogue_id: DialogueId) -> Vec<Action> {
        if self.answered.insert(dialogue_id) {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        self.decide()
    }
}

impl AgentHandler for WeatherClient {
    fn on_search_result(&mut self, search_id: u32, agents: &[AgentAddress]) -> Vec<Action> {
        if self.search_id != Some(search_id) {
            return Vec::new();
        }
        info!(search_id, stations = agents.len(), "found stations");
        self.outstanding += agents.len();
        agents
            .iter()
            .map(|agent| Action::Cfp {
                to: agent.clone(),
                payload: CfpPayload::Query(Self::query()),
            })
            .collect()
    }

    fn on_propose(&mut self, dialogue: &Dialogue, proposal: &Proposal) -> Vec<Action> {
        let price = proposal
            .descriptions()
            .first()
            .and_then(|d| d.get("price"))
            .and_then(AttributeValue::as_int);

        match price {
            Some(price) if self.accepted.is_none() => {
                debug!(dialogue_id = %dialogue.id(), price, "offer received");
                self.offers
                    .insert(dialogue.id(), (dialogue.counterparty().clone(), price));
                self.settle(dialogue.id())
            }
            _ => {
                let mut actions = vec![Action::Decline {
                    dialogue_id: dialogue.id(),
                }];
                actions.extend(self.settle(dialogue.id()));
                actions
            }
        }
    }

    fn on_message(&mut self, dialogue: &Dialogue, content: &[u8]) -> Vec<Action> {
        let Some((winner, station, price)) = self.accepted.clone() else {
            return Vec::new();
        };
        if winner != dialogue.id() {
            return Vec::new();
        }

        match serde_json::from_slice::<Measurement>(content) {
            Ok(measurement) => {
                let outcome = Outcome {
                    station: station.to_string(),
                    price,
                    proposals: self.offers.len(),
                    measurement,
                };
                if let Some(done) = self.done.take() {
                    let _ = done.send(outcome);
                }
                vec![Action::Complete {
                    dialogue_id: dialogue.id(),
                }]
            }
            Err(e) => {
                warn!(dialogue_id = %dialogue.id(), error = %e, "unreadable measurement");
                vec![Action::Cancel {
                    dialogue_id: dialogue.id(),
                }]
            }
        }
    }

    fn on_decline(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        self.settle(dialogue.id())
    }

    fn on_dialogue_error(
        &mut self,
        dialogue_id: DialogueId,
        origin: &AgentAddress,
        _dialogue: Option<&Dialogue>,
    ) -> Vec<Action> {
        warn!(dialogue_id = %dialogue_id, station = %origin, "station unreachable");
        self.offers.remove(&dialogue_id);
        self.settle(dialogue_id)
    }

    fn on_timeout(&mut self, dialogue: &Dialogue) -> Vec<Action> {
        self.offers.remove(&dialogue.id());
        self.settle(dialogue.id())
    }

    fn on_action_failed(&mut self, action: &Action, error: &NegotiationError) -> Vec<Action> {
        match action {
            Action::Cfp { to, .. } => {
                warn!(station = %to, error = %error, "cfp not sent");
                self.outstanding = self.outstanding.saturating_sub(1);
                self.decide()
            }
            _ => Vec::new(),
        }
    }
}
