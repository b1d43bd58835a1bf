//! Weather demo driver.
//!
//! Connects every configured agent to one [`LocalBroker`], runs each agent's
//! engine on its own task and waits for the client's outcome.

use std::time::Duration;

use anyhow::Context;
use oef_dialogue::{AgentHandler, NegotiationEngine, NegotiationError};
use oef_local::{EventReceiver, LocalBroker, LocalConnection};
use oef_schema::Location;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{DemoConfig, StationConfig};
use crate::weather::{Outcome, WeatherClient, WeatherStation, WEATHER_SERVICE};

/// Runs the weather negotiation described by `config`.
///
/// # Errors
///
/// Returns an error if an agent cannot connect or register, or if the client
/// does not receive a measurement within `config.timeout_secs`.
pub async fn run_demo(config: &DemoConfig) -> anyhow::Result<Outcome> {
    config.validate()?;

    let broker = LocalBroker::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut agents = JoinSet::new();

    for station in &config.stations {
        let (engine, events) = connect(&broker, &station.agent.public_key, config)?;
        let handler = WeatherStation::new(station.price, station_location(station));
        let description = handler
            .service_description()
            .context("station description does not fit the weather model")?;
        engine
            .register_service(WEATHER_SERVICE, description)
            .await
            .with_context(|| format!("station '{}' failed to register", station.agent.public_key))?;
        agents.spawn(drive(engine, events, handler, shutdown_rx.clone()));
    }
    info!(stations = config.stations.len(), "stations registered");

    let (done_tx, done_rx) = oneshot::channel();
    let mut client = WeatherClient::new(done_tx);
    let (engine, events) = connect(&broker, &config.client.public_key, config)?;
    let search_id = engine
        .search_services(WeatherClient::query())
        .await
        .context("client search failed")?;
    client.expect_search(search_id);
    agents.spawn(drive(engine, events, client, shutdown_rx));

    let outcome = tokio::time::timeout(Duration::from_secs(config.timeout_secs), done_rx)
        .await
        .with_context(|| format!("no measurement within {}s", config.timeout_secs))
        .and_then(|received| received.context("client stopped before receiving a measurement"));

    let _ = shutdown_tx.send(true);
    while let Some(joined) = agents.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "agent stopped with an error"),
            Err(e) => warn!(error = %e, "agent task failed"),
        }
    }
    for key in broker.agents() {
        broker.disconnect(&key);
    }

    outcome
}

fn connect(
    broker: &LocalBroker,
    key: &str,
    config: &DemoConfig,
) -> anyhow::Result<(NegotiationEngine<LocalConnection>, EventReceiver)> {
    let (connection, events) = broker
        .connect(key)
        .with_context(|| format!("agent '{key}' failed to connect"))?;
    let engine = NegotiationEngine::new(
        connection.address().clone(),
        connection,
        config.engine.clone(),
    )?;
    Ok((engine, events))
}

async fn drive<H: AgentHandler>(
    engine: NegotiationEngine<LocalConnection>,
    events: EventReceiver,
    mut handler: H,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), NegotiationError> {
    let stop = async move {
        let _ = shutdown.changed().await;
    };
    engine.run(events, &mut handler, stop).await
}

fn station_location(station: &StationConfig) -> Option<Location> {
    match (station.latitude, station.longitude) {
        (Some(latitude), Some(longitude)) => Some(Location::new(latitude, longitude)),
        _ => None,
    }
}
