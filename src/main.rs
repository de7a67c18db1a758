//! Line-driven harness around the shell: wires the live weather provider
//! and simulated device signals to the orchestrator, logs every published
//! snapshot, and turns stdin lines into shell interactions so a whole
//! session can be exercised without a rendering layer.

use anyhow::Context;
use log::{info, LevelFilter};
use skyview::{
    app::{App, AppEvent},
    config::Config,
    provider::http::HttpWeatherProvider,
    signal::{SimulatedViewport, StaticGeolocation},
    state::{Coordinates, Layer, SwipeDirection, Viewport},
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = Config::load()?;
    let provider = Arc::new(HttpWeatherProvider::new(&config)?);
    let geolocation = Arc::new(StaticGeolocation(config.device_location));
    let viewport = Arc::new(SimulatedViewport::new(config.viewport));

    let mut app = App::new(
        &config,
        provider,
        geolocation,
        Arc::clone(&viewport) as Arc<dyn skyview::signal::ViewportSource>,
    );
    let events = app.events();

    // Ctrl-c ends the session, which releases the signal subscriptions
    let shutdown = events.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown.send(AppEvent::Shutdown);
    })
    .context("Error installing shutdown handler")?;

    // Follow the session by logging every published snapshot
    let mut snapshots = app.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let state = snapshots.borrow_and_update().clone();
            info!(
                "screen={:?} layer={:?} at={} loading={} location={:?} \
                 error={:?}",
                state.screen,
                state.layer,
                state.coordinates,
                state.loading,
                state.location,
                state.error,
            );
        }
    });

    // Each stdin line becomes one shell interaction
    let input = events.clone();
    let resizable = Arc::clone(&viewport);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(Command::Resize(viewport)) => resizable.resize(viewport),
                Some(Command::Event(event)) => {
                    if input.send(event).is_err() {
                        break;
                    }
                }
                None => eprintln!("unrecognized command: {line}"),
            }
        }
    });

    app.run().await;
    Ok(())
}

/// One parsed harness command
#[derive(Debug)]
enum Command {
    Event(AppEvent),
    Resize(Viewport),
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "enter" => Command::Event(AppEvent::EnteredApp),
        "close" => Command::Event(AppEvent::PresenterClosed),
        // `zip` alone opens the entry surface, `zip <code>` submits
        "zip" => match words.next() {
            Some(code) => {
                Command::Event(AppEvent::PostalSubmitted(code.to_owned()))
            }
            None => Command::Event(AppEvent::PostalEntryOpened),
        },
        "cancel" => Command::Event(AppEvent::PostalEntryClosed),
        "map" => {
            let lat = words.next()?.parse().ok()?;
            let lon = words.next()?.parse().ok()?;
            Command::Event(AppEvent::MapPointSelected(Coordinates {
                lat,
                lon,
            }))
        }
        "left" => Command::Event(AppEvent::LayerSwiped(SwipeDirection::Left)),
        "right" => {
            Command::Event(AppEvent::LayerSwiped(SwipeDirection::Right))
        }
        "layer" => {
            let layer = match words.next()? {
                "satellite" => Layer::Satellite,
                "precipitation" | "rain" => Layer::Precipitation,
                "forecast" => Layer::Forecast,
                _ => return None,
            };
            Command::Event(AppEvent::LayerSelected(layer))
        }
        "resize" => {
            let width = words.next()?.parse().ok()?;
            let height = words.next()?.parse().ok()?;
            Command::Resize(Viewport { width, height })
        }
        "quit" | "exit" => Command::Event(AppEvent::Shutdown),
        _ => return None,
    };
    Some(command)
}
