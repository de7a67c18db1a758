//! Fetch lifecycle. One coordinator per session issues provider calls and
//! decides which settlements are allowed to touch state. Requests are
//! never cancelled; a newer request simply starts another independent
//! cycle, and sequence tagging keeps racing cycles consistent.

use crate::{
    app::AppEvent,
    provider::WeatherProvider,
    state::Coordinates,
};
use log::info;
use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;

/// One resolved location request. Lives for a single fetch cycle and
/// travels with the settlement so the orchestrator can apply
/// request-kind-specific effects.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchRequest {
    Coordinates(Coordinates),
    PostalCode(String),
}

impl Display for FetchRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinates(coordinates) => {
                write!(f, "coordinates {coordinates}")
            }
            Self::PostalCode(code) => write!(f, "postal code {code}"),
        }
    }
}

/// Verdict on one settlement
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Admission {
    /// Apply the result. `latest` is true when no newer request is still
    /// in flight, which is what clears the loading flag.
    Apply { latest: bool },
    /// A newer settlement has already been applied; discard this one
    Stale,
}

/// Issues fetches and arbitrates their settlements. Each issued request
/// gets a monotonically increasing sequence number; a settlement is
/// applied only if its sequence is higher than every sequence applied so
/// far, so two cycles racing in flight can't leave older data on screen.
pub struct FetchCoordinator {
    provider: Arc<dyn WeatherProvider>,
    events: UnboundedSender<AppEvent>,
    /// Sequence number of the most recently issued request
    issued: u64,
    /// Highest sequence number whose settlement has been applied
    applied: u64,
}

impl FetchCoordinator {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            provider,
            events,
            issued: 0,
            applied: 0,
        }
    }

    /// Start a fetch cycle. The settlement comes back through the event
    /// channel; nothing is awaited here.
    pub fn issue(&mut self, request: FetchRequest) {
        self.issued += 1;
        let seq = self.issued;
        info!("Fetching weather for {request} (seq {seq})");
        let provider = Arc::clone(&self.provider);
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = match &request {
                FetchRequest::Coordinates(coordinates) => {
                    provider.by_coordinates(*coordinates).await
                }
                FetchRequest::PostalCode(code) => {
                    provider.by_postal_code(code).await
                }
            };
            // The session loop may already be gone during teardown
            let _ = events.send(AppEvent::FetchSettled {
                seq,
                request,
                outcome,
            });
        });
    }

    /// Judge a settlement by its sequence number
    pub fn admit(&mut self, seq: u64) -> Admission {
        if seq <= self.applied {
            return Admission::Stale;
        }
        self.applied = seq;
        Admission::Apply {
            latest: seq == self.issued,
        }
    }
}
