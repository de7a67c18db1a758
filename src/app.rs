//! The orchestrator. Owns the session's view state and reconciles every
//! input stream into it: device geolocation, postal-code submissions, map
//! selection, viewport changes and fetch settlements all funnel through
//! one event loop, so each transition is atomic with respect to the
//! others.

use crate::{
    config::Config,
    fetch::{Admission, FetchCoordinator, FetchRequest},
    provider::{WeatherPayload, WeatherProvider},
    signal::{GeolocationSource, Subscriptions, ViewportSource},
    state::{Coordinates, Layer, Screen, SwipeDirection, ViewState},
};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Shown when a fetch failure carries no message of its own
const GENERIC_FETCH_ERROR: &str = "Failed to fetch weather data";

/// Messages received from async operations and device signals
#[derive(Debug)]
pub enum AppEvent {
    /// Device reported a position (one-shot query or movement update)
    Geolocated(Coordinates),
    /// Device denied or failed the position query
    GeolocationFailed(String),
    /// Viewport may have changed; dimensions are read on handling
    ViewportChanged,
    /// A fetch cycle finished
    FetchSettled {
        seq: u64,
        request: FetchRequest,
        outcome: anyhow::Result<WeatherPayload>,
    },
    /// User left the landing screen
    EnteredApp,
    /// User explicitly dismissed the presenter
    PresenterClosed,
    /// User submitted a postal code
    PostalSubmitted(String),
    /// User picked a point on the map
    MapPointSelected(Coordinates),
    /// User swiped across the map
    LayerSwiped(SwipeDirection),
    /// User picked a layer directly
    LayerSelected(Layer),
    PostalEntryOpened,
    PostalEntryClosed,
    /// End the session
    Shutdown,
}

pub struct App {
    state: ViewState,
    mobile_breakpoint: u32,
    fetch: FetchCoordinator,
    geolocation: Arc<dyn GeolocationSource>,
    viewport: Arc<dyn ViewportSource>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    published: watch::Sender<ViewState>,
}

impl App {
    pub fn new(
        config: &Config,
        provider: Arc<dyn WeatherProvider>,
        geolocation: Arc<dyn GeolocationSource>,
        viewport: Arc<dyn ViewportSource>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = ViewState::default();
        let (published, _) = watch::channel(state.clone());
        Self {
            state,
            mobile_breakpoint: config.mobile_breakpoint,
            fetch: FetchCoordinator::new(provider, events_tx.clone()),
            geolocation,
            viewport,
            events_tx,
            events_rx,
            published,
        }
    }

    /// Read-only snapshot of the current view state
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Channel the rendering layer can watch; it receives a fresh snapshot
    /// after every transition
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.published.subscribe()
    }

    /// Sender for feeding external events into the session loop
    pub fn events(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.events_tx.clone()
    }

    /// Run one session: acquire the device signal subscriptions, process
    /// events until shutdown, release the subscriptions.
    pub async fn run(&mut self) {
        let _subscriptions = self.acquire_subscriptions();
        loop {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            if !self.handle_event(event) {
                break;
            }
        }
        info!("Session over");
    }

    /// Wire every external signal source into the event channel. The
    /// returned guard tears the wiring down when dropped.
    fn acquire_subscriptions(&self) -> Subscriptions {
        let mut handles = Vec::new();

        // One-shot position query; denial is recovered with the fallback
        // point when the failure event is handled
        let geolocation = Arc::clone(&self.geolocation);
        let events = self.events_tx.clone();
        handles.push(tokio::spawn(async move {
            let event = match geolocation.current().await {
                Ok(coordinates) => AppEvent::Geolocated(coordinates),
                Err(error) => {
                    AppEvent::GeolocationFailed(format!("{error:#}"))
                }
            };
            let _ = events.send(event);
        }));

        // Continuous updates, for devices that report movement
        if let Some(mut updates) = self.geolocation.updates() {
            let events = self.events_tx.clone();
            handles.push(tokio::spawn(async move {
                while let Some(coordinates) = updates.recv().await {
                    if events.send(AppEvent::Geolocated(coordinates)).is_err()
                    {
                        break;
                    }
                }
            }));
        }

        // Resize/orientation notifications
        let mut changes = self.viewport.changes();
        let events = self.events_tx.clone();
        handles.push(tokio::spawn(async move {
            while changes.recv().await.is_some() {
                if events.send(AppEvent::ViewportChanged).is_err() {
                    break;
                }
            }
        }));

        info!("Acquired {} signal subscriptions", handles.len());
        Subscriptions::new(handles)
    }

    /// Apply one event. Returns false when the session should end.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        trace!("Handling event: {event:?}");
        match event {
            AppEvent::Geolocated(coordinates) => {
                debug!("Device position: {coordinates}");
                self.focus_coordinates(coordinates);
            }
            AppEvent::GeolocationFailed(message) => {
                warn!(
                    "Device location unavailable ({message}); \
                     falling back to {}",
                    Coordinates::FALLBACK
                );
                self.focus_coordinates(Coordinates::FALLBACK);
            }
            AppEvent::ViewportChanged => self.recheck_screen(),
            AppEvent::FetchSettled {
                seq,
                request,
                outcome,
            } => self.settle_fetch(seq, request, outcome),
            AppEvent::EnteredApp => self.enter_app(),
            AppEvent::PresenterClosed => self.close_presenter(),
            AppEvent::PostalSubmitted(code) => {
                self.submit_postal_code(&code)
            }
            AppEvent::MapPointSelected(coordinates) => {
                self.select_map_point(coordinates)
            }
            AppEvent::LayerSwiped(direction) => self.swipe_layer(direction),
            AppEvent::LayerSelected(layer) => self.select_layer(layer),
            AppEvent::PostalEntryOpened => self.open_postal_entry(),
            AppEvent::PostalEntryClosed => self.close_postal_entry(),
            AppEvent::Shutdown => {
                info!("Shutting down session");
                return false;
            }
        }
        true
    }

    /// Map interaction entry point
    pub fn select_map_point(&mut self, coordinates: Coordinates) {
        self.focus_coordinates(coordinates);
    }

    /// Postal-code form entry point. Blank input is dropped without
    /// touching state.
    pub fn submit_postal_code(&mut self, code: &str) {
        let code = code.trim();
        if code.is_empty() {
            debug!("Ignoring blank postal code submission");
            return;
        }
        // The code doesn't self-describe a coordinate; the map moves once
        // the fetch settles
        self.start_fetch(FetchRequest::PostalCode(code.to_owned()));
    }

    /// Move one layer in swipe order. Swiping past either end is a no-op.
    pub fn swipe_layer(&mut self, direction: SwipeDirection) {
        let layer = match direction {
            SwipeDirection::Left => self.state.layer.next(),
            SwipeDirection::Right => self.state.layer.previous(),
        };
        if layer != self.state.layer {
            debug!("Layer {:?} -> {layer:?}", self.state.layer);
            self.state.layer = layer;
            self.publish();
        }
    }

    /// Direct selection from the layer picker
    pub fn select_layer(&mut self, layer: Layer) {
        if layer != self.state.layer {
            debug!("Layer {:?} -> {layer:?}", self.state.layer);
            self.state.layer = layer;
            self.publish();
        }
    }

    /// Leave the landing screen. Which screen comes up depends on the
    /// device condition at this moment.
    pub fn enter_app(&mut self) {
        if self.state.screen != Screen::Landing {
            return;
        }
        self.state.screen = Screen::Main;
        self.recheck_screen();
    }

    /// Escape hatch out of the presenter, independent of the device
    /// condition. The next viewport recheck may flip it back.
    pub fn close_presenter(&mut self) {
        if self.state.screen == Screen::Presenter {
            info!("Presenter closed");
            self.state.screen = Screen::Main;
            self.publish();
        }
    }

    pub fn open_postal_entry(&mut self) {
        self.state.postal_entry_open = true;
        self.publish();
    }

    pub fn close_postal_entry(&mut self) {
        self.state.postal_entry_open = false;
        self.publish();
    }

    /// Focus a coordinate-bearing source (device position or map point):
    /// the display tracks the point immediately, weather follows when the
    /// fetch settles.
    fn focus_coordinates(&mut self, coordinates: Coordinates) {
        if !coordinates.is_finite() {
            warn!("Ignoring non-finite coordinates");
            return;
        }
        self.state.coordinates = coordinates;
        self.start_fetch(FetchRequest::Coordinates(coordinates));
    }

    fn start_fetch(&mut self, request: FetchRequest) {
        self.state.loading = true;
        self.state.error = None;
        self.fetch.issue(request);
        self.publish();
    }

    fn settle_fetch(
        &mut self,
        seq: u64,
        request: FetchRequest,
        outcome: anyhow::Result<WeatherPayload>,
    ) {
        let latest = match self.fetch.admit(seq) {
            Admission::Stale => {
                debug!("Discarding stale result for {request} (seq {seq})");
                return;
            }
            Admission::Apply { latest } => latest,
        };
        if latest {
            self.state.loading = false;
        }
        match outcome {
            Ok(payload) => {
                info!(
                    "Weather ready for {} (seq {seq})",
                    payload.location.name
                );
                // Adopt the provider's possibly corrected coordinate
                self.state.coordinates = payload.location.coordinates;
                self.state.location = payload.location.name.clone();
                self.state.weather = Some(payload);
                self.state.error = None;
                // A successful postal lookup closes the entry surface;
                // failures leave it open for another try
                if matches!(request, FetchRequest::PostalCode(_)) {
                    self.state.postal_entry_open = false;
                }
            }
            Err(error) => {
                warn!("Fetch for {request} failed: {error:#}");
                let mut message = format!("{error:#}");
                if message.is_empty() {
                    message = GENERIC_FETCH_ERROR.to_owned();
                }
                self.state.error = Some(message);
            }
        }
        self.publish();
    }

    /// Re-evaluate presenter eligibility from the current viewport.
    /// Suppressed on the landing screen.
    fn recheck_screen(&mut self) {
        if self.state.screen == Screen::Landing {
            return;
        }
        let viewport = self.viewport.dimensions();
        let screen = if viewport.is_presenter_eligible(self.mobile_breakpoint)
        {
            Screen::Presenter
        } else {
            Screen::Main
        };
        if screen != self.state.screen {
            info!(
                "Screen {:?} -> {screen:?} at {}x{}",
                self.state.screen, viewport.width, viewport.height
            );
            self.state.screen = screen;
        }
        self.publish();
    }

    fn publish(&self) {
        self.published.send_replace(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        provider::{Conditions, Location},
        signal::{SimulatedViewport, StaticGeolocation},
        state::Viewport,
    };
    use anyhow::bail;
    use async_trait::async_trait;
    use std::{collections::VecDeque, sync::Mutex};

    /// Provider that pops pre-scripted outcomes, regardless of request
    struct ScriptedProvider {
        outcomes: Mutex<VecDeque<anyhow::Result<WeatherPayload>>>,
    }

    impl ScriptedProvider {
        fn new(
            outcomes: impl IntoIterator<Item = anyhow::Result<WeatherPayload>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
            })
        }

        fn next(&self) -> anyhow::Result<WeatherPayload> {
            match self.outcomes.lock().unwrap().pop_front() {
                Some(outcome) => outcome,
                None => bail!("No scripted outcome left"),
            }
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        async fn by_coordinates(
            &self,
            _: Coordinates,
        ) -> anyhow::Result<WeatherPayload> {
            self.next()
        }

        async fn by_postal_code(
            &self,
            _: &str,
        ) -> anyhow::Result<WeatherPayload> {
            self.next()
        }
    }

    fn payload(name: &str, lat: f64, lon: f64) -> WeatherPayload {
        WeatherPayload {
            location: Location {
                name: name.into(),
                coordinates: Coordinates { lat, lon },
            },
            current: Conditions {
                temperature: 21.0,
                humidity: 55,
                wind_speed: 2.5,
                description: "scattered clouds".into(),
            },
            periods: Vec::new(),
        }
    }

    fn app_with(
        outcomes: impl IntoIterator<Item = anyhow::Result<WeatherPayload>>,
        viewport: Viewport,
    ) -> (App, Arc<SimulatedViewport>) {
        let simulated = Arc::new(SimulatedViewport::new(viewport));
        let app = App::new(
            &Config::default(),
            ScriptedProvider::new(outcomes),
            Arc::new(StaticGeolocation(None)),
            Arc::clone(&simulated) as Arc<dyn ViewportSource>,
        );
        (app, simulated)
    }

    fn desktop() -> Viewport {
        Viewport {
            width: 1280,
            height: 800,
        }
    }

    fn sideways_phone() -> Viewport {
        Viewport {
            width: 740,
            height: 360,
        }
    }

    /// Wait for the next settlement coming back from a spawned fetch
    async fn next_settlement(app: &mut App) -> AppEvent {
        loop {
            let event = app
                .events_rx
                .recv()
                .await
                .expect("event channel closed");
            if matches!(event, AppEvent::FetchSettled { .. }) {
                return event;
            }
        }
    }

    /// Wait for two settlements and return them in issue order
    async fn two_settlements(app: &mut App) -> (AppEvent, AppEvent) {
        let a = next_settlement(app).await;
        let b = next_settlement(app).await;
        if seq_of(&a) < seq_of(&b) {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn seq_of(event: &AppEvent) -> u64 {
        match event {
            AppEvent::FetchSettled { seq, .. } => *seq,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_blank_postal_code_is_ignored() {
        let (mut app, _) = app_with([], desktop());
        app.submit_postal_code("   ");
        app.submit_postal_code("");

        assert!(!app.state().loading);
        assert!(app.state().error.is_none());
        // Nothing was issued, so nothing ever settles
        assert!(app.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_map_point_fetch_success() {
        let picked = Coordinates {
            lat: 40.7,
            lon: -74.1,
        };
        let (mut app, _) =
            app_with([Ok(payload("New York", 40.7306, -73.9866))], desktop());

        app.select_map_point(picked);
        // The display tracks the point before any data arrives
        assert_eq!(app.state().coordinates, picked);
        assert!(app.state().loading);
        assert!(app.state().error.is_none());

        let settled = next_settlement(&mut app).await;
        app.handle_event(settled);

        assert!(!app.state().loading);
        assert_eq!(app.state().location, "New York");
        // Reconciled with the provider's corrected coordinate
        assert_eq!(app.state().coordinates.lat, 40.7306);
        assert!(app.state().weather.is_some());
        assert!(app.state().error.is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_data() {
        let (mut app, _) = app_with(
            [Ok(payload("Chicago", 41.88, -87.63)), Err(bail_err())],
            desktop(),
        );

        app.select_map_point(Coordinates {
            lat: 41.88,
            lon: -87.63,
        });
        let settled = next_settlement(&mut app).await;
        app.handle_event(settled);
        assert_eq!(app.state().location, "Chicago");

        app.submit_postal_code("60601");
        assert!(app.state().loading);
        assert!(app.state().error.is_none());

        let settled = next_settlement(&mut app).await;
        app.handle_event(settled);

        assert!(!app.state().loading);
        assert!(app.state().error.as_deref().unwrap().contains("boom"));
        // Prior data survives the failure
        assert_eq!(app.state().location, "Chicago");
        assert!(app.state().weather.is_some());
    }

    fn bail_err() -> anyhow::Error {
        anyhow::anyhow!("boom")
    }

    #[tokio::test]
    async fn test_racing_fetches_newest_settlement_wins() {
        let (mut app, _) = app_with(
            [
                Ok(payload("First", 1.0, 1.0)),
                Ok(payload("Second", 2.0, 2.0)),
            ],
            desktop(),
        );

        app.select_map_point(Coordinates { lat: 1.0, lon: 1.0 });
        app.select_map_point(Coordinates { lat: 2.0, lon: 2.0 });

        let (first, second) = two_settlements(&mut app).await;

        // The newer cycle settles first
        app.handle_event(second);
        assert!(!app.state().loading);
        assert_eq!(app.state().location, "Second");

        // The older result is now stale and must change nothing
        app.handle_event(first);
        assert!(!app.state().loading);
        assert_eq!(app.state().location, "Second");
        assert_eq!(app.state().coordinates.lat, 2.0);
    }

    #[tokio::test]
    async fn test_old_settlement_leaves_loading_while_newer_in_flight() {
        let (mut app, _) = app_with(
            [
                Ok(payload("First", 1.0, 1.0)),
                Ok(payload("Second", 2.0, 2.0)),
            ],
            desktop(),
        );

        app.select_map_point(Coordinates { lat: 1.0, lon: 1.0 });
        app.select_map_point(Coordinates { lat: 2.0, lon: 2.0 });

        let (first, second) = two_settlements(&mut app).await;
        app.handle_event(first);
        // Older data may show, but the newer cycle is still in flight
        assert_eq!(app.state().location, "First");
        assert!(app.state().loading);

        app.handle_event(second);
        assert_eq!(app.state().location, "Second");
        assert!(!app.state().loading);
    }

    #[tokio::test]
    async fn test_geolocation_denial_falls_back() {
        let (mut app, _) =
            app_with([Ok(payload("New York", 40.7128, -74.0060))], desktop());

        app.handle_event(AppEvent::GeolocationFailed("denied".into()));
        assert_eq!(app.state().coordinates, Coordinates::FALLBACK);
        assert!(app.state().loading);
        // Geolocation failure is recovered, never user-visible
        assert!(app.state().error.is_none());

        let settled = next_settlement(&mut app).await;
        app.handle_event(settled);
        assert_eq!(app.state().location, "New York");
    }

    #[tokio::test]
    async fn test_postal_code_success_closes_entry_surface() {
        let (mut app, _) =
            app_with([Ok(payload("New York", 40.7506, -73.9972))], desktop());

        app.open_postal_entry();
        assert!(app.state().postal_entry_open);

        app.submit_postal_code("10001");
        assert!(app.state().loading);

        let settled = next_settlement(&mut app).await;
        app.handle_event(settled);

        assert!(!app.state().loading);
        assert!(!app.state().postal_entry_open);
        assert_eq!(app.state().coordinates.lat, 40.7506);
    }

    #[tokio::test]
    async fn test_postal_code_failure_keeps_entry_surface_open() {
        let (mut app, _) = app_with([Err(bail_err())], desktop());

        app.open_postal_entry();
        app.submit_postal_code("10001");
        let settled = next_settlement(&mut app).await;
        app.handle_event(settled);

        assert!(app.state().postal_entry_open);
        assert!(app.state().error.is_some());
    }

    #[tokio::test]
    async fn test_swipe_sequence_clamps_at_ends() {
        let (mut app, _) = app_with([], desktop());

        app.swipe_layer(SwipeDirection::Right);
        assert_eq!(app.state().layer, Layer::Satellite);

        app.swipe_layer(SwipeDirection::Left);
        app.swipe_layer(SwipeDirection::Left);
        app.swipe_layer(SwipeDirection::Left);
        assert_eq!(app.state().layer, Layer::Forecast);

        app.swipe_layer(SwipeDirection::Right);
        assert_eq!(app.state().layer, Layer::Precipitation);

        app.select_layer(Layer::Satellite);
        assert_eq!(app.state().layer, Layer::Satellite);
    }

    #[tokio::test]
    async fn test_landing_suppresses_device_condition() {
        let (mut app, simulated) = app_with([], sideways_phone());

        // Still on the landing screen: rechecks change nothing
        app.handle_event(AppEvent::ViewportChanged);
        assert_eq!(app.state().screen, Screen::Landing);

        // Entering the app lands directly in the presenter on a sideways
        // phone
        app.enter_app();
        assert_eq!(app.state().screen, Screen::Presenter);

        // Rotating upright drops back to the main screen
        simulated.resize(Viewport {
            width: 360,
            height: 740,
        });
        app.handle_event(AppEvent::ViewportChanged);
        assert_eq!(app.state().screen, Screen::Main);
    }

    #[tokio::test]
    async fn test_close_presenter_until_next_recheck() {
        let (mut app, _) = app_with([], sideways_phone());
        app.enter_app();
        assert_eq!(app.state().screen, Screen::Presenter);

        // Explicit close wins over the device condition
        app.close_presenter();
        assert_eq!(app.state().screen, Screen::Main);

        // The next recheck flips it back, the device is still sideways
        app.handle_event(AppEvent::ViewportChanged);
        assert_eq!(app.state().screen, Screen::Presenter);
    }

    #[tokio::test]
    async fn test_enter_app_is_one_time() {
        let (mut app, _) = app_with([], desktop());
        app.enter_app();
        assert_eq!(app.state().screen, Screen::Main);

        // A second enter is a no-op in any screen
        app.enter_app();
        assert_eq!(app.state().screen, Screen::Main);
    }

    #[tokio::test]
    async fn test_non_finite_map_point_is_rejected() {
        let (mut app, _) = app_with([], desktop());
        let before = app.state().coordinates;

        app.select_map_point(Coordinates {
            lat: f64::NAN,
            lon: 0.0,
        });
        assert_eq!(app.state().coordinates, before);
        assert!(!app.state().loading);
    }

    #[tokio::test]
    async fn test_published_snapshots_follow_transitions() {
        let (mut app, _) = app_with([], desktop());
        let snapshots = app.subscribe();

        app.enter_app();
        assert_eq!(snapshots.borrow().screen, Screen::Main);

        app.select_layer(Layer::Forecast);
        assert_eq!(snapshots.borrow().layer, Layer::Forecast);
    }

    #[tokio::test]
    async fn test_session_loop_shuts_down() {
        let (mut app, _) = app_with([], desktop());
        let events = app.events();
        events.send(AppEvent::Shutdown).unwrap();
        // Returns once the shutdown event is processed
        app.run().await;
    }
}
