//! Injected device signal sources. The orchestrator only sees the traits
//! here; the binary wires simulated sources, tests wire scripted ones, and
//! a real embedding would wire the platform's location and window systems.

use crate::state::{Coordinates, Viewport};
use anyhow::anyhow;
use async_trait::async_trait;
use log::info;
use std::sync::Mutex;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

/// Device geolocation. The query resolves or fails exactly once per
/// invocation; continuous movement updates are a separate, optional
/// stream.
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    /// Resolve the device's current position. Fails on denial or when no
    /// position is available.
    async fn current(&self) -> anyhow::Result<Coordinates>;

    /// Continuous position updates, for devices that report movement
    fn updates(&self) -> Option<UnboundedReceiver<Coordinates>> {
        None
    }
}

/// Viewport geometry plus resize/orientation-change notification. The
/// notification carries no payload; dimensions are read back at recheck
/// time.
pub trait ViewportSource: Send + Sync {
    fn dimensions(&self) -> Viewport;

    /// Channel that fires whenever the viewport may have changed
    fn changes(&self) -> UnboundedReceiver<()>;
}

/// Handles for the background tasks forwarding device signals into the
/// session loop. Dropping the guard releases every subscription exactly
/// once, however the session ends.
pub struct Subscriptions(Vec<JoinHandle<()>>);

impl Subscriptions {
    pub fn new(handles: Vec<JoinHandle<()>>) -> Self {
        Self(handles)
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        info!("Releasing {} signal subscriptions", self.0.len());
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Fixed-position source for headless runs: reports the configured
/// coordinate, or fails so the shell falls back
pub struct StaticGeolocation(pub Option<Coordinates>);

#[async_trait]
impl GeolocationSource for StaticGeolocation {
    async fn current(&self) -> anyhow::Result<Coordinates> {
        self.0.ok_or_else(|| anyhow!("No device location configured"))
    }
}

/// Viewport whose geometry is set programmatically. Used by the line
/// harness and by tests.
pub struct SimulatedViewport {
    dimensions: Mutex<Viewport>,
    subscribers: Mutex<Vec<UnboundedSender<()>>>,
}

impl SimulatedViewport {
    pub fn new(initial: Viewport) -> Self {
        Self {
            dimensions: Mutex::new(initial),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Change the geometry and notify every subscriber
    pub fn resize(&self, viewport: Viewport) {
        *self.dimensions.lock().unwrap() = viewport;
        self.subscribers
            .lock()
            .unwrap()
            .retain(|subscriber| subscriber.send(()).is_ok());
    }
}

impl ViewportSource for SimulatedViewport {
    fn dimensions(&self) -> Viewport {
        *self.dimensions.lock().unwrap()
    }

    fn changes(&self) -> UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}
