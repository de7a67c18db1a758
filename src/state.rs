//! View state shared between the orchestrator and the rendering layer,
//! plus the small value types it is built from.

use crate::provider::WeatherPayload;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A latitude/longitude pair. Both values are always finite; inputs that
/// aren't get rejected at the boundary where they arrive.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Focus point used when the device can't or won't provide a location
    /// (New York City)
    pub const FALLBACK: Self = Self {
        lat: 40.7128,
        lon: -74.0060,
    };

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// Selectable weather data layers, in swipe order
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    Satellite,
    Precipitation,
    Forecast,
}

impl Layer {
    const ORDER: &'static [Self] =
        &[Self::Satellite, Self::Precipitation, Self::Forecast];

    /// The layer one step forward in swipe order. Clamped: the last layer
    /// is its own successor.
    pub fn next(self) -> Self {
        let index = self.index();
        Self::ORDER.get(index + 1).copied().unwrap_or(self)
    }

    /// The layer one step backward in swipe order. Clamped: the first
    /// layer is its own predecessor.
    pub fn previous(self) -> Self {
        self.index()
            .checked_sub(1)
            .and_then(|index| Self::ORDER.get(index))
            .copied()
            .unwrap_or(self)
    }

    fn index(self) -> usize {
        Self::ORDER
            .iter()
            .position(|layer| *layer == self)
            .unwrap_or_default()
    }
}

/// Horizontal swipe over the map
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SwipeDirection {
    Left,
    Right,
}

/// Which top-level screen the shell is showing
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    /// Intro screen, shown until the user explicitly enters the app
    #[default]
    Landing,
    /// Stripped-down display for small landscape screens
    Presenter,
    /// Fullscreen map with layer chrome
    Main,
}

/// Viewport geometry reported by the device
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn is_landscape(self) -> bool {
        self.height < self.width
    }

    /// Presenter mode is for phones held sideways: landscape orientation
    /// at or below the mobile width breakpoint
    pub fn is_presenter_eligible(self, mobile_breakpoint: u32) -> bool {
        self.is_landscape() && self.width <= mobile_breakpoint
    }
}

/// Everything the rendering layer needs in order to draw a frame. There is
/// exactly one instance per session, owned by [App](crate::app::App) and
/// mutated only through its transition methods.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ViewState {
    /// Current geographic focus point
    pub coordinates: Coordinates,
    /// Latest successfully fetched payload. Kept on fetch failure; stale
    /// is better than blank.
    pub weather: Option<WeatherPayload>,
    /// True strictly while the most recently issued fetch is unsettled
    pub loading: bool,
    /// Message from the latest failed fetch, cleared when a new fetch
    /// starts
    pub error: Option<String>,
    /// Display name of the focus point, from the last successful fetch
    pub location: String,
    pub layer: Layer,
    pub screen: Screen,
    /// Whether the postal-code entry surface is open
    pub postal_entry_open: bool,
}
