//! Abstraction over the weather data provider, and the normalized payload
//! it hands back. The shell only ever talks to the [WeatherProvider]
//! trait; production wires [http::HttpWeatherProvider], tests wire a
//! scripted provider.

pub mod http;

use crate::state::Coordinates;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// A source of weather data for a geographic point. Both calls fail with a
/// descriptive error on invalid input or a provider/network problem.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> anyhow::Result<WeatherPayload>;

    async fn by_postal_code(
        &self,
        code: &str,
    ) -> anyhow::Result<WeatherPayload>;
}

/// Normalized weather data for one location: enough to drive the
/// satellite, precipitation and forecast layers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherPayload {
    pub location: Location,
    pub current: Conditions,
    /// Upcoming forecast intervals, in chronological order
    pub periods: Vec<ForecastPeriod>,
}

/// Where the payload is for. The coordinate is the provider's own notion
/// of the location, which may be a corrected version of what was asked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub coordinates: Coordinates,
}

/// Conditions at the focus point right now
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub temperature: f64,
    pub humidity: u32,
    pub wind_speed: f64,
    pub description: String,
}

impl Conditions {
    /// Formatted temperature
    pub fn temperature(&self) -> String {
        format!("{:.0}°", self.temperature)
    }
}

/// One forecast interval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastPeriod {
    pub start_time: DateTime<Utc>,
    pub temperature: f64,
    /// Probability of precipitation, 0.0 to 1.0
    pub precipitation_chance: f64,
    pub description: String,
}

impl ForecastPeriod {
    /// Localized timestamp for the start of this period
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time.with_timezone(&Local)
    }

    /// Formatted temperature
    pub fn temperature(&self) -> String {
        format!("{:.0}°", self.temperature)
    }

    /// Formatted probability of precipitation
    pub fn precipitation_chance(&self) -> String {
        format!("{:.0}%", self.precipitation_chance * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_formatting() {
        let period = ForecastPeriod {
            start_time: "2026-08-07T17:00:00Z".parse().unwrap(),
            temperature: 23.6,
            precipitation_chance: 0.35,
            description: "light rain".into(),
        };
        assert_eq!(period.temperature(), "24°");
        assert_eq!(period.precipitation_chance(), "35%");
    }
}
