//! Weather provider backed by an OpenWeatherMap-compatible HTTP API. One
//! forecast call carries everything the payload needs: the resolved
//! location, conditions now, and the upcoming periods.

use crate::{
    config::Config,
    provider::{
        Conditions, ForecastPeriod, Location, WeatherPayload,
        WeatherProvider,
    },
    state::Coordinates,
};
use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;

pub struct HttpWeatherProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpWeatherProvider {
    const TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .user_agent("skyview")
            .timeout(Self::TIMEOUT)
            .build()
            .context("Error building HTTP client")?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Issue one forecast request and normalize the response. `what`
    /// describes the query for error messages.
    async fn fetch(
        &self,
        query: &[(&str, String)],
        what: &str,
    ) -> anyhow::Result<WeatherPayload> {
        let url = format!("{}/forecast", self.base_url);
        debug!("Requesting weather for {what}");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .query(query)
            .send()
            .await
            .with_context(|| format!("Error fetching weather for {what}"))?;

        let status = response.status();
        if !status.is_success() {
            // Failures come back as {cod, message}
            let message = response
                .json::<ApiError>()
                .await
                .map(|error| error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            bail!("Weather provider rejected request for {what}: {message}");
        }

        let forecast: ForecastResponse = response
            .json()
            .await
            .with_context(|| format!("Error parsing weather for {what}"))?;
        forecast.normalize()
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> anyhow::Result<WeatherPayload> {
        self.fetch(
            &[
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lon.to_string()),
            ],
            &format!("coordinates {coordinates}"),
        )
        .await
    }

    async fn by_postal_code(
        &self,
        code: &str,
    ) -> anyhow::Result<WeatherPayload> {
        self.fetch(
            &[("zip", code.to_owned())],
            &format!("postal code {code}"),
        )
        .await
    }
}

/// Error body for non-2xx responses
#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Wire format of the forecast endpoint
/// https://openweathermap.org/forecast5
#[derive(Deserialize)]
struct ForecastResponse {
    city: City,
    list: Vec<Entry>,
}

#[derive(Deserialize)]
struct City {
    name: String,
    coord: Coord,
}

#[derive(Deserialize)]
struct Coord {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct Entry {
    #[serde(with = "chrono::serde::ts_seconds")]
    dt: DateTime<Utc>,
    main: MainInfo,
    weather: Vec<Description>,
    wind: Wind,
    /// Probability of precipitation, 0.0 to 1.0. Absent on some plans.
    #[serde(default)]
    pop: f64,
}

#[derive(Deserialize)]
struct MainInfo {
    temp: f64,
    humidity: u32,
}

#[derive(Deserialize)]
struct Description {
    description: String,
}

#[derive(Deserialize)]
struct Wind {
    speed: f64,
}

impl Entry {
    fn description(&self) -> &str {
        self.weather
            .first()
            .map(|weather| weather.description.as_str())
            .unwrap_or_default()
    }
}

impl ForecastResponse {
    /// Flatten the wire shape into the normalized payload. The first
    /// period stands in for current conditions.
    fn normalize(self) -> anyhow::Result<WeatherPayload> {
        let current = self
            .list
            .first()
            .context("Forecast contains no periods")?;
        let conditions = Conditions {
            temperature: current.main.temp,
            humidity: current.main.humidity,
            wind_speed: current.wind.speed,
            description: current.description().to_owned(),
        };
        let periods = self
            .list
            .iter()
            .map(|entry| ForecastPeriod {
                start_time: entry.dt,
                temperature: entry.main.temp,
                precipitation_chance: entry.pop,
                description: entry.description().to_owned(),
            })
            .collect();
        Ok(WeatherPayload {
            location: Location {
                name: self.city.name,
                coordinates: Coordinates {
                    lat: self.city.coord.lat,
                    lon: self.city.coord.lon,
                },
            },
            current: conditions,
            periods,
        })
    }
}
