use crate::state::{Coordinates, Viewport};
use anyhow::Context;
use log::info;
use serde::Deserialize;
use std::{fs::File, path::Path};

/// App configuration, loaded from `./config.json`. Every field has a
/// default so a missing or partial file still boots the shell.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the weather API
    pub api_url: String,
    /// API key sent with every request
    pub api_key: String,
    /// Device position, for environments without a real location service.
    /// Absent means the position query fails and the shell falls back.
    pub device_location: Option<Coordinates>,
    /// Widest viewport still considered a phone
    pub mobile_breakpoint: u32,
    /// Viewport geometry at session start
    pub viewport: Viewport,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.openweathermap.org/data/2.5".into(),
            api_key: String::new(),
            device_location: None,
            mobile_breakpoint: 768,
            viewport: Viewport {
                width: 1280,
                height: 800,
            },
        }
    }
}

impl Config {
    const PATH: &'static str = "./config.json";

    /// Load the config file, or fall back to defaults when it's absent
    pub fn load() -> anyhow::Result<Self> {
        if !Path::new(Self::PATH).exists() {
            info!("No config file at `{}`, using defaults", Self::PATH);
            return Ok(Self::default());
        }
        info!("Loading config from `{}`", Self::PATH);
        let file = File::open(Self::PATH)?;
        serde_json::from_reader(file)
            .context(format!("Error parsing config file {}", Self::PATH))
    }
}
