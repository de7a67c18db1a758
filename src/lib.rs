//! Presentation shell for a location-based weather viewer. The shell
//! resolves a geographic focus point (device location, typed postal code,
//! or a point picked on the map), fetches weather data for it, and decides
//! which screen the interface is showing. Rendering itself lives outside
//! this crate; consumers watch the published view state and call the
//! mutators on [app::App].

pub mod app;
pub mod config;
pub mod fetch;
pub mod provider;
pub mod signal;
pub mod state;
