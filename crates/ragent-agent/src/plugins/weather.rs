//! Current conditions from WeatherAPI.com for `weather in <city>` queries.

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use tracing::warn;

use ragent_core::config::PluginSettings;

use super::Plugin;

pub const NO_KEY: &str = "Weather API key not set.";
pub const FETCH_FAILED: &str = "Failed to fetch weather data.";
pub const NOT_FOUND: &str = "Weather data not found.";

pub struct WeatherPlugin {
    client: reqwest::Client,
    api_key: Option<Secret<String>>,
    api_base: String,
    city: Regex,
}

#[derive(Deserialize)]
struct WeatherResponse {
    location: Option<Location>,
    current: Option<Current>,
}

#[derive(Deserialize)]
struct Location {
    name: String,
    country: String,
}

#[derive(Deserialize)]
struct Current {
    temp_c: f64,
    humidity: f64,
    wind_kph: f64,
    condition: Condition,
}

#[derive(Deserialize)]
struct Condition {
    text: String,
}

impl WeatherPlugin {
    pub fn from_settings(settings: &PluginSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(settings.weather_timeout()).build()?;
        Ok(Self {
            client,
            api_key: settings
                .weather_api_key
                .clone()
                .filter(|k| !k.is_empty())
                .map(Secret::new),
            api_base: settings.weather_api_base.clone(),
            city: Regex::new(r"(?i)weather in ([a-z\s]+)")?,
        })
    }

    fn city_of<'q>(&self, query: &'q str) -> Option<&'q str> {
        self.city.captures(query).and_then(|c| c.get(1)).map(|m| m.as_str().trim())
    }

    async fn fetch(&self, key: &str, city: &str) -> Result<WeatherResponse, reqwest::Error> {
        self.client
            .get(&self.api_base)
            .query(&[("key", key), ("q", city)])
            .send()
            .await?
            .error_for_status()?
            .json::<WeatherResponse>()
            .await
    }
}

#[async_trait]
impl Plugin for WeatherPlugin {
    fn name(&self) -> &str {
        "WeatherPlugin"
    }

    fn description(&self) -> &str {
        "Returns real weather info using WeatherAPI.com if query contains \"weather in <city>\""
    }

    fn can_handle(&self, query: &str) -> bool {
        self.city.is_match(query)
    }

    async fn handle(&self, query: &str) -> String {
        let Some(city) = self.city_of(query).filter(|c| !c.is_empty()) else {
            return "Could not find city.".to_string();
        };
        let Some(key) = &self.api_key else {
            return NO_KEY.to_string();
        };
        match self.fetch(key.expose_secret(), city).await {
            Ok(WeatherResponse { location: Some(loc), current: Some(cur) }) => format!(
                "Weather in {}, {}: {}, {}°C, Humidity: {}%, Wind: {} kph.",
                loc.name, loc.country, cur.condition.text, cur.temp_c, cur.humidity, cur.wind_kph
            ),
            Ok(_) => NOT_FOUND.to_string(),
            Err(e) => {
                warn!(city, error = %e, "weather lookup failed");
                FETCH_FAILED.to_string()
            }
        }
    }
}
