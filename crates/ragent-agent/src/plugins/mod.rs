//! Tool plugins that run before retrieval and feed the prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragent_core::config::PluginSettings;

pub mod math;
pub mod weather;

pub use math::MathPlugin;
pub use weather::WeatherPlugin;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn can_handle(&self, query: &str) -> bool;
    /// Always yields user-facing text; failures are reported in the text.
    async fn handle(&self, query: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    pub plugin: String,
    pub output: String,
}

#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Math first, then weather.
    pub fn with_defaults(settings: &PluginSettings) -> anyhow::Result<Self> {
        let mut manager = Self::new();
        manager.register(Box::new(MathPlugin));
        manager.register(Box::new(WeatherPlugin::from_settings(settings)?));
        Ok(manager)
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run the first registered plugin that accepts `query`.
    pub async fn detect_and_run(&self, query: &str) -> Option<PluginResult> {
        let plugin = self.plugins.iter().find(|p| p.can_handle(query))?;
        debug!(plugin = plugin.name(), "plugin matched");
        let output = plugin.handle(query).await;
        Some(PluginResult { plugin: plugin.name().to_string(), output })
    }
}
