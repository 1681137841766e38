//! Tracing initialisation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `log:` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Per-crate overrides, e.g. `paindex-evm: debug`.
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    /// JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directives, e.g. `info,paindex_evm=debug`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (component, level) in &self.components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the config file.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialised: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_component_overrides() {
        let mut config = LogConfig::default();
        config.components.insert("paindex-evm".into(), "debug".into());
        config.components.insert("paindex-rpc".into(), "warn".into());
        assert_eq!(config.directives(), "info,paindex_evm=debug,paindex_rpc=warn");
    }
}
