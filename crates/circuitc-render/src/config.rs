//! Render configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! [`RenderConfig::from_env`] layers environment variables over the
//! defaults:
//! - `CIRCUITC_AUTOROUTER_URL`: default autorouter server
//! - `CIRCUITC_MAX_RENDER_CYCLES`: settle loop cycle limit (default: 64)
//! - `CIRCUITC_SETTLE_POLL_MS`: settle loop wait per poll (default: 50)

use serde::{Deserialize, Serialize};

/// Remote autorouter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutorouterConfig {
    pub server_url: String,
    #[serde(default = "default_autorouter_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

impl AutorouterConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        AutorouterConfig {
            server_url: server_url.into(),
            poll_interval_ms: default_autorouter_poll_ms(),
            max_polls: default_max_polls(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub settle_poll_interval_ms: u64,
    pub max_render_cycles: usize,
    /// Server used by subcircuits declaring `autorouter="auto"`.
    pub autorouter: Option<AutorouterConfig>,
    /// Clearance between packed pcb footprints, in mm.
    pub pack_gap: f64,
    pub schematic_pack_gap: f64,
    pub trace_width: f64,
    /// When false, cacheable groups render inline like any subcircuit.
    pub subcircuit_caching: bool,
    pub isolation_id_prefix: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            settle_poll_interval_ms: 50,
            max_render_cycles: 64,
            autorouter: None,
            pack_gap: 0.5,
            schematic_pack_gap: 1.0,
            trace_width: 0.15,
            subcircuit_caching: true,
            isolation_id_prefix: "isolated".to_string(),
        }
    }
}

impl RenderConfig {
    /// Defaults overridden by `CIRCUITC_*` environment variables.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = RenderConfig::default();
        if let Some(url) = lookup("CIRCUITC_AUTOROUTER_URL").filter(|u| !u.is_empty()) {
            config.autorouter = Some(AutorouterConfig::new(url));
        }
        if let Some(raw) = lookup("CIRCUITC_MAX_RENDER_CYCLES") {
            match raw.parse() {
                Ok(n) => config.max_render_cycles = n,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid CIRCUITC_MAX_RENDER_CYCLES"),
            }
        }
        if let Some(raw) = lookup("CIRCUITC_SETTLE_POLL_MS") {
            match raw.parse() {
                Ok(ms) => config.settle_poll_interval_ms = ms,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid CIRCUITC_SETTLE_POLL_MS"),
            }
        }
        config
    }

    pub fn with_autorouter_url(mut self, url: impl Into<String>) -> Self {
        self.autorouter = Some(AutorouterConfig::new(url));
        self
    }

    pub fn with_max_render_cycles(mut self, cycles: usize) -> Self {
        self.max_render_cycles = cycles;
        self
    }
}

fn default_autorouter_poll_ms() -> u64 {
    100
}

fn default_max_polls() -> u32 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_object_gives_defaults() {
        let config: RenderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RenderConfig::default());
        assert_eq!(config.max_render_cycles, 64);
        assert!(config.subcircuit_caching);
    }

    #[test]
    fn autorouter_fields_default() {
        let config: RenderConfig =
            serde_json::from_str(r#"{ "autorouter": { "server_url": "http://x" } }"#).unwrap();
        let auto = config.autorouter.unwrap();
        assert_eq!(auto.poll_interval_ms, 100);
        assert_eq!(auto.max_polls, 600);
    }

    #[test]
    fn environment_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("CIRCUITC_AUTOROUTER_URL", "http://127.0.0.1:9000"),
            ("CIRCUITC_MAX_RENDER_CYCLES", "8"),
            ("CIRCUITC_SETTLE_POLL_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = RenderConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(
            config.autorouter.map(|a| a.server_url),
            Some("http://127.0.0.1:9000".to_string())
        );
        assert_eq!(config.max_render_cycles, 8);
        assert_eq!(config.settle_poll_interval_ms, 50);
    }
}
