//! Taint configuration loading (C10): source/sink/transfer declarations,
//! deserialized with `serde` from JSON or TOML, matching the declarative
//! config idiom used elsewhere for analysis configuration.

use crate::error::ConfigError;
use crate::ir::{MethodRef, Type};

use super::Slot;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Source {
    pub method: MethodRef,
    pub result_type: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sink {
    pub method: MethodRef,
    pub arg_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transfer {
    pub method: MethodRef,
    pub from: Slot,
    pub to: Slot,
    #[serde(rename = "type")]
    pub ty: Type,
}

/// Immutable taint source/sink/transfer declarations (§3).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaintConfig {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub sinks: Vec<Sink>,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

impl TaintConfig {
    /// Builds a config directly from in-memory records, without going
    /// through `serde` (useful for tests and programmatic callers).
    #[must_use]
    pub fn from_records(sources: Vec<Source>, sinks: Vec<Sink>, transfers: Vec<Transfer>) -> Self {
        Self {
            sources,
            sinks,
            transfers,
        }
    }

    /// Parses a JSON taint configuration. A malformed document is a
    /// `ConfigError`, surfaced at initialization (§7) — never recovered
    /// mid-run.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::MalformedConfig(e.to_string()))
    }

    /// Parses a TOML taint configuration.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::MalformedConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ClassRef;

    #[test]
    fn parses_json_config() {
        let json = r#"{
            "sources": [{"method": {"class": "Lib", "subsignature": "source()"}, "result_type": "Boolean"}],
            "sinks": [{"method": {"class": "Lib", "subsignature": "sink(Object)"}, "arg_index": 0}],
            "transfers": [{"method": {"class": "Lib", "subsignature": "concat(Object,Object)"}, "from": {"Arg": 0}, "to": "Result", "type": "Boolean"}]
        }"#;
        let config = TaintConfig::from_json(json).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].method.class, ClassRef::new("Lib"));
        assert_eq!(config.sinks[0].arg_index, 0);
        assert_eq!(config.transfers[0].from, Slot::Arg(0));
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(TaintConfig::from_json("{ not json").is_err());
    }
}
