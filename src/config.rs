//! # Engine Configuration
//!
//! Tunables for the analysis engine. All fields have defaults so a config
//! file (or CLI flag set) only needs to name what it overrides.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::EngineError;

/// How flows that passed through a registered-but-ineffective sanitizer are
/// surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeakSanitizationPolicy {
    /// Report as a full finding (default). An ineffective sanitizer is not
    /// a mitigation.
    ReportAsFinding,
    /// Report, but downgrade the severity to Low.
    ReportAsWarning,
    /// Drop weakly sanitized flows entirely.
    Suppress,
}

impl FromStr for WeakSanitizationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").to_lowercase().as_str() {
            "report_as_finding" => Ok(WeakSanitizationPolicy::ReportAsFinding),
            "report_as_warning" => Ok(WeakSanitizationPolicy::ReportAsWarning),
            "suppress" => Ok(WeakSanitizationPolicy::Suppress),
            other => Err(format!("unknown weak sanitization policy '{}'", other)),
        }
    }
}

/// Engine configuration consumed by [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on interprocedural call-chain depth when linking a source to a
    /// sink through callee summaries.
    pub max_call_depth: usize,

    /// Bound on fixed-point iterations within one strongly connected
    /// component of the call graph. Hitting the bound freezes the component's
    /// summaries conservatively instead of looping.
    pub scc_iteration_bound: usize,

    /// Treatment of weakly sanitized flows.
    pub weak_sanitization_policy: WeakSanitizationPolicy,

    /// Optional wall-clock budget for a whole pass, in milliseconds. When
    /// exceeded the pass returns partial results with an incompleteness
    /// marker.
    pub time_budget_ms: Option<u64>,
}

impl EngineConfig {
    /// Loads a configuration file, applying defaults for missing keys.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| EngineError::ConfigLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 8,
            scc_iteration_bound: 16,
            weak_sanitization_policy: WeakSanitizationPolicy::ReportAsFinding,
            time_budget_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_call_depth, 8);
        assert_eq!(config.scc_iteration_bound, 16);
        assert_eq!(
            config.weak_sanitization_policy,
            WeakSanitizationPolicy::ReportAsFinding
        );
        assert!(config.time_budget_ms.is_none());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "report-as-warning".parse::<WeakSanitizationPolicy>().unwrap(),
            WeakSanitizationPolicy::ReportAsWarning
        );
        assert!("nonsense".parse::<WeakSanitizationPolicy>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "time_budget_ms": 250 }"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.time_budget_ms, Some(250));
        assert_eq!(config.max_call_depth, 8);
    }

    #[test]
    fn test_partial_override_from_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "max_call_depth": 3, "weak_sanitization_policy": "suppress" }"#)
                .unwrap();
        assert_eq!(config.max_call_depth, 3);
        assert_eq!(config.weak_sanitization_policy, WeakSanitizationPolicy::Suppress);
        assert_eq!(config.scc_iteration_bound, 16);
    }
}
