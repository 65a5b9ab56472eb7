//! Resolver configuration
//!
//! All calibration knobs (thresholds, consensus weights, layer deltas,
//! timeouts, brand rules) live here. Configuration resolves in priority
//! order: `TEILEBOT_OR_CONFIG` env var, then the platform config directory,
//! then built-in defaults. Every field has a default so a partial TOML file
//! overrides only what it names.

use crate::brand::{default_rules, BrandRule};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use teilebot_common::config::{load_toml, resolve_config_file};
use tracing::{info, warn};

/// Env var pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TEILEBOT_OR_CONFIG";
/// Config file name searched in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "teilebot-or.toml";

// ============================================================================
// Sections
// ============================================================================

/// Confidence thresholds separating the outcome bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// At or above: eligible for fully automatic downstream use
    pub vetted: f32,
    /// At or above (below vetted): returned but flagged for review
    pub reliable: f32,
    /// Ceiling for any candidate backed by a single source
    pub single_source_cap: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            vetted: 0.97,
            reliable: 0.85,
            single_source_cap: 0.85,
        }
    }
}

/// Consensus composite weights. Diversity dominates: independent agreement
/// is worth more than any one source's self-reported confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusWeights {
    /// Weight of source diversity (distinct agreeing sources / sources queried)
    pub diversity: f32,
    /// Weight of the merged candidate confidence
    pub confidence: f32,
    /// Weight of normalized source priority
    pub priority: f32,
}

impl Default for ConsensusWeights {
    fn default() -> Self {
        Self {
            diversity: 0.7,
            confidence: 0.15,
            priority: 0.15,
        }
    }
}

/// Per-layer confidence deltas applied during candidate validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerDeltas {
    /// Strong brand pattern match
    pub brand_match: f32,
    /// Outside the brand envelope (xref-exempt candidates only reach here)
    pub brand_mismatch: f32,
    /// Backsearch: two or more panel members confirmed
    pub backsearch_multi: f32,
    /// Backsearch: exactly one panel member confirmed
    pub backsearch_single: f32,
    /// Backsearch: no panel member confirmed
    pub backsearch_none: f32,
    /// Candidate carries an aftermarket article cross-reference
    pub part_xref: f32,
    /// AI re-verification confirmed the candidate
    pub ai_confirm: f32,
    /// AI re-verification rejected the candidate
    pub ai_reject: f32,
}

impl Default for LayerDeltas {
    fn default() -> Self {
        Self {
            brand_match: 0.05,
            brand_mismatch: -0.10,
            backsearch_multi: 0.15,
            backsearch_single: 0.08,
            backsearch_none: -0.45,
            part_xref: 0.05,
            ai_confirm: 0.10,
            ai_reject: -0.60,
        }
    }
}

/// Timeout budget per pipeline stage (milliseconds in TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Per-source fan-out timeout
    pub source_ms: u64,
    /// Per-panel-member backsearch timeout
    pub panel_ms: u64,
    /// Per-LLM-call timeout
    pub llm_ms: u64,
    /// Optional overall resolution budget; `None` means unbounded
    pub overall_ms: Option<u64>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            source_ms: 8_000,
            panel_ms: 5_000,
            llm_ms: 10_000,
            overall_ms: None,
        }
    }
}

impl Timeouts {
    pub fn source(&self) -> Duration {
        Duration::from_millis(self.source_ms)
    }

    pub fn panel(&self) -> Duration {
        Duration::from_millis(self.panel_ms)
    }

    pub fn llm(&self) -> Duration {
        Duration::from_millis(self.llm_ms)
    }

    pub fn overall(&self) -> Option<Duration> {
        self.overall_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Root Config
// ============================================================================

/// Complete resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub thresholds: Thresholds,
    pub consensus: ConsensusWeights,
    pub deltas: LayerDeltas,
    pub timeouts: Timeouts,
    /// How many merged candidates enter deep validation
    pub top_k: usize,
    /// How many candidates the relevance filter shows the LLM
    pub relevance_top_n: usize,
    /// Boost when a candidate's year/kW hint matches the vehicle
    pub hint_boost: f32,
    /// Brand structural rule table
    pub brand_rules: Vec<BrandRule>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            consensus: ConsensusWeights::default(),
            deltas: LayerDeltas::default(),
            timeouts: Timeouts::default(),
            top_k: 10,
            relevance_top_n: 12,
            hint_boost: 0.05,
            brand_rules: default_rules(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from the standard locations, falling back to
    /// defaults when no file is found or the file fails to parse.
    pub fn load() -> Self {
        match resolve_config_file(CONFIG_ENV_VAR, CONFIG_FILE_NAME) {
            Some(path) => match load_toml::<ResolverConfig>(&path) {
                Ok(config) => {
                    info!("Loaded resolver config from {}", path.display());
                    config.validated()
                }
                Err(e) => {
                    warn!(
                        "Failed to load resolver config from {}: {}; using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            None => {
                info!("No resolver config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Clamp out-of-range knobs back into their valid domains, warning on
    /// each adjustment.
    fn validated(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.thresholds.vetted) {
            warn!(
                "thresholds.vetted {} out of [0,1], resetting to default",
                self.thresholds.vetted
            );
            self.thresholds.vetted = Thresholds::default().vetted;
        }
        if !(0.0..=1.0).contains(&self.thresholds.reliable) {
            warn!(
                "thresholds.reliable {} out of [0,1], resetting to default",
                self.thresholds.reliable
            );
            self.thresholds.reliable = Thresholds::default().reliable;
        }
        if self.thresholds.reliable > self.thresholds.vetted {
            warn!(
                "thresholds.reliable {} above vetted {}, resetting both to defaults",
                self.thresholds.reliable, self.thresholds.vetted
            );
            self.thresholds = Thresholds::default();
        }
        if self.top_k == 0 {
            warn!("top_k must be at least 1, resetting to default");
            self.top_k = ResolverConfig::default().top_k;
        }
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_calibrated() {
        let config = ResolverConfig::default();
        assert!((config.thresholds.vetted - 0.97).abs() < 1e-6);
        assert!((config.thresholds.reliable - 0.85).abs() < 1e-6);
        assert!((config.thresholds.single_source_cap - 0.85).abs() < 1e-6);
        assert_eq!(config.top_k, 10);
        assert!(!config.brand_rules.is_empty());
    }

    #[test]
    fn test_consensus_weights_sum_to_one() {
        let w = ConsensusWeights::default();
        assert!((w.diversity + w.confidence + w.priority - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let config: ResolverConfig = toml::from_str(
            r#"
            top_k = 5

            [thresholds]
            vetted = 0.95
            "#,
        )
        .unwrap();
        assert_eq!(config.top_k, 5);
        assert!((config.thresholds.vetted - 0.95).abs() < 1e-6);
        // Untouched fields keep their defaults
        assert!((config.thresholds.reliable - 0.85).abs() < 1e-6);
        assert!((config.deltas.backsearch_none + 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_validated_resets_inverted_thresholds() {
        let mut config = ResolverConfig::default();
        config.thresholds.reliable = 0.99;
        let config = config.validated();
        assert!(config.thresholds.reliable <= config.thresholds.vetted);
    }
}
