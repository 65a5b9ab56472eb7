//! Brand schema validation
//!
//! Structural plausibility scoring for OEM numbers, keyed by the vehicle
//! manufacturer. Every manufacturer uses a recognizable number shape (VAG:
//! leading digit + 8-11 alphanumerics, BMW: 7 or 11 digits, ...); a candidate
//! far outside that shape is junk no matter how confident its source was.
//!
//! Rules are a configurable table, not hard-coded branching: real-world
//! schemas overlap and the acceptable false-positive rate differs per brand.
//! All patterns operate on the canonical form (separators stripped).

use crate::canon::canon_oem;
use crate::types::{OemCandidate, VehicleDescriptor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use teilebot_common::Error;
use tracing::debug;

/// Shape score: strong structural match.
pub const SHAPE_STRONG: u8 = 2;
/// Shape score: length envelope only.
pub const SHAPE_ENVELOPE: u8 = 1;
/// Shape score: outside the brand's envelope.
pub const SHAPE_MISMATCH: u8 = 0;

/// One brand's structural rule, as carried in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRule {
    /// Brand names this rule covers (first entry is the display name)
    pub brands: Vec<String>,
    /// Loose envelope: minimum canonical length
    pub min_len: usize,
    /// Loose envelope: maximum canonical length
    pub max_len: usize,
    /// Tight patterns (anchored regexes over the canonical form)
    pub tight_patterns: Vec<String>,
    /// Human-readable shape description
    pub description: String,
}

/// Generic fallback envelope for unknown brands: almost any 5-14 character
/// alphanumeric string passes, and nothing scores as a strong match.
const FALLBACK_MIN_LEN: usize = 5;
const FALLBACK_MAX_LEN: usize = 14;

struct CompiledRule {
    brand_keys: Vec<String>,
    min_len: usize,
    max_len: usize,
    tight: Vec<Regex>,
    description: String,
}

/// Compiled brand schema table.
pub struct BrandSchema {
    rules: Vec<CompiledRule>,
}

fn brand_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl BrandSchema {
    /// Compile a rule table. Fails on an invalid tight pattern.
    pub fn new(rules: &[BrandRule]) -> Result<Self, Error> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let mut tight = Vec::with_capacity(rule.tight_patterns.len());
            for pattern in &rule.tight_patterns {
                let re = Regex::new(pattern).map_err(|e| {
                    Error::Config(format!("Invalid brand pattern '{}': {}", pattern, e))
                })?;
                tight.push(re);
            }
            compiled.push(CompiledRule {
                brand_keys: rule.brands.iter().map(|b| brand_key(b)).collect(),
                min_len: rule.min_len,
                max_len: rule.max_len,
                tight,
                description: rule.description.clone(),
            });
        }
        Ok(Self { rules: compiled })
    }

    fn rule_for(&self, make: &str) -> Option<&CompiledRule> {
        let key = brand_key(make);
        if key.is_empty() {
            return None;
        }
        self.rules.iter().find(|rule| {
            rule.brand_keys
                .iter()
                .any(|b| *b == key || key.contains(b.as_str()) || b.contains(key.as_str()))
        })
    }

    /// Structural shape score for an OEM against a vehicle manufacturer.
    ///
    /// - `SHAPE_STRONG` (2): matches a tight brand pattern
    /// - `SHAPE_ENVELOPE` (1): within the brand's length envelope only, or
    ///   the brand is unknown and the generic fallback envelope fits
    /// - `SHAPE_MISMATCH` (0): outside even the loose envelope
    pub fn shape_score(&self, oem: &str, make: Option<&str>) -> u8 {
        let canonical = canon_oem(oem);
        let len = canonical.len();

        let rule = make.and_then(|m| self.rule_for(m));
        match rule {
            Some(rule) => {
                if rule.tight.iter().any(|re| re.is_match(&canonical)) {
                    SHAPE_STRONG
                } else if (rule.min_len..=rule.max_len).contains(&len) {
                    SHAPE_ENVELOPE
                } else {
                    SHAPE_MISMATCH
                }
            }
            // Unknown brand: neutral within the fallback envelope, never strong
            None => {
                if (FALLBACK_MIN_LEN..=FALLBACK_MAX_LEN).contains(&len) {
                    SHAPE_ENVELOPE
                } else {
                    SHAPE_MISMATCH
                }
            }
        }
    }

    /// Loose envelope check, used by the hard filter.
    pub fn passes_envelope(&self, oem: &str, make: Option<&str>) -> bool {
        self.shape_score(oem, make) != SHAPE_MISMATCH
    }

    /// Shape description for a brand, for reasoning strings.
    pub fn describe(&self, make: Option<&str>) -> &str {
        make.and_then(|m| self.rule_for(m))
            .map(|r| r.description.as_str())
            .unwrap_or("generic 5-14 alphanumeric envelope")
    }
}

/// Hard filter ("firewall"): drop candidates outside the brand envelope.
///
/// Reverse-aftermarket candidates bypass the filter; their numbers were
/// cross-referenced from a known article, not scraped from arbitrary text.
pub fn hard_filter(
    candidates: Vec<OemCandidate>,
    schema: &BrandSchema,
    make: Option<&str>,
) -> Vec<OemCandidate> {
    candidates
        .into_iter()
        .filter(|cand| {
            if cand.is_aftermarket_xref() {
                return true;
            }
            let keep = schema.passes_envelope(&cand.oem, make);
            if !keep {
                debug!(
                    oem = %cand.oem,
                    source = %cand.source,
                    make = make.unwrap_or("?"),
                    "candidate rejected by brand envelope"
                );
            }
            keep
        })
        .collect()
}

/// Boost candidates whose metadata hints match the requested vehicle.
///
/// Year and engine-power matches each add `boost`, independently.
pub fn apply_vehicle_hint_boosts(
    candidates: &mut [OemCandidate],
    vehicle: &VehicleDescriptor,
    boost: f32,
) {
    for cand in candidates.iter_mut() {
        let year_match = matches!((cand.meta.year_hint, vehicle.year), (Some(a), Some(b)) if a == b);
        let kw_match = matches!((cand.meta.kw_hint, vehicle.kw), (Some(a), Some(b)) if a == b);
        if year_match {
            cand.set_confidence(cand.confidence + boost);
        }
        if kw_match {
            cand.set_confidence(cand.confidence + boost);
        }
    }
}

/// Sort candidates into validation order: `(shape_score desc, confidence desc)`.
pub fn sort_for_validation(
    candidates: &mut [OemCandidate],
    schema: &BrandSchema,
    make: Option<&str>,
) {
    candidates.sort_by(|a, b| {
        let shape_a = schema.shape_score(&a.oem, make);
        let shape_b = schema.shape_score(&b.oem, make);
        shape_b.cmp(&shape_a).then(
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
}

/// Built-in brand rule table.
///
/// Patterns are heuristic and occasionally overlap; per-brand tolerance is a
/// calibration decision carried in config, so deployments can tighten or
/// loosen individual brands without code changes.
pub fn default_rules() -> Vec<BrandRule> {
    vec![
        BrandRule {
            brands: ["Volkswagen", "VW", "Audi", "Skoda", "Seat", "Cupra"]
                .map(String::from)
                .to_vec(),
            min_len: 9,
            max_len: 12,
            tight_patterns: vec!["^[0-9][A-Z0-9]{8,11}$".to_string()],
            description: "VAG: leading digit + 8-11 alphanumeric".to_string(),
        },
        BrandRule {
            brands: ["BMW", "Mini"].map(String::from).to_vec(),
            min_len: 7,
            max_len: 11,
            tight_patterns: vec!["^[0-9]{11}$".to_string(), "^[0-9]{7}$".to_string()],
            description: "BMW: 7 or 11 digits".to_string(),
        },
        BrandRule {
            brands: ["Mercedes-Benz", "Mercedes", "Daimler", "Smart"]
                .map(String::from)
                .to_vec(),
            min_len: 10,
            max_len: 13,
            tight_patterns: vec![
                "^[A-Z][0-9]{9,12}$".to_string(),
                "^[0-9]{10,13}$".to_string(),
            ],
            description: "Mercedes: letter prefix + 9-12 digits, or 10-13 digits".to_string(),
        },
        BrandRule {
            brands: vec!["Porsche".to_string()],
            min_len: 9,
            max_len: 12,
            tight_patterns: vec!["^[0-9]{3}[A-Z0-9]{6,9}$".to_string()],
            description: "Porsche: 3 digits + 6-9 alphanumeric".to_string(),
        },
        BrandRule {
            brands: ["Opel", "Vauxhall"].map(String::from).to_vec(),
            min_len: 8,
            max_len: 10,
            tight_patterns: vec!["^[0-9]{8,10}$".to_string()],
            description: "Opel: 8-10 digits".to_string(),
        },
        BrandRule {
            brands: vec!["Ford".to_string()],
            min_len: 7,
            max_len: 15,
            tight_patterns: vec!["^[0-9A-Z]{7,15}$".to_string()],
            description: "Ford: 7-15 alphanumeric".to_string(),
        },
        BrandRule {
            brands: ["Renault", "Dacia"].map(String::from).to_vec(),
            min_len: 10,
            max_len: 12,
            tight_patterns: vec!["^[0-9]{10,12}$".to_string()],
            description: "Renault: 10-12 digits".to_string(),
        },
        BrandRule {
            brands: ["Peugeot", "Citroen", "Citroën", "DS"].map(String::from).to_vec(),
            min_len: 8,
            max_len: 12,
            tight_patterns: vec!["^[0-9]{10}$".to_string()],
            description: "PSA: 10 digits".to_string(),
        },
        BrandRule {
            brands: ["Toyota", "Lexus"].map(String::from).to_vec(),
            min_len: 10,
            max_len: 12,
            tight_patterns: vec!["^[0-9]{10}$".to_string()],
            description: "Toyota: 10 digits (XXXXX-XXXXX written forms)".to_string(),
        },
        BrandRule {
            brands: ["Honda", "Acura"].map(String::from).to_vec(),
            min_len: 10,
            max_len: 13,
            tight_patterns: vec!["^[0-9]{5}[A-Z0-9]{3}[0-9]{3}$".to_string()],
            description: "Honda: 5 digits + 3 alphanumeric + 3 digits".to_string(),
        },
        BrandRule {
            brands: ["Nissan", "Infiniti"].map(String::from).to_vec(),
            min_len: 10,
            max_len: 12,
            tight_patterns: vec!["^[0-9]{5}[0-9A-Z]{5}$".to_string()],
            description: "Nissan: 5 digits + 5 alphanumeric".to_string(),
        },
    ]
}

// ============================================================================
// Tests
// ============================================================================
