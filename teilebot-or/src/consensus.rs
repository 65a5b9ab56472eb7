//! Multi-source consensus scoring
//!
//! Computes the base confidence for a merged candidate from three signals,
//! weighted so independent agreement dominates:
//! - diversity: fraction of queried sources that proposed this OEM
//! - confidence: the group's average raw contribution confidence
//! - priority: the group's average source trust weight
//!
//! The confidence and priority terms deliberately average over the raw
//! per-source contributions, not the union-combined merge value: the union
//! formula already rewards agreement, and folding it in here would count the
//! same agreement twice. Agreement boosts stack on top, and a candidate
//! backed by a single source is capped so it can never auto-vet on its own
//! say-so.

use crate::config::ResolverConfig;
use crate::types::OemCandidate;
use std::collections::HashMap;
use tracing::debug;

/// Per-group averages over the raw (pre-merge) contributions.
#[derive(Debug, Clone)]
pub struct GroupProfile {
    /// Mean raw contribution confidence
    pub avg_confidence: f32,
    /// Mean source trust weight on the 1..=10 scale
    pub avg_priority: f32,
    /// Number of raw contributions (not distinct sources)
    pub contributions: usize,
}

impl GroupProfile {
    /// Degenerate profile from a merged candidate alone, for callers that
    /// no longer have the raw contribution list.
    pub fn from_candidate(candidate: &OemCandidate) -> Self {
        Self {
            avg_confidence: candidate.confidence,
            avg_priority: candidate.meta.priority_or_default() as f32,
            contributions: 1,
        }
    }
}

/// Build per-OEM group profiles from the raw candidate list, before merging
/// collapses the individual contributions.
pub fn profile_groups(raw: &[OemCandidate]) -> HashMap<String, GroupProfile> {
    let mut acc: HashMap<String, (f32, f32, usize)> = HashMap::new();
    for cand in raw {
        let entry = acc.entry(cand.oem.clone()).or_insert((0.0, 0.0, 0));
        entry.0 += cand.confidence;
        entry.1 += cand.meta.priority_or_default() as f32;
        entry.2 += 1;
    }
    acc.into_iter()
        .map(|(oem, (conf_sum, prio_sum, n))| {
            (
                oem,
                GroupProfile {
                    avg_confidence: conf_sum / n as f32,
                    avg_priority: prio_sum / n as f32,
                    contributions: n,
                },
            )
        })
        .collect()
}

/// Consensus base score for one merged candidate.
#[derive(Debug, Clone)]
pub struct ConsensusScore {
    /// Canonical OEM
    pub oem: String,
    /// Composite score after boosts and the single-source cap, in [0,1]
    pub score: f32,
    /// Fraction of responding sources agreeing on this OEM, in [0,1]
    pub agreement: f32,
    /// Number of distinct sources backing this candidate
    pub source_count: usize,
    /// Backing source ids
    pub sources: Vec<String>,
    /// Scoring explanation
    pub details: String,
}

/// Score one merged candidate against the full fan-out context.
///
/// The two denominators differ on purpose: diversity is measured against
/// `total_sources_queried` (a source that was asked and returned nothing
/// still dilutes the composite), while the agreement score only counts the
/// `responding_sources` that produced any candidate at all.
pub fn score_candidate(
    candidate: &OemCandidate,
    profile: &GroupProfile,
    total_sources_queried: usize,
    responding_sources: usize,
    config: &ResolverConfig,
) -> ConsensusScore {
    let sources: Vec<String> = candidate
        .source_set()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let source_count = sources.len();

    let diversity = if total_sources_queried == 0 {
        0.0
    } else {
        (source_count as f32 / total_sources_queried as f32).min(1.0)
    };
    let agreement = if responding_sources == 0 {
        0.0
    } else {
        (source_count as f32 / responding_sources as f32).min(1.0)
    };
    let priority_norm = (profile.avg_priority / 10.0).clamp(0.0, 1.0);

    let weights = &config.consensus;
    let mut score = weights.diversity * diversity
        + weights.confidence * profile.avg_confidence.clamp(0.0, 1.0)
        + weights.priority * priority_norm;
    score = score.clamp(0.0, 1.0);

    // Agreement boosts, each clamped as applied
    if source_count >= 3 {
        score = (score + 0.08).min(1.0);
    } else if source_count >= 2 {
        score = (score + 0.05).min(1.0);
    }
    if agreement >= 0.7 {
        score = (score + 0.05).min(1.0);
    }

    // A single source never clears vetted on consensus alone
    if source_count <= 1 {
        score = score.min(config.thresholds.single_source_cap);
    }

    let details = format!(
        "{}/{} queried sources agree (agreement {:.2} over {} responding), \
         avg contribution confidence {:.2}, avg priority {:.1}",
        source_count,
        total_sources_queried,
        agreement,
        responding_sources,
        profile.avg_confidence,
        profile.avg_priority
    );
    debug!(oem = %candidate.oem, score, %details, "consensus scored");

    ConsensusScore {
        oem: candidate.oem.clone(),
        score,
        agreement,
        source_count,
        sources,
        details,
    }
}

/// Score a full merged candidate list and return scores in candidate order.
///
/// Candidates missing from `profiles` fall back to a degenerate profile
/// derived from the merged value.
pub fn score_groups(
    candidates: &[OemCandidate],
    profiles: &HashMap<String, GroupProfile>,
    total_sources_queried: usize,
    responding_sources: usize,
    config: &ResolverConfig,
) -> Vec<ConsensusScore> {
    candidates
        .iter()
        .map(|c| {
            let fallback;
            let profile = match profiles.get(&c.oem) {
                Some(profile) => profile,
                None => {
                    fallback = GroupProfile::from_candidate(c);
                    &fallback
                }
            };
            score_candidate(c, profile, total_sources_queried, responding_sources, config)
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
