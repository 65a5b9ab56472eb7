//! Candidate merging
//!
//! Collapses per-source candidate lists into one entry per canonical OEM.
//! Confidences combine with the probabilistic union `1 - (1-a)(1-b)`: each
//! source is treated as independent evidence, so agreement raises confidence
//! above either input while staying below 1.

use crate::types::OemCandidate;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Merge candidates by canonical OEM.
///
/// For duplicates:
/// - confidence: probabilistic union across all contributions
/// - source: "+"-joined sorted set of distinct source ids
/// - brand: first `Some` wins
/// - meta: first-seen fields win, gaps filled from later contributions
///
/// Output is sorted by confidence, best first.
pub fn merge_candidates(candidates: Vec<OemCandidate>) -> Vec<OemCandidate> {
    let mut by_oem: HashMap<String, (OemCandidate, BTreeSet<String>)> = HashMap::new();
    let input_count = candidates.len();

    for cand in candidates {
        // Inputs may already carry "+"-joined sets (e.g. re-merged batches)
        let sources: Vec<String> = cand.source_set().iter().map(|s| s.to_string()).collect();

        match by_oem.get_mut(&cand.oem) {
            Some((merged, source_set)) => {
                let combined = 1.0 - (1.0 - merged.confidence) * (1.0 - cand.confidence);
                merged.set_confidence(combined);
                if merged.brand.is_none() {
                    merged.brand = cand.brand.clone();
                }
                merged.meta.absorb(&cand.meta);
                source_set.extend(sources);
            }
            None => {
                let mut source_set = BTreeSet::new();
                source_set.extend(sources);
                by_oem.insert(cand.oem.clone(), (cand, source_set));
            }
        }
    }

    let mut merged: Vec<OemCandidate> = by_oem
        .into_values()
        .map(|(mut cand, source_set)| {
            cand.source = source_set.into_iter().collect::<Vec<_>>().join("+");
            cand
        })
        .collect();

    merged.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!("Merged {} raw candidates into {}", input_count, merged.len());
    merged
}

// ============================================================================
// Tests
// ============================================================================
