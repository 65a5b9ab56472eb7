//! Web shop search source
//!
//! Queries a parts shop's search page with the part text plus vehicle words
//! and mines OEM numbers out of the result HTML. Noisy by nature (result
//! pages list related parts too), so contributions carry moderate confidence
//! and rely on downstream filtering.

use crate::extract::{extract_oe_number_blocks, extract_oem_tokens};
use crate::fetch::WebFetcher;
use crate::types::{OemCandidate, OemSource, ResolutionRequest, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Confidence for numbers found in embedded JSON blocks.
const BLOCK_CONFIDENCE: f32 = 0.6;
/// Confidence for numbers mined from free page text.
const TOKEN_CONFIDENCE: f32 = 0.45;
/// Cap on candidates per page, best sections first.
const MAX_CANDIDATES: usize = 15;

/// Markers of bot-protection interstitials. A blocked page is an empty
/// contribution, not an error.
const BOT_WALL_MARKERS: &[&str] = &[
    "Just a moment",
    "challenge-platform",
    "cf-mitigated",
    "Access Denied",
];

pub struct ShopSearchSource {
    fetcher: Arc<dyn WebFetcher>,
    /// Search URL with a `{query}` placeholder
    search_url_template: String,
}

impl ShopSearchSource {
    pub fn new(fetcher: Arc<dyn WebFetcher>, search_url_template: impl Into<String>) -> Self {
        Self {
            fetcher,
            search_url_template: search_url_template.into(),
        }
    }

    fn build_query(req: &ResolutionRequest) -> String {
        let mut parts = vec![req.part.raw_text.as_str()];
        if let Some(make) = &req.vehicle.make {
            parts.push(make);
        }
        if let Some(model) = &req.vehicle.model {
            parts.push(model);
        }
        let joined = parts.join(" ");
        joined
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("+")
    }
}

#[async_trait]
impl OemSource for ShopSearchSource {
    fn name(&self) -> &'static str {
        "shop_search"
    }

    fn priority(&self) -> u8 {
        6
    }

    async fn resolve_candidates(
        &self,
        req: &ResolutionRequest,
    ) -> Result<Vec<OemCandidate>, SourceError> {
        let query = Self::build_query(req);
        let url = self.search_url_template.replace("{query}", &query);

        let response = self
            .fetcher
            .get(&url)
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        if response.status >= 400 {
            return Err(SourceError::Api(format!("search returned {}", response.status)));
        }
        if BOT_WALL_MARKERS.iter().any(|m| response.body.contains(m)) {
            warn!("Shop search hit a bot wall, skipping");
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        let mut seen = std::collections::HashSet::new();

        // Embedded JSON blocks are the cleanest signal
        for oem in extract_oe_number_blocks(&response.body) {
            if seen.insert(oem.clone()) {
                candidates.push(OemCandidate::new(&oem, self.name(), BLOCK_CONFIDENCE));
            }
        }
        // Free-text mining fills the rest
        for oem in extract_oem_tokens(&response.body) {
            if candidates.len() >= MAX_CANDIDATES {
                break;
            }
            if seen.insert(oem.clone()) {
                candidates.push(OemCandidate::new(&oem, self.name(), TOKEN_CONFIDENCE));
            }
        }
        candidates.truncate(MAX_CANDIDATES);

        debug!("Shop search mined {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}

// ============================================================================
// Tests
// ============================================================================
