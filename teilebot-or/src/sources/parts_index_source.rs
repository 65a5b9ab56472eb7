//! OEM parts index source
//!
//! Queries an OEM parts index (dealer-catalog style site). Indexed by VIN
//! when the request carries one, which scopes results to the exact build;
//! otherwise falls back to a make/model keyword search.

use crate::extract::extract_oem_tokens;
use crate::fetch::WebFetcher;
use crate::types::{OemCandidate, OemSource, ResolutionRequest, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Confidence for VIN-scoped results.
const VIN_CONFIDENCE: f32 = 0.7;
/// Confidence for keyword-search results.
const KEYWORD_CONFIDENCE: f32 = 0.55;
const MAX_CANDIDATES: usize = 15;

pub struct PartsIndexSource {
    fetcher: Arc<dyn WebFetcher>,
    /// Search URL with a `{query}` placeholder
    search_url_template: String,
}

impl PartsIndexSource {
    pub fn new(fetcher: Arc<dyn WebFetcher>, search_url_template: impl Into<String>) -> Self {
        Self {
            fetcher,
            search_url_template: search_url_template.into(),
        }
    }
}

#[async_trait]
impl OemSource for PartsIndexSource {
    fn name(&self) -> &'static str {
        "parts_index"
    }

    fn priority(&self) -> u8 {
        5
    }

    async fn resolve_candidates(
        &self,
        req: &ResolutionRequest,
    ) -> Result<Vec<OemCandidate>, SourceError> {
        let (query, confidence) = match &req.vehicle.vin {
            Some(vin) if !vin.is_empty() => {
                (format!("{} {}", vin, req.part.raw_text), VIN_CONFIDENCE)
            }
            _ => {
                let make = req.vehicle.make.as_deref().unwrap_or("");
                let model = req.vehicle.model.as_deref().unwrap_or("");
                (
                    format!("{} {} {}", make, model, req.part.raw_text),
                    KEYWORD_CONFIDENCE,
                )
            }
        };
        let query = query.split_whitespace().collect::<Vec<_>>().join("+");
        let url = self.search_url_template.replace("{query}", &query);

        let response = self
            .fetcher
            .get(&url)
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        if response.status >= 400 {
            return Err(SourceError::Api(format!(
                "index returned {}",
                response.status
            )));
        }

        let candidates: Vec<OemCandidate> = extract_oem_tokens(&response.body)
            .into_iter()
            .take(MAX_CANDIDATES)
            .map(|oem| OemCandidate::new(&oem, self.name(), confidence))
            .collect();
        debug!("Parts index yielded {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}

// ============================================================================
// Tests
// ============================================================================
