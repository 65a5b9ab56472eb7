//! Structured vehicle catalog source
//!
//! Highest-trust source: matches the requested part against the catalog's
//! category list (fuzzy, the user writes "Ölfilter" and the catalog says
//! "Ölfilter / Filtereinsatz"), then lifts the OE numbers from the articles
//! listed in the best-matching category.

use crate::catalog::VehicleCatalog;
use crate::types::{OemCandidate, OemSource, ResolutionRequest, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use strsim::normalized_levenshtein;
use tracing::debug;

/// Minimum similarity for a category to count as a match.
const CATEGORY_MATCH_THRESHOLD: f64 = 0.55;

/// Confidence for catalog-listed OE numbers.
const CATALOG_CONFIDENCE: f32 = 0.9;

pub struct CatalogSource {
    catalog: Arc<dyn VehicleCatalog>,
}

impl CatalogSource {
    pub fn new(catalog: Arc<dyn VehicleCatalog>) -> Self {
        Self { catalog }
    }

    /// Best-matching category for the part query, if any clears the
    /// similarity threshold. Substring containment counts as a full match.
    fn best_category(query: &str, categories: &[String]) -> Option<String> {
        let query_lower = query.to_lowercase();
        categories
            .iter()
            .map(|cat| {
                let cat_lower = cat.to_lowercase();
                let score = if cat_lower.contains(&query_lower) || query_lower.contains(&cat_lower)
                {
                    1.0
                } else {
                    normalized_levenshtein(&query_lower, &cat_lower)
                };
                (cat, score)
            })
            .filter(|(_, score)| *score >= CATEGORY_MATCH_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(cat, _)| cat.clone())
    }
}

#[async_trait]
impl OemSource for CatalogSource {
    fn name(&self) -> &'static str {
        "vehicle_catalog"
    }

    fn priority(&self) -> u8 {
        9
    }

    async fn resolve_candidates(
        &self,
        req: &ResolutionRequest,
    ) -> Result<Vec<OemCandidate>, SourceError> {
        let categories = self
            .catalog
            .categories(&req.vehicle)
            .await
            .map_err(|e| SourceError::Api(e.to_string()))?;

        // Prefer the pre-normalized category when the order workflow set one
        let query = req
            .part
            .normalized_category
            .as_deref()
            .unwrap_or(&req.part.raw_text);

        let category = match Self::best_category(query, &categories) {
            Some(category) => category,
            None => {
                debug!("No catalog category matches '{}'", query);
                return Ok(Vec::new());
            }
        };
        debug!("Catalog category for '{}': {}", query, category);

        let articles = self
            .catalog
            .articles(&req.vehicle, &category)
            .await
            .map_err(|e| SourceError::Api(e.to_string()))?;

        let mut candidates = Vec::new();
        for article in articles {
            for oe in &article.oe_numbers {
                let mut cand = OemCandidate::new(oe, self.name(), CATALOG_CONFIDENCE);
                cand.meta.article_number = Some(article.article_number.clone());
                cand.meta.year_hint = article.year_hint;
                cand.meta.kw_hint = article.kw_hint;
                if let Some(supplier) = &article.supplier {
                    cand.meta.note =
                        Some(format!("listed for {} {}", supplier, article.article_number));
                }
                candidates.push(cand);
            }
        }
        Ok(candidates)
    }
}

// ============================================================================
// Tests
// ============================================================================
