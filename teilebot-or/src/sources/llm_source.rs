//! LLM heuristic source
//!
//! Asks a language model for OEM numbers directly. Weakest source by
//! design: models remember common numbers well but confabulate rare ones,
//! so this source carries low trust and exists mainly to seed candidates
//! for the stronger validation stages.

use crate::canon::{canon_oem, looks_like_oem};
use crate::llm::LlmClient;
use crate::types::{OemCandidate, OemSource, ResolutionRequest, SourceError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const HEURISTIC_CONFIDENCE: f32 = 0.4;
const MAX_CANDIDATES: usize = 5;

pub struct LlmHeuristicSource {
    llm: Arc<dyn LlmClient>,
}

impl LlmHeuristicSource {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl OemSource for LlmHeuristicSource {
    fn name(&self) -> &'static str {
        "llm_heuristic"
    }

    fn priority(&self) -> u8 {
        3
    }

    async fn resolve_candidates(
        &self,
        req: &ResolutionRequest,
    ) -> Result<Vec<OemCandidate>, SourceError> {
        let vehicle = &req.vehicle;
        let prompt = format!(
            "Part: {part}\nVehicle: {make} {model}{year}\n\n\
             Which OEM part numbers fit? Answer with a JSON array of up to \
             {max} OEM number strings, most likely first, nothing else. \
             Answer [] if you are not sure.",
            part = req.part.raw_text,
            make = vehicle.make.as_deref().unwrap_or("unknown make"),
            model = vehicle.model.as_deref().unwrap_or("unknown model"),
            year = vehicle
                .year
                .map(|y| format!(", year {}", y))
                .unwrap_or_default(),
            max = MAX_CANDIDATES,
        );

        let value = self
            .llm
            .complete_json(
                "You are an automotive parts specialist. Only list OEM numbers \
                 you are confident about.",
                &prompt,
            )
            .await
            .map_err(|e| SourceError::Api(e.to_string()))?;

        let array = value
            .as_array()
            .ok_or_else(|| SourceError::Parse("expected a JSON array".to_string()))?;

        let mut candidates = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for oem in array.iter().filter_map(|v| v.as_str()) {
            let canonical = canon_oem(oem);
            if looks_like_oem(&canonical) && seen.insert(canonical.clone()) {
                candidates.push(OemCandidate::new(
                    &canonical,
                    self.name(),
                    HEURISTIC_CONFIDENCE,
                ));
            }
            if candidates.len() >= MAX_CANDIDATES {
                break;
            }
        }
        debug!("LLM heuristic proposed {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}

// ============================================================================
// Tests
// ============================================================================
