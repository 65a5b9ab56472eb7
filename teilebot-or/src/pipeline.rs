//! Resolution pipeline
//!
//! Orchestrates a full resolution pass:
//!
//! 1. Fan-out: all sources plus the reverse aftermarket lookup, concurrent
//! 2. Relevance filter, canonical merge, vehicle hint boosts, brand firewall
//! 3. Deep validation of the top candidates, best-shaped first: consensus
//!    base score, then layered adjustments (brand structure, backsearch,
//!    article provenance, AI re-verification)
//!
//! Validation walks candidates sequentially and stops at the first one that
//! clears the vetted threshold. "Nothing found" and "found but weak" are
//! regular results; the only errors are a malformed request and bad wiring.

use crate::backsearch::{default_panel, BacksearchValidator, PanelMember};
use crate::brand::{
    apply_vehicle_hint_boosts, hard_filter, sort_for_validation, BrandSchema, SHAPE_MISMATCH,
    SHAPE_STRONG,
};
use crate::config::ResolverConfig;
use crate::consensus::{profile_groups, score_candidate, GroupProfile};
use crate::fetch::WebFetcher;
use crate::llm::LlmClient;
use crate::merge::merge_candidates;
use crate::relevance::PartRelevanceFilter;
use crate::sources::SourceOrchestrator;
use crate::types::{
    OemCandidate, OemSource, ResolutionRequest, ResolutionResult, ResolutionStatus, ResolveError,
    ValidationLayer,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// Builder
// ============================================================================

/// Builds a [`Resolver`].
///
/// At least one source and a fetcher are required; the LLM client and the
/// backsearch panel are optional (no LLM disables the LLM-assisted stages,
/// the panel defaults to the built-in one).
pub struct ResolverBuilder {
    config: ResolverConfig,
    sources: Vec<Arc<dyn OemSource>>,
    fetcher: Option<Arc<dyn WebFetcher>>,
    panel: Option<Vec<PanelMember>>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
            sources: Vec::new(),
            fetcher: None,
            panel: None,
            llm: None,
        }
    }

    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(mut self, source: Arc<dyn OemSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn WebFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn panel(mut self, panel: Vec<PanelMember>) -> Self {
        self.panel = Some(panel);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// # Errors
    /// Returns `ResolveError::Config` when no source or fetcher is
    /// registered, or a brand rule pattern fails to compile.
    pub fn build(self) -> Result<Resolver, ResolveError> {
        if self.sources.is_empty() {
            return Err(ResolveError::Config("no sources registered".to_string()));
        }
        let fetcher = self
            .fetcher
            .ok_or_else(|| ResolveError::Config("no fetcher configured".to_string()))?;
        let schema = BrandSchema::new(&self.config.brand_rules)
            .map_err(|e| ResolveError::Config(e.to_string()))?;

        let orchestrator =
            SourceOrchestrator::new(self.sources, self.config.timeouts.source());
        let backsearch = BacksearchValidator::new(
            Arc::clone(&fetcher),
            self.panel.unwrap_or_else(default_panel),
            self.config.timeouts.panel(),
        );
        let relevance = PartRelevanceFilter::new(
            self.llm.clone(),
            self.config.relevance_top_n,
            self.config.timeouts.llm(),
        );

        Ok(Resolver {
            config: self.config,
            orchestrator,
            backsearch,
            relevance,
            llm: self.llm,
            schema,
        })
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct Resolver {
    config: ResolverConfig,
    orchestrator: SourceOrchestrator,
    backsearch: BacksearchValidator,
    relevance: PartRelevanceFilter,
    llm: Option<Arc<dyn LlmClient>>,
    schema: BrandSchema,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Resolve a part request to an OEM number.
    ///
    /// Uses the configured overall budget for the fan-out stage, if any.
    ///
    /// # Errors
    /// Returns `ResolveError::InvalidRequest` for a malformed request. Empty
    /// or low-confidence outcomes are regular results.
    pub async fn resolve_oem(
        &self,
        req: &ResolutionRequest,
    ) -> Result<ResolutionResult, ResolveError> {
        self.resolve_inner(req, self.config.timeouts.overall()).await
    }

    /// Resolve with an explicit fan-out budget, overriding the configured
    /// one. Sources still pending at the deadline are abandoned and the
    /// pass continues with whatever arrived.
    pub async fn resolve_oem_with_deadline(
        &self,
        req: &ResolutionRequest,
        budget: Duration,
    ) -> Result<ResolutionResult, ResolveError> {
        self.resolve_inner(req, Some(budget)).await
    }

    async fn resolve_inner(
        &self,
        req: &ResolutionRequest,
        budget: Option<Duration>,
    ) -> Result<ResolutionResult, ResolveError> {
        validate_request(req)?;
        info!(
            order_id = %req.order_id,
            part = %req.part.raw_text,
            "starting OEM resolution"
        );

        // Stage 1: concurrent fan-out plus the reverse aftermarket lookup
        let (mut raw, xref) = tokio::join!(
            self.orchestrator.resolve_all(req, budget),
            self.relevance.reverse_aftermarket(req),
        );
        raw.extend(xref);
        // Diversity denominator counts everything that was asked, including
        // the reverse lookup when an LLM is wired in; the agreement
        // denominator only counts sources that produced candidates
        let total_queried = self.orchestrator.count() + usize::from(self.llm.is_some());
        let responding = raw
            .iter()
            .flat_map(|c| c.source_set())
            .collect::<std::collections::HashSet<_>>()
            .len();

        if raw.is_empty() {
            info!(order_id = %req.order_id, "no source proposed any candidate");
            return Ok(ResolutionResult::empty("no source proposed any candidate"));
        }
        debug!("{} raw candidate(s) from fan-out", raw.len());

        // Stage 2: filter, boost, merge, firewall. Hint boosts land on the
        // raw contributions so they flow into the per-group averages the
        // consensus layer scores from.
        let make = req.vehicle.make.as_deref();
        let mut filtered = self.relevance.filter(raw, req).await;
        apply_vehicle_hint_boosts(&mut filtered, &req.vehicle, self.config.hint_boost);
        let profiles = profile_groups(&filtered);
        let merged = merge_candidates(filtered);
        let mut merged = hard_filter(merged, &self.schema, make);
        sort_for_validation(&mut merged, &self.schema, make);

        if merged.is_empty() {
            info!(order_id = %req.order_id, "all candidates rejected by filtering");
            return Ok(ResolutionResult::empty(
                "all candidates rejected by relevance or brand filtering",
            ));
        }

        // Stage 3: deep validation, best-shaped candidates first
        let mut best: Option<(f32, usize, Vec<ValidationLayer>)> = None;
        for (idx, cand) in merged.iter().take(self.config.top_k).enumerate() {
            let (score, layers) = self
                .validate_candidate(cand, req, &profiles, total_queried, responding)
                .await;
            debug!(oem = %cand.oem, score, "candidate validated");

            let better = match &best {
                Some((best_score, _, _)) => score > *best_score,
                None => true,
            };
            if better {
                best = Some((score, idx, layers));
            }
            if score >= self.config.thresholds.vetted {
                break;
            }
        }

        let Some((score, best_idx, layers)) = best else {
            return Ok(ResolutionResult::empty("no candidate survived validation"));
        };
        let best_oem = merged[best_idx].oem.clone();

        let (status, primary_oem, notes) = if score >= self.config.thresholds.vetted {
            (
                ResolutionStatus::Vetted,
                Some(best_oem.clone()),
                format!("{} vetted at confidence {:.2}", best_oem, score),
            )
        } else if score >= self.config.thresholds.reliable {
            (
                ResolutionStatus::NeedsReview,
                Some(best_oem.clone()),
                format!(
                    "{} at confidence {:.2}, below the vetted threshold; manual review advised",
                    best_oem, score
                ),
            )
        } else {
            (
                ResolutionStatus::Unresolved,
                None,
                format!(
                    "best candidate {} only reached confidence {:.2}",
                    best_oem, score
                ),
            )
        };

        info!(
            order_id = %req.order_id,
            status = ?status,
            confidence = score,
            "resolution complete"
        );
        Ok(ResolutionResult {
            primary_oem,
            status,
            candidates: merged,
            overall_confidence: score,
            notes,
            layers,
            resolved_at: chrono::Utc::now(),
        })
    }

    /// Run the layered validation for one candidate. Returns the final
    /// confidence and the per-layer audit trail.
    async fn validate_candidate(
        &self,
        cand: &OemCandidate,
        req: &ResolutionRequest,
        profiles: &HashMap<String, GroupProfile>,
        total_queried: usize,
        responding: usize,
    ) -> (f32, Vec<ValidationLayer>) {
        let deltas = &self.config.deltas;
        let make = req.vehicle.make.as_deref();
        let mut layers = Vec::with_capacity(5);

        // Layer 1: multi-source consensus base score over the group's raw
        // contribution averages
        let fallback;
        let profile = match profiles.get(&cand.oem) {
            Some(profile) => profile,
            None => {
                fallback = GroupProfile::from_candidate(cand);
                &fallback
            }
        };
        let consensus =
            score_candidate(cand, profile, total_queried, responding, &self.config);
        let mut score = consensus.score;
        layers.push(ValidationLayer {
            name: "source_consensus".to_string(),
            passed: consensus.source_count >= 2,
            confidence_delta: consensus.score,
            details: consensus.details.clone(),
        });

        // Layer 2: brand structure
        let shape = self.schema.shape_score(&cand.oem, make);
        let brand_delta = match shape {
            SHAPE_STRONG => deltas.brand_match,
            SHAPE_MISMATCH => deltas.brand_mismatch,
            _ => 0.0,
        };
        score = (score + brand_delta).clamp(0.0, 1.0);
        layers.push(ValidationLayer {
            name: "brand_structure".to_string(),
            passed: shape != SHAPE_MISMATCH,
            confidence_delta: brand_delta,
            details: format!("shape score {} ({})", shape, self.schema.describe(make)),
        });

        // Layer 3: backsearch re-confirmation, computed fresh per candidate
        let backsearch = self.backsearch.validate(&cand.oem, &req.vehicle).await;
        let backsearch_delta = match backsearch.total_hits {
            0 => deltas.backsearch_none,
            1 => deltas.backsearch_single,
            _ => deltas.backsearch_multi,
        };
        score = (score + backsearch_delta).clamp(0.0, 1.0);
        layers.push(ValidationLayer {
            name: "backsearch".to_string(),
            passed: backsearch.total_hits >= 1,
            confidence_delta: backsearch_delta,
            details: format!(
                "{}/{} panel members confirmed",
                backsearch.total_hits,
                backsearch.hits.len()
            ),
        });

        // Layer 4: part provenance (article cross-reference or the user's
        // own quoted number)
        let matches_suspected = req
            .part
            .suspected_number
            .as_deref()
            .map(|n| crate::canon::canon_oem(n) == cand.oem)
            .unwrap_or(false);
        let (xref_delta, xref_passed, xref_details) = match &cand.meta.article_number {
            Some(article) => (
                deltas.part_xref,
                true,
                format!("cross-referenced from {}", article),
            ),
            None if matches_suspected => (
                deltas.part_xref,
                true,
                "matches the number quoted in the request".to_string(),
            ),
            None => (0.0, false, "no article cross-reference".to_string()),
        };
        score = (score + xref_delta).clamp(0.0, 1.0);
        layers.push(ValidationLayer {
            name: "part_provenance".to_string(),
            passed: xref_passed,
            confidence_delta: xref_delta,
            details: xref_details,
        });

        // Layer 5: AI re-verification (skipped without an LLM)
        let (ai_delta, ai_passed, ai_details) = match self.ai_reverify(cand, req).await {
            Some(true) => (deltas.ai_confirm, true, "model confirmed fitment".to_string()),
            Some(false) => (deltas.ai_reject, false, "model rejected fitment".to_string()),
            None => (0.0, true, "skipped".to_string()),
        };
        score = (score + ai_delta).clamp(0.0, 1.0);
        layers.push(ValidationLayer {
            name: "ai_reverification".to_string(),
            passed: ai_passed,
            confidence_delta: ai_delta,
            details: ai_details,
        });

        // A single source never vets, no matter how the layers stacked up
        if consensus.source_count <= 1 {
            score = score.min(self.config.thresholds.single_source_cap);
        }

        (score, layers)
    }

    /// Ask the model for a final fitment verdict. `None` means the stage
    /// was skipped (no LLM, call failed, or the model was unsure).
    async fn ai_reverify(&self, cand: &OemCandidate, req: &ResolutionRequest) -> Option<bool> {
        let llm = self.llm.as_ref()?;
        let vehicle = &req.vehicle;
        let prompt = format!(
            "OEM number: {oem}\nPart: {part}\nVehicle: {make} {model}\n\n\
             Does this OEM number plausibly belong to this part on this \
             vehicle? Answer with JSON: {{\"verdict\": \"confirm\"}} or \
             {{\"verdict\": \"reject\"}} or {{\"verdict\": \"unsure\"}}.",
            oem = cand.oem,
            part = req.part.raw_text,
            make = vehicle.make.as_deref().unwrap_or("unknown make"),
            model = vehicle.model.as_deref().unwrap_or("unknown model"),
        );

        let call = llm.complete_json(
            "You verify automotive OEM part number fitment. Answer reject \
             only when you are confident the number does not fit.",
            &prompt,
        );
        let value = match tokio::time::timeout(self.config.timeouts.llm(), call).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("AI re-verification failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!("AI re-verification timed out");
                return None;
            }
        };

        match value.get("verdict").and_then(|v| v.as_str()) {
            Some("confirm") => Some(true),
            Some("reject") => Some(false),
            _ => None,
        }
    }
}

/// A request must name a part and identify a vehicle, either by VIN or by
/// make and model.
fn validate_request(req: &ResolutionRequest) -> Result<(), ResolveError> {
    if req.part.raw_text.trim().is_empty() {
        return Err(ResolveError::InvalidRequest(
            "part text is empty".to_string(),
        ));
    }
    let has_vin = req
        .vehicle
        .vin
        .as_deref()
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    let has_make_model = req.vehicle.make.is_some() && req.vehicle.model.is_some();
    if !has_vin && !has_make_model {
        return Err(ResolveError::InvalidRequest(
            "vehicle not identified (need VIN or make and model)".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
