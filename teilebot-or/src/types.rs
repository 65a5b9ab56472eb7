//! Core types and trait definitions for OEM resolution
//!
//! Defines the data model flowing through the resolution pipeline and the
//! `OemSource` trait every candidate source implements for uniform parallel
//! execution.
//!
//! # Architecture
//! A resolution pass runs in stages:
//! - Fan-out: all registered sources propose candidates concurrently
//! - Filter/merge: relevance filter, canonical merge, brand plausibility gate
//! - Validation: per-candidate backsearch + layered confidence scoring

use crate::canon::canon_oem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distinguished source id for candidates produced by the reverse
/// aftermarket cross-reference lookup. Exempt from the brand hard filter.
pub const AFTERMARKET_XREF_SOURCE: &str = "aftermarket_xref";

/// Default source trust weight on the 1..=10 scale (mid-scale).
pub const DEFAULT_SOURCE_PRIORITY: u8 = 5;

// ============================================================================
// Request Types
// ============================================================================

/// Vehicle identification data as collected by the order workflow.
///
/// All fields are optional at the type level; the resolution entry point
/// rejects requests that identify no vehicle (neither make+model nor VIN).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleDescriptor {
    /// Vehicle identification number
    pub vin: Option<String>,
    /// German HSN manufacturer key
    pub hsn: Option<String>,
    /// German TSN type key
    pub tsn: Option<String>,
    /// Manufacturer name, e.g. "Volkswagen"
    pub make: Option<String>,
    /// Model description, e.g. "Golf 7 1.6 TDI"
    pub model: Option<String>,
    /// Engine power in kW
    pub kw: Option<u32>,
    /// First registration year
    pub year: Option<i32>,
}

/// Free-text part request from the end user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartQuery {
    /// Raw user text, e.g. "Ölfilter" or "Bremsscheiben vorne"
    pub raw_text: String,
    /// Normalized part category when available, e.g. "oil_filter"
    pub normalized_category: Option<String>,
    /// OE/article number the user may have quoted directly
    pub suspected_number: Option<String>,
}

/// Immutable input to a resolution pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// Order id from the order workflow (opaque)
    pub order_id: String,
    /// Vehicle identification
    pub vehicle: VehicleDescriptor,
    /// Requested part
    pub part: PartQuery,
}

// ============================================================================
// Candidate Types
// ============================================================================

/// Structured candidate metadata.
///
/// Explicit optional fields per concern instead of an open string map, so the
/// merge and scoring invariants stay checkable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateMeta {
    /// Source trust weight (1..=10); `None` means mid-scale default
    pub priority: Option<u8>,
    /// Free-form provenance note, e.g. "via MANN CUK 26 009"
    pub note: Option<String>,
    /// Model year the source associated with this number
    pub year_hint: Option<i32>,
    /// Engine power (kW) the source associated with this number
    pub kw_hint: Option<u32>,
    /// Aftermarket article number the candidate was derived from
    pub article_number: Option<String>,
}

impl CandidateMeta {
    /// Source trust weight, defaulting to mid-scale.
    pub fn priority_or_default(&self) -> u8 {
        self.priority.unwrap_or(DEFAULT_SOURCE_PRIORITY)
    }

    /// Merge another meta into this one, keeping the more specific value
    /// (existing `Some` fields win; `None` fields are filled in).
    pub fn absorb(&mut self, other: &CandidateMeta) {
        if self.priority.is_none() {
            self.priority = other.priority;
        }
        if self.note.is_none() {
            self.note = other.note.clone();
        }
        if self.year_hint.is_none() {
            self.year_hint = other.year_hint;
        }
        if self.kw_hint.is_none() {
            self.kw_hint = other.kw_hint;
        }
        if self.article_number.is_none() {
            self.article_number = other.article_number.clone();
        }
    }
}

/// One (OEM, confidence, source) proposal for a request.
///
/// Produced by sources with a single source id; after merging, `source`
/// carries the "+"-joined set of contributing source ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OemCandidate {
    /// Canonical OEM number (uppercased, separators stripped)
    pub oem: String,
    /// Manufacturer brand claim, when the source provides one
    pub brand: Option<String>,
    /// Source id, or "+"-joined set after merge
    pub source: String,
    /// Confidence in [0,1]
    pub confidence: f32,
    /// Structured metadata
    pub meta: CandidateMeta,
}

impl OemCandidate {
    /// Create a candidate with a canonicalized OEM and clamped confidence.
    pub fn new(oem: &str, source: impl Into<String>, confidence: f32) -> Self {
        Self {
            oem: canon_oem(oem),
            brand: None,
            source: source.into(),
            confidence: confidence.clamp(0.0, 1.0),
            meta: CandidateMeta::default(),
        }
    }

    /// Builder-style brand setter.
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Builder-style priority setter.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.meta.priority = Some(priority.clamp(1, 10));
        self
    }

    /// Distinct source ids backing this candidate.
    pub fn source_set(&self) -> Vec<&str> {
        self.source.split('+').filter(|s| !s.is_empty()).collect()
    }

    /// Whether this candidate came (at least partly) from the reverse
    /// aftermarket cross-reference lookup.
    pub fn is_aftermarket_xref(&self) -> bool {
        self.source_set().contains(&AFTERMARKET_XREF_SOURCE)
    }

    /// Set confidence with clamping.
    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = confidence.clamp(0.0, 1.0);
    }
}

// ============================================================================
// Validation Types
// ============================================================================

/// Outcome of one backsearch panel member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelHit {
    /// Panel source name
    pub source: String,
    /// Whether the OEM + vehicle context was confirmed
    pub hit: bool,
}

/// Result of re-confirming a candidate against the independent panel.
///
/// Computed fresh per candidate per call, never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacksearchResult {
    /// Per-source outcomes, one per panel member
    pub hits: Vec<PanelHit>,
    /// Number of confirming panel members
    pub total_hits: usize,
}

/// One scoring layer applied to a candidate, kept for audit/explainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationLayer {
    /// Layer name, e.g. "source_consensus"
    pub name: String,
    /// Whether the layer's check passed
    pub passed: bool,
    /// Confidence delta this layer contributed (may be negative)
    pub confidence_delta: f32,
    /// Human-readable detail
    pub details: String,
}

/// Resolution outcome band for the order workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStatus {
    /// Final confidence cleared the vetted threshold; eligible for fully
    /// automatic downstream use
    Vetted,
    /// Confidence in the reliable band; primary returned but flagged for
    /// manual review
    NeedsReview,
    /// No candidate cleared the reliable threshold
    Unresolved,
}

/// The externally visible artifact of a resolution pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Resolved OEM number; unset below the reliable threshold
    pub primary_oem: Option<String>,
    /// Outcome band
    pub status: ResolutionStatus,
    /// Merged candidate list (post-filter), best first
    pub candidates: Vec<OemCandidate>,
    /// Best final confidence seen across validated candidates
    pub overall_confidence: f32,
    /// Explanatory notes (best candidate reasoning, or why nothing cleared)
    pub notes: String,
    /// Audit trail of the best candidate's scoring layers
    pub layers: Vec<ValidationLayer>,
    /// When this resolution completed
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionResult {
    /// Empty result for a request where fan-out yielded nothing.
    pub fn empty(notes: impl Into<String>) -> Self {
        Self {
            primary_oem: None,
            status: ResolutionStatus::Unresolved,
            candidates: Vec::new(),
            overall_confidence: 0.0,
            notes: notes.into(),
            layers: Vec::new(),
            resolved_at: Utc::now(),
        }
    }
}

// ============================================================================
// Source Trait
// ============================================================================

/// Source error
///
/// A failing source contributes nothing to the batch; the orchestrator logs
/// the error and moves on. Nothing here aborts a resolution pass.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// External API error
    #[error("API error: {0}")]
    Api(String),

    /// Failed to parse a response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Required capability not configured for this source
    #[error("Source not available: {0}")]
    NotAvailable(String),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Candidate source trait
///
/// Each source independently proposes OEM candidates for a request. Sources
/// run concurrently under the orchestrator; an error or timeout from one
/// source yields an empty contribution from it only.
#[async_trait::async_trait]
pub trait OemSource: Send + Sync {
    /// Source id for provenance tracking (used as candidate `source`)
    fn name(&self) -> &'static str;

    /// Source trust weight (1..=10), used by the consensus engine
    fn priority(&self) -> u8 {
        DEFAULT_SOURCE_PRIORITY
    }

    /// Propose candidates for a request
    ///
    /// # Errors
    /// Returns `SourceError` on failure; the orchestrator isolates it.
    async fn resolve_candidates(
        &self,
        req: &ResolutionRequest,
    ) -> Result<Vec<OemCandidate>, SourceError>;
}

// ============================================================================
// Resolution Errors
// ============================================================================

/// Errors the public entry point can return.
///
/// "Not found" and "found but low confidence" are regular results, not
/// errors; the only fatal cases are a malformed request and broken wiring.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Malformed request (missing vehicle identity or part text)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Resolver wiring/configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

// ============================================================================
// Tests
// ============================================================================
