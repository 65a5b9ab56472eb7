//! End-to-end resolution pipeline tests with deterministic stand-ins for
//! sources, the web fetcher, and the LLM client.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use teilebot_or::{
    FetchError, FetchResponse, LlmClient, LlmError, OemCandidate, OemSource, PanelMember,
    PartQuery, ResolutionRequest, ResolutionStatus, Resolver, ResolverConfig, ResolveError,
    SourceError, VehicleDescriptor, WebFetcher,
};

// ============================================================================
// Stand-ins
// ============================================================================

struct StaticSource {
    name: &'static str,
    candidates: Vec<OemCandidate>,
}

#[async_trait]
impl OemSource for StaticSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn resolve_candidates(
        &self,
        _req: &ResolutionRequest,
    ) -> Result<Vec<OemCandidate>, SourceError> {
        Ok(self.candidates.clone())
    }
}

struct HangingSource;

#[async_trait]
impl OemSource for HangingSource {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn resolve_candidates(
        &self,
        _req: &ResolutionRequest,
    ) -> Result<Vec<OemCandidate>, SourceError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Serves the same body for every URL, so the whole backsearch panel either
/// confirms or denies a candidate.
struct StubFetcher {
    body: String,
}

impl StubFetcher {
    /// Panel pages that confirm the given OEM for a VW Golf.
    fn confirming(oem: &str) -> Arc<Self> {
        Arc::new(Self {
            body: format!("Ersatzteil {} passend für VW Golf", oem),
        })
    }

    /// Panel pages that mention neither the number nor the vehicle.
    fn denying() -> Arc<Self> {
        Arc::new(Self {
            body: "Keine Treffer gefunden".to_string(),
        })
    }
}

#[async_trait]
impl WebFetcher for StubFetcher {
    async fn get(&self, _url: &str) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse {
            status: 200,
            body: self.body.clone(),
        })
    }
}

/// Confirms the OEM only on the named hosts; every other panel page is a
/// miss.
struct SplitFetcher {
    confirming_hosts: Vec<&'static str>,
    oem: &'static str,
}

#[async_trait]
impl WebFetcher for SplitFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let body = if self.confirming_hosts.iter().any(|h| url.contains(h)) {
            format!("Ersatzteil {} passend für VW Golf", self.oem)
        } else {
            "Keine Treffer gefunden".to_string()
        };
        Ok(FetchResponse { status: 200, body })
    }
}

struct FailingLlm;

#[async_trait]
impl LlmClient for FailingLlm {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Api("unavailable".to_string()))
    }
}

fn source(name: &'static str, oem: &str, confidence: f32) -> Arc<StaticSource> {
    Arc::new(StaticSource {
        name,
        candidates: vec![OemCandidate::new(oem, name, confidence)],
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn golf_request() -> ResolutionRequest {
    ResolutionRequest {
        order_id: "order-42".to_string(),
        vehicle: VehicleDescriptor {
            make: Some("Volkswagen".to_string()),
            model: Some("Golf 7 1.6 TDI".to_string()),
            kw: Some(81),
            year: Some(2015),
            ..Default::default()
        },
        part: PartQuery {
            raw_text: "Ölfilter".to_string(),
            ..Default::default()
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn two_agreeing_sources_with_backsearch_vet() {
    init_tracing();
    let resolver = Resolver::builder()
        .source(source("vehicle_catalog", "03L 115 562", 0.8))
        .source(source("shop_search", "03L115562", 0.8))
        .fetcher(StubFetcher::confirming("03L115562"))
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    assert_eq!(result.status, ResolutionStatus::Vetted);
    assert_eq!(result.primary_oem.as_deref(), Some("03L115562"));
    assert!(result.overall_confidence >= 0.97);
    // Both sources show up in the merged candidate
    assert_eq!(result.candidates[0].source, "shop_search+vehicle_catalog");
    // Audit trail covers every layer
    let names: Vec<&str> = result.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "source_consensus",
            "brand_structure",
            "backsearch",
            "part_provenance",
            "ai_reverification"
        ]
    );
}

#[tokio::test]
async fn partial_panel_confirmation_still_vets() {
    init_tracing();
    let panel = vec![
        PanelMember {
            name: "alpha",
            url_template: "https://a.example/search?q={oem}",
        },
        PanelMember {
            name: "beta",
            url_template: "https://b.example/search?q={oem}",
        },
        PanelMember {
            name: "gamma",
            url_template: "https://c.example/search?q={oem}",
        },
        PanelMember {
            name: "delta",
            url_template: "https://d.example/search?q={oem}",
        },
    ];
    let resolver = Resolver::builder()
        .source(source("vehicle_catalog", "03L115562", 0.8))
        .source(source("shop_search", "03L115562", 0.8))
        .fetcher(Arc::new(SplitFetcher {
            confirming_hosts: vec!["a.example", "b.example"],
            oem: "03L115562",
        }))
        .panel(panel)
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    // Two of four panel members is enough independent re-confirmation
    assert_eq!(result.status, ResolutionStatus::Vetted);
    assert!(result.overall_confidence >= 0.9);
    let backsearch = result
        .layers
        .iter()
        .find(|l| l.name == "backsearch")
        .unwrap();
    assert!(backsearch.passed);
    assert!(backsearch.confidence_delta > 0.1, "multi-hit boost applies");
    assert!(backsearch.details.contains("2/4"));
}

#[tokio::test]
async fn weak_single_source_without_backsearch_stays_unresolved() {
    init_tracing();
    let resolver = Resolver::builder()
        .source(source("shop_search", "03L115562", 0.5))
        .fetcher(StubFetcher::denying())
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    assert_eq!(result.status, ResolutionStatus::Unresolved);
    assert!(result.primary_oem.is_none());
    assert!(result.overall_confidence < 0.5);
    // The failed backsearch is visible in the audit trail
    let backsearch = result
        .layers
        .iter()
        .find(|l| l.name == "backsearch")
        .unwrap();
    assert!(!backsearch.passed);
    assert!(backsearch.confidence_delta < 0.0);
}

#[tokio::test]
async fn single_source_never_vets_even_at_full_confidence() {
    let resolver = Resolver::builder()
        .source(source("vehicle_catalog", "03L115562", 1.0))
        .fetcher(StubFetcher::confirming("03L115562"))
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    assert_ne!(result.status, ResolutionStatus::Vetted);
    assert_eq!(result.status, ResolutionStatus::NeedsReview);
    assert!(result.overall_confidence <= 0.85 + 1e-6);
    assert_eq!(result.primary_oem.as_deref(), Some("03L115562"));
}

#[tokio::test]
async fn failed_backsearch_blocks_vetting_despite_full_agreement() {
    let resolver = Resolver::builder()
        .source(source("vehicle_catalog", "03L115562", 0.9))
        .source(source("shop_search", "03L115562", 0.9))
        .fetcher(StubFetcher::denying())
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    assert_ne!(result.status, ResolutionStatus::Vetted);
    assert!(result.overall_confidence < 0.85);
}

#[tokio::test]
async fn llm_failure_degrades_gracefully() {
    let resolver = Resolver::builder()
        .source(source("vehicle_catalog", "03L115562", 0.8))
        .source(source("shop_search", "03L115562", 0.8))
        .fetcher(StubFetcher::confirming("03L115562"))
        .llm(Arc::new(FailingLlm))
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    // A broken LLM must not block resolution, only the boosts it would add
    assert_eq!(result.primary_oem.as_deref(), Some("03L115562"));
    assert_ne!(result.status, ResolutionStatus::Unresolved);
    let ai = result
        .layers
        .iter()
        .find(|l| l.name == "ai_reverification")
        .unwrap();
    assert_eq!(ai.confidence_delta, 0.0);
    assert_eq!(ai.details, "skipped");
}

#[tokio::test]
async fn hung_source_is_abandoned() {
    let mut config = ResolverConfig::default();
    config.timeouts.source_ms = 100;

    let resolver = Resolver::builder()
        .config(config)
        .source(Arc::new(HangingSource))
        .source(source("vehicle_catalog", "03L115562", 0.9))
        .fetcher(StubFetcher::confirming("03L115562"))
        .build()
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        resolver.resolve_oem(&golf_request()),
    )
    .await
    .expect("resolution must not hang on a stuck source")
    .unwrap();
    assert_eq!(result.candidates[0].oem, "03L115562");
}

#[tokio::test]
async fn fan_out_deadline_returns_partial_results() {
    let resolver = Resolver::builder()
        .source(Arc::new(HangingSource))
        .source(source("vehicle_catalog", "03L115562", 0.9))
        .fetcher(StubFetcher::confirming("03L115562"))
        .build()
        .unwrap();

    let result = resolver
        .resolve_oem_with_deadline(&golf_request(), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].oem, "03L115562");
}

#[tokio::test]
async fn off_brand_candidates_are_filtered_out() {
    let resolver = Resolver::builder()
        .source(Arc::new(StaticSource {
            name: "shop_search",
            candidates: vec![
                OemCandidate::new("03L115562", "shop_search", 0.6),
                // Far outside any VAG shape
                OemCandidate::new("AB1", "shop_search", 0.9),
            ],
        }))
        .fetcher(StubFetcher::confirming("03L115562"))
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    assert!(result.candidates.iter().all(|c| c.oem != "AB1"));
}

#[tokio::test]
async fn empty_fan_out_is_a_regular_result() {
    let resolver = Resolver::builder()
        .source(Arc::new(StaticSource {
            name: "shop_search",
            candidates: Vec::new(),
        }))
        .fetcher(StubFetcher::denying())
        .build()
        .unwrap();

    let result = resolver.resolve_oem(&golf_request()).await.unwrap();
    assert_eq!(result.status, ResolutionStatus::Unresolved);
    assert!(result.candidates.is_empty());
    assert!(result.primary_oem.is_none());
}

#[tokio::test]
async fn malformed_request_is_the_only_error() {
    let resolver = Resolver::builder()
        .source(source("shop_search", "03L115562", 0.8))
        .fetcher(StubFetcher::denying())
        .build()
        .unwrap();

    let mut req = golf_request();
    req.vehicle = VehicleDescriptor::default();
    assert!(matches!(
        resolver.resolve_oem(&req).await,
        Err(ResolveError::InvalidRequest(_))
    ));

    let mut req = golf_request();
    req.part.raw_text = String::new();
    assert!(matches!(
        resolver.resolve_oem(&req).await,
        Err(ResolveError::InvalidRequest(_))
    ));
}
