//! OEM part number resolution
//!
//! Resolves a free-text part request for a specific vehicle to a vetted OEM
//! part number. Multiple independent sources propose candidates
//! concurrently; candidates are merged by canonical number, gated by brand
//! structure rules, and the best ones are re-confirmed against an
//! independent search panel before layered confidence scoring decides
//! whether the result is vetted, needs review, or stays unresolved.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use teilebot_or::{
//!     PartQuery, ReqwestFetcher, ResolutionRequest, Resolver, VehicleDescriptor,
//! };
//! # async fn run(source: Arc<dyn teilebot_or::OemSource>) -> anyhow::Result<()> {
//! let resolver = Resolver::builder()
//!     .source(source)
//!     .fetcher(Arc::new(ReqwestFetcher::new()))
//!     .build()?;
//!
//! let request = ResolutionRequest {
//!     order_id: "order-42".to_string(),
//!     vehicle: VehicleDescriptor {
//!         make: Some("Volkswagen".to_string()),
//!         model: Some("Golf 7 1.6 TDI".to_string()),
//!         ..Default::default()
//!     },
//!     part: PartQuery {
//!         raw_text: "Ölfilter".to_string(),
//!         ..Default::default()
//!     },
//! };
//! let result = resolver.resolve_oem(&request).await?;
//! println!("{:?}: {:?}", result.status, result.primary_oem);
//! # Ok(())
//! # }
//! ```

pub mod backsearch;
pub mod brand;
pub mod canon;
pub mod catalog;
pub mod config;
pub mod consensus;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod merge;
pub mod pipeline;
pub mod relevance;
pub mod sources;
pub mod types;

pub use backsearch::{default_panel, BacksearchValidator, PanelMember};
pub use canon::canon_oem;
pub use config::ResolverConfig;
pub use fetch::{FetchError, FetchResponse, ReqwestFetcher, WebFetcher};
pub use llm::{ChatCompletionClient, LlmClient, LlmError};
pub use pipeline::{Resolver, ResolverBuilder};
pub use types::{
    BacksearchResult, CandidateMeta, OemCandidate, OemSource, PartQuery, ResolutionRequest,
    ResolutionResult, ResolutionStatus, ResolveError, SourceError, ValidationLayer,
    VehicleDescriptor,
};
