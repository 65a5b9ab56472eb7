//! Candidate sources and the fan-out orchestrator
//!
//! Each source implements [`OemSource`] and proposes candidates
//! independently; the orchestrator runs them concurrently, isolating
//! failures and timeouts so one broken source never empties the batch.

pub mod catalog_source;
pub mod llm_source;
pub mod parts_index_source;
pub mod shop_source;

use crate::types::{OemCandidate, OemSource, ResolutionRequest};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs all registered sources concurrently.
pub struct SourceOrchestrator {
    sources: Vec<Arc<dyn OemSource>>,
    source_timeout: Duration,
}

impl SourceOrchestrator {
    pub fn new(sources: Vec<Arc<dyn OemSource>>, source_timeout: Duration) -> Self {
        Self {
            sources,
            source_timeout,
        }
    }

    /// Number of registered sources (consensus denominator).
    pub fn count(&self) -> usize {
        self.sources.len()
    }

    /// Fan out to all sources and collect their candidates.
    ///
    /// Each source gets an individual timeout; a failing or timed-out source
    /// contributes nothing. With an overall `budget`, sources still pending
    /// at the deadline are abandoned and whatever has arrived is returned.
    pub async fn resolve_all(
        &self,
        req: &ResolutionRequest,
        budget: Option<Duration>,
    ) -> Vec<OemCandidate> {
        let mut pending: FuturesUnordered<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                async move {
                    let name = source.name();
                    let priority = source.priority();
                    let outcome =
                        tokio::time::timeout(self.source_timeout, source.resolve_candidates(req))
                            .await;
                    (name, priority, outcome)
                }
            })
            .collect();

        let deadline = budget.map(tokio::time::sleep);
        tokio::pin!(deadline);

        let mut candidates = Vec::new();
        loop {
            let next = tokio::select! {
                item = pending.next() => item,
                _ = async {
                    match deadline.as_mut().as_pin_mut() {
                        Some(sleep) => sleep.await,
                        // No budget set; never fires
                        None => std::future::pending().await,
                    }
                } => {
                    warn!(
                        "fan-out budget expired with {} source(s) pending",
                        pending.len()
                    );
                    break;
                }
            };

            let (name, priority, outcome) = match next {
                Some(item) => item,
                None => break,
            };

            match outcome {
                Ok(Ok(batch)) => {
                    debug!("Source {} proposed {} candidate(s)", name, batch.len());
                    for mut cand in batch {
                        if cand.meta.priority.is_none() {
                            cand.meta.priority = Some(priority);
                        }
                        candidates.push(cand);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Source {} failed: {}", name, e);
                }
                Err(_) => {
                    warn!("Source {} timed out after {:?}", name, self.source_timeout);
                }
            }
        }

        candidates
    }
}

// ============================================================================
// Test support
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::types::SourceError;
    use async_trait::async_trait;

    /// Scriptable source for orchestrator and pipeline tests.
    pub struct MockSource {
        pub name: &'static str,
        pub priority: u8,
        pub candidates: Vec<OemCandidate>,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    impl MockSource {
        pub fn returning(name: &'static str, candidates: Vec<OemCandidate>) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority: 5,
                candidates,
                fail: false,
                delay: None,
            })
        }

        pub fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority: 5,
                candidates: Vec::new(),
                fail: true,
                delay: None,
            })
        }

        pub fn hanging(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority: 5,
                candidates: Vec::new(),
                fail: false,
                delay: Some(Duration::from_secs(3600)),
            })
        }
    }

    #[async_trait]
    impl OemSource for MockSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        async fn resolve_candidates(
            &self,
            _req: &ResolutionRequest,
        ) -> Result<Vec<OemCandidate>, SourceError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SourceError::Api("mock failure".to_string()));
            }
            Ok(self.candidates.clone())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
