//! Part relevance filtering and reverse aftermarket lookup
//!
//! Two LLM-assisted stages, both strictly optional:
//!
//! - The relevance filter drops candidates that belong to a different part
//!   than the user asked for (a brake disc number mined from an oil filter
//!   page). A keyword pre-pass exempts candidates that already carry
//!   evidence of relevance before anything is shown to the model. The
//!   filter fails OPEN: any LLM error, a timed-out call, an empty answer,
//!   or no configured client leaves the candidate list untouched. Scoring
//!   decides final fates; this stage only removes obvious off-part noise.
//! - The reverse lookup goes the other way round: name well-known
//!   aftermarket articles for the request, then cross-reference those
//!   articles to OEM numbers. Its candidates carry the article provenance
//!   and bypass the brand hard filter.

use crate::canon::{canon_oem, looks_like_oem};
use crate::llm::{LlmClient, LlmError};
use crate::types::{
    CandidateMeta, OemCandidate, PartQuery, ResolutionRequest, AFTERMARKET_XREF_SOURCE,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Confidence assigned to reverse-lookup candidates. Moderate: the chain has
/// two inference steps, but each number is anchored to a concrete article.
const XREF_CONFIDENCE: f32 = 0.75;
/// Trust weight for reverse-lookup candidates.
const XREF_PRIORITY: u8 = 8;

pub struct PartRelevanceFilter {
    llm: Option<Arc<dyn LlmClient>>,
    /// How many candidates (best first) are shown to the model
    top_n: usize,
    /// Budget per LLM call; an elapsed call counts as a failed one
    call_timeout: Duration,
}

impl PartRelevanceFilter {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        top_n: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            top_n,
            call_timeout,
        }
    }

    /// Drop candidates the model flags as belonging to a different part.
    ///
    /// A keyword pre-pass exempts candidates that already carry evidence of
    /// relevance: a match on the user's own quoted number, an aftermarket
    /// article provenance, or a source note mentioning the requested part.
    /// Of the rest, only the `top_n` highest-confidence numbers are judged;
    /// the long tail passes through and gets sorted out by scoring.
    pub async fn filter(
        &self,
        candidates: Vec<OemCandidate>,
        req: &ResolutionRequest,
    ) -> Vec<OemCandidate> {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => return candidates,
        };
        if candidates.is_empty() {
            return candidates;
        }

        let suspected = req.part.suspected_number.as_deref().map(canon_oem);
        let keywords = part_keywords(&req.part);
        let protected: Vec<bool> = candidates
            .iter()
            .map(|c| is_evidently_relevant(c, suspected.as_deref(), &keywords))
            .collect();

        // Judge the highest-confidence distinct unprotected numbers
        let mut by_confidence: Vec<&OemCandidate> = candidates
            .iter()
            .zip(&protected)
            .filter(|(_, p)| !**p)
            .map(|(c, _)| c)
            .collect();
        by_confidence.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut judged: Vec<&str> = Vec::new();
        for cand in by_confidence {
            if judged.len() >= self.top_n {
                break;
            }
            if !judged.contains(&cand.oem.as_str()) {
                judged.push(cand.oem.as_str());
            }
        }
        if judged.is_empty() {
            return candidates;
        }

        let keep = match self.ask_keep_list(llm.as_ref(), &judged, req).await {
            Some(keep) if !keep.is_empty() => keep,
            _ => {
                debug!("relevance filter skipped (no usable answer), keeping all");
                return candidates;
            }
        };
        let judged: HashSet<String> = judged.into_iter().map(String::from).collect();

        let before = candidates.len();
        let kept: Vec<OemCandidate> = candidates
            .into_iter()
            .zip(protected)
            .filter(|(cand, protected)| {
                *protected || !judged.contains(&cand.oem) || keep.contains(&cand.oem)
            })
            .map(|(cand, _)| cand)
            .collect();
        debug!(
            "relevance filter kept {}/{} candidates for '{}'",
            kept.len(),
            before,
            req.part.raw_text
        );
        kept
    }

    /// One LLM call under the per-call budget.
    async fn complete_json_timed(
        &self,
        llm: &dyn LlmClient,
        system: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, LlmError> {
        match tokio::time::timeout(self.call_timeout, llm.complete_json(system, prompt)).await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Network("call timed out".to_string())),
        }
    }

    async fn ask_keep_list(
        &self,
        llm: &dyn LlmClient,
        oems: &[&str],
        req: &ResolutionRequest,
    ) -> Option<HashSet<String>> {
        let vehicle = &req.vehicle;
        let prompt = format!(
            "Requested part: {part}\nVehicle: {make} {model}\n\n\
             Candidate OEM numbers:\n{list}\n\n\
             Which of these numbers plausibly belong to the requested part \
             (not to some other component)? Answer with a JSON array of the \
             numbers to KEEP, nothing else.",
            part = req.part.raw_text,
            make = vehicle.make.as_deref().unwrap_or("unknown make"),
            model = vehicle.model.as_deref().unwrap_or("unknown model"),
            list = oems.join("\n"),
        );

        let value = match self
            .complete_json_timed(
                llm,
                "You check whether OEM part numbers match a requested part category. \
                 Be permissive: only exclude numbers that clearly belong to a \
                 different part.",
                &prompt,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("relevance filter LLM call failed: {}", e);
                return None;
            }
        };

        let array = value.as_array()?;
        let keep: HashSet<String> = array
            .iter()
            .filter_map(|v| v.as_str())
            .map(canon_oem)
            .collect();
        Some(keep)
    }

    /// Reverse aftermarket cross-reference.
    ///
    /// Step 1 names well-known aftermarket articles for the request; step 2
    /// maps each article to its OEM numbers. Any failure yields an empty
    /// contribution.
    pub async fn reverse_aftermarket(&self, req: &ResolutionRequest) -> Vec<OemCandidate> {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => return Vec::new(),
        };

        let articles = match self.ask_articles(llm.as_ref(), req).await {
            Some(articles) if !articles.is_empty() => articles,
            _ => {
                debug!("reverse lookup found no articles for '{}'", req.part.raw_text);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        for article in &articles {
            let oems = match self.ask_oems_for_article(llm.as_ref(), article, req).await {
                Some(oems) => oems,
                None => continue,
            };
            for oem in oems {
                let canonical = canon_oem(&oem);
                if !looks_like_oem(&canonical) || !seen.insert(canonical.clone()) {
                    continue;
                }
                let mut cand =
                    OemCandidate::new(&canonical, AFTERMARKET_XREF_SOURCE, XREF_CONFIDENCE)
                        .with_priority(XREF_PRIORITY);
                cand.meta = CandidateMeta {
                    priority: cand.meta.priority,
                    note: Some(format!("via {}", article)),
                    article_number: Some(article.clone()),
                    ..CandidateMeta::default()
                };
                candidates.push(cand);
            }
        }
        debug!(
            "reverse lookup produced {} candidates from {} articles",
            candidates.len(),
            articles.len()
        );
        candidates
    }

    async fn ask_articles(
        &self,
        llm: &dyn LlmClient,
        req: &ResolutionRequest,
    ) -> Option<Vec<String>> {
        let vehicle = &req.vehicle;
        let prompt = format!(
            "Part: {part}\nVehicle: {make} {model}\n\n\
             Name up to 3 well-known aftermarket article numbers (e.g. MANN, \
             Bosch, Brembo) that fit this vehicle and part. Answer with a JSON \
             array of article number strings, nothing else. Answer [] if you \
             are not sure.",
            part = req.part.raw_text,
            make = vehicle.make.as_deref().unwrap_or("unknown make"),
            model = vehicle.model.as_deref().unwrap_or("unknown model"),
        );

        let value = match self
            .complete_json_timed(
                llm,
                "You are an automotive parts specialist. Only name article \
                 numbers you are confident exist.",
                &prompt,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("reverse lookup article step failed: {}", e);
                return None;
            }
        };
        Some(
            value
                .as_array()?
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(3)
                .collect(),
        )
    }

    async fn ask_oems_for_article(
        &self,
        llm: &dyn LlmClient,
        article: &str,
        req: &ResolutionRequest,
    ) -> Option<Vec<String>> {
        let prompt = format!(
            "Aftermarket article: {article}\nVehicle: {make} {model}\n\n\
             Which OEM (original equipment) part numbers does this article \
             cross-reference to for this vehicle? Answer with a JSON array of \
             OEM number strings, nothing else. Answer [] if you are not sure.",
            article = article,
            make = req.vehicle.make.as_deref().unwrap_or("unknown make"),
            model = req.vehicle.model.as_deref().unwrap_or("unknown model"),
        );

        let value = match self
            .complete_json_timed(
                llm,
                "You are an automotive parts specialist. Only list OEM numbers \
                 you are confident about.",
                &prompt,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("reverse lookup xref step failed for {}: {}", article, e);
                return None;
            }
        };
        Some(
            value
                .as_array()?
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

/// Lowercase part keywords from the request, for the pre-pass.
fn part_keywords(part: &PartQuery) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let category = part.normalized_category.as_deref().unwrap_or("");
    let words = part
        .raw_text
        .split(|c: char| !c.is_alphabetic())
        .chain(category.split(|c: char| !c.is_alphabetic()));
    for word in words {
        let word = word.to_lowercase();
        if word.chars().count() >= 3 && !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

/// A candidate skips the LLM judgement when it already carries evidence of
/// relevance: it matches the user's quoted number, it came out of an article
/// cross-reference, or its source note mentions the requested part.
fn is_evidently_relevant(
    cand: &OemCandidate,
    suspected: Option<&str>,
    keywords: &[String],
) -> bool {
    if suspected == Some(cand.oem.as_str()) {
        return true;
    }
    if cand.meta.article_number.is_some() {
        return true;
    }
    if let Some(note) = &cand.meta.note {
        let note = note.to_lowercase();
        if keywords.iter().any(|k| note.contains(k.as_str())) {
            return true;
        }
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns scripted responses in order and counts calls.
    struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, ()>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<&str, ()>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .rev()
                        .map(|r| r.map(String::from))
                        .collect(),
                ),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            match self.responses.lock().unwrap().pop() {
                Some(Ok(s)) => Ok(s),
                _ => Err(LlmError::Api("scripted failure".to_string())),
            }
        }
    }

    fn request() -> ResolutionRequest {
        ResolutionRequest {
            order_id: "o-1".to_string(),
            vehicle: crate::types::VehicleDescriptor {
                make: Some("Volkswagen".to_string()),
                model: Some("Golf 7".to_string()),
                ..Default::default()
            },
            part: crate::types::PartQuery {
                raw_text: "Ölfilter".to_string(),
                ..Default::default()
            },
        }
    }

    fn candidates() -> Vec<OemCandidate> {
        vec![
            OemCandidate::new("03L115562", "a", 0.9),
            OemCandidate::new("1K0615301AA", "b", 0.8),
        ]
    }

    #[tokio::test]
    async fn test_filter_keeps_listed_numbers() {
        let llm = ScriptedLlm::new(vec![Ok(r#"["03L115562"]"#)]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let kept = filter.filter(candidates(), &request()).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].oem, "03L115562");
    }

    #[tokio::test]
    async fn test_filter_fails_open_on_error() {
        let llm = ScriptedLlm::new(vec![Err(())]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let kept = filter.filter(candidates(), &request()).await;
        assert_eq!(kept.len(), 2, "LLM failure must not drop candidates");
    }

    #[tokio::test]
    async fn test_filter_fails_open_on_empty_answer() {
        let llm = ScriptedLlm::new(vec![Ok("[]")]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let kept = filter.filter(candidates(), &request()).await;
        assert_eq!(kept.len(), 2, "empty keep list means no judgement");
    }

    #[tokio::test]
    async fn test_filter_without_llm_is_passthrough() {
        let filter = PartRelevanceFilter::new(None, 12, Duration::from_secs(5));
        let kept = filter.filter(candidates(), &request()).await;
        assert_eq!(kept.len(), 2);
    }

    #[tokio::test]
    async fn test_filter_protects_suspected_number() {
        let llm = ScriptedLlm::new(vec![Ok(r#"["03L115562"]"#)]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let mut req = request();
        req.part.suspected_number = Some("1K0 615 301 AA".to_string());
        let kept = filter.filter(candidates(), &req).await;
        assert_eq!(kept.len(), 2, "user-quoted number survives the filter");
    }

    #[tokio::test]
    async fn test_filter_exempts_article_backed_candidates() {
        let mut backed = OemCandidate::new("03L115562", "a", 0.9);
        backed.meta.article_number = Some("CUK 26 009".to_string());
        let plain = OemCandidate::new("1K0615301AA", "b", 0.8);

        // The model only keeps the plain number; the article-backed one
        // never reached it and survives regardless
        let llm = ScriptedLlm::new(vec![Ok(r#"["1K0615301AA"]"#)]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let kept = filter.filter(vec![backed, plain], &request()).await;
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().any(|c| c.oem == "03L115562"));
    }

    #[tokio::test]
    async fn test_filter_exempts_note_matching_part_keyword() {
        let mut noted = OemCandidate::new("03L115562", "a", 0.9);
        noted.meta.note = Some("Ölfilter Golf VII".to_string());
        let plain = OemCandidate::new("1K0615301AA", "b", 0.8);

        let llm = ScriptedLlm::new(vec![Ok(r#"["1K0615301AA"]"#)]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let kept = filter.filter(vec![noted, plain], &request()).await;
        assert_eq!(kept.len(), 2, "note naming the requested part is evidence enough");
    }

    #[tokio::test]
    async fn test_filter_skips_llm_when_all_candidates_carry_evidence() {
        let mut backed = OemCandidate::new("03L115562", "a", 0.9);
        backed.meta.article_number = Some("CUK 26 009".to_string());

        let llm = ScriptedLlm::new(vec![]);
        let filter = PartRelevanceFilter::new(
            Some(Arc::clone(&llm) as Arc<dyn LlmClient>),
            12,
            Duration::from_secs(5),
        );
        let kept = filter.filter(vec![backed], &request()).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(*llm.calls.lock().unwrap(), 0, "nothing left to judge");
    }

    #[tokio::test]
    async fn test_filter_times_out_and_fails_open() {
        struct HangingLlm;

        #[async_trait]
        impl LlmClient for HangingLlm {
            async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let filter =
            PartRelevanceFilter::new(Some(Arc::new(HangingLlm)), 12, Duration::from_millis(50));
        let kept = tokio::time::timeout(
            Duration::from_secs(5),
            filter.filter(candidates(), &request()),
        )
        .await
        .expect("filter must give up on a stuck LLM");
        assert_eq!(kept.len(), 2, "a timed-out judgement keeps everything");
    }

    #[tokio::test]
    async fn test_reverse_aftermarket_two_steps() {
        let llm = ScriptedLlm::new(vec![
            Ok(r#"["CUK 26 009"]"#),
            Ok(r#"["03L 115 562", "03L115562A"]"#),
        ]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let candidates = filter.reverse_aftermarket(&request()).await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].oem, "03L115562");
        assert_eq!(candidates[0].source, AFTERMARKET_XREF_SOURCE);
        assert!((candidates[0].confidence - 0.75).abs() < 1e-6);
        assert_eq!(candidates[0].meta.article_number.as_deref(), Some("CUK 26 009"));
        assert!(candidates[0].is_aftermarket_xref());
    }

    #[tokio::test]
    async fn test_reverse_aftermarket_fails_to_empty() {
        let llm = ScriptedLlm::new(vec![Err(())]);
        let filter = PartRelevanceFilter::new(Some(llm), 12, Duration::from_secs(5));
        let candidates = filter.reverse_aftermarket(&request()).await;
        assert!(candidates.is_empty());
    }
}
