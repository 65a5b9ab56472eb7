//! Backsearch re-confirmation
//!
//! Validates a candidate by querying an independent panel of parts sites for
//! the OEM number itself and checking that the result pages mention the
//! requested vehicle. A hit requires both: the verbatim canonical number in
//! the page, and at least one vehicle keyword nearby. Panel members run
//! concurrently with individual timeouts; a timed-out or failed member
//! counts as a miss.

use crate::canon::canon_oem;
use crate::fetch::WebFetcher;
use crate::types::{BacksearchResult, PanelHit, VehicleDescriptor};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One panel member: a site searchable by OEM number.
#[derive(Debug, Clone)]
pub struct PanelMember {
    /// Panel source name
    pub name: &'static str,
    /// Search URL with an `{oem}` placeholder
    pub url_template: &'static str,
}

/// Built-in search panel. Independent of the candidate sources by design
/// intent; deployments sharing a site between fan-out and panel accept the
/// correlated-evidence risk.
pub fn default_panel() -> Vec<PanelMember> {
    vec![
        PanelMember {
            name: "oem-db",
            url_template: "https://www.tecdoc-catalogue.com/search?q={oem}",
        },
        PanelMember {
            name: "autodoc",
            url_template: "https://www.autodoc.de/search?keyword={oem}",
        },
        PanelMember {
            name: "daparto",
            url_template: "https://www.daparto.de/Teilesuche?searchTerm={oem}",
        },
        PanelMember {
            name: "ebay",
            url_template: "https://www.ebay.de/sch/i.html?_nkw={oem}",
        },
        PanelMember {
            name: "7zap",
            url_template: "https://7zap.com/en/search/?q={oem}",
        },
    ]
}

/// Keywords identifying the vehicle in a result page (lowercase).
///
/// Make and model words plus common brand synonyms; model strings split into
/// words so "Golf 7 1.6 TDI" matches a page that only says "Golf".
pub fn vehicle_keywords(vehicle: &VehicleDescriptor) -> Vec<String> {
    let mut keywords = Vec::new();

    if let Some(make) = &vehicle.make {
        let make_lower = make.to_lowercase();
        for synonym in brand_synonyms(&make_lower) {
            keywords.push(synonym.to_string());
        }
        keywords.push(make_lower);
    }
    if let Some(model) = &vehicle.model {
        for word in model.to_lowercase().split_whitespace() {
            // Skip pure numbers and short tokens ("7", "1.6")
            if word.len() >= 3 && word.chars().any(|c| c.is_alphabetic()) {
                keywords.push(word.to_string());
            }
        }
    }

    keywords.sort();
    keywords.dedup();
    keywords
}

fn brand_synonyms(make_lower: &str) -> Vec<&'static str> {
    match make_lower {
        "vw" | "volkswagen" => vec!["vw", "volkswagen"],
        "mercedes" | "mercedes-benz" | "daimler" => {
            vec!["mercedes", "mercedes-benz", "daimler"]
        }
        "skoda" | "škoda" => vec!["skoda", "škoda"],
        "citroen" | "citroën" => vec!["citroen", "citroën"],
        "opel" | "vauxhall" => vec!["opel", "vauxhall"],
        _ => vec![],
    }
}

/// Backsearch validator over a configurable panel.
pub struct BacksearchValidator {
    fetcher: Arc<dyn WebFetcher>,
    panel: Vec<PanelMember>,
    member_timeout: Duration,
}

impl BacksearchValidator {
    pub fn new(
        fetcher: Arc<dyn WebFetcher>,
        panel: Vec<PanelMember>,
        member_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            panel,
            member_timeout,
        }
    }

    /// Re-confirm one candidate OEM against the panel.
    ///
    /// Always computed fresh; results are not cached across candidates or
    /// calls. Never fails: every panel outcome folds into hit/miss.
    pub async fn validate(&self, oem: &str, vehicle: &VehicleDescriptor) -> BacksearchResult {
        let canonical = canon_oem(oem);
        let keywords = vehicle_keywords(vehicle);

        let checks = self.panel.iter().map(|member| {
            let url = member.url_template.replace("{oem}", &canonical);
            let fetcher = Arc::clone(&self.fetcher);
            let canonical = canonical.clone();
            let keywords = keywords.clone();
            let timeout = self.member_timeout;
            let name = member.name;

            async move {
                let outcome =
                    tokio::time::timeout(timeout, fetcher.get(&url)).await;
                let hit = match outcome {
                    Ok(Ok(response)) if response.status < 400 => {
                        page_confirms(&response.body, &canonical, &keywords)
                    }
                    Ok(Ok(response)) => {
                        debug!("Panel {} returned status {}", name, response.status);
                        false
                    }
                    Ok(Err(e)) => {
                        warn!("Panel {} failed: {}", name, e);
                        false
                    }
                    Err(_) => {
                        warn!("Panel {} timed out after {:?}", name, timeout);
                        false
                    }
                };
                PanelHit {
                    source: name.to_string(),
                    hit,
                }
            }
        });

        let hits: Vec<PanelHit> = join_all(checks).await;
        let total_hits = hits.iter().filter(|h| h.hit).count();
        debug!(
            oem = %canonical,
            total_hits,
            panel_size = hits.len(),
            "backsearch complete"
        );
        BacksearchResult { hits, total_hits }
    }
}

/// A page confirms a candidate when the canonical OEM appears verbatim
/// (after squashing separators) and a vehicle keyword co-occurs.
fn page_confirms(body: &str, canonical_oem: &str, keywords: &[String]) -> bool {
    let squashed: String = body
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if !squashed.contains(canonical_oem) {
        return false;
    }
    if keywords.is_empty() {
        // No vehicle context to check against; number presence suffices
        return true;
    }
    let lower = body.to_lowercase();
    keywords.iter().any(|k| lower.contains(k.as_str()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResponse};
    use async_trait::async_trait;

    struct StaticFetcher {
        body: String,
    }

    #[async_trait]
    impl WebFetcher for StaticFetcher {
        async fn get(&self, _url: &str) -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse {
                status: 200,
                body: self.body.clone(),
            })
        }
    }

    struct HangingFetcher;

    #[async_trait]
    impl WebFetcher for HangingFetcher {
        async fn get(&self, _url: &str) -> Result<FetchResponse, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn vehicle() -> VehicleDescriptor {
        VehicleDescriptor {
            make: Some("Volkswagen".to_string()),
            model: Some("Golf 7 1.6 TDI".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_page_confirms_needs_both() {
        let keywords = vehicle_keywords(&vehicle());
        assert!(page_confirms(
            "Ölfilter 03L 115 562 für VW Golf VII",
            "03L115562",
            &keywords
        ));
        // Number alone, no vehicle context
        assert!(!page_confirms("Artikel 03L115562 lieferbar", "03L115562", &keywords));
        // Vehicle alone, no number
        assert!(!page_confirms("Ersatzteile für VW Golf", "03L115562", &keywords));
    }

    #[test]
    fn test_page_confirms_separator_insensitive() {
        let keywords = vehicle_keywords(&vehicle());
        assert!(page_confirms(
            "golf Ersatzteil 03l-115-562",
            "03L115562",
            &keywords
        ));
    }

    #[test]
    fn test_vehicle_keywords_synonyms_and_model_words() {
        let keywords = vehicle_keywords(&vehicle());
        assert!(keywords.contains(&"vw".to_string()));
        assert!(keywords.contains(&"volkswagen".to_string()));
        assert!(keywords.contains(&"golf".to_string()));
        assert!(keywords.contains(&"tdi".to_string()));
        assert!(!keywords.iter().any(|k| k == "1.6"), "numeric tokens skipped");
    }

    #[tokio::test]
    async fn test_validate_counts_hits() {
        let fetcher = Arc::new(StaticFetcher {
            body: "VW Golf Ölfilter 03L115562".to_string(),
        });
        let validator = BacksearchValidator::new(
            fetcher,
            default_panel(),
            Duration::from_secs(5),
        );
        let result = validator.validate("03L 115 562", &vehicle()).await;
        assert_eq!(result.total_hits, 5);
        assert_eq!(result.hits.len(), 5);
    }

    #[tokio::test]
    async fn test_validate_timeout_is_miss() {
        let validator = BacksearchValidator::new(
            Arc::new(HangingFetcher),
            vec![PanelMember {
                name: "slow",
                url_template: "https://example.invalid/?q={oem}",
            }],
            Duration::from_millis(20),
        );
        let result = validator.validate("03L115562", &vehicle()).await;
        assert_eq!(result.total_hits, 0);
        assert_eq!(result.hits.len(), 1);
        assert!(!result.hits[0].hit);
    }
}
