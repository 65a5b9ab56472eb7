//! OEM token mining from fetched page bodies
//!
//! Shop and parts-index sources return HTML or embedded JSON; this module
//! pulls OEM-shaped tokens out of either. Extraction is best-effort: a page
//! that yields nothing is an empty contribution, never an error.

use crate::canon::{canon_oem, looks_like_oem};
use regex::Regex;
use std::sync::OnceLock;

/// Contiguous OEM-shaped token, dots and dashes allowed inside.
fn solid_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z0-9][A-Z0-9.\-]{3,18}[A-Z0-9]\b").expect("static regex")
    })
}

/// Space-grouped OEM written form ("03L 115 562", "A 203 421 10 12").
/// Groups are capped at 4 characters so prose words cannot join a number.
fn spaced_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z0-9]{1,4}(?: [A-Z0-9]{1,4}){1,5}\b").expect("static regex")
    })
}

/// `"oeNumbers": [...]` style JSON blocks embedded in shop search pages.
fn oe_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?:oeNumbers|oe_numbers|mpn|sku)"\s*:\s*("[^"]+"|\[[^\]]*\])"#)
            .expect("static regex")
    })
}

/// Spaced matches are prone to catching prose ("GOLF 7 16 TDI"), so they
/// additionally need a substantial digit share.
fn digit_heavy(canonical: &str) -> bool {
    let digits = canonical.chars().filter(|c| c.is_ascii_digit()).count();
    digits * 10 >= canonical.len() * 4
}

/// Mine OEM-shaped tokens from free text or HTML.
///
/// Returns canonical, deduplicated tokens, contiguous matches first.
pub fn extract_oem_tokens(body: &str) -> Vec<String> {
    let upper = body.to_ascii_uppercase();
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for m in solid_token_re().find_iter(&upper) {
        let canonical = canon_oem(m.as_str());
        if looks_like_oem(&canonical) && seen.insert(canonical.clone()) {
            out.push(canonical);
        }
    }
    for m in spaced_token_re().find_iter(&upper) {
        let canonical = canon_oem(m.as_str());
        if looks_like_oem(&canonical) && digit_heavy(&canonical) && seen.insert(canonical.clone())
        {
            out.push(canonical);
        }
    }
    out
}

/// Mine OEM numbers from embedded JSON blocks (`oeNumbers`, `mpn`, `sku`).
///
/// More precise than [`extract_oem_tokens`]; prefer these when present.
pub fn extract_oe_number_blocks(body: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for cap in oe_block_re().captures_iter(body) {
        let payload = &cap[1];
        for token in extract_oem_tokens(payload) {
            if seen.insert(token.clone()) {
                out.push(token);
            }
        }
    }
    out
}
