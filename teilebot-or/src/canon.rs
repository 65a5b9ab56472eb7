//! OEM number canonicalization
//!
//! OEM numbers arrive with inconsistent separators ("03L 115 562",
//! "03l-115-562", "03L.115.562" are the same part). All merge keys and
//! verbatim-match checks operate on the canonical form.

/// Canonicalize an OEM number: uppercase, strip everything that is not
/// ASCII alphanumeric. Idempotent.
pub fn canon_oem(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Quick structural test for an OEM-shaped token: canonical form of
/// plausible length that contains at least one digit.
///
/// This is deliberately loose; the brand schema applies the real
/// plausibility rules later.
pub fn looks_like_oem(canonical: &str) -> bool {
    let len = canonical.len();
    if !(5..=20).contains(&len) {
        return false;
    }
    canonical.chars().any(|c| c.is_ascii_digit())
        && canonical.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canon_strips_separators() {
        assert_eq!(canon_oem("03L 115 562"), "03L115562");
        assert_eq!(canon_oem("03l-115.562"), "03L115562");
        assert_eq!(canon_oem("A 203 421 10 12"), "A2034211012");
    }

    #[test]
    fn test_canon_idempotent() {
        let once = canon_oem("34-116 858 652a");
        let twice = canon_oem(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_looks_like_oem_bounds() {
        assert!(looks_like_oem("03L115562"));
        assert!(looks_like_oem("34116858652"));
        assert!(!looks_like_oem("ABC"), "too short");
        assert!(!looks_like_oem("BREMSSCHEIBE"), "no digit");
        assert!(
            !looks_like_oem("012345678901234567890"),
            "longer than any real OEM"
        );
    }
}
