//! Name normalization (§4.4 step 1): Unicode NFC, lower-case, full-width to
//! half-width, whitespace and honorific stripping, plus the "core name"
//! extraction used by the fuzzy pass's script-specific boosts.

use unicode_normalization::UnicodeNormalization;

/// Honorific/title suffixes stripped before comparison. Not exhaustive; the
/// set a production deployment needs is a locale/config concern, but these
/// cover the common English and CJK cases the fuzzy pass boosts around.
const HONORIFIC_SUFFIXES: &[&str] = &["jr.", "jr", "sr.", "sr", "phd", "ph.d.", "md", "esq.", "esq"];

/// Folds a full-width (U+FF01..U+FF5E) character down to its half-width
/// ASCII equivalent; characters outside that block pass through unchanged.
fn fullwidth_to_halfwidth(c: char) -> char {
    let code = c as u32;
    if (0xFF01..=0xFF5E).contains(&code) {
        char::from_u32(code - 0xFEE0).unwrap_or(c)
    } else if code == 0x3000 {
        ' '
    } else {
        c
    }
}

/// `Normalize(name)` (§4.4 step 1): NFC, lower-case, full-width folded to
/// half-width, whitespace collapsed and trimmed, trailing honorific stripped.
pub fn normalize(name: &str) -> String {
    let nfc: String = name.nfc().collect();
    let folded: String = nfc.chars().map(fullwidth_to_halfwidth).collect();
    let lowered = folded.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    strip_honorific(&collapsed)
}

fn strip_honorific(name: &str) -> String {
    let trimmed = name.trim_end_matches([' ', ',']);
    for suffix in HONORIFIC_SUFFIXES {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            let stripped = stripped.trim_end_matches([' ', ',']);
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// The "core name" a script-specific policy (§4.4 step 4) compares on: the
/// normalized name with any remaining single-token titles removed, so
/// "dr smith" and "smith" both reduce to "smith".
pub fn core_name(normalized: &str) -> String {
    const TITLES: &[&str] = &["dr", "mr", "mrs", "ms", "prof", "sir", "dame"];
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !TITLES.contains(t)).collect();
    tokens.join(" ")
}

/// True if `a` is a single-character family-name prefix of `b` (or vice
/// versa), the second script-specific boost condition in §4.4 step 4.
pub fn is_family_name_prefix_match(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    shorter.chars().count() == 1 && longer.starts_with(shorter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whitespace_and_lowercases() {
        assert_eq!(normalize("  Alice   Smith "), "alice smith");
    }

    #[test]
    fn folds_fullwidth_to_halfwidth() {
        assert_eq!(normalize("ＡＢＣ"), "abc");
    }

    #[test]
    fn strips_trailing_honorific() {
        assert_eq!(normalize("John Smith Jr."), "john smith");
        assert_eq!(normalize("Jane Doe, PhD"), "jane doe");
    }

    #[test]
    fn nfc_normalizes_combining_sequences() {
        // "e" + combining acute accent decomposed form vs precomposed "é".
        let decomposed = "cafe\u{0301}";
        let precomposed = "café";
        assert_eq!(normalize(decomposed), normalize(precomposed));
    }

    #[test]
    fn core_name_drops_titles() {
        assert_eq!(core_name("dr smith"), "smith");
    }

    #[test]
    fn family_name_prefix_matches_single_character() {
        assert!(is_family_name_prefix_match("l", "li wei"));
        assert!(!is_family_name_prefix_match("li", "li wei"));
    }
}
