//! Fixed company lookup table for deriving a company code from free text.

/// Keyword patterns per company code. First hit wins; unmatched text yields
/// no code, which downstream degrades to a no-context draft.
const COMPANY_PATTERNS: &[(&str, &[&str])] = &[
    ("AAPL", &["aapl", "apple"]),
    ("MSFT", &["msft", "microsoft"]),
    ("TSLA", &["tsla", "tesla"]),
    ("NVDA", &["nvda", "nvidia"]),
    ("GOOGL", &["googl", "google", "alphabet"]),
];

/// Derive a company code from free text by keyword matching.
pub fn detect_company(text: &str) -> Option<&'static str> {
    let haystack = text.to_lowercase();
    COMPANY_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| haystack.contains(p)))
        .map(|(code, _)| *code)
}
