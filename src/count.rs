use regex::Regex;
use std::sync::LazyLock;

// number, then an optional scale letter that must not be the start of a word
static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,]*(?:\.\d+)?)\s*([kKmM])?([A-Za-z])?").unwrap());

/// Parses a human-readable engagement count ("2.4K", "1,234", "15 Comments").
///
/// Returns `None` when the text carries no number, so callers can tell
/// "unknown" apart from zero.
pub fn parse_count(text: &str) -> Option<u64> {
    let caps = COUNT_RE.captures(text)?;
    let digits = caps.get(1)?.as_str().replace(',', "");

    // "2.4K likes" keeps its K, "3 more" loses its m
    let scale: u64 = match (caps.get(2), caps.get(3)) {
        (Some(s), None) => match s.as_str() {
            "k" | "K" => 1_000,
            _ => 1_000_000,
        },
        _ => 1,
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits.as_str(), ""),
    };
    let whole: u64 = int_part.parse().ok()?;
    let mut value = whole.checked_mul(scale)?;

    // fraction scaled exactly, then floored; digits past 1e-9 can't matter
    let frac = &frac_part[..frac_part.len().min(9)];
    if !frac.is_empty() {
        let num: u64 = frac.parse().ok()?;
        let den = 10u64.pow(frac.len() as u32);
        value = value.checked_add(num * scale / den)?;
    }
    Some(value)
}
