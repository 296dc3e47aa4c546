use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Localized meridiem markers: `a. m.`, `p.m.`, `a m`, `pm`...
static MERIDIEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[\s\d])([ap])\.?\s?m\.?(\s|$)").expect("meridiem pattern is valid")
});

fn replace_odd_spaces(raw: &str) -> String {
    raw.replace(&['\u{00a0}', '\u{202f}'][..], " ")
}

/// Rewrite raw timestamp text so the explicit formats can read it:
/// non-breaking spaces become plain spaces and Spanish style meridiem
/// markers become `AM` / `PM`.
pub fn normalize_am_pm(raw: &str) -> String {
    let spaced = replace_odd_spaces(raw);
    MERIDIEM
        .replace_all(&spaced, |caps: &Captures<'_>| {
            format!("{}{}M{}", &caps[1], caps[2].to_ascii_uppercase(), &caps[3])
        })
        .trim()
        .to_string()
}

/// Parse a meter value cell.
///
/// Whitespace (including NBSP) is dropped and a decimal comma becomes a
/// period. When both separators appear the right-most one is the decimal
/// mark. Anything else that does not read as a finite number is `None`.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let compact: String = replace_odd_spaces(raw)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if compact.is_empty() {
        return None;
    }

    let cleaned = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        _ => compact,
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_meridiem_markers_are_normalized() {
        assert_eq!(normalize_am_pm("01/02/2024 12:15:00 a. m."), "01/02/2024 12:15:00 AM");
        assert_eq!(normalize_am_pm("01/02/2024 1:15:00 p.m."), "01/02/2024 1:15:00 PM");
        assert_eq!(normalize_am_pm("01/02/2024 1:15 p. m"), "01/02/2024 1:15 PM");
        assert_eq!(normalize_am_pm("01/02/2024 1:15 pm"), "01/02/2024 1:15 PM");
    }

    #[test]
    fn non_breaking_spaces_become_plain_spaces() {
        assert_eq!(
            normalize_am_pm("01/02/2024\u{a0}3:00:00\u{202f}p.\u{a0}m."),
            "01/02/2024 3:00:00 PM"
        );
    }

    #[test]
    fn twenty_four_hour_text_is_untouched() {
        assert_eq!(normalize_am_pm(" 2024-02-01 13:45 "), "2024-02-01 13:45");
    }

    #[test]
    fn parse_numeric_handles_locale_separators() {
        assert_eq!(parse_numeric("12,5"), Some(12.5));
        assert_eq!(parse_numeric("\u{a0}0.125 "), Some(0.125));
        assert_eq!(parse_numeric("1.234,5"), Some(1234.5));
        assert_eq!(parse_numeric("1,234.5"), Some(1234.5));
        assert_eq!(parse_numeric("1 234,5"), Some(1234.5));
        assert_eq!(parse_numeric("-3"), Some(-3.0));
    }

    #[test]
    fn parse_numeric_rejects_text_and_blanks() {
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("   "), None);
        assert_eq!(parse_numeric("OK"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric("inf"), None);
    }
}
