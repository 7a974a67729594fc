//! Helpers that generated snippets may call by name.

use lazy_static::lazy_static;
use regex::Regex;

/// Substring -> canonical acquirer token, checked in order.
pub const BANK_TOKENS: &[(&str, &str)] = &[
    ("AXIS", "AXIS"),
    ("HDFC", "HDFC"),
    ("KOTAK", "KOTAK"),
    ("ICICI", "ICICI"),
    ("INDUSIND", "INDUSIND_BANK"),
    ("RBL", "RBL"),
    ("SCB", "STANDARD_CHARTERED_BANK"),
    ("YES", "YES"),
    ("PNB", "PNB"),
    ("IOB", "INDIAN_OVERSEAS_BANK"),
];

pub const UNKNOWN_ACQUIRER: &str = "OTHER";

lazy_static! {
    static ref NON_LETTERS: Regex = Regex::new(r"[^A-Z]").expect("static regex");
}

/// `numer / denom`, or `0.0` when `denom` is zero.
pub fn safe_divide(numer: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        0.0
    } else {
        numer / denom
    }
}

/// Normalise a free-form acquirer name to a bank token.
pub fn map_acquirer(acquirer: &str) -> &'static str {
    let upper = acquirer.to_uppercase();
    let letters = NON_LETTERS.replace_all(&upper, "");
    BANK_TOKENS
        .iter()
        .find(|(needle, _)| letters.contains(needle))
        .map(|(_, token)| *token)
        .unwrap_or(UNKNOWN_ACQUIRER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_divide_by_zero_is_zero() {
        for n in [-5.0, 0.0, 1.0, 1e12, f64::MAX] {
            assert_eq!(safe_divide(n, 0.0), 0.0);
        }
        assert_eq!(safe_divide(1.0, -0.0), 0.0);
    }

    #[test]
    fn test_safe_divide_nonzero() {
        for (n, d) in [(10.0, 4.0), (-3.0, 2.0), (0.0, 7.0), (1.0, 3.0)] {
            assert_eq!(safe_divide(n, d), n / d);
        }
    }

    #[test]
    fn test_map_acquirer() {
        assert_eq!(map_acquirer("HDFC Bank Ltd"), "HDFC");
        assert_eq!(map_acquirer("Standard Chartered (SCB)"), "STANDARD_CHARTERED_BANK");
        assert_eq!(map_acquirer("indusind-bank"), "INDUSIND_BANK");
        assert_eq!(map_acquirer("I.O.B."), "INDIAN_OVERSEAS_BANK");
        assert_eq!(map_acquirer("Some Co-op Bank"), UNKNOWN_ACQUIRER);
        assert_eq!(map_acquirer(""), UNKNOWN_ACQUIRER);
    }
}
