//! Identity key normalization
//!
//! Raw phone numbers, national IDs (CPF) and names arrive in many shapes from
//! chat integrations, form builders and compliance providers. Every function
//! here is total, side-effect free and idempotent: feeding a normalized key
//! back in returns the same key.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Country calling code prepended to national numbers
pub const COUNTRY_CODE: &str = "55";

/// Fixed length of a national ID (CPF) after zero padding
pub const NATIONAL_ID_LEN: usize = 11;

/// Anything shorter than this cannot identify a subscriber
const MIN_PHONE_DIGITS: usize = 8;

/// Normalize a raw phone string into its canonical key.
///
/// Rules, in order:
/// 1. Cut messaging-protocol suffixes (`@s.whatsapp.net`, `@c.us`, ...) and the
///    `:device` part of a JID.
/// 2. Keep digits only and drop trunk-prefix zeros.
/// 3. National numbers (10 or 11 digits: area code + subscriber) get the
///    country code prepended.
/// 4. Twelve-digit numbers with the country code whose subscriber part starts
///    with 6-9 are old-format mobiles: the mobile `9` is inserted after the
///    area code.
///
/// Returns an empty string when fewer than 8 digits remain.
///
/// ```
/// use leadflow_common::normalize::normalize_phone;
/// assert_eq!(normalize_phone("+55 31 99997-2368"), "5531999972368");
/// assert_eq!(normalize_phone("31999972368"), "5531999972368");
/// assert_eq!(normalize_phone("5531999972368@s.whatsapp.net"), "5531999972368");
/// ```
pub fn normalize_phone(raw: &str) -> String {
    let without_suffix = raw.split('@').next().unwrap_or_default();
    let without_device = without_suffix.split(':').next().unwrap_or_default();

    let digits: String = without_device
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let digits = digits.trim_start_matches('0');

    if digits.len() < MIN_PHONE_DIGITS {
        return String::new();
    }

    let mut key = if digits.len() == 10 || digits.len() == 11 {
        format!("{COUNTRY_CODE}{digits}")
    } else {
        digits.to_string()
    };

    if key.len() == 12 && key.starts_with(COUNTRY_CODE) {
        let subscriber_first = key.as_bytes()[4];
        if (b'6'..=b'9').contains(&subscriber_first) {
            key.insert(4, '9');
        }
    }

    key
}

/// Normalize a national ID (CPF) into its canonical key.
///
/// Strips everything but digits and left-pads with zeros to 11 digits. Longer
/// digit strings (company IDs) are returned unpadded. Empty input, or input
/// without a single digit, yields an empty key.
pub fn normalize_id(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }
    format!("{:0>width$}", digits, width = NATIONAL_ID_LEN)
}

/// Normalize a free-text person name into a lookup key.
///
/// Lower-cases, folds diacritics ("José" and "Jose" share a key) and
/// collapses runs of whitespace.
pub fn normalize_name(raw: &str) -> String {
    let folded: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_equivalence() {
        let expected = "5531999972368";
        assert_eq!(normalize_phone("31999972368"), expected);
        assert_eq!(normalize_phone("5531999972368"), expected);
        assert_eq!(normalize_phone("+55 31 99997-2368"), expected);
        assert_eq!(normalize_phone("5531999972368@suffix"), expected);
        assert_eq!(normalize_phone("5531999972368:17@s.whatsapp.net"), expected);
    }

    #[test]
    fn test_phone_old_mobile_format_gets_ninth_digit() {
        assert_eq!(normalize_phone("553199972368"), "5531999972368");
        assert_eq!(normalize_phone("3199972368"), "5531999972368");
    }

    #[test]
    fn test_phone_landline_is_not_changed() {
        assert_eq!(normalize_phone("(31) 3333-4444"), "553133334444");
    }

    #[test]
    fn test_phone_trunk_zero_is_dropped() {
        assert_eq!(normalize_phone("031 99997-2368"), "5531999972368");
    }

    #[test]
    fn test_phone_area_code_55_is_not_mistaken_for_country_code() {
        assert_eq!(normalize_phone("55 99997-2368"), "5555999972368");
    }

    #[test]
    fn test_phone_unparsable_is_empty() {
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("not a phone"), "");
        assert_eq!(normalize_phone("12345"), "");
        assert_eq!(normalize_phone("@s.whatsapp.net"), "");
    }

    #[test]
    fn test_phone_idempotent() {
        let samples = [
            "31999972368",
            "+55 31 99997-2368",
            "553199972368",
            "(31) 3333-4444",
            "+1 415 555 0100",
            "5531999972368@c.us",
            "031 99997-2368",
            "12345",
            "",
        ];
        for s in samples {
            let once = normalize_phone(s);
            assert_eq!(normalize_phone(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_id_pads_and_strips() {
        assert_eq!(normalize_id("123.456.789-09"), "12345678909");
        assert_eq!(normalize_id("1234567890"), "01234567890");
        assert_eq!(normalize_id(""), "");
        assert_eq!(normalize_id("abc"), "");
    }

    #[test]
    fn test_id_idempotent() {
        for s in ["123.456.789-09", "42", "12.345.678/0001-90"] {
            let once = normalize_id(s);
            assert_eq!(normalize_id(&once), once);
        }
    }

    #[test]
    fn test_name_folds_case_accents_and_spaces() {
        assert_eq!(normalize_name("  José   da SILVA "), "jose da silva");
        assert_eq!(normalize_name("João"), normalize_name("joao"));
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_name_strips_stacked_and_extended_marks() {
        assert_eq!(normalize_name("Nguyễn Thị"), "nguyen thi");
        assert_eq!(normalize_name("Ana\u{1AB0} Souza\u{20D7}"), "ana souza");
    }
}
