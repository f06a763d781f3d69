// =============================================================================
// normalizer.rs — CNJ NUMBER JANITOR
// =============================================================================
//
// Brazilian judicial case numbers follow the CNJ standard: twenty digits
// grouped 7-2-4-1-2-4 as NNNNNNN-DD.YYYY.J.TR.OOOO. Humans type them with
// spaces, without dots, with stray characters, or not at all. We clean up
// what we can and pass the rest through untouched — a malformed number
// isn't our problem to reject, the docket API will do that for us with
// great enthusiasm.
// =============================================================================

/// Canonicalize a raw case identifier into grouped CNJ format.
///
/// Strips every non-digit character; if exactly 20 digits remain, regroups
/// them into `NNNNNNN-DD.YYYY.J.TR.OOOO`. Anything else comes back as the
/// trimmed original. Never fails.
pub fn normalize_cnj(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() != 20 {
        return raw.trim().to_string();
    }

    format!(
        "{}-{}.{}.{}.{}.{}",
        &digits[0..7],
        &digits[7..9],
        &digits[9..13],
        &digits[13..14],
        &digits[14..16],
        &digits[16..20],
    )
}
