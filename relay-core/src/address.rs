//! Tolerant counterparty address matching.
//!
//! Phone numbers arrive from providers in several shapes (`+15551234567`,
//! `15551234567`, `(555) 123-4567`). Threads are keyed on the trailing ten
//! digits so those all land in the same conversation. Platform-scoped ids
//! (Messenger PSIDs, Instagram IGSIDs) are compared verbatim.

use crate::models::Channel;

/// Number of trailing digits compared for phone-addressed channels.
pub const PHONE_KEY_DIGITS: usize = 10;

/// Strip non-digits and keep the trailing ten. Inputs without any digits are
/// returned trimmed so the function stays idempotent.
pub fn normalize_phone(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return raw.trim().to_string();
    }
    let start = digits.len().saturating_sub(PHONE_KEY_DIGITS);
    digits[start..].iter().collect()
}

/// The matching key stored alongside each conversation.
pub fn address_key(channel: Channel, address: &str) -> String {
    if channel.is_phone_addressed() {
        normalize_phone(address)
    } else {
        address.trim().to_string()
    }
}

/// Remove a single leading `+`, used as the fallback tenant lookup.
pub fn strip_plus(address: &str) -> Option<&str> {
    address.strip_prefix('+')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_code_and_plus_variants_share_a_key() {
        let a = normalize_phone("+15551234567");
        let b = normalize_phone("15551234567");
        let c = normalize_phone("5551234567");
        assert_eq!(a, "5551234567");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn formatting_characters_are_ignored() {
        assert_eq!(normalize_phone("(555) 123-4567"), "5551234567");
        assert_eq!(normalize_phone("+1 555.123.4567"), "5551234567");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "+15551234567",
            "555-0001",
            "+44 20 7946 0958",
            "",
            "anonymous",
            "  +1 (555) 000-1111 ",
        ] {
            let once = normalize_phone(raw);
            assert_eq!(normalize_phone(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn short_numbers_keep_all_digits() {
        assert_eq!(normalize_phone("+1 555-0001"), "15550001");
    }

    #[test]
    fn platform_ids_are_matched_verbatim() {
        assert_eq!(address_key(Channel::Facebook, "6789012345678901"), "6789012345678901");
        assert_eq!(address_key(Channel::Instagram, " IGSID-42 "), "IGSID-42");
        assert_eq!(address_key(Channel::Sms, "+15551234567"), "5551234567");
        assert_eq!(address_key(Channel::Whatsapp, "15551234567"), "5551234567");
    }

    #[test]
    fn strip_plus_only_removes_leading_plus() {
        assert_eq!(strip_plus("+15559998888"), Some("15559998888"));
        assert_eq!(strip_plus("15559998888"), None);
    }
}
