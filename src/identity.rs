//! Place identity extraction and URL canonicalization.
//!
//! A place id is derived from the URL a scrape was launched with and the URL
//! the browser ended up on after redirects. Strategies, strongest first:
//! - `cid:<n>` from a numeric `cid` query parameter
//! - the hex feature id embedded in a `!1s0x...` data parameter
//! - `short:<segment>` for short-link hosts
//! - `hash:<16 hex>` over the canonical URL as a last resort

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use url::Url;

/// Query parameters that never contribute to identity.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "dclid",
    "msclkid",
    "twclid",
    "igshid",
    "mc_cid",
    "mc_eid",
    "ref",
    "source",
];

/// Number of hex characters kept from the fallback digest.
const HASH_ID_LEN: usize = 16;

static HEX_PAIR_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!1s(0x[0-9a-fA-F]+:(?:0x)?[0-9a-fA-F]+)").unwrap());
static HEX_SINGLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!1s(0x[0-9a-fA-F]{8,})").unwrap());

/// Derive a stable place id from the original and resolved URLs.
///
/// The resolved URL is tried before the original one for the `cid` and hex
/// strategies. Short links are only recognized on the original URL, since a
/// resolved URL never points at the short-link host. Always returns a
/// non-empty id.
pub fn extract_place_id(original_url: &str, resolved_url: &str) -> String {
    for url in [resolved_url, original_url] {
        if url.is_empty() {
            continue;
        }
        if let Some(cid) = extract_cid(url) {
            return format!("cid:{}", cid);
        }
        if let Some(hex_id) = extract_hex_id(url) {
            return hex_id;
        }
    }

    if let Some(segment) = extract_short_link_id(original_url) {
        return format!("short:{}", segment);
    }

    let basis = if resolved_url.is_empty() {
        original_url
    } else {
        resolved_url
    };
    let canonical = canonicalize_url(basis);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("hash:{}", &digest[..HASH_ID_LEN])
}

/// Normalize a URL so that equivalent links compare equal.
///
/// Lowercases the host, strips trailing slashes, removes tracking parameters,
/// sorts what remains and drops the fragment. Unparseable input comes back
/// with only its fragment removed.
pub fn canonicalize_url(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let Some(mut parsed) = parse_lenient(raw) else {
        return raw.split('#').next().unwrap_or(raw).to_string();
    };

    let trimmed = parsed.path().trim_end_matches('/');
    let path = if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    };

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    params.sort();

    parsed.set_path(&path);
    parsed.set_fragment(None);
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(params.iter());
    }

    parsed.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str())
}

/// Parse a URL, assuming https when the scheme is missing.
fn parse_lenient(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{}", raw)))
        .ok()
}

fn extract_cid(url: &str) -> Option<String> {
    let parsed = parse_lenient(url)?;
    let value = parsed
        .query_pairs()
        .find(|(key, _)| *key == "cid")
        .map(|(_, value)| value.trim().to_string())?;
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        Some(value)
    } else {
        None
    }
}

fn extract_hex_id(url: &str) -> Option<String> {
    HEX_PAIR_ID
        .captures(url)
        .or_else(|| HEX_SINGLE_ID.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_short_link_id(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    let parsed = parse_lenient(url)?;
    let host = parsed.host_str()?;
    if !host.contains("goo.gl") {
        return None;
    }
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_from_resolved_url_wins() {
        let id = extract_place_id(
            "https://maps.app.goo.gl/AbCd123",
            "https://www.google.com/maps?cid=1234567890&hl=en",
        );
        assert_eq!(id, "cid:1234567890");
    }

    #[test]
    fn non_numeric_cid_is_ignored() {
        let id = extract_place_id("https://www.google.com/maps?cid=abc", "");
        assert!(id.starts_with("hash:"));
    }

    #[test]
    fn hex_id_with_colon_is_returned_verbatim() {
        let url = "https://www.google.com/maps/place/Cafe/@1,2,17z/data=!4m6!3m5!1s0x80dc:0xABCDEF12!8m2";
        assert_eq!(extract_place_id(url, url), "0x80dc:0xABCDEF12");
    }

    #[test]
    fn short_hex_form_needs_eight_digits() {
        let long = "https://www.google.com/maps/data=!1s0x1234abcd9";
        assert_eq!(extract_place_id(long, ""), "0x1234abcd9");

        let short = "https://www.google.com/maps/data=!1s0x12ab";
        assert!(extract_place_id(short, "").starts_with("hash:"));
    }

    #[test]
    fn resolved_url_is_preferred_over_original() {
        let original = "https://www.google.com/maps?cid=111";
        let resolved = "https://www.google.com/maps?cid=222";
        assert_eq!(extract_place_id(original, resolved), "cid:222");
    }

    #[test]
    fn falls_back_to_original_when_resolved_has_nothing() {
        let original = "https://www.google.com/maps?cid=111";
        let resolved = "https://www.google.com/maps/place/Somewhere";
        assert_eq!(extract_place_id(original, resolved), "cid:111");
    }

    #[test]
    fn short_link_uses_last_segment() {
        let id = extract_place_id("https://maps.app.goo.gl/XyZ987/", "");
        assert_eq!(id, "short:XyZ987");
    }

    #[test]
    fn hash_fallback_is_deterministic_and_tracking_insensitive() {
        let a = extract_place_id(
            "https://example.com/place/?utm_source=mail&b=2&a=1",
            "",
        );
        let b = extract_place_id("https://EXAMPLE.com/place?a=1&b=2#top", "");
        assert_eq!(a, b);
        assert!(a.starts_with("hash:"));
        assert_eq!(a.len(), "hash:".len() + HASH_ID_LEN);
    }

    #[test]
    fn never_returns_empty() {
        let id = extract_place_id("", "");
        assert!(id.starts_with("hash:"));
    }

    #[test]
    fn canonicalize_strips_tracking_and_sorts() {
        let canonical = canonicalize_url(
            "https://Maps.Google.com/place/?utm_source=x&GCLID=y&b=2&a=1&ref=z#frag",
        );
        assert_eq!(canonical, "https://maps.google.com/place?a=1&b=2");
    }

    #[test]
    fn canonicalize_root_path() {
        assert_eq!(
            canonicalize_url("https://example.com//"),
            "https://example.com/"
        );
    }

    #[test]
    fn canonicalize_empty_is_empty() {
        assert_eq!(canonicalize_url(""), "");
    }
}
