//! Hop-by-hop / end-to-end header classification and small helpers.

use http::header::{HeaderMap, HeaderName, CONNECTION};

/// Hop-by-hop headers enumerated by RFC 7230 section 6.1.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// Names listed as tokens in the block's own `Connection` value.
fn connection_options(headers: &HeaderMap) -> Vec<String> {
    let mut options = Vec::new();
    for value in headers.get_all(CONNECTION) {
        let Ok(raw) = value.to_str() else { continue };
        for token in raw.split(',') {
            let token = token.trim();
            if !token.is_empty() {
                options.push(token.to_ascii_lowercase());
            }
        }
    }
    options
}

/// Header names in `headers` that are end-to-end: not hop-by-hop and not
/// named by the block's own `Connection` value.
pub fn end_to_end_headers(headers: &HeaderMap) -> Vec<HeaderName> {
    let connection = connection_options(headers);
    headers
        .keys()
        .filter(|name| {
            !is_hop_by_hop(name.as_str()) && !connection.iter().any(|c| c == name.as_str())
        })
        .cloned()
        .collect()
}

/// Drop hop-by-hop headers, and everything the block's `Connection` value
/// names, in place. Applied to the header block before it is stored.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let mut drop: Vec<HeaderName> = connection_options(headers)
        .iter()
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();
    for name in headers.keys() {
        if is_hop_by_hop(name.as_str()) {
            drop.push(name.clone());
        }
    }
    for name in drop {
        while headers.remove(&name).is_some() {}
    }
}

/// Tokens of a comma-separated header, lowercased, across all its values.
pub fn comma_tokens(headers: &HeaderMap, name: &HeaderName) -> Vec<String> {
    let mut tokens = Vec::new();
    for value in headers.get_all(name) {
        let Ok(raw) = value.to_str() else { continue };
        for token in raw.split(',') {
            let token = token.trim();
            if !token.is_empty() {
                tokens.push(token.to_ascii_lowercase());
            }
        }
    }
    tokens
}

/// All values of `name` joined with ", "; `None` when the header is absent.
pub fn joined_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}
