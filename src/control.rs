//! `Cache-Control` directive parsing.

use std::collections::HashMap;
use std::time::Duration;

use http::header::CACHE_CONTROL;
use http::HeaderMap;

/// Parsed `Cache-Control` directives: lowercase name to unquoted argument,
/// empty for the bare form. Duplicates keep the last occurrence; unknown
/// directives are preserved.
#[derive(Debug, Default, Clone)]
pub struct CacheControl {
    directives: HashMap<String, String>,
}

impl CacheControl {
    /// Parse every `Cache-Control` value present in `headers`.
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut directives = HashMap::new();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(raw) = value.to_str() else { continue };
            for token in raw.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                match token.split_once('=') {
                    Some((name, arg)) => {
                        directives.insert(
                            name.trim().to_ascii_lowercase(),
                            unquote(arg.trim()).to_owned(),
                        );
                    }
                    None => {
                        directives.insert(token.to_ascii_lowercase(), String::new());
                    }
                }
            }
        }
        CacheControl { directives }
    }

    pub fn has(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    /// Argument for `name`; empty for the bare form.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    /// Argument parsed as whole seconds. `None` when the directive is
    /// absent or its argument does not parse.
    pub fn seconds(&self, name: &str) -> Option<Duration> {
        self.get(name)
            .and_then(|arg| arg.parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for value in values {
            map.append(CACHE_CONTROL, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn empty_headers_parse_to_nothing() {
        let cc = CacheControl::parse(&HeaderMap::new());
        assert!(!cc.has("no-cache"));
    }

    #[test]
    fn bare_directive_has_empty_argument() {
        let cc = CacheControl::parse(&headers(&["no-cache"]));
        assert_eq!(cc.get("no-cache"), Some(""));
        assert!(!cc.has("foo"));
    }

    #[test]
    fn valued_directives_parse() {
        let cc = CacheControl::parse(&headers(&["no-cache, max-age=3600"]));
        assert_eq!(cc.get("no-cache"), Some(""));
        assert_eq!(cc.get("max-age"), Some("3600"));
        assert_eq!(cc.seconds("max-age"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn quoted_arguments_are_unquoted() {
        let cc = CacheControl::parse(&headers(&["max-age=\"60\""]));
        assert_eq!(cc.get("max-age"), Some("60"));
    }

    #[test]
    fn last_duplicate_wins() {
        let cc = CacheControl::parse(&headers(&["max-age=1, max-age=2"]));
        assert_eq!(cc.get("max-age"), Some("2"));
    }

    #[test]
    fn multiple_header_values_concatenate() {
        let cc = CacheControl::parse(&headers(&["no-store", "max-age=5"]));
        assert!(cc.has("no-store"));
        assert_eq!(cc.seconds("max-age"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn unparseable_seconds_is_none() {
        let cc = CacheControl::parse(&headers(&["max-age=banana, max-stale"]));
        assert!(cc.has("max-age"));
        assert_eq!(cc.seconds("max-age"), None);
        assert_eq!(cc.seconds("max-stale"), None);
    }
}
