//! RFC 7234 freshness arithmetic.

use std::time::{Duration, SystemTime};

use http::header::{EXPIRES, PRAGMA};
use http::HeaderMap;

use crate::clock::Clock;
use crate::control::CacheControl;
use crate::date;

/// Whether a stored response may be served as-is, must be revalidated, or
/// the request forbids cache use outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Transparent,
}

/// Evaluate a stored response against an incoming request.
///
/// Age is measured from the response's `Date` header; a missing or
/// unparseable `Date` counts the response as just received. Fresh means
/// strictly `age < lifetime` after the request directives (`max-age` cap,
/// `min-fresh`, `max-stale`) are applied.
pub fn evaluate(resp_headers: &HeaderMap, req_headers: &HeaderMap, clock: &dyn Clock) -> Freshness {
    let req_cc = CacheControl::parse(req_headers);
    if req_cc.has("no-cache") || pragma_no_cache(req_headers) {
        return Freshness::Transparent;
    }
    let resp_cc = CacheControl::parse(resp_headers);
    if resp_cc.has("no-cache") || resp_cc.has("must-revalidate") || req_cc.has("must-revalidate") {
        return Freshness::Stale;
    }

    let date = date::date_of(resp_headers);
    let mut age = date.map(|d| clock.since(d)).unwrap_or(Duration::ZERO);

    let mut lifetime = response_lifetime(resp_headers, &resp_cc, date);
    if req_cc.has("max-age") {
        lifetime = lifetime.min(req_cc.seconds("max-age").unwrap_or(Duration::ZERO));
    }
    if let Some(min_fresh) = req_cc.seconds("min-fresh") {
        age += min_fresh;
    }
    if let Some(arg) = req_cc.get("max-stale") {
        if arg.is_empty() {
            // Bare max-stale: the client accepts any staleness.
            return Freshness::Fresh;
        }
        if let Some(slack) = req_cc.seconds("max-stale") {
            age = age.saturating_sub(slack);
        }
    }

    if age < lifetime {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}

/// Freshness lifetime of a stored response: `max-age` wins over `Expires`;
/// zero when neither applies. `Expires` needs a `Date` anchor.
pub(crate) fn response_lifetime(
    headers: &HeaderMap,
    cc: &CacheControl,
    date: Option<SystemTime>,
) -> Duration {
    if cc.has("max-age") {
        return cc.seconds("max-age").unwrap_or(Duration::ZERO);
    }
    if let Some(raw) = headers.get(EXPIRES).and_then(|value| value.to_str().ok()) {
        if let (Some(expires), Some(date)) = (date::parse_http_date(raw), date) {
            return expires.duration_since(date).unwrap_or(Duration::ZERO);
        }
    }
    Duration::ZERO
}

/// Whether a stored response may paper over an origin failure right now.
///
/// The request directive overrides the response one when both carry
/// values; a bare `stale-if-error` in either grants an unbounded window.
/// The valued form allows `lifetime + N` seconds past `Date`.
pub fn allows_stale_on_error(
    resp_headers: &HeaderMap,
    req_headers: &HeaderMap,
    clock: &dyn Clock,
) -> bool {
    let resp_cc = CacheControl::parse(resp_headers);
    let req_cc = CacheControl::parse(req_headers);

    let mut window = None;
    for cc in [&resp_cc, &req_cc] {
        if let Some(arg) = cc.get("stale-if-error") {
            if arg.is_empty() {
                return true;
            }
            match cc.seconds("stale-if-error") {
                Some(slack) => window = Some(slack),
                None => return false,
            }
        }
    }

    let Some(slack) = window else { return false };
    let Some(date) = date::date_of(resp_headers) else {
        return false;
    };
    let lifetime = response_lifetime(resp_headers, &resp_cc, Some(date));
    clock.since(date) < lifetime + slack
}

fn pragma_no_cache(headers: &HeaderMap) -> bool {
    headers
        .get(PRAGMA)
        .and_then(|value| value.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("no-cache"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use http::header::DATE;
    use http::HeaderValue;

    use crate::clock::SystemClock;

    use super::*;

    struct FakeClock(Duration);

    impl Clock for FakeClock {
        fn since(&self, _earlier: SystemTime) -> Duration {
            self.0
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    fn dated(extra: &[(&str, &str)]) -> HeaderMap {
        let mut map = headers(extra);
        let now = date::fmt_http_date(SystemTime::now());
        map.insert(DATE, HeaderValue::from_str(&now).unwrap());
        map
    }

    #[test]
    fn request_no_cache_is_transparent() {
        let resp = headers(&[("cache-control", "max-age=7200")]);
        let req = headers(&[("cache-control", "no-cache")]);
        assert_eq!(evaluate(&resp, &req, &SystemClock), Freshness::Transparent);
    }

    #[test]
    fn pragma_no_cache_is_transparent() {
        let resp = headers(&[("cache-control", "max-age=7200")]);
        let req = headers(&[("pragma", "no-cache")]);
        assert_eq!(evaluate(&resp, &req, &SystemClock), Freshness::Transparent);
    }

    #[test]
    fn response_no_cache_is_stale() {
        let resp = headers(&[
            ("cache-control", "no-cache"),
            ("expires", "Wed, 19 Apr 3000 11:43:00 GMT"),
        ]);
        assert_eq!(
            evaluate(&resp, &HeaderMap::new(), &SystemClock),
            Freshness::Stale
        );
    }

    #[test]
    fn must_revalidate_is_stale_from_either_side() {
        let req = headers(&[("cache-control", "must-revalidate")]);
        assert_eq!(
            evaluate(&HeaderMap::new(), &req, &SystemClock),
            Freshness::Stale
        );

        let resp = headers(&[("cache-control", "must-revalidate")]);
        assert_eq!(
            evaluate(&resp, &HeaderMap::new(), &SystemClock),
            Freshness::Stale
        );
    }

    #[test]
    fn expires_bounds_freshness() {
        let now = SystemTime::now();
        let resp = headers(&[
            ("date", &date::fmt_http_date(now)),
            (
                "expires",
                &date::fmt_http_date(now + Duration::from_secs(2)),
            ),
        ]);

        let req = HeaderMap::new();
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::ZERO)),
            Freshness::Fresh
        );
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::from_secs(3))),
            Freshness::Stale
        );
    }

    #[test]
    fn max_age_bounds_freshness() {
        let resp = dated(&[("cache-control", "max-age=2")]);
        let req = HeaderMap::new();
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::ZERO)),
            Freshness::Fresh
        );
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::from_secs(3))),
            Freshness::Stale
        );
    }

    #[test]
    fn max_age_zero_is_immediately_stale() {
        let resp = dated(&[("cache-control", "max-age=0")]);
        assert_eq!(
            evaluate(&resp, &HeaderMap::new(), &FakeClock(Duration::ZERO)),
            Freshness::Stale
        );
    }

    #[test]
    fn request_max_age_caps_lifetime() {
        let resp = dated(&[("cache-control", "max-age=2")]);
        let req = headers(&[("cache-control", "max-age=0")]);
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::ZERO)),
            Freshness::Stale
        );
    }

    #[test]
    fn min_fresh_demands_remaining_lifetime() {
        let now = SystemTime::now();
        let resp = headers(&[
            ("date", &date::fmt_http_date(now)),
            (
                "expires",
                &date::fmt_http_date(now + Duration::from_secs(2)),
            ),
        ]);

        let req = headers(&[("cache-control", "min-fresh=1")]);
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::ZERO)),
            Freshness::Fresh
        );

        let req = headers(&[("cache-control", "min-fresh=2")]);
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::ZERO)),
            Freshness::Stale
        );
    }

    #[test]
    fn bare_max_stale_accepts_anything() {
        let resp = dated(&[("cache-control", "max-age=20")]);
        let req = headers(&[("cache-control", "max-stale")]);
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::from_secs(10))),
            Freshness::Fresh
        );
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::from_secs(60))),
            Freshness::Fresh
        );
    }

    #[test]
    fn valued_max_stale_extends_lifetime() {
        let resp = dated(&[("cache-control", "max-age=10")]);
        let req = headers(&[("cache-control", "max-stale=20")]);
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::from_secs(5))),
            Freshness::Fresh
        );
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::from_secs(15))),
            Freshness::Fresh
        );
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::from_secs(30))),
            Freshness::Stale
        );
    }

    #[test]
    fn missing_date_counts_as_just_received() {
        let resp = headers(&[("cache-control", "max-age=60")]);
        assert_eq!(
            evaluate(&resp, &HeaderMap::new(), &SystemClock),
            Freshness::Fresh
        );
    }

    #[test]
    fn stale_if_error_bare_is_unbounded() {
        let resp = dated(&[("cache-control", "no-cache, stale-if-error")]);
        let req = HeaderMap::new();
        assert!(allows_stale_on_error(
            &resp,
            &req,
            &FakeClock(Duration::from_secs(1_000_000))
        ));
    }

    #[test]
    fn stale_if_error_window_is_lifetime_plus_slack() {
        let resp = dated(&[("cache-control", "no-cache")]);
        let req = headers(&[("cache-control", "stale-if-error=100")]);
        assert!(allows_stale_on_error(
            &resp,
            &req,
            &FakeClock(Duration::from_secs(50))
        ));
        assert!(!allows_stale_on_error(
            &resp,
            &req,
            &FakeClock(Duration::from_secs(200))
        ));
    }

    #[test]
    fn stale_if_error_needs_a_date_anchor() {
        let resp = headers(&[("cache-control", "stale-if-error=100")]);
        assert!(!allows_stale_on_error(
            &resp,
            &HeaderMap::new(),
            &FakeClock(Duration::ZERO)
        ));
    }

    #[test]
    fn cache_control_directives_ignore_unlisted_headers() {
        let resp = dated(&[("cache-control", "max-age=2")]);
        let req = headers(&[("accept", "text/plain")]);
        assert_eq!(
            evaluate(&resp, &req, &FakeClock(Duration::ZERO)),
            Freshness::Fresh
        );
    }
}
