//! The visitor identity travels in a `sid` cookie scoped to the whole site.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};

pub const SESSION_COOKIE: &str = "sid";

/// Returns the `sid` cookie value presented in `headers`, if any.
///
/// Every `Cookie` header is searched; the first `sid` pair wins.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
}

/// `Set-Cookie` value that hands `token` to the client.
pub fn issue(token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}; Path=/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookies: &[&'static str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(COOKIE, HeaderValue::from_static(*cookie));
        }
        headers
    }

    #[test]
    fn finds_sid_among_other_cookies() {
        let headers = headers(&["theme=dark; sid=abc-123; lang=en"]);
        assert_eq!(session_token(&headers), Some("abc-123"));
    }

    #[test]
    fn searches_every_cookie_header() {
        let headers = headers(&["theme=dark", "sid=xyz"]);
        assert_eq!(session_token(&headers), Some("xyz"));
    }

    #[test]
    fn missing_cookie_yields_none() {
        assert_eq!(session_token(&HeaderMap::new()), None);
        assert_eq!(session_token(&headers(&["sidecar=1"])), None);
    }

    #[test]
    fn empty_value_is_returned_as_empty() {
        // The resolver treats an empty token as absent.
        assert_eq!(session_token(&headers(&["sid="])), Some(""));
    }

    #[test]
    fn issued_cookie_is_site_wide() {
        assert_eq!(issue("abc").unwrap(), "sid=abc; Path=/");
    }
}
