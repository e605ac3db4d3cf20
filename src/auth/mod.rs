//! Principal extraction
//!
//! Identity issuance and verification live in front of this service;
//! by the time a request arrives, the `Authorization: Bearer` value IS
//! the authenticated principal name, or is absent for anonymous
//! requests. Collection rules decide what either may do.

use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;

/// Extract the bearer value from an Authorization header value
pub fn extract_bearer(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Resolve the request principal from headers. `None` = anonymous.
pub fn principal_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    extract_bearer(Some(header)).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer alice")), Some("alice"));
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("Basic alice")), None);
        assert_eq!(extract_bearer(None), None);
    }

    #[test]
    fn test_principal_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(principal_from_headers(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer alice"));
        assert_eq!(principal_from_headers(&headers), Some("alice".to_string()));
    }
}
