use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::domains::join_requests::models::normalize_email;
use crate::server::error::ApiError;

pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The identified caller of a request. Identity is an email; verifying it is
/// the job of whatever sits in front of this service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub email: String,
    pub name: Option<String>,
}

/// Identity middleware
///
/// Reads the caller from the `x-user-email` / `x-user-name` headers and adds
/// it to the request extensions. Requests without an email continue
/// anonymously.
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    if let Some(caller) = extract_caller(request.headers()) {
        debug!(caller = %caller.email, "Identified caller");
        request.extensions_mut().insert(caller);
    }
    next.run(request).await
}

fn extract_caller(headers: &HeaderMap) -> Option<Caller> {
    let email = header_text(headers, USER_EMAIL_HEADER)?;
    let email = normalize_email(email);
    if email.is_empty() || !email.contains('@') {
        return None;
    }

    let name = header_text(headers, USER_NAME_HEADER)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Some(Caller { email, name })
}

/// Header value as UTF-8. `HeaderValue::to_str` only takes visible ASCII,
/// which would drop accented names.
fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
}

/// Handlers taking a `Caller` reject anonymous requests with 401.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_email_is_normalized() {
        let caller = extract_caller(&headers(&[(USER_EMAIL_HEADER, " Lea@X.com ")])).unwrap();
        assert_eq!(caller.email, "lea@x.com");
        assert_eq!(caller.name, None);
    }

    #[test]
    fn test_name_is_optional() {
        let caller = extract_caller(&headers(&[
            (USER_EMAIL_HEADER, "lea@x.com"),
            (USER_NAME_HEADER, "Léa"),
        ]))
        .unwrap();
        assert_eq!(caller.name.as_deref(), Some("Léa"));
    }

    #[test]
    fn test_accented_email_is_kept() {
        let caller = extract_caller(&headers(&[
            (USER_EMAIL_HEADER, "Hélène@X.com"),
            (USER_NAME_HEADER, "  Hélène "),
        ]))
        .unwrap();
        assert_eq!(caller.email, "hélène@x.com");
        assert_eq!(caller.name.as_deref(), Some("Hélène"));
    }

    #[test]
    fn test_missing_or_invalid_email() {
        assert!(extract_caller(&HeaderMap::new()).is_none());
        assert!(extract_caller(&headers(&[(USER_EMAIL_HEADER, "not-an-email")])).is_none());
    }
}
