use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request id made available to handlers through request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Keeps a caller-supplied `x-request-id` when it is a sane token, otherwise
/// assigns a fresh one; either way it is echoed on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let (request_id, header_value) = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .filter(|v| is_acceptable(v))
        .and_then(|v| Some((v.to_str().ok()?.to_string(), v.clone())))
        .unwrap_or_else(fresh_id);

    req.headers_mut()
        .insert(REQUEST_ID_HEADER.clone(), header_value.clone());
    req.extensions_mut().insert(RequestId(request_id));

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER.clone(), header_value);
    response
}

fn is_acceptable(value: &HeaderValue) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 128
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn fresh_id() -> (String, HeaderValue) {
    let id = Uuid::new_v4().to_string();
    // A hyphenated UUID is always a valid header value
    let value = HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    (id, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptable_ids() {
        assert!(is_acceptable(&HeaderValue::from_static("abc-123_x.y")));
        assert!(!is_acceptable(&HeaderValue::from_static("")));
        assert!(!is_acceptable(&HeaderValue::from_static("has space")));
        assert!(!is_acceptable(&HeaderValue::from_str(&"a".repeat(129)).unwrap()));
    }

    #[test]
    fn test_fresh_id_is_uuid() {
        let (id, value) = fresh_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(value.to_str().unwrap(), id);
    }
}
