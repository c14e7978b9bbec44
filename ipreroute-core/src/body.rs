//! Response body type shared by every branch of the handler.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode};

use crate::headers::CONTENT_TYPE;

/// Boxed error carried by streamed bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of every response produced by this crate: either fully buffered
/// (errors) or streamed from an upstream.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

/// Wraps bytes into a [`ProxyBody`].
pub fn full(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Creates a plain text response.
///
/// Falls back to a bare response if building fails, which cannot happen
/// with a valid [`StatusCode`].
///
/// # Example
///
/// ```
/// use ipreroute_core::body::create_error_response;
/// use hyper::StatusCode;
///
/// let response = create_error_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
/// assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
/// ```
pub fn create_error_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full(message))
        .unwrap_or_else(|_| Response::new(full(message)))
}
