//! Request handling and transformation.
//!
//! # Responsibilities
//! - Tag every request with a correlation ID (`X-Request-ID`)
//! - Prepare the admitted request for forwarding to a backend
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A caller-supplied ID is kept; otherwise a UUID v4 is generated
//! - Forwarded requests never carry hop-by-hop headers

use std::net::IpAddr;

use axum::{
    body::Body,
    http::{
        header::{self, HeaderName, HeaderValue},
        uri::{Authority, PathAndQuery, Scheme},
        Request, Uri,
    },
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::http::response::strip_hop_by_hop;
use crate::http::websocket::is_upgrade_request;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Generates UUID v4 request IDs for requests that arrive without one.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Correlation ID of `request`, or `"-"` when none is set.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// Rewrite `request` in place so it targets `backend` at `upstream_path`.
///
/// The query string is preserved. Hop-by-hop headers are dropped except on
/// protocol upgrades, `Host` names the backend and the peer address is
/// appended to `X-Forwarded-For`.
pub fn prepare_forward(
    request: &mut Request<Body>,
    backend: &Authority,
    upstream_path: &str,
    peer: Option<IpAddr>,
) -> Result<(), axum::http::Error> {
    let path_and_query = match request.uri().query() {
        Some(query) => format!("{upstream_path}?{query}"),
        None => upstream_path.to_string(),
    };

    let uri = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(backend.clone())
        .path_and_query(PathAndQuery::try_from(path_and_query)?)
        .build()?;
    *request.uri_mut() = uri;

    let upgrade = is_upgrade_request(request);
    let headers = request.headers_mut();
    if !upgrade {
        strip_hop_by_hop(headers);
    }

    headers.insert(header::HOST, HeaderValue::from_str(backend.as_str())?);

    if let Some(ip) = peer {
        let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip.to_string(),
        };
        headers.insert(X_FORWARDED_FOR.clone(), HeaderValue::from_str(&forwarded)?);
    }

    Ok(())
}
