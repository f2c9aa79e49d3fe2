//! Request dispatch: authenticate, resolve, forward
//!
//! Every entry in [`ENDPOINTS`] is registered as its own route. A matched
//! request goes through, in order:
//!
//! 1. bearer token check when the endpoint requires auth (`401`, upstream is
//!    never contacted)
//! 2. service lookup in the [`RouteTable`] (`400 Service not found`)
//! 3. forwarding with the original method, path, query, headers and body;
//!    the upstream response is streamed back as is. Transport failures and
//!    the uniform deadline map to `502`. Nothing is retried.

use crate::error::{GatewayError, UpstreamError};
use crate::routes::{route_listing, Endpoint, Route, RouteTable, ENDPOINTS};
use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_web::http::{Method, StatusCode};
use actix_web::middleware::DefaultHeaders;
use actix_web::{web, HttpRequest, HttpResponse};
use crypto_core::{jwt, Principal};
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, warn};

/// Headers that describe one connection and are never forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

/// Shared, read-only state of the gateway
pub struct GatewayState {
    routes: RouteTable,
    secret: Vec<u8>,
    client: reqwest::Client,
}

impl GatewayState {
    /// `upstream_timeout` bounds every forwarded call, connect through body.
    pub fn new(
        routes: RouteTable,
        secret: impl Into<Vec<u8>>,
        upstream_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(upstream_timeout)
            // Redirects belong to the client, not the gateway.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            routes,
            secret: secret.into(),
            client,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

/// Check the `Authorization: Bearer <token>` header against `secret` at `now`.
pub fn authenticate(req: &HttpRequest, secret: &[u8], now: i64) -> Result<Principal, GatewayError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(GatewayError::MissingCredential)?;

    // Auth schemes are case-insensitive.
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.trim_start().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|t| !t.is_empty())
        .ok_or(GatewayError::InvalidCredential)?;

    jwt::validate(token, secret, now).map_err(|reason| {
        debug!(%reason, path = %req.path(), "Rejected bearer token");
        GatewayError::InvalidCredential
    })
}

async fn dispatch(
    endpoint: &'static Endpoint,
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> Result<HttpResponse, GatewayError> {
    if endpoint.auth_required {
        let principal = authenticate(&req, &state.secret, chrono::Utc::now().timestamp())?;
        debug!(subject = principal.subject, path = %req.path(), "Request authenticated");
    }

    let route = state.routes.resolve(endpoint.service).ok_or_else(|| {
        warn!(service = endpoint.service, "No target registered for service");
        GatewayError::ServiceNotFound(endpoint.service.to_string())
    })?;

    match forward(&state.client, route, &req, body).await {
        Ok(response) => {
            debug!(
                service = endpoint.service,
                status = response.status().as_u16(),
                "Upstream responded"
            );
            Ok(response)
        }
        Err(e) => {
            warn!(service = endpoint.service, error = %e, "Upstream request failed");
            Err(e.into())
        }
    }
}

/// Target URL for `path?query` under the route's base URL.
///
/// A base path on the target is kept as a prefix.
pub fn upstream_url(target: &Url, path: &str, query: &str) -> Url {
    let mut url = target.clone();
    let base = target.path().trim_end_matches('/');
    url.set_path(&format!("{base}{path}"));
    url.set_query(if query.is_empty() { None } else { Some(query) });
    url
}

async fn forward(
    client: &reqwest::Client,
    route: &Route,
    req: &HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, UpstreamError> {
    let url = upstream_url(&route.target, req.path(), req.query_string());
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

    let mut upstream_req = client.request(method, url);
    let mut forwarded_for = None;
    for (name, value) in req.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if name.as_str() == "x-forwarded-for" {
            forwarded_for = value.to_str().ok().map(str::to_string);
            continue;
        }
        upstream_req = upstream_req.header(name.as_str(), value.as_bytes());
    }
    if let Some(peer) = req.peer_addr() {
        let chain = match forwarded_for {
            Some(prior) => format!("{prior}, {}", peer.ip()),
            None => peer.ip().to_string(),
        };
        upstream_req = upstream_req.header("x-forwarded-for", chain);
    } else if let Some(prior) = forwarded_for {
        upstream_req = upstream_req.header("x-forwarded-for", prior);
    }

    let upstream = upstream_req.body(body).send().await?;

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
    let mut response = HttpResponse::build(status);
    for (name, value) in upstream.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response.append_header((name, value));
        }
    }

    Ok(response.streaming(upstream.bytes_stream()))
}

/// GET /routes
pub async fn list_routes() -> HttpResponse {
    HttpResponse::Ok().json(route_listing())
}

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// CORS headers added to every response
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add((
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ))
        .add(("Access-Control-Allow-Headers", "Content-Type, Authorization"))
}

/// Register the gateway surface. Expects `web::Data<GatewayState>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/routes", web::get().to(list_routes));

    for endpoint in ENDPOINTS {
        cfg.route(
            endpoint.path,
            web::method(endpoint.method.clone()).to(
                move |req: HttpRequest, body: web::Bytes, state: web::Data<GatewayState>| {
                    dispatch(endpoint, req, body, state)
                },
            ),
        );
    }

    // Any OPTIONS request is answered here, matched route or not.
    cfg.route("/{tail:.*}", web::method(Method::OPTIONS).to(preflight));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    const SECRET: &[u8] = b"dispatcher-test-secret-dispatcher-test";

    #[test]
    fn test_upstream_url_keeps_path_and_query() {
        let target = Url::parse("http://task-service:8082").unwrap();
        let url = upstream_url(&target, "/api/tasks/5", "expand=assignee&x=1");
        assert_eq!(url.as_str(), "http://task-service:8082/api/tasks/5?expand=assignee&x=1");
    }

    #[test]
    fn test_upstream_url_with_base_path() {
        let target = Url::parse("http://proxy.internal/users/").unwrap();
        let url = upstream_url(&target, "/api/users/login", "");
        assert_eq!(url.as_str(), "http://proxy.internal/users/api/users/login");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("host"));
        assert!(!is_hop_by_hop("authorization"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn test_authenticate_missing_header() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            authenticate(&req, SECRET, 0),
            Err(GatewayError::MissingCredential)
        ));
    }

    #[test]
    fn test_authenticate_requires_bearer_scheme() {
        let token = jwt::issue_token(1, 2_000_000_000, SECRET).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Token {token}")))
            .to_http_request();
        assert!(matches!(
            authenticate(&req, SECRET, 1_700_000_000),
            Err(GatewayError::InvalidCredential)
        ));
    }

    #[test]
    fn test_authenticate_scheme_is_case_insensitive() {
        let token = jwt::issue_token(42, 2_000_000_000, SECRET).unwrap();
        for scheme in ["bearer", "BEARER", "BeArEr"] {
            let req = TestRequest::default()
                .insert_header(("Authorization", format!("{scheme} {token}")))
                .to_http_request();

            let principal = authenticate(&req, SECRET, 1_700_000_000).unwrap();
            assert_eq!(principal.subject, 42, "scheme {scheme}");
        }
    }

    #[test]
    fn test_authenticate_empty_bearer_token() {
        for value in ["Bearer", "Bearer ", "bearer    "] {
            let req = TestRequest::default()
                .insert_header(("Authorization", value))
                .to_http_request();
            assert!(
                matches!(
                    authenticate(&req, SECRET, 1_700_000_000),
                    Err(GatewayError::InvalidCredential)
                ),
                "header {value:?}"
            );
        }
    }

    #[test]
    fn test_authenticate_valid_token() {
        let token = jwt::issue_token(42, 2_000_000_000, SECRET).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();

        let principal = authenticate(&req, SECRET, 1_700_000_000).unwrap();
        assert_eq!(principal.subject, 42);
    }

    #[test]
    fn test_authenticate_expired_token() {
        let token = jwt::issue_token(42, 1_700_000_000, SECRET).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_http_request();

        assert!(matches!(
            authenticate(&req, SECRET, 1_700_000_000),
            Err(GatewayError::InvalidCredential)
        ));
    }
}
