//! Route table for the gateway
//!
//! Two pieces, both fixed at startup:
//! - [`ENDPOINTS`]: every path the gateway exposes, the backend service it
//!   belongs to and whether a bearer token is required.
//! - [`RouteTable`]: service name to forwarding target, built from
//!   configuration and shared read-only by all requests.

use actix_web::http::Method;
use reqwest::Url;
use std::collections::HashMap;
use thiserror::Error;

/// A statically registered gateway path
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    /// actix path pattern, e.g. `/api/tasks/{id}`
    pub path: &'static str,
    pub service: &'static str,
    pub auth_required: bool,
}

const fn endpoint(
    method: Method,
    path: &'static str,
    service: &'static str,
    auth_required: bool,
) -> Endpoint {
    Endpoint {
        method,
        path,
        service,
        auth_required,
    }
}

/// Every proxied path.
///
/// Web aliases (`/register`, `/login`, `/profile`, `/tasks/{id}`) carry the
/// same auth requirement as the API operation they mirror.
pub static ENDPOINTS: &[Endpoint] = &[
    // Users
    endpoint(Method::POST, "/api/users/register", "users", false),
    endpoint(Method::POST, "/api/users/login", "users", false),
    endpoint(Method::GET, "/api/users/profile/{id}", "users", true),
    endpoint(Method::GET, "/register", "users", false),
    endpoint(Method::GET, "/login", "users", false),
    endpoint(Method::GET, "/profile", "users", true),
    // Tasks
    endpoint(Method::POST, "/api/tasks", "tasks", true),
    endpoint(Method::GET, "/api/tasks", "tasks", true),
    endpoint(Method::GET, "/api/tasks/{id}", "tasks", true),
    endpoint(Method::PUT, "/api/tasks/{id}", "tasks", true),
    endpoint(Method::DELETE, "/api/tasks/{id}", "tasks", true),
    // Assignments
    endpoint(Method::POST, "/api/assignments/assign", "assignments", true),
    endpoint(Method::GET, "/api/assignments/user/{user_id}", "assignments", true),
    endpoint(Method::PUT, "/api/assignments/{id}/status", "assignments", true),
    endpoint(Method::GET, "/api/assignments", "assignments", true),
    // Notifications
    endpoint(Method::POST, "/api/notifications/send", "notifications", true),
    endpoint(Method::GET, "/api/notifications/user/{user_id}", "notifications", true),
    endpoint(Method::PUT, "/api/notifications/{id}/read", "notifications", true),
    // Dashboard
    endpoint(Method::GET, "/api/dashboard/{user_id}", "dashboard", true),
    endpoint(Method::GET, "/api/dashboard/{user_id}/tasks", "dashboard", true),
    endpoint(Method::GET, "/tasks/{id}", "dashboard", true),
];

/// Gateway-owned paths, listed by `GET /routes` alongside [`ENDPOINTS`]
pub const GATEWAY_PATHS: &[&str] = &["/health", "/routes"];

/// Forwarding target for one backend service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub service_name: String,
    pub target: Url,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid target for service {service}: {reason}")]
    InvalidTarget { service: String, reason: String },

    #[error("service {0} registered twice")]
    Duplicate(String),
}

/// Immutable service name to target mapping
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    /// Build the table from `(service name, base URL)` pairs.
    ///
    /// Fails on an unparseable URL, a scheme other than http/https, or a
    /// repeated service name.
    pub fn from_targets<I, N, U>(targets: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = (N, U)>,
        N: Into<String>,
        U: AsRef<str>,
    {
        let mut routes = HashMap::new();

        for (name, raw) in targets {
            let service_name = name.into();
            let target = Url::parse(raw.as_ref()).map_err(|e| RouteError::InvalidTarget {
                service: service_name.clone(),
                reason: e.to_string(),
            })?;

            if !matches!(target.scheme(), "http" | "https") {
                return Err(RouteError::InvalidTarget {
                    service: service_name,
                    reason: format!("unsupported scheme {}", target.scheme()),
                });
            }
            if target.cannot_be_a_base() || target.host_str().is_none() {
                return Err(RouteError::InvalidTarget {
                    service: service_name,
                    reason: "target has no host".to_string(),
                });
            }

            if routes.contains_key(&service_name) {
                return Err(RouteError::Duplicate(service_name));
            }
            routes.insert(
                service_name.clone(),
                Route {
                    service_name,
                    target,
                },
            );
        }

        Ok(Self { routes })
    }

    /// Exact-match lookup
    pub fn resolve(&self, service_name: &str) -> Option<&Route> {
        self.routes.get(service_name)
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// `"METHOD /path"` for every endpoint plus the gateway's own paths
pub fn route_listing() -> Vec<String> {
    ENDPOINTS
        .iter()
        .map(|e| format!("{} {}", e.method, e.path))
        .chain(GATEWAY_PATHS.iter().map(|p| format!("GET {p}")))
        .collect()
}
