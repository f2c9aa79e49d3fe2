//! Edge gateway for the task platform
//!
//! Resolves the backend service for each registered path, enforces bearer
//! token auth centrally and forwards the request unchanged.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod routes;

pub use config::Config;
pub use dispatcher::{configure, cors_headers, GatewayState};
pub use error::{GatewayError, UpstreamError};
pub use routes::{Endpoint, Route, RouteError, RouteTable, ENDPOINTS};
