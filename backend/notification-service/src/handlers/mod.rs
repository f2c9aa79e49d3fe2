/// HTTP handlers for the notification service API
pub mod notifications;

pub use notifications::register_routes;
