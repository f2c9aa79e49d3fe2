use crate::error::{AppError, Result};
use crate::models::NotificationRecord;
use crate::services::EventProducer;
use crate::store::NotificationStore;
/// Notification send, list and mark-read handlers
use actix_web::{web, HttpResponse};
use event_schema::NotificationEvent;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Queue a notification event
///
/// POST /api/notifications/send
pub async fn send_notification(
    producer: web::Data<EventProducer>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let event: NotificationEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid notification event: {e}")))?;

    producer.publish(&event).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Notification queued",
    }))
}

/// List a user's notifications, newest first
///
/// GET /api/notifications/user/{user_id}
pub async fn get_user_notifications(
    store: web::Data<dyn NotificationStore>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = parse_id(&path, "user_id")?;
    let records: Vec<NotificationRecord> = store.list_by_user(user_id).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Mark a notification as read
///
/// PUT /api/notifications/{id}/read
pub async fn mark_as_read(
    store: web::Data<dyn NotificationStore>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_id(&path, "id")?;
    store.mark_read(id).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Notification marked as read",
    }))
}

fn parse_id(raw: &str, name: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("{name} must be an integer")))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/notifications")
            .route("/send", web::post().to(send_notification))
            .route("/user/{user_id}", web::get().to(get_user_notifications))
            .route("/{id}/read", web::put().to(mark_as_read)),
    );
}
