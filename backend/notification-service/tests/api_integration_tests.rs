//! HTTP API tests for the notification service

use actix_web::{http::StatusCode, test, web, App};
use event_schema::NotificationEvent;
use notification_service::handlers::register_routes;
use notification_service::services::{EventSource, InMemoryEventLog};
use notification_service::{
    EventConsumer, EventProducer, InMemoryNotificationStore, NotificationStore,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn app_data(
    log: &Arc<InMemoryEventLog>,
    store: &Arc<InMemoryNotificationStore>,
) -> (web::Data<EventProducer>, web::Data<dyn NotificationStore>) {
    let producer = web::Data::new(EventProducer::new(log.clone()));
    let store: Arc<dyn NotificationStore> = store.clone();
    (producer, web::Data::from(store))
}

macro_rules! init_app {
    ($log:expr, $store:expr) => {{
        let (producer, store) = app_data($log, $store);
        test::init_service(
            App::new()
                .app_data(producer)
                .app_data(store)
                .configure(register_routes),
        )
        .await
    }};
}

#[actix_web::test]
async fn test_send_queues_event() {
    let log = Arc::new(InMemoryEventLog::new(1));
    let store = Arc::new(InMemoryNotificationStore::new());
    let app = init_app!(&log, &store);

    let req = test::TestRequest::post()
        .uri("/api/notifications/send")
        .set_json(json!({
            "user_id": 7,
            "task_id": 3,
            "event_type": "ASSIGNED",
            "message": "You were assigned task 3"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Notification queued");

    let mut source = log.subscribe("notification-service", 0).await;
    let record = source.next_record().await.unwrap();
    let event = NotificationEvent::from_payload(&record.payload).unwrap();
    assert_eq!(event, NotificationEvent::new(7, 3, "ASSIGNED", "You were assigned task 3"));
}

#[actix_web::test]
async fn test_send_with_broker_down_returns_500() {
    let log = Arc::new(InMemoryEventLog::new(1));
    log.set_available(false);
    let store = Arc::new(InMemoryNotificationStore::new());
    let app = init_app!(&log, &store);

    let req = test::TestRequest::post()
        .uri("/api/notifications/send")
        .set_json(json!({
            "user_id": 7,
            "task_id": 3,
            "event_type": "ASSIGNED",
            "message": "x"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to send notification"));
}

#[actix_web::test]
async fn test_send_invalid_json_returns_400() {
    let log = Arc::new(InMemoryEventLog::new(1));
    let store = Arc::new(InMemoryNotificationStore::new());
    let app = init_app!(&log, &store);

    let req = test::TestRequest::post()
        .uri("/api/notifications/send")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"user_id\": \"seven\"")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
    assert!(log.is_empty().await);
}

#[actix_web::test]
async fn test_list_returns_empty_array_for_unknown_user() {
    let log = Arc::new(InMemoryEventLog::new(1));
    let store = Arc::new(InMemoryNotificationStore::new());
    let app = init_app!(&log, &store);

    let req = test::TestRequest::get()
        .uri("/api/notifications/user/12345")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!([]));
}

#[actix_web::test]
async fn test_consumed_event_visible_and_mark_read_twice() {
    let log = Arc::new(InMemoryEventLog::new(1));
    let store = Arc::new(InMemoryNotificationStore::new());
    let app = init_app!(&log, &store);

    let send = test::TestRequest::post()
        .uri("/api/notifications/send")
        .set_json(json!({
            "user_id": 7,
            "task_id": 3,
            "event_type": "ASSIGNED",
            "message": "You were assigned task 3"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, send).await.status(), StatusCode::OK);

    let mut consumer = EventConsumer::new(
        log.subscribe("notification-service", 0).await,
        store.clone(),
    );
    let id = consumer.process_next().await.unwrap();

    let list = test::TestRequest::get()
        .uri("/api/notifications/user/7")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, list).await).await;
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], id);
    assert_eq!(items[0]["user_id"], 7);
    assert_eq!(items[0]["type"], "ASSIGNED");
    assert_eq!(items[0]["is_read"], false);

    for _ in 0..2 {
        let mark = test::TestRequest::put()
            .uri(&format!("/api/notifications/{id}/read"))
            .to_request();
        let resp = test::call_service(&app, mark).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Notification marked as read");
    }

    let records = store.list_by_user(7).await.unwrap();
    assert!(records[0].is_read);
}

#[actix_web::test]
async fn test_mark_read_unknown_id_returns_404() {
    let log = Arc::new(InMemoryEventLog::new(1));
    let store = Arc::new(InMemoryNotificationStore::new());
    let app = init_app!(&log, &store);

    let req = test::TestRequest::put()
        .uri("/api/notifications/999/read")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_non_numeric_ids_return_400() {
    let log = Arc::new(InMemoryEventLog::new(1));
    let store = Arc::new(InMemoryNotificationStore::new());
    let app = init_app!(&log, &store);

    let list = test::TestRequest::get()
        .uri("/api/notifications/user/abc")
        .to_request();
    assert_eq!(
        test::call_service(&app, list).await.status(),
        StatusCode::BAD_REQUEST
    );

    let mark = test::TestRequest::put()
        .uri("/api/notifications/abc/read")
        .to_request();
    assert_eq!(
        test::call_service(&app, mark).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_web::test]
async fn test_store_outage_returns_generic_500() {
    let log = Arc::new(InMemoryEventLog::new(1));
    let store = Arc::new(InMemoryNotificationStore::new());
    store.set_unavailable(true);
    let app = init_app!(&log, &store);

    let req = test::TestRequest::get()
        .uri("/api/notifications/user/7")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Notification store is unavailable");
}
