//! Prometheus metrics for the notification service
//!
//! HTTP traffic is recorded by [`MetricsMiddleware`] under the matched route
//! pattern; the consumer records one outcome per record it handles.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};
use std::rc::Rc;
use std::time::{Duration, Instant};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_http_requests_total",
            "HTTP requests handled by the notification service",
        ),
        &["method", "route", "status"],
    )
    .expect("valid notification_http_requests_total definition");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("notification_http_requests_total registered once");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "notification_http_request_duration_seconds",
            "HTTP request latency for the notification service",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "route"],
    )
    .expect("valid notification_http_request_duration_seconds definition");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("notification_http_request_duration_seconds registered once");
    histogram
});

/// Records handled by the consumer, by outcome
/// (`persisted`, `decode_failure`, `persist_failure`, `read_error`)
static CONSUMER_RECORDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_consumer_records_total",
            "Event log records handled by the notification consumer",
        ),
        &["outcome"],
    )
    .expect("valid notification_consumer_records_total definition");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("notification_consumer_records_total registered once");
    counter
});

pub fn observe_http_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, route, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, route])
        .observe(elapsed.as_secs_f64());
}

pub fn record_consumer_outcome(outcome: &str) {
    CONSUMER_RECORDS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Current count for a consumer outcome
pub fn consumer_outcome_count(outcome: &str) -> u64 {
    CONSUMER_RECORDS_TOTAL.with_label_values(&[outcome]).get()
}

/// GET /metrics
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        // Route pattern keeps ids out of the label set.
        let route = req
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let result = service.call(req).await;
            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(_) => 500,
            };
            observe_http_request(&method, &route, status, start.elapsed());
            result
        })
    }
}
