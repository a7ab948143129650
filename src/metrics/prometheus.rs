//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec,
    TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::mirror::LocalMirror;

lazy_static::lazy_static! {
    /// Total number of reconcile passes
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "runner_pool_operator_reconciliations_total",
        "Total number of reconcile passes",
        &["kind"]
    ).unwrap();

    /// Total number of failed reconcile passes
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "runner_pool_operator_reconciliation_errors_total",
        "Total number of failed reconcile passes",
        &["kind"]
    ).unwrap();

    /// Reconcile pass duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "runner_pool_operator_reconcile_duration_seconds",
        "Duration of reconcile passes in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Runner pods created
    pub static ref PODS_CREATED: CounterVec = register_counter_vec!(
        "runner_pool_operator_pods_created_total",
        "Runner pods created per pool",
        &["namespace", "name"]
    ).unwrap();

    /// Runner pods deleted
    pub static ref PODS_DELETED: CounterVec = register_counter_vec!(
        "runner_pool_operator_pods_deleted_total",
        "Runner pods deleted per pool",
        &["namespace", "name"]
    ).unwrap();

    /// Registered runners seen on the last pass per pool
    pub static ref REGISTERED_RUNNERS: GaugeVec = register_gauge_vec!(
        "runner_pool_operator_registered_runners",
        "Registered runners reported by the registry on the last pass",
        &["namespace", "name"]
    ).unwrap();

    /// Owned pods seen on the last pass per pool
    pub static ref OWNED_PODS: GaugeVec = register_gauge_vec!(
        "runner_pool_operator_owned_pods",
        "Pods owned by the pool on the last pass",
        &["namespace", "name"]
    ).unwrap();

    /// Tasks waiting in the work queue
    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "runner_pool_operator_queue_depth",
        "Reconcile tasks waiting in the work queue"
    ).unwrap();

    /// Tasks rejected because the work queue was full
    pub static ref QUEUE_DROPPED: Counter = register_counter!(
        "runner_pool_operator_queue_dropped_total",
        "Reconcile tasks dropped because the work queue was full"
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: Gauge = register_gauge!(
        "runner_pool_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Drop every per-pool series for a pool that no longer exists
pub fn forget_pool(namespace: &str, name: &str) {
    let labels = [namespace, name];
    for gauge in [&*REGISTERED_RUNNERS, &*OWNED_PODS] {
        // Absent when the pool never completed a pass
        let _ = gauge.remove_label_values(&labels);
    }
    for counter in [&*PODS_CREATED, &*PODS_DELETED] {
        let _ = counter.remove_label_values(&labels);
    }
}

/// Start the metrics HTTP server.
///
/// `/readyz` reports 503 until the local mirror has completed its initial sync.
pub async fn serve(port: u16, mirror: LocalMirror) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    // Set initial health
    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let mirror = mirror.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let synced = mirror.has_synced();
                async move { handle_request(req, synced).await }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    synced: bool,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" if synced => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" => text_response(StatusCode::SERVICE_UNAVAILABLE, "syncing"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Generate metrics response
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
