//! Prometheus metrics for the retriever and CLI.
//!
//! Exposes:
//! - `khet_sahayak_retrieval_total` (counter by path: remote/local)
//! - `khet_sahayak_fallback_total` (counter by reason)
//! - `khet_sahayak_retrieval_duration_seconds` (histogram by path)
//! - `khet_sahayak_probe_total` / `khet_sahayak_probe_duration_seconds`
//! - `khet_sahayak_command_*` (duration, status, inflight)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::models::{Connectivity, FallbackReason};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static RETRIEVAL_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "khet_sahayak_retrieval_total",
        "Retrievals by the path that produced the result",
        &["path"]
    )
    .expect("failed to register retrieval counter")
});

static FALLBACK_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "khet_sahayak_fallback_total",
        "Online retrievals that fell back to the local index",
        &["reason"]
    )
    .expect("failed to register fallback counter")
});

static RETRIEVAL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 1ms up to ~30 seconds.
    let buckets =
        prometheus::exponential_buckets(0.001, 2.0, 16).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "khet_sahayak_retrieval_duration_seconds",
        "Retrieval duration in seconds",
        &["path"],
        buckets
    )
    .expect("failed to register retrieval duration histogram")
});

static PROBE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "khet_sahayak_probe_total",
        "Connectivity probes by outcome",
        &["state"]
    )
    .expect("failed to register probe counter")
});

static PROBE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets =
        prometheus::exponential_buckets(0.005, 2.0, 12).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "khet_sahayak_probe_duration_seconds",
        "Connectivity probe duration in seconds",
        &["state"],
        buckets
    )
    .expect("failed to register probe duration histogram")
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "khet_sahayak_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "khet_sahayak_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "khet_sahayak_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&RETRIEVAL_TOTAL);
    Lazy::force(&FALLBACK_TOTAL);
    Lazy::force(&RETRIEVAL_DURATION);
    Lazy::force(&PROBE_TOTAL);
    Lazy::force(&PROBE_DURATION);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
}

fn fallback_label(reason: &FallbackReason) -> &'static str {
    match reason {
        FallbackReason::NoRemoteConfigured => "no_remote",
        FallbackReason::Timeout => "timeout",
        FallbackReason::RemoteError(_) => "remote_error",
        FallbackReason::MalformedResponse(_) => "malformed",
    }
}

/// Count a finished retrieval; `path` is `remote` or `local`.
pub fn record_retrieval(path: &'static str, duration: Duration) {
    init_collectors();
    RETRIEVAL_TOTAL.with_label_values(&[path]).inc();
    RETRIEVAL_DURATION
        .with_label_values(&[path])
        .observe(duration.as_secs_f64());
}

pub fn record_fallback(reason: &FallbackReason) {
    init_collectors();
    FALLBACK_TOTAL
        .with_label_values(&[fallback_label(reason)])
        .inc();
}

pub fn record_probe(state: Connectivity, seconds: f64) {
    init_collectors();
    PROBE_TOTAL.with_label_values(&[state.as_str()]).inc();
    PROBE_DURATION
        .with_label_values(&[state.as_str()])
        .observe(seconds);
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

fn response_with(status: StatusCode, body: Full<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(response_with(
            StatusCode::INTERNAL_SERVER_ERROR,
            Full::from("encode error"),
        ));
    }

    let mut response = response_with(StatusCode::OK, Full::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(response_with(StatusCode::NOT_FOUND, Full::new(Bytes::new()))),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
