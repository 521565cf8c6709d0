//! Request statistics exposed on `/metrics`.
//!
//! Prometheus text when the client accepts `text/plain`, JSON otherwise.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::auth::ServerState;

const NAMESPACE: &str = "userapi";

/// Calls per minute of the hour; a bucket is reset when its minute comes round again.
#[derive(Debug)]
pub struct MinuteTally {
    minutes: [u64; 60],
    current: usize,
}

impl Default for MinuteTally {
    fn default() -> Self {
        Self { minutes: [0; 60], current: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rates {
    pub per_second: f64,
    pub per_minute: f64,
    pub per_hour: f64,
}

impl MinuteTally {
    fn roll(&mut self, minute: usize) {
        let minute = minute % 60;
        if minute != self.current {
            self.minutes[minute] = 0;
            self.current = minute;
        }
    }

    pub fn increment_at(&mut self, minute: usize) {
        self.roll(minute);
        self.minutes[self.current] += 1;
    }

    /// Rates extrapolated from the calls seen so far in `minute`.
    pub fn rates_at(&mut self, minute: usize) -> Rates {
        self.roll(minute);
        let per_minute = self.minutes[self.current] as f64;
        Rates { per_second: per_minute / 60.0, per_minute, per_hour: per_minute * 60.0 }
    }
}

fn minute_of_hour() -> usize {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
    ((secs / 60) % 60) as usize
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub uptime_sec: f64,
    pub total_count: u64,
    pub total_status_code_count: BTreeMap<String, u64>,
    pub total_response_time_sec: f64,
    pub average_response_time_sec: f64,
    pub rates: Rates,
}

/// Per-server metric set on a private registry.
pub struct Metrics {
    registry: Registry,
    responses: IntCounterVec,
    response_time: Histogram,
    uptime: Gauge,
    rate_per_second: Gauge,
    rate_per_minute: Gauge,
    rate_per_hour: Gauge,
    started: Instant,
    tally: Mutex<MinuteTally>,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), None)?;
        let responses = IntCounterVec::new(
            Opts::new("response_status_total", "Total number of requests by http status"),
            &["status"],
        )?;
        let response_time = Histogram::with_opts(
            HistogramOpts::new("response_time_seconds", "Time spent handling requests")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        let uptime = Gauge::new("uptime_seconds", "How many seconds the app has been up")?;
        let rate_per_second = Gauge::new("response_rate_per_second", "Requests/Second")?;
        let rate_per_minute = Gauge::new("response_rate_per_minute", "Requests/Minute")?;
        let rate_per_hour = Gauge::new("response_rate_per_hour", "Requests/Hour")?;
        registry.register(Box::new(responses.clone()))?;
        registry.register(Box::new(response_time.clone()))?;
        registry.register(Box::new(uptime.clone()))?;
        registry.register(Box::new(rate_per_second.clone()))?;
        registry.register(Box::new(rate_per_minute.clone()))?;
        registry.register(Box::new(rate_per_hour.clone()))?;
        Ok(Self {
            registry,
            responses,
            response_time,
            uptime,
            rate_per_second,
            rate_per_minute,
            rate_per_hour,
            started: Instant::now(),
            tally: Mutex::new(MinuteTally::default()),
        })
    }

    pub fn observe(&self, status: StatusCode, elapsed_secs: f64) {
        self.responses.with_label_values(&[status.as_str()]).inc();
        self.response_time.observe(elapsed_secs);
        self.tally.lock().unwrap_or_else(|p| p.into_inner()).increment_at(minute_of_hour());
    }

    fn refresh_gauges(&self) -> Rates {
        let rates = self.tally.lock().unwrap_or_else(|p| p.into_inner()).rates_at(minute_of_hour());
        self.uptime.set(self.started.elapsed().as_secs_f64());
        self.rate_per_second.set(rates.per_second);
        self.rate_per_minute.set(rates.per_minute);
        self.rate_per_hour.set(rates.per_hour);
        rates
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let rates = self.refresh_gauges();
        let mut by_status = BTreeMap::new();
        let mut total = 0;
        for family in self.registry.gather() {
            if !family.get_name().ends_with("response_status_total") {
                continue;
            }
            for metric in family.get_metric() {
                let status = metric
                    .get_label()
                    .iter()
                    .find(|l| l.get_name() == "status")
                    .map(|l| l.get_value().to_string())
                    .unwrap_or_default();
                let count = metric.get_counter().get_value() as u64;
                total += count;
                by_status.insert(status, count);
            }
        }
        let total_time = self.response_time.get_sample_sum();
        let samples = self.response_time.get_sample_count();
        StatsSnapshot {
            uptime_sec: self.started.elapsed().as_secs_f64(),
            total_count: total,
            total_status_code_count: by_status,
            total_response_time_sec: total_time,
            average_response_time_sec: if samples > 0 { total_time / samples as f64 } else { 0.0 },
            rates,
        }
    }

    /// Prometheus text exposition of the registry.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        self.refresh_gauges();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Middleware: count every response and its latency.
pub async fn record_call(State(state): State<ServerState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let resp = next.run(req).await;
    state.metrics.observe(resp.status(), started.elapsed().as_secs_f64());
    resp
}

pub async fn statistics(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if accept.contains("text/plain") {
        return match state.metrics.encode() {
            Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}")).into_response(),
        };
    }
    Json(state.metrics.snapshot()).into_response()
}
