//! Call telemetry: a bounded event ring plus running counters.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sa_protocol::{TelemetryEvent, Via};
use sa_router::TelemetryConfig;
use serde::Serialize;

/// Interpreter tokens assumed saved by each direct call.
pub const TOKENS_SAVED_PER_DIRECT_CALL: u64 = 500;
const LATENCY_WINDOW: usize = 1000;
const EXPORT_EVENTS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub total_calls: u64,
    pub direct_calls: u64,
    pub llm_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub tokens_used: u64,
    pub tokens_saved: u64,
    pub cache_hit_rate: f64,
    /// `direct_calls / total_calls`.
    pub short_circuit_rate: f64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointStats {
    pub calls: u64,
    pub direct: u64,
    pub llm: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub avg_confidence: f64,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
}

/// Event selection for [`Telemetry::events`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub since: Option<DateTime<Utc>>,
    pub endpoint: Option<String>,
    pub via: Option<Via>,
}

impl EventFilter {
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn via(mut self, via: Via) -> Self {
        self.via = Some(via);
        self
    }

    fn matches(&self, event: &TelemetryEvent) -> bool {
        self.since.is_none_or(|since| event.timestamp >= since)
            && self.endpoint.as_deref().is_none_or(|e| event.endpoint == e)
            && self.via.is_none_or(|v| event.via == v)
    }
}

/// Serialisable telemetry snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryExport {
    pub timestamp: DateTime<Utc>,
    pub summary: TelemetrySummary,
    pub endpoint_stats: BTreeMap<String, EndpointStats>,
    pub recent_events: Vec<TelemetryEvent>,
}

#[derive(Debug)]
struct State {
    events: VecDeque<TelemetryEvent>,
    latencies: VecDeque<f64>,
    counters: TelemetrySummary,
    last_export: Instant,
}

impl State {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
            latencies: VecDeque::new(),
            counters: TelemetrySummary::default(),
            last_export: Instant::now(),
        }
    }

    fn summary(&self) -> TelemetrySummary {
        let c = &self.counters;
        let rate = |n: u64| ratio(n, c.total_calls);
        let latencies: Vec<f64> = self.latencies.iter().copied().collect();
        TelemetrySummary {
            cache_hit_rate: rate(c.cache_hits),
            short_circuit_rate: rate(c.direct_calls),
            success_rate: rate(c.successes),
            avg_latency_ms: mean(&latencies),
            p50_latency_ms: median(&latencies),
            p95_latency_ms: p95(&latencies),
            ..c.clone()
        }
    }
}

/// Thread-safe telemetry recorder.
#[derive(Debug)]
pub struct Telemetry {
    enabled: bool,
    capacity: usize,
    export_interval: Duration,
    state: Mutex<State>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(&TelemetryConfig::default())
    }
}

impl Telemetry {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            capacity: config.capacity.max(1),
            export_interval: Duration::from_secs(config.export_interval_secs),
            state: Mutex::new(State::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one event and update the counters. No-op when disabled.
    pub fn record(&self, event: TelemetryEvent) {
        if !self.enabled {
            return;
        }
        let mut state = self.state();

        let c = &mut state.counters;
        c.total_calls += 1;
        match event.via {
            Via::Direct => {
                c.direct_calls += 1;
                c.tokens_saved += TOKENS_SAVED_PER_DIRECT_CALL;
            }
            Via::Llm => {
                c.llm_calls += 1;
                c.tokens_used += event.tokens;
            }
        }
        if event.cache_hit {
            c.cache_hits += 1;
        }
        if event.success {
            c.successes += 1;
        } else {
            c.failures += 1;
        }

        if state.latencies.len() == LATENCY_WINDOW {
            state.latencies.pop_front();
        }
        state.latencies.push_back(event.latency_ms);
        if state.events.len() == self.capacity {
            state.events.pop_front();
        }
        state.events.push_back(event);

        if state.last_export.elapsed() > self.export_interval {
            state.last_export = Instant::now();
            let s = state.summary();
            tracing::info!(
                total_calls = s.total_calls,
                short_circuit_rate = s.short_circuit_rate,
                cache_hit_rate = s.cache_hit_rate,
                success_rate = s.success_rate,
                p95_latency_ms = s.p95_latency_ms,
                tokens_saved = s.tokens_saved,
                "telemetry summary"
            );
        }
    }

    pub fn summary(&self) -> TelemetrySummary {
        self.state().summary()
    }

    /// Aggregates per endpoint over the retained events.
    pub fn endpoint_stats(&self) -> BTreeMap<String, EndpointStats> {
        let state = self.state();
        let mut grouped: BTreeMap<&str, Vec<&TelemetryEvent>> = BTreeMap::new();
        for event in &state.events {
            grouped
                .entry(event.endpoint.as_str())
                .or_default()
                .push(event);
        }

        grouped
            .into_iter()
            .map(|(endpoint, events)| {
                let calls = events.len() as u64;
                let count = |f: fn(&TelemetryEvent) -> bool| {
                    events.iter().filter(|e| f(e)).count() as u64
                };
                let successes = count(|e| e.success);
                let cache_hits = count(|e| e.cache_hit);
                let latencies: Vec<f64> = events.iter().map(|e| e.latency_ms).collect();
                let confidences: Vec<f64> = events.iter().filter_map(|e| e.confidence).collect();
                let stats = EndpointStats {
                    calls,
                    direct: count(|e| e.via == Via::Direct),
                    llm: count(|e| e.via == Via::Llm),
                    successes,
                    failures: calls - successes,
                    cache_hits,
                    avg_latency_ms: mean(&latencies),
                    p95_latency_ms: p95(&latencies),
                    avg_confidence: mean(&confidences),
                    success_rate: ratio(successes, calls),
                    cache_hit_rate: ratio(cache_hits, calls),
                };
                (endpoint.to_string(), stats)
            })
            .collect()
    }

    pub fn events(&self, filter: &EventFilter) -> Vec<TelemetryEvent> {
        self.state()
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn export(&self) -> TelemetryExport {
        let endpoint_stats = self.endpoint_stats();
        let mut state = self.state();
        state.last_export = Instant::now();
        let skip = state.events.len().saturating_sub(EXPORT_EVENTS);
        TelemetryExport {
            timestamp: Utc::now(),
            summary: state.summary(),
            endpoint_stats,
            recent_events: state.events.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn reset(&self) {
        *self.state() = State::new();
    }
}

fn ratio(n: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 / total as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

fn median(values: &[f64]) -> f64 {
    let v = sorted(values);
    let n = v.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => v[n / 2],
        _ => (v[n / 2 - 1] + v[n / 2]) / 2.0,
    }
}

/// 19th of 20 exclusive-method quantiles above 20 samples, else the max.
fn p95(values: &[f64]) -> f64 {
    let v = sorted(values);
    let len = v.len();
    if len <= 20 {
        return v.last().copied().unwrap_or(0.0);
    }
    let (i, n) = (19, 20);
    let m = len + 1;
    let j = (i * m / n).clamp(1, len - 1);
    let delta = (i * m) as f64 - (j * n) as f64;
    (v[j - 1] * (n as f64 - delta) + v[j] * delta) / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(capacity: usize) -> Telemetry {
        Telemetry::new(&TelemetryConfig {
            capacity,
            ..TelemetryConfig::default()
        })
    }

    fn event(endpoint: &str, via: Via, latency: f64) -> TelemetryEvent {
        TelemetryEvent::new(endpoint, via).latency(latency)
    }

    // ── counters ──

    #[test]
    fn short_circuit_rate_is_exact() {
        let t = telemetry(100);
        for _ in 0..7 {
            t.record(event("list_todos", Via::Direct, 1.0));
        }
        for _ in 0..3 {
            t.record(event("llm_fallback", Via::Llm, 1.0).tokens(120));
        }
        let s = t.summary();
        assert_eq!(s.total_calls, 10);
        assert_eq!(s.short_circuit_rate, 7.0 / 10.0);
        assert_eq!(s.tokens_saved, 7 * TOKENS_SAVED_PER_DIRECT_CALL);
        assert_eq!(s.tokens_used, 360);
    }

    #[test]
    fn success_and_cache_counters() {
        let t = telemetry(100);
        t.record(event("a", Via::Direct, 1.0).cache_hit(true));
        t.record(event("a", Via::Direct, 1.0).success(false));
        let s = t.summary();
        assert_eq!(s.successes, 1);
        assert_eq!(s.failures, 1);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.cache_hit_rate, 0.5);
        assert_eq!(s.success_rate, 0.5);
    }

    #[test]
    fn disabled_records_nothing() {
        let t = Telemetry::new(&TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        });
        t.record(event("a", Via::Direct, 1.0));
        assert_eq!(t.summary().total_calls, 0);
        assert!(t.events(&EventFilter::default()).is_empty());
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let s = telemetry(10).summary();
        assert_eq!(s, TelemetrySummary::default());
    }

    // ── ring buffer ──

    #[test]
    fn ring_drops_oldest() {
        let t = telemetry(3);
        for i in 0..5 {
            t.record(event(&format!("e{i}"), Via::Direct, 1.0));
        }
        let names: Vec<String> = t
            .events(&EventFilter::default())
            .into_iter()
            .map(|e| e.endpoint)
            .collect();
        assert_eq!(names, ["e2", "e3", "e4"]);
        assert_eq!(t.summary().total_calls, 5);
    }

    // ── latency ──

    #[test]
    fn latency_small_sample_uses_max() {
        let t = telemetry(100);
        for l in [10.0, 30.0, 20.0] {
            t.record(event("a", Via::Direct, l));
        }
        let s = t.summary();
        assert_eq!(s.avg_latency_ms, 20.0);
        assert_eq!(s.p50_latency_ms, 20.0);
        assert_eq!(s.p95_latency_ms, 30.0);
    }

    #[test]
    fn p95_exclusive_quantile() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        // m = 101, j = 95, delta = 19*101 - 95*20 = 19
        let expected = (95.0 * 1.0 + 96.0 * 19.0) / 20.0;
        assert!((p95(&values) - expected).abs() < 1e-9);
        assert_eq!(median(&values), 50.5);
    }

    // ── queries ──

    #[test]
    fn endpoint_stats_per_endpoint() {
        let t = telemetry(100);
        t.record(event("a", Via::Direct, 10.0).confidence(0.9));
        t.record(event("a", Via::Llm, 30.0).confidence(0.7).success(false));
        t.record(event("b", Via::Direct, 5.0).cache_hit(true));

        let stats = t.endpoint_stats();
        let a = &stats["a"];
        assert_eq!(a.calls, 2);
        assert_eq!(a.direct, 1);
        assert_eq!(a.llm, 1);
        assert_eq!(a.failures, 1);
        assert_eq!(a.avg_latency_ms, 20.0);
        assert!((a.avg_confidence - 0.8).abs() < 1e-9);
        assert_eq!(a.success_rate, 0.5);
        assert_eq!(stats["b"].cache_hit_rate, 1.0);
        assert_eq!(stats["b"].avg_confidence, 0.0);
    }

    #[test]
    fn filter_events() {
        let t = telemetry(100);
        let before = Utc::now();
        t.record(event("a", Via::Direct, 1.0));
        t.record(event("b", Via::Llm, 1.0));
        t.record(event("a", Via::Llm, 1.0));

        assert_eq!(t.events(&EventFilter::default().endpoint("a")).len(), 2);
        assert_eq!(t.events(&EventFilter::default().via(Via::Llm)).len(), 2);
        let both = EventFilter::default().endpoint("a").via(Via::Llm);
        assert_eq!(t.events(&both).len(), 1);
        assert_eq!(t.events(&EventFilter::default().since(before)).len(), 3);
        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(t.events(&EventFilter::default().since(future)).is_empty());
    }

    #[test]
    fn export_keeps_last_hundred_events() {
        let t = telemetry(1000);
        for i in 0..150 {
            t.record(event(&format!("e{i}"), Via::Direct, 1.0));
        }
        let export = t.export();
        assert_eq!(export.recent_events.len(), 100);
        assert_eq!(export.recent_events[0].endpoint, "e50");
        assert_eq!(export.summary.total_calls, 150);
        assert_eq!(export.endpoint_stats.len(), 150);
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["summary"]["direct_calls"], 150);
    }

    #[test]
    fn reset_clears_everything() {
        let t = telemetry(10);
        t.record(event("a", Via::Direct, 1.0));
        t.reset();
        assert_eq!(t.summary().total_calls, 0);
        assert!(t.endpoint_stats().is_empty());
    }
}
