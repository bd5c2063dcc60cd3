use std::sync::OnceLock;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

fn requests_total() -> &'static IntCounterVec {
    static METRIC: OnceLock<IntCounterVec> = OnceLock::new();
    METRIC.get_or_init(|| {
        let counter = IntCounterVec::new(
            Opts::new("timegate_requests_total", "Requests by cache status"),
            &["cache_status"],
        )
        .unwrap();
        registry().register(Box::new(counter.clone())).unwrap();
        counter
    })
}

fn origin_requests_total() -> &'static IntCounterVec {
    static METRIC: OnceLock<IntCounterVec> = OnceLock::new();
    METRIC.get_or_init(|| {
        let counter = IntCounterVec::new(
            Opts::new("timegate_origin_requests_total", "Origin fetches by result"),
            &["result"],
        )
        .unwrap();
        registry().register(Box::new(counter.clone())).unwrap();
        counter
    })
}

fn evictions_total() -> &'static IntCounter {
    static METRIC: OnceLock<IntCounter> = OnceLock::new();
    METRIC.get_or_init(|| {
        let counter = IntCounter::new(
            "timegate_cache_evictions_total",
            "Cache entries evicted by the index",
        )
        .unwrap();
        registry().register(Box::new(counter.clone())).unwrap();
        counter
    })
}

fn cache_bytes_gauge() -> &'static IntGauge {
    static METRIC: OnceLock<IntGauge> = OnceLock::new();
    METRIC.get_or_init(|| {
        let gauge = IntGauge::new("timegate_cache_size_bytes", "Cached sample bytes").unwrap();
        registry().register(Box::new(gauge.clone())).unwrap();
        gauge
    })
}

fn cache_objects_gauge() -> &'static IntGauge {
    static METRIC: OnceLock<IntGauge> = OnceLock::new();
    METRIC.get_or_init(|| {
        let gauge = IntGauge::new("timegate_cache_objects", "Cached entries").unwrap();
        registry().register(Box::new(gauge.clone())).unwrap();
        gauge
    })
}

fn init_metrics() {
    let _ = evictions_total();
    let _ = cache_bytes_gauge();
    let _ = cache_objects_gauge();
    for status in ["MISS", "HIT", "PART_HIT"] {
        requests_total().with_label_values(&[status]).inc_by(0);
    }
    for result in ["ok", "error"] {
        origin_requests_total().with_label_values(&[result]).inc_by(0);
    }
}

pub fn record_request(cache_status: &str) {
    init_metrics();
    requests_total().with_label_values(&[cache_status]).inc();
}

pub fn record_origin_fetch(ok: bool) {
    init_metrics();
    let result = if ok { "ok" } else { "error" };
    origin_requests_total().with_label_values(&[result]).inc();
}

pub fn record_eviction() {
    init_metrics();
    evictions_total().inc();
}

pub fn set_cache_usage(bytes: u64, objects: usize) {
    init_metrics();
    cache_bytes_gauge().set(bytes as i64);
    cache_objects_gauge().set(objects as i64);
}

pub fn render() -> String {
    init_metrics();
    let families = registry().gather();
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&families, &mut buf).unwrap_or(());
    String::from_utf8(buf).unwrap_or_default()
}
