#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;

use timegate::cache::CacheStore;
use timegate::extent::Extent;
use timegate::index::{CacheIndex, IndexOptions};
use timegate::origin::{BoxFuture, OriginClient};
use timegate::proxy::{DeltaProxy, OriginOptions};
use timegate::timeseries::{encode_samples, OriginRequest, Sample, TimeRangeQuery};

/// Deterministic sample grid for an extent: one sample per step, value
/// equal to its timestamp.
pub fn sample_grid(extent: Extent, step: i64) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut ts = extent.start;
    while ts <= extent.end {
        samples.push(Sample {
            timestamp: ts,
            value: ts as f64,
        });
        ts += step;
    }
    samples
}

/// In-process origin double: serves the sample grid for every requested
/// extent, records each fetch, and can fail or delay on demand.
pub struct ScriptedOrigin {
    calls: Mutex<Vec<Extent>>,
    fail_from: Option<i64>,
    delay: Option<Duration>,
}

impl ScriptedOrigin {
    pub fn new() -> Arc<ScriptedOrigin> {
        Arc::new(ScriptedOrigin {
            calls: Mutex::new(Vec::new()),
            fail_from: None,
            delay: None,
        })
    }

    /// Fail every fetch whose extent starts at or after `ts`.
    pub fn failing_from(ts: i64) -> Arc<ScriptedOrigin> {
        Arc::new(ScriptedOrigin {
            calls: Mutex::new(Vec::new()),
            fail_from: Some(ts),
            delay: None,
        })
    }

    pub fn with_delay(delay: Duration) -> Arc<ScriptedOrigin> {
        Arc::new(ScriptedOrigin {
            calls: Mutex::new(Vec::new()),
            fail_from: None,
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> Vec<Extent> {
        self.calls.lock().expect("origin calls").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("origin calls").len()
    }
}

impl OriginClient for ScriptedOrigin {
    fn fetch(&self, req: OriginRequest) -> BoxFuture<Result<Vec<Sample>>> {
        let delay = self.delay;
        let fail_from = self.fail_from;
        self.calls.lock().expect("origin calls").push(req.extent);
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(fail_from) = fail_from {
                if req.extent.start >= fail_from {
                    return Err(anyhow!("scripted failure for {}", req.extent));
                }
            }
            Ok(sample_grid(req.extent, req.step.as_secs() as i64))
        })
    }
}

pub fn engine(origin: Arc<dyn OriginClient>, opts: OriginOptions) -> Harness {
    engine_with_index(origin, opts, IndexOptions::default())
}

pub fn engine_with_index(
    origin: Arc<dyn OriginClient>,
    opts: OriginOptions,
    index_opts: IndexOptions,
) -> Harness {
    let store = Arc::new(CacheStore::new());
    let index = Arc::new(CacheIndex::new(index_opts));
    Harness {
        proxy: Arc::new(DeltaProxy::new(
            origin,
            Arc::clone(&store),
            Arc::clone(&index),
            opts,
        )),
        store,
        index,
    }
}

pub struct Harness {
    pub proxy: Arc<DeltaProxy>,
    pub store: Arc<CacheStore>,
    pub index: Arc<CacheIndex>,
}

pub fn trq(statement: &str, start: i64, end: i64, step_secs: u64) -> TimeRangeQuery {
    TimeRangeQuery::new(
        statement,
        Extent::new(start, end),
        Duration::from_secs(step_secs),
        "http://origin.local/api/query_range".parse().expect("template"),
    )
}

/// Hyper-backed origin for exercising the HTTP client: answers range
/// queries with the sample grid and records every request URI.
pub struct MockOrigin {
    addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    pub async fn start() -> MockOrigin {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, mut rx) = tokio::sync::oneshot::channel();
        let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    res = listener.accept() => {
                        let (stream, _) = match res { Ok(v) => v, Err(_) => break };
                        let io = TokioIo::new(stream);
                        let seen = Arc::clone(&seen);
                        tokio::spawn(async move {
                            let service = service_fn(move |req: http::Request<Incoming>| {
                                let seen = Arc::clone(&seen);
                                async move {
                                    seen.lock().expect("mock requests").push(req.uri().to_string());
                                    Ok::<_, hyper::Error>(answer_range_query(&req))
                                }
                            });
                            let builder = ConnBuilder::new(TokioExecutor::new());
                            let _ = builder.serve_connection(io, service).await;
                        });
                    }
                }
            }
        });

        MockOrigin {
            addr,
            shutdown: Some(shutdown),
            requests,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/api/query_range", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("mock requests").clone()
    }
}

impl Drop for MockOrigin {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn answer_range_query(req: &http::Request<Incoming>) -> Response<Full<Bytes>> {
    let params = query_params(req.uri().query().unwrap_or(""));
    let (Some(start), Some(end), Some(step)) = (
        params.get("start").and_then(|v| v.parse::<i64>().ok()),
        params.get("end").and_then(|v| v.parse::<i64>().ok()),
        params.get("step").and_then(|v| v.parse::<i64>().ok()),
    ) else {
        return Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Full::new(Bytes::new()))
            .unwrap();
    };
    let samples = sample_grid(Extent::new(start, end), step.max(1));
    let body = encode_samples(&samples).expect("encode samples");
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(body))
        .unwrap()
}

fn query_params(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter_map(|pair| {
            let mut iter = pair.splitn(2, '=');
            let key = iter.next()?;
            let val = iter.next().unwrap_or("");
            Some((key.to_string(), val.to_string()))
        })
        .collect()
}
