use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::extent::{Extent, ExtentList};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// Merge two sample sets by timestamp. Output is strictly increasing;
/// where both sets carry a boundary timestamp, the freshly fetched value
/// wins.
pub fn merge_samples(cached: Vec<Sample>, fetched: Vec<Sample>) -> Vec<Sample> {
    let mut merged: BTreeMap<i64, f64> = cached
        .into_iter()
        .map(|s| (s.timestamp, s.value))
        .collect();
    for sample in fetched {
        merged.insert(sample.timestamp, sample.value);
    }
    merged
        .into_iter()
        .map(|(timestamp, value)| Sample { timestamp, value })
        .collect()
}

pub fn crop_samples(samples: &[Sample], bound: &Extent) -> Vec<Sample> {
    samples
        .iter()
        .filter(|s| bound.contains(s.timestamp))
        .copied()
        .collect()
}

pub fn encode_samples(samples: &[Sample]) -> Result<Bytes> {
    let raw = serde_json::to_vec(samples).map_err(|err| anyhow!("encode samples: {err}"))?;
    Ok(Bytes::from(raw))
}

pub fn decode_samples(raw: &[u8]) -> Result<Vec<Sample>> {
    serde_json::from_slice(raw).map_err(|err| anyhow!("decode samples: {err}"))
}

/// One incoming range query: an opaque statement, the desired extent, the
/// sampling step and the origin request template. Constructed per request,
/// normalized in place, consumed by the proxy and discarded.
#[derive(Debug, Clone)]
pub struct TimeRangeQuery {
    pub statement: String,
    pub extent: Extent,
    pub step: Duration,
    pub template_url: http::Uri,
}

/// A single origin fetch derived from a query and one missing extent.
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub statement: String,
    pub extent: Extent,
    pub step: Duration,
    pub uri: http::Uri,
}

impl TimeRangeQuery {
    pub fn new(
        statement: impl Into<String>,
        extent: Extent,
        step: Duration,
        template_url: http::Uri,
    ) -> TimeRangeQuery {
        TimeRangeQuery {
            statement: statement.into(),
            extent,
            step,
            template_url,
        }
    }

    fn step_secs(&self) -> i64 {
        self.step.as_secs() as i64
    }

    /// Align the extent to the step grid: clamp the end to `now` (data
    /// past the current moment does not exist yet), then floor both edges
    /// to step multiples so extents from different request times are
    /// directly comparable. A non-positive step is a configuration error.
    /// An inverted range after flooring becomes the empty extent.
    pub fn normalize_extent(&mut self, now: i64) -> Result<()> {
        let step = self.step_secs();
        if step <= 0 {
            return Err(anyhow!("non-positive step {:?} in {}", self.step, self));
        }
        let start = self.extent.start.div_euclid(step) * step;
        let end = self.extent.end.min(now).div_euclid(step) * step;
        self.extent = Extent::new(start, end);
        Ok(())
    }

    /// Sub-ranges of the (already normalized) desired extent not covered
    /// by `have`, at step granularity. `have` may arrive unsorted and
    /// overlapping. A degenerate step degrades to a full miss.
    pub fn calculate_deltas(&self, have: &ExtentList) -> ExtentList {
        let desired = self.extent;
        if desired.is_none() {
            return ExtentList::new();
        }
        let step = self.step_secs();
        if step <= 0 || have.is_empty() {
            return ExtentList::from(vec![desired]);
        }
        let mut covered = have.clone();
        covered.compress(step);

        let mut deltas = ExtentList::new();
        let mut cursor = desired.start;
        for c in covered.iter().filter(|c| c.intersects(&desired)) {
            if cursor <= c.start - step {
                deltas.push(Extent::new(cursor, c.start - step));
            }
            cursor = cursor.max(c.end.saturating_add(step));
        }
        if cursor <= desired.end {
            deltas.push(Extent::new(cursor, desired.end));
        }
        deltas
    }

    /// Build the concrete origin request for one missing extent from the
    /// query's template URL.
    pub fn origin_request(&self, extent: Extent) -> Result<OriginRequest> {
        let template = &self.template_url;
        let scheme = template.scheme_str().unwrap_or("http");
        let authority = template
            .authority()
            .ok_or_else(|| anyhow!("origin template {template} has no authority"))?;
        let path = template.path();
        let mut query = String::new();
        if let Some(existing) = template.query() {
            query.push_str(existing);
            query.push('&');
        }
        query.push_str(&format!(
            "{}={}&{}={}&{}={}&{}={}",
            constants::PARAM_QUERY,
            encode_component(&self.statement),
            constants::PARAM_START,
            extent.start,
            constants::PARAM_END,
            extent.end,
            constants::PARAM_STEP,
            self.step.as_secs()
        ));
        let uri = format!("{scheme}://{authority}{path}?{query}")
            .parse::<http::Uri>()
            .context("build origin uri")?;
        Ok(OriginRequest {
            statement: self.statement.clone(),
            extent,
            step: self.step,
            uri,
        })
    }
}

impl fmt::Display for TimeRangeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ \"statement\": \"{}\", \"step\": \"{}\", \"extent\": \"{}\" }}",
            self.statement,
            humantime::format_duration(self.step),
            self.extent
        )
    }
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
