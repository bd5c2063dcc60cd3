//! Delta-caching accelerator core for time-series query backends: caches
//! previously fetched result ranges and, per request, fetches only the
//! missing sub-ranges from the origin before merging.

pub mod cache;
pub mod config;
pub mod constants;
pub mod extent;
pub mod index;
pub mod logging;
pub mod metrics;
pub mod origin;
pub mod proxy;
pub mod runtime;
pub mod timeseries;
