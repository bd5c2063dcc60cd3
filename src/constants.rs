pub const PARAM_QUERY: &str = "query";
pub const PARAM_START: &str = "start";
pub const PARAM_END: &str = "end";
pub const PARAM_STEP: &str = "step";

pub const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FAST_FORWARD_TTL_SECS: u64 = 15;
pub const DEFAULT_TIMESERIES_RETENTION: usize = 1024;

pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_MAX_SIZE_BACKOFF_BYTES: u64 = 16 * 1024 * 1024;
