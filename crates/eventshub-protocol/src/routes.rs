//! Route paths served under `/api/v1`.

pub const VERSION: &str = "/api/v1/version";
pub const LOGIN: &str = "/api/v1/login";
pub const INSERT_EVENT: &str = "/api/v1/insertEvent";
pub const EVENT_CHECKSUM: &str = "/api/v1/getEventCheckSum";
pub const EVENTS_IN_RANGE: &str = "/api/v1/getEventsWithinTimeRange";
pub const STATUS: &str = "/api/v1/status";
pub const KILL: &str = "/api/v1/ki11s3rv3rn0w";

/// Header carrying the bearer token.
pub const TOKEN_HEADER: &str = "Token";
