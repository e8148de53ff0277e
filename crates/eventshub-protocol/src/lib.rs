//! HTTP request/response envelopes for eventshub.
//!
//! All endpoints live under `/api/v1` (see [`routes`]) and exchange JSON.
//! Every response names its logical type in a `__type__` field and embeds a
//! [`ResponseStatus`] block; clients check `status.success` rather than the
//! HTTP code alone.
//!
//! ```rust
//! use eventshub_protocol::{decode_body, KillRequest};
//!
//! let req: KillRequest = decode_body(br#"{"payload":"x"}"#).unwrap();
//! assert_eq!(req.payload, "x");
//! ```

mod body;
mod error;
pub mod routes;
mod types;

pub use body::decode_body;
pub use error::{ProtocolError, ProtocolResult};
pub use types::{
    AddEventRequest, AddEventResponse, ChecksumRequest, ChecksumResponse, Credentials,
    EventsResponse, KillRequest, KillResponse, RangeRequest, ResponseStatus, StatusResponse,
    TokenMessage, VersionResponse,
};

/// Version reported by the `version` endpoint.
pub const API_VERSION: &str = "v1.1.0";

/// Version tag written into status rows.
pub const REPOSITORY_VERSION: &str = "1.1.0";
