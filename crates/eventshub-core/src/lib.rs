//! Core types: events, moments, the temporal codec, wire tags, tracing

pub mod event;
pub mod tag;
pub mod time;
pub mod tracing;

pub use event::{Event, Source};
pub use tag::{TYPE_FIELD, Tag, WireType};
pub use time::{CodecError, CodecResult, DEFAULT_TIME_ZONE, Moment, TemporalCodec};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
