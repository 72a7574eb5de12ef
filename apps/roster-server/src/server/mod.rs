pub(crate) mod auth;
pub(crate) mod core;
pub(crate) mod directory;
pub(crate) mod errors;
pub(crate) mod gateway_events;
pub(crate) mod metrics;
pub(crate) mod realtime;
pub(crate) mod router;
pub(crate) mod types;

pub use core::{
    AppConfig, DirectoryAccount, DEFAULT_GATEWAY_OUTBOUND_QUEUE, DEFAULT_MAX_GATEWAY_EVENT_BYTES,
};
pub use errors::init_tracing;
pub use router::build_router;
