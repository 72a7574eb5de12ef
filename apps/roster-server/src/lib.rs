#![forbid(unsafe_code)]

mod server;

pub use server::{
    build_router, init_tracing, AppConfig, DirectoryAccount, DEFAULT_GATEWAY_OUTBOUND_QUEUE,
    DEFAULT_MAX_GATEWAY_EVENT_BYTES,
};
