#[macro_use]
extern crate napi_derive;

mod archive;
mod category;
mod config;
mod error;
mod manifest;
#[macro_use]
mod model;
mod napi_exports;
mod path_codec;
mod report;
mod service;
mod slug;
mod storage;
mod validation;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("graphpack_core=info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    });
}
