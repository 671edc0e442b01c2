pub mod config;
pub mod http;
pub mod models;
pub mod service;

pub use config::ClientConfig;
pub use http::HttpBackend;
pub use service::{AppState, build_router, create_app};
