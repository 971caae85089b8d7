#![warn(clippy::dbg_macro)]

pub mod config;
mod errors;
mod http_server;
pub mod middleware;
mod routers;
mod utils;

pub use http_server::run_http_server;
