#![forbid(unsafe_code)]

mod connection;
pub mod handler;
mod metrics;

pub use connection::Connection;
pub use handler::handle_connection;
pub use metrics::ServerMetrics;
