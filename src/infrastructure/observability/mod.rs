//! Observability: a Prometheus registry pulled by the admin HTTP surface
//! (`/metrics`) plus a small RAII latency timer used around adapter calls.

pub mod latency_tracker;
pub mod metrics;

pub use latency_tracker::LatencyGuard;
pub use metrics::Metrics;
