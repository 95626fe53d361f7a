pub mod adapters;
pub mod core;
pub mod http;
pub mod observability;
pub mod persistence;
pub mod sinks;
