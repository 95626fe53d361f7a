pub mod audit_repository;
pub mod candle_repository;
pub mod database;
pub mod risk_state_file;

pub use audit_repository::SqliteAuditRepository;
pub use candle_repository::SqliteCandleRepository;
pub use database::Database;
pub use risk_state_file::RiskStateStore;
