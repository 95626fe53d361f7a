use rust_decimal::Decimal;
use thiserror::Error;

/// Errors related to order lifecycle and execution
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Insufficient funds: need ${need}, available ${available}")]
    InsufficientFunds { need: Decimal, available: Decimal },

    #[error("Position not found: {instrument}")]
    PositionNotFound { instrument: String },

    #[error("Invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("Order execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("Illegal order state transition: {from} -> {to}")]
    StateMachineViolation { from: String, to: String },

    #[error("Candle invariant violated: {reason}")]
    DataInvalid { reason: String },

    #[error("Bounded channel full, message dropped: {context}")]
    Overflow { context: String },
}

/// Risk Gate admission-denial reasons, one per `admit()` check in order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RiskViolation {
    #[error("Blocked: {reason}")]
    Blocked { reason: String },

    #[error("Daily loss limit reached: |{daily_pnl}| >= {limit}")]
    DailyLossLimitAbs { daily_pnl: String, limit: String },

    #[error("Daily loss percent limit reached: {pct:.2}% >= {limit_pct:.2}%")]
    DailyLossLimitPct { pct: f64, limit_pct: f64 },

    #[error("Position size limit exceeded: {lots} > {max_lots}")]
    PositionSizeLimit { lots: i64, max_lots: i64 },

    #[error("Open position cap reached: {count} >= {max_count}")]
    OpenPositionCap { count: usize, max_count: usize },
}

/// Errors related to market data and adapter connectivity
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Invalid market data for {instrument}: {reason}")]
    InvalidData { instrument: String, reason: String },

    #[error("Service timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Rate limit exceeded: retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Adapter authentication failed: {reason}")]
    AdapterAuthFailure { reason: String },

    #[error("Adapter transient failure: {reason}")]
    AdapterTransient { reason: String },

    #[error("Adapter returned an unmapped order status: {status}")]
    UnknownOrderStatus { status: String },
}

/// Configuration loading/validation errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration invalid: {reason}")]
    ConfigInvalid { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_violation_formatting() {
        let violation = RiskViolation::PositionSizeLimit {
            lots: 15,
            max_lots: 10,
        };

        let msg = violation.to_string();
        assert!(msg.contains("15"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_state_machine_violation_formatting() {
        let error = TradingError::StateMachineViolation {
            from: "filled".to_string(),
            to: "open".to_string(),
        };

        let msg = error.to_string();
        assert!(msg.contains("filled"));
        assert!(msg.contains("open"));
    }

    #[test]
    fn risk_violation_eq_supports_assertion_comparisons() {
        let a = RiskViolation::Blocked {
            reason: "daily loss".into(),
        };
        let b = RiskViolation::Blocked {
            reason: "daily loss".into(),
        };
        assert_eq!(a, b);
    }
}
