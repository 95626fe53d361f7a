pub mod binance;
pub mod paper;

pub use binance::BinanceAdapter;
pub use paper::PaperAdapter;
