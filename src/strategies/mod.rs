//! Reference strategy implementations

pub mod ema_breakout;
pub mod rsi_swing;
pub mod sma_breakout;
pub mod trend_following;

pub use ema_breakout::EmaBreakoutStrategy;
pub use rsi_swing::RsiSwingStrategy;
pub use sma_breakout::SmaBreakoutStrategy;
pub use trend_following::TrendFollowingStrategy;
