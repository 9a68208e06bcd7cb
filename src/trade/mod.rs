//! Position tracking and the per-asset trading decision

pub mod actions;
pub mod memo;
pub mod trader;
pub mod window;

pub use actions::TradeActions;
pub use memo::PositionMemo;
pub use trader::Trader;
pub use window::PriceWindow;
