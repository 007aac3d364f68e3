//! 账户同步涉及的领域模型

pub mod account;
pub mod execution_request;
pub mod history;
pub mod order;
pub mod position;
pub mod price;
pub mod side;

pub use account::{AccountDelta, AccountSnapshot};
pub use execution_request::ExecutionRequest;
pub use history::{DealRecord, HistoryOrderRecord};
pub use order::{OrderDelta, OrderRecord, OrderState, TrackedOrder};
pub use position::{PositionDelta, PositionRecord, TrackedPosition};
pub use price::PriceQuote;
pub use side::TradeSide;
