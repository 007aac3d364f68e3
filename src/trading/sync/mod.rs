mod claims;
pub mod events;
pub mod handler;
pub mod protocol;
pub mod tracker;

pub use events::SyncEvent;
pub use handler::{PendingTrade, SynchronizationHandler, TradeReply};
pub use protocol::{IncomingMessage, OutgoingMessage, TradeAction, TradeCommand, TradeResult};
