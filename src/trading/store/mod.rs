pub mod account_store;

pub use account_store::{AccountState, AccountStore, AccountUpdate, OrderSet, PositionSet, UpdateOutcome};
