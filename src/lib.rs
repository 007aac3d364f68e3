pub mod app;
pub mod app_config;
pub mod error;
pub mod observers;
pub mod socket;
pub mod time_util;
pub mod trading;

pub const ENVIRONMENT_LOCAL: &str = "local";
