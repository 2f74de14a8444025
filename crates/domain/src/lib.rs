mod commands;
mod error;
mod matcher;
mod models;
pub mod webhook;

pub use commands::{NewRule, RuleUpdate};
pub use error::Error;
pub use matcher::matches;
pub use models::{Account, DeliveryStatus, LedgerEntry, Rule};
