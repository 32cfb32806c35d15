//! Core of the Telegram bot builder.
//!
//! Framework-agnostic: the chat platform lives behind the
//! [`messaging::port::ChatClient`] and [`lifecycle::BotLauncher`] ports,
//! implemented in adapter crates.

pub mod broadcast;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod registry;
pub mod router;
pub mod store;
pub mod subscription;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
