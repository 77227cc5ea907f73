//! Core of the legacy-block cleaner.
//!
//! This crate is framework-agnostic. Telegram lives behind the messaging ports
//! (traits) implemented in the adapter crate; the filesystem lives behind
//! [`cleaner::store::FileStore`].

pub mod cleaner;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
