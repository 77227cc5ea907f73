//! Confirmation-gated removal of `OLD BLOCK` regions from a document.
//!
//! Flow: [`extract`] -> [`report`] -> [`confirm`] -> (on approval) [`apply`],
//! which uses [`rewrite`] for the new content. [`run::Cleaner`] wires it together.

pub mod apply;
pub mod confirm;
pub mod extract;
pub mod report;
pub mod rewrite;
pub mod run;
pub mod store;

pub use run::{Cleaner, RunOutcome};
