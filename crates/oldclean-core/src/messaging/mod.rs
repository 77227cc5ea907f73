//! Channel abstractions between the cleaner and its single operator.

pub mod port;
pub mod types;
