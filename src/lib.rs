#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod asynch;
pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod expander;
mod module_timing;
pub mod response;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use config::Config;
pub use error::Error;
