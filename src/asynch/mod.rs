pub mod bridge;
pub mod engine;
pub mod mqtt;
pub mod network;
pub mod probe;
pub(crate) mod pwr;
pub mod runner;
pub mod shared;
pub mod sms;
pub mod state;
pub mod tasks;
pub mod urc_handler;

use crate::console::Console;
use crate::error::Error;
use crate::transport::Uart;

pub use engine::AtEngine;
pub use pwr::{init_expander, power_on, PwrCtrl};
pub use shared::Modem;

/// An ordered script of engine calls with its own timeouts and accept
/// conditions.
///
/// A sequence takes the engine by exclusive reference for its whole run, so
/// commands from two sequences can never interleave.
#[allow(async_fn_in_trait)]
pub trait Sequence<U: Uart, C: Console> {
    type Output;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<Self::Output, Error>;
}
