use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{with_timeout, Duration};

use super::{AtEngine, Sequence};
use crate::console::Console;
use crate::error::Error;
use crate::transport::Uart;

/// The AT engine shared between tasks.
///
/// At most one sequence runs at a time. The lock is taken once per
/// sequence and held until it finishes, never per command.
pub struct Modem<M: RawMutex, U: Uart, C: Console> {
    at: Mutex<M, AtEngine<U, C>>,
}

impl<M: RawMutex, U: Uart, C: Console> Modem<M, U, C> {
    pub fn new(at: AtEngine<U, C>) -> Self {
        Self { at: Mutex::new(at) }
    }

    /// Take the engine, waiting at most `wait`. [`Error::Busy`] means
    /// another task held it for the whole time; callers skip this cycle.
    pub async fn lock(&self, wait: Duration) -> Result<MutexGuard<'_, M, AtEngine<U, C>>, Error> {
        with_timeout(wait, self.at.lock()).await.map_err(|_| {
            debug!("AT engine busy");
            Error::Busy
        })
    }

    /// Run `sequence` to completion under the lock.
    pub async fn run<S: Sequence<U, C>>(
        &self,
        sequence: S,
        wait: Duration,
    ) -> Result<S::Output, Error> {
        let mut at = self.lock(wait).await?;
        sequence.run(&mut *at).await
    }

    pub fn into_inner(self) -> AtEngine<U, C> {
        self.at.into_inner()
    }
}
