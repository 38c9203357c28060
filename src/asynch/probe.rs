use embassy_time::Duration;

use super::{AtEngine, Sequence};
use crate::command::{general, Outcome};
use crate::config::Timing;
use crate::console::Console;
use crate::error::Error;
use crate::transport::Uart;

/// Find the baud rate the module answers `AT` at.
///
/// Candidates are tried in order and the first responsive one wins. The
/// UART is only reopened when a candidate differs from the current rate.
pub struct LivenessProbe<'a> {
    candidates: &'a [u32],
    timeout: Duration,
    settle: Duration,
}

impl<'a> LivenessProbe<'a> {
    pub fn new(timing: &Timing) -> Self {
        Self {
            candidates: &general::BAUD_CANDIDATES,
            timeout: timing.probe_timeout,
            settle: timing.baud_switch_settle,
        }
    }

    pub fn candidates(mut self, candidates: &'a [u32]) -> Self {
        self.candidates = candidates;
        self
    }
}

/// `true` if an `AT` probe outcome shows a live module.
///
/// Anything that answered with `OK`, or with an error that echoes the
/// command back, counts.
fn responsive(outcome: &Outcome) -> bool {
    match outcome {
        Outcome::Ok(_) => true,
        Outcome::ModemError(response) => response.contains("AT"),
        _ => false,
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for LivenessProbe<'_> {
    type Output = u32;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<u32, Error> {
        let command = general::AT.timeout(self.timeout);

        for &baud_rate in self.candidates {
            if at.transport_mut().baud_rate() != baud_rate {
                info!("Trying baud rate {}", baud_rate);
                at.transport_mut().reconfigure(baud_rate).await?;
                at.settle(self.settle).await?;
            }

            if responsive(&at.execute(&command).await?) {
                info!("Module responding at {} baud", baud_rate);
                return Ok(baud_rate);
            }
        }

        error!("No response from module at any baud rate");
        Err(Error::Unresponsive)
    }
}

/// Single `AT` round trip, used by the watchdog.
pub struct Heartbeat {
    timeout: Duration,
}

impl Heartbeat {
    pub fn new(timing: &Timing) -> Self {
        Self {
            timeout: timing.probe_timeout,
        }
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for Heartbeat {
    type Output = bool;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<bool, Error> {
        let outcome = at.execute(&general::AT.timeout(self.timeout)).await?;
        Ok(outcome.is_ok())
    }
}
