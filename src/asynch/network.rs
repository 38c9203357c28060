use embassy_time::Timer;

use super::state::{advance, RegistrationState};
use super::{AtEngine, Sequence};
use crate::command::network::{self, SignalQuality, Status};
use crate::command::{Command, Outcome};
use crate::config::{Apn, Timing};
use crate::console::Console;
use crate::error::Error;
use crate::transport::Uart;

/// Bring the modem onto the packet network.
///
/// SIM check, registration polling, signal report, PDP context and
/// optional authentication, then a fixed settle delay.
pub struct NetworkAttach<'a> {
    apn: &'a Apn<'a>,
    timing: &'a Timing,
}

impl<'a> NetworkAttach<'a> {
    pub fn new(apn: &'a Apn<'a>, timing: &'a Timing) -> Self {
        Self { apn, timing }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Attached {
    pub state: RegistrationState,
    pub status: Status,
    pub signal: Option<SignalQuality>,
}

impl<U: Uart, C: Console> Sequence<U, C> for NetworkAttach<'_> {
    type Output = Attached;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<Attached, Error> {
        let mut state = RegistrationState::NotRegistered;

        let pin = at.execute(&network::PIN_STATUS).await?;
        if !pin.is_ok() {
            error!("SIM not ready");
            return Err(Error::SimNotReady);
        }

        advance(&mut state, RegistrationState::Registering);
        let mut status = None;
        for attempt in 1..=self.timing.registration_attempts {
            let outcome = at.execute(&network::REGISTRATION).await?;
            if network::is_registered(outcome.response()) {
                status = Some(network::registration_status(outcome.response()));
                break;
            }

            debug!(
                "Not registered yet ({}/{})",
                attempt, self.timing.registration_attempts
            );
            if attempt < self.timing.registration_attempts {
                Timer::after(self.timing.registration_interval).await;
            }
        }
        let Some(status) = status else {
            error!("Network registration timed out");
            return Err(Error::RegistrationTimeout);
        };
        advance(&mut state, RegistrationState::Registered);
        info!("Registered on network: {:?}", status);

        let csq = at.execute(&network::SIGNAL_QUALITY).await?;
        let signal = network::parse_signal_quality(csq.response());
        if let Some(signal) = signal {
            info!("Signal quality: rssi {} ber {}", signal.rssi, signal.ber);
        }

        let context = network::define_context(self.apn)?;
        report(at.execute(&Command::new(&context)).await?, "PDP context");

        if let Some(auth) = network::authenticate(self.apn)? {
            report(at.execute(&Command::new(&auth)).await?, "APN authentication");
        }

        at.settle(self.timing.network_settle).await?;

        Ok(Attached {
            state,
            status,
            signal,
        })
    }
}

fn report(outcome: Outcome, step: &str) {
    if !outcome.is_ok() {
        warn!("{} not confirmed ({}), continuing", step, outcome.name());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helpers::*;

    const SEARCHING: &str = "\r\n+CREG: 0,2\r\n\r\nOK\r\n";
    const HOME: &str = "\r\n+CREG: 0,1\r\n\r\nOK\r\n";

    fn modem(creg: &[&str]) -> MockModem {
        MockModem::new()
            .on("AT+CPIN?", "\r\n+CPIN: READY\r\n\r\nOK\r\n")
            .on_seq("AT+CREG?", creg)
            .on("AT+CSQ", "\r\n+CSQ: 21,99\r\n\r\nOK\r\n")
            .on("AT+CGDCONT", "\r\nOK\r\n")
            .on("AT+CGAUTH", "\r\nOK\r\n")
    }

    fn registrations(written: &[String]) -> usize {
        written.iter().filter(|l| l.as_str() == "AT+CREG?").count()
    }

    #[test]
    fn registers_on_last_poll() {
        let timing = fast_timing();
        let apn = Apn::default();
        let mut script = [SEARCHING; 20];
        script[19] = HOME;

        let mut at = engine(modem(&script));
        let attached = block_on(NetworkAttach::new(&apn, &timing).run(&mut at)).unwrap();

        assert_eq!(attached.state, RegistrationState::Registered);
        assert_eq!(attached.status, Status::Home);
        assert_eq!(attached.signal, Some(SignalQuality { rssi: 21, ber: 99 }));

        let written = &at.transport_mut().uart_mut().written;
        assert_eq!(registrations(written), 20);
        assert!(written.contains(&"AT+CGDCONT=1,\"IP\",\"safaricom\"".into()));
        assert!(written.contains(&"AT+CGAUTH=1,1,\"saf\",\"data\"".into()));
    }

    #[test]
    fn registration_timeout_is_repeatable() {
        let timing = fast_timing();
        let apn = Apn::default();

        for _ in 0..2 {
            let mut at = engine(modem(&[SEARCHING]));
            let result = block_on(NetworkAttach::new(&apn, &timing).run(&mut at));

            assert_eq!(result, Err(Error::RegistrationTimeout));
            assert_eq!(registrations(&at.transport_mut().uart_mut().written), 20);
        }
    }

    #[test]
    fn roaming_counts_as_registered() {
        let timing = fast_timing();
        let apn = Apn::default();
        let mut at = engine(modem(&["\r\n+CREG: 0,5\r\n\r\nOK\r\n"]));

        let attached = block_on(NetworkAttach::new(&apn, &timing).run(&mut at)).unwrap();
        assert_eq!(attached.status, Status::Roaming);
        assert_eq!(registrations(&at.transport_mut().uart_mut().written), 1);
    }

    #[test]
    fn sim_not_ready_stops_early() {
        let timing = fast_timing();
        let apn = Apn::default();
        let mut at = engine(MockModem::new().on("AT+CPIN?", "\r\n+CPIN: SIM PIN\r\n\r\nOK\r\n"));

        let result = block_on(NetworkAttach::new(&apn, &timing).run(&mut at));
        assert_eq!(result, Err(Error::SimNotReady));
        assert_eq!(at.transport_mut().uart_mut().written, ["AT+CPIN?"]);
    }
}
