use embassy_time::{Duration, Timer};

use super::AtEngine;
use crate::console::Console;
use crate::error::Error;
use crate::transport::Uart;

/// Pause between bridge passes
pub const BRIDGE_POLL: Duration = Duration::from_millis(10);

/// Transparent operator bridge: typed lines go to the modem verbatim, modem
/// output comes back to the console.
pub struct Bridge<'a, U: Uart, C: Console> {
    at: &'a mut AtEngine<U, C>,
}

impl<'a, U: Uart, C: Console> Bridge<'a, U, C> {
    pub fn new(at: &'a mut AtEngine<U, C>) -> Self {
        Self { at }
    }

    /// One pass of the bridge. Returns `true` if an operator line was
    /// forwarded.
    pub async fn service(&mut self) -> Result<bool, Error> {
        let mut forwarded = false;
        if let Some(line) = self.at.console().read_line() {
            let command = line.trim();
            if !command.is_empty() {
                let console = self.at.console();
                console.write_str(">> Sending: ");
                console.write_str(command);
                console.write_str("\r\n");
                self.at.transport_mut().write_line(command).await?;
                forwarded = true;
            }
        }

        self.at.relay_pending().await?;
        Ok(forwarded)
    }

    pub async fn run(&mut self, poll: Duration) -> ! {
        loop {
            if let Err(e) = self.service().await {
                warn!("Bridge: {:?}", e);
            }
            Timer::after(poll).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::asynch::engine::AtEngine;
    use crate::test_helpers::*;
    use crate::transport::Transport;

    #[test]
    fn forwards_typed_lines_and_relays_output() {
        let console = CaptureConsole::new().typed("  AT+CSQ ").typed("").typed("ATI");
        let modem = MockModem::new()
            .on("AT+CSQ", "\r\n+CSQ: 17,99\r\n\r\nOK\r\n")
            .on("ATI", "\r\nModel: SIMCOM_SIM7600G-H\r\n\r\nOK\r\n");
        let mut at = AtEngine::new(Transport::new(modem, 115_200), console);
        let mut bridge = Bridge::new(&mut at);

        assert!(block_on(bridge.service()).unwrap());
        assert!(!block_on(bridge.service()).unwrap());
        assert!(block_on(bridge.service()).unwrap());
        assert!(!block_on(bridge.service()).unwrap());

        assert_eq!(at.transport_mut().uart_mut().written, ["AT+CSQ", "ATI"]);
        let output = &at.console().output;
        assert!(output.contains(">> Sending: AT+CSQ\r\n\r\n+CSQ: 17,99"));
        assert!(output.contains("SIMCOM_SIM7600G-H"));
    }
}
