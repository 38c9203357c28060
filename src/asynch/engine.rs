use embassy_futures::yield_now;
use embassy_time::{Duration, Instant};

use super::urc_handler::{InboundMessage, UrcHandler};
use crate::command::{Command, Marker, Outcome, RawResponse, Reply};
use crate::console::{Console, Line};
use crate::error::Error;
use crate::response::collect_until;
use crate::transport::{Transport, Uart};

/// Single-transaction AT engine.
///
/// Owns the transport and the operator console. Every byte exchanged with
/// the modem is relayed to the console as it happens, and scanned for MQTT
/// receive blocks.
pub struct AtEngine<U: Uart, C: Console> {
    transport: Transport<U>,
    console: C,
    urc: UrcHandler,
}

impl<U: Uart, C: Console> AtEngine<U, C> {
    pub fn new(transport: Transport<U>, console: C) -> Self {
        Self {
            transport,
            console,
            urc: UrcHandler::new(),
        }
    }

    /// Send `command` and classify whatever comes back before its timeout.
    ///
    /// Bytes left over from an earlier exchange are flushed first, so the
    /// response belongs to this command only. `Err` is reserved for
    /// transport faults; everything the modem says is an [`Outcome`].
    pub async fn execute(&mut self, command: &Command<'_>) -> Result<Outcome, Error> {
        self.relay_pending().await?;

        self.console.write_str("Sending: ");
        self.console.write_str(command.line());
        self.console.write_str("\r\n");
        trace!("AT > {}", command.line());

        self.transport.write_line(command.line()).await?;

        let deadline = Instant::now() + command.get_timeout();
        let mut sink = Tap {
            console: &mut self.console,
            urc: &mut self.urc,
        };
        let (response, matched) =
            collect_until(&mut self.transport, &mut sink, deadline, command.terminators()).await?;
        if response.truncated() {
            warn!("Response to {} truncated", command.line());
        }

        let outcome = command.classify(response, matched);
        match &outcome {
            Outcome::Ok(Reply {
                tolerated: Some(code),
                ..
            }) => {
                warn!("{} returned benign {}", command.line(), code);
                self.notice("tolerated", code);
            }
            Outcome::Ok(_) => {}
            Outcome::Timeout(_) => {
                warn!("{} timed out", command.line());
                self.notice("timeout", command.line());
            }
            Outcome::ModemError(_) => {
                debug!("{} failed", command.line());
                self.notice("error", command.line());
            }
            Outcome::UnexpectedPattern(_) => {
                debug!("{} gave an unexpected response", command.line());
                self.notice("unexpected response", command.line());
            }
        }

        Ok(outcome)
    }

    /// Write `line` plus terminator without waiting for an answer.
    pub async fn send_line(&mut self, line: &str) -> Result<(), Error> {
        self.console.write_str("Sending: ");
        self.console.write_str(line);
        self.console.write_str("\r\n");
        self.transport.write_line(line).await
    }

    /// Write raw bytes, e.g. a message body or Ctrl-Z.
    pub async fn transmit(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.transport.write_raw(bytes).await
    }

    /// Collect for up to `timeout` without sending anything first.
    pub async fn listen(
        &mut self,
        timeout: Duration,
        markers: &[Marker<'_>],
    ) -> Result<(RawResponse, bool), Error> {
        let deadline = Instant::now() + timeout;
        let mut sink = Tap {
            console: &mut self.console,
            urc: &mut self.urc,
        };
        collect_until(&mut self.transport, &mut sink, deadline, markers).await
    }

    /// Wait for `duration` while relaying anything the modem sends.
    pub async fn settle(&mut self, duration: Duration) -> Result<(), Error> {
        self.listen(duration, &[]).await.map(|_| ())
    }

    /// Next received MQTT message, if any.
    ///
    /// Pending output is taken in first. When a receive block is still
    /// open, reading continues until it ends or no byte arrived for
    /// `idle`; a block cut short is returned as incomplete.
    pub async fn receive_inbound(&mut self, idle: Duration) -> Result<Option<InboundMessage>, Error> {
        self.relay_pending().await?;

        let mut last_rx = Instant::now();
        while self.urc.in_block() {
            if let Some(byte) = self.transport.poll_byte().await? {
                self.received(byte);
                last_rx = Instant::now();
                continue;
            }
            if last_rx.elapsed() >= idle {
                self.urc.abandon();
                break;
            }
            yield_now().await;
        }

        Ok(self.urc.pop())
    }

    /// Relay everything already received to the console.
    pub async fn relay_pending(&mut self) -> Result<usize, Error> {
        let mut count = 0;
        while let Some(byte) = self.transport.poll_byte().await? {
            self.received(byte);
            count += 1;
        }
        if count > 0 {
            trace!("Relayed {} stale bytes", count);
        }
        Ok(count)
    }

    pub fn console(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn transport_mut(&mut self) -> &mut Transport<U> {
        &mut self.transport
    }

    pub fn release(self) -> (Transport<U>, C) {
        (self.transport, self.console)
    }

    fn received(&mut self, byte: u8) {
        self.console.write_bytes(&[byte]);
        self.urc.feed(byte);
    }

    fn notice(&mut self, kind: &str, detail: &str) {
        self.console.write_str("\r\n[");
        self.console.write_str(kind);
        self.console.write_str("] ");
        self.console.write_str(detail);
        self.console.write_str("\r\n");
    }
}

/// Console sink that also feeds the receive-block scanner.
struct Tap<'a, C: Console> {
    console: &'a mut C,
    urc: &'a mut UrcHandler,
}

impl<C: Console> Console for Tap<'_, C> {
    fn write_str(&mut self, text: &str) {
        self.console.write_str(text)
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.console.write_bytes(bytes);
        bytes.iter().for_each(|b| self.urc.feed(*b));
    }

    fn read_line(&mut self) -> Option<Line> {
        self.console.read_line()
    }
}
