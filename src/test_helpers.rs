//! Scripted doubles for the hardware seams.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::string::String;
use std::sync::Once;
use std::vec::Vec;

use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, OutputPin, PinState};

pub use embassy_futures::block_on;

use crate::asynch::engine::AtEngine;
use crate::config::{Config, Timing};
use crate::console::{Console, Line};
use crate::expander::IoExpander;
use crate::transport::{Transport, Uart};

static INIT: Once = Once::new();

/// Driver diagnostics only reach the logger when tests run with
/// `--features log`.
pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init()
            .ok();
    });
}

struct Rule {
    prefix: String,
    replies: Vec<String>,
    next: usize,
}

/// Fake modem answering complete command lines from a script.
///
/// A rule matches a written line by prefix; consecutive matches walk its
/// replies, the last one repeating. Lines with no matching rule get no
/// answer. The modem only answers while the UART runs at its live baud.
pub struct MockModem {
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    /// Every line written, without terminator. Data ended by Ctrl-Z is
    /// recorded with a `<CTRL-Z>` suffix.
    pub written: Vec<String>,
    rules: Vec<Rule>,
    ctrl_z_reply: Option<String>,
    baud: u32,
    live_baud: u32,
    chatter: Option<u8>,
    pub reopened: Vec<u32>,
}

impl MockModem {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            pending: Vec::new(),
            written: Vec::new(),
            rules: Vec::new(),
            ctrl_z_reply: None,
            baud: 115_200,
            live_baud: 115_200,
            chatter: None,
            reopened: Vec::new(),
        }
    }

    pub fn on(self, prefix: &str, reply: &str) -> Self {
        self.on_seq(prefix, &[reply])
    }

    pub fn on_seq(mut self, prefix: &str, replies: &[&str]) -> Self {
        self.rules.push(Rule {
            prefix: prefix.into(),
            replies: replies.iter().map(|r| String::from(*r)).collect(),
            next: 0,
        });
        self
    }

    pub fn on_ctrl_z(mut self, reply: &str) -> Self {
        self.ctrl_z_reply = Some(reply.into());
        self
    }

    /// Only answer while the UART is open at `baud`.
    pub fn live_at(mut self, baud: u32) -> Self {
        self.live_baud = baud;
        self
    }

    /// Once the script is exhausted, keep sending `byte` forever.
    pub fn chatter(mut self, byte: u8) -> Self {
        self.chatter = Some(byte);
        self
    }

    pub fn push_rx(&mut self, data: &str) {
        self.rx.extend(data.bytes());
    }

    fn feed(&mut self, byte: u8) {
        match byte {
            b'\r' => {}
            b'\n' => {
                let line = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                self.answer(&line);
                self.written.push(line);
            }
            0x1A => {
                let mut body = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                body.push_str("<CTRL-Z>");
                self.written.push(body);
                if let Some(reply) = self.ctrl_z_reply.clone() {
                    self.push_rx(&reply);
                }
            }
            b => self.pending.push(b),
        }
    }

    fn answer(&mut self, line: &str) {
        if self.baud != self.live_baud {
            return;
        }
        let Some(rule) = self.rules.iter_mut().find(|r| line.starts_with(&r.prefix)) else {
            return;
        };
        let reply = rule.replies[rule.next.min(rule.replies.len() - 1)].clone();
        rule.next += 1;
        self.push_rx(&reply);
    }
}

impl embedded_io::ErrorType for MockModem {
    type Error = Infallible;
}

impl embedded_io_async::Read for MockModem {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front().or(self.chatter) {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io_async::Write for MockModem {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for b in buf {
            self.feed(*b);
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::ReadReady for MockModem {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty() || self.chatter.is_some())
    }
}

impl Uart for MockModem {
    async fn reopen(&mut self, baud_rate: u32) -> Result<(), Self::Error> {
        // Anything in flight is lost when the port closes
        self.rx.clear();
        self.baud = baud_rate;
        self.reopened.push(baud_rate);
        Ok(())
    }
}

/// Console recording all output and replaying queued operator lines.
#[derive(Default)]
pub struct CaptureConsole {
    pub output: String,
    pub input: VecDeque<String>,
}

impl CaptureConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn typed(mut self, line: &str) -> Self {
        self.input.push_back(line.into());
        self
    }
}

impl Console for CaptureConsole {
    fn write_str(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.output.push_str(&String::from_utf8_lossy(bytes));
    }

    fn read_line(&mut self) -> Option<Line> {
        let typed = self.input.pop_front()?;
        let mut line = Line::new();
        line.push_str(&typed).ok()?;
        Some(line)
    }
}

#[derive(Default)]
pub struct RecordingPin {
    pub states: Vec<PinState>,
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.states.push(PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.states.push(PinState::High);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockExpander {
    pub outputs: Vec<u8>,
    pub writes: Vec<(u8, PinState)>,
    pub fail: bool,
}

impl IoExpander for MockExpander {
    type Error = ();

    fn set_output(&mut self, line: u8) -> Result<(), Self::Error> {
        if self.fail {
            return Err(());
        }
        self.outputs.push(line);
        Ok(())
    }

    fn write(&mut self, line: u8, state: PinState) -> Result<(), Self::Error> {
        if self.fail {
            return Err(());
        }
        self.writes.push((line, state));
        Ok(())
    }
}

pub fn engine(modem: MockModem) -> AtEngine<MockModem, CaptureConsole> {
    init_logger();
    AtEngine::new(Transport::new(modem, 115_200), CaptureConsole::new())
}

/// Millisecond-scale timings so sequencer tests finish quickly.
pub fn fast_timing() -> Timing {
    let ms = Duration::from_millis;
    Timing {
        pwrkey_lead: ms(1),
        pwrkey_pulse: ms(2),
        boot_wait: ms(1),
        stabilize: ms(1),
        baud_switch_settle: ms(1),
        probe_timeout: ms(20),

        registration_attempts: 20,
        registration_interval: ms(1),
        network_settle: ms(1),

        mqtt_settle: ms(1),
        connect_timeout: ms(50),
        subscribe_timeout: ms(50),
        publish_settle: ms(1),
        publish_ack_timeout: ms(50),
        inbound_idle: ms(10),

        sms_settle: ms(1),
        sms_body_settle: ms(1),
        sms_prompt_timeout: ms(50),
        sms_confirm_timeout: ms(50),

        publish_period: ms(20),
        poll_period: ms(1),
        watchdog_period: ms(5),
        lock_wait: ms(20),
    }
}

/// A module that is registered at home and has a reachable broker.
pub fn healthy_modem() -> MockModem {
    MockModem::new()
        .on("AT+CPIN?", "\r\n+CPIN: READY\r\n\r\nOK\r\n")
        .on("AT+CREG?", "\r\n+CREG: 0,1\r\n\r\nOK\r\n")
        .on("AT+CSQ", "\r\n+CSQ: 24,99\r\n\r\nOK\r\n")
        .on("AT+CMQTTSTOP", "\r\n+CMQTTSTOP: 21\r\n\r\nERROR\r\n")
        .on("AT+CMQTTSTART", "\r\n+CMQTTSTART: 23\r\n\r\nERROR\r\n")
        .on("AT+CMQTTCONNECT", "\r\nOK\r\n\r\n+CMQTTCONNECT: 0,0\r\n")
        .on("AT+CMQTTSUB", "\r\nOK\r\n\r\n+CMQTTSUB: 0,0\r\n")
        .on("AT+CMQTTPUB", "\r\nOK\r\n\r\n+CMQTTPUB: 0,0\r\n")
        .on("AT+CMGS", "\r\n> ")
        .on("ATI", "\r\nManufacturer: SIMCOM INCORPORATED\r\nModel: SIMCOM_SIM7600G-H\r\n\r\nOK\r\n")
        .on("AT", "\r\nOK\r\n")
        .on_ctrl_z("\r\n+CMGS: 3\r\n\r\nOK\r\n")
}

pub fn test_config() -> Config<'static> {
    Config {
        timing: fast_timing(),
        ..Default::default()
    }
}
