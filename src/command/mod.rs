//! AT commands for the SIMCom SIM7500/SIM7600 series and the
//! classification of their responses.
//!
//! Command lines and allow-lists are grouped per functional area following
//! the SIM7500_SIM7600 Series AT Command Manual and its MQTT addendum.

pub mod general;
pub mod mqtt;
pub mod network;
pub mod sms;

use embassy_time::Duration;
use heapless::String;

pub use crate::response::{Marker, RawResponse};

pub const MAX_COMMAND_LEN: usize = 384;

pub type CommandLine = String<MAX_COMMAND_LEN>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

pub const OK: Marker<'static> = Marker::Text("OK");
pub const ERROR: Marker<'static> = Marker::Text("ERROR");
/// Data prompt, e.g. after `AT+CMGS`
pub const PROMPT: Marker<'static> = Marker::Text(">");

pub const DEFAULT_TERMINATORS: &[Marker<'static>] = &[OK, ERROR];
pub const DEFAULT_ERRORS: &[&str] = &["ERROR"];

/// One command line plus everything needed to judge its answer.
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    line: &'a str,
    timeout: Duration,
    until: &'static [Marker<'static>],
    expect: &'static [&'static str],
    errors: &'static [&'static str],
    ignore: &'static [&'static str],
}

impl<'a> Command<'a> {
    /// `line` is sent without terminator, the engine appends it.
    pub const fn new(line: &'a str) -> Self {
        Self {
            line,
            timeout: DEFAULT_TIMEOUT,
            until: DEFAULT_TERMINATORS,
            expect: &[],
            errors: DEFAULT_ERRORS,
            ignore: &[],
        }
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Markers that end response collection.
    pub const fn until(mut self, until: &'static [Marker<'static>]) -> Self {
        self.until = until;
        self
    }

    /// Substrings of which at least one must be present for success. Empty
    /// means any terminated, error-free response succeeds.
    pub const fn expect(mut self, expect: &'static [&'static str]) -> Self {
        self.expect = expect;
        self
    }

    pub const fn errors(mut self, errors: &'static [&'static str]) -> Self {
        self.errors = errors;
        self
    }

    /// Known benign error codes. A response containing any of them is an
    /// [`Outcome::Ok`] carrying the matched code.
    pub const fn ignore(mut self, ignore: &'static [&'static str]) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn line(&self) -> &'a str {
        self.line
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn terminators(&self) -> &'static [Marker<'static>] {
        self.until
    }

    /// Turn a collected response into an [`Outcome`].
    ///
    /// Order: allow-listed codes, then error markers, then missing
    /// terminator, then expected success markers.
    pub fn classify(&self, response: RawResponse, matched: bool) -> Outcome {
        if let Some(code) = self.ignore.iter().copied().find(|c| response.contains(c)) {
            return Outcome::Ok(Reply {
                response,
                tolerated: Some(code),
            });
        }

        if self.errors.iter().any(|e| response.contains(e)) {
            return Outcome::ModemError(response);
        }

        if !matched {
            return Outcome::Timeout(response);
        }

        if self.expect.is_empty() || self.expect.iter().any(|e| response.contains(e)) {
            Outcome::Ok(Reply {
                response,
                tolerated: None,
            })
        } else {
            Outcome::UnexpectedPattern(response)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub response: RawResponse,
    /// Allow-listed error code that was accepted in place of success
    pub tolerated: Option<&'static str>,
}

/// Result of one command transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok(Reply),
    ModemError(RawResponse),
    Timeout(RawResponse),
    /// Collection ended on a terminator, but none of the expected success
    /// markers is present.
    UnexpectedPattern(RawResponse),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn response(&self) -> &RawResponse {
        match self {
            Self::Ok(reply) => &reply.response,
            Self::ModemError(r) | Self::Timeout(r) | Self::UnexpectedPattern(r) => r,
        }
    }

    pub fn into_response(self) -> RawResponse {
        match self {
            Self::Ok(reply) => reply.response,
            Self::ModemError(r) | Self::Timeout(r) | Self::UnexpectedPattern(r) => r,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok(Reply {
                tolerated: Some(_), ..
            }) => "tolerated",
            Self::Ok(_) => "ok",
            Self::ModemError(_) => "modem error",
            Self::Timeout(_) => "timeout",
            Self::UnexpectedPattern(_) => "unexpected",
        }
    }
}

/// How far a lenient step was confirmed by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    Confirmed,
    /// A known benign error code was returned.
    Tolerated(&'static str),
    /// Neither success nor a known benign code; the caller carried on anyway.
    Unclear,
}

impl From<&Outcome> for Ack {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Ok(Reply {
                tolerated: Some(code),
                ..
            }) => Self::Tolerated(*code),
            Outcome::Ok(_) => Self::Confirmed,
            _ => Self::Unclear,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CONNECT_UNTIL: &[Marker<'static>] = &[Marker::Line("+CMQTTCONNECT:"), ERROR];

    #[test]
    fn ok_response() {
        let outcome = Command::new("AT").classify("AT\r\nOK\r\n".into(), true);
        assert!(outcome.is_ok());
        assert_eq!(Ack::from(&outcome), Ack::Confirmed);
    }

    #[test]
    fn error_response() {
        let outcome = Command::new("AT+CMGF=1").classify("\r\nERROR\r\n".into(), true);
        assert!(matches!(outcome, Outcome::ModemError(_)));
        assert_eq!(Ack::from(&outcome), Ack::Unclear);
    }

    #[test]
    fn cme_error_is_modem_error() {
        let outcome = Command::new("AT+CPIN?").classify("\r\n+CME ERROR: 10\r\n".into(), true);
        assert!(matches!(outcome, Outcome::ModemError(_)));
    }

    #[test]
    fn allow_listed_code_wins_over_error() {
        let outcome = Command::new("AT+CMQTTSTART")
            .ignore(&["+CMQTTSTART: 23"])
            .classify("\r\n+CMQTTSTART: 23\r\n\r\nERROR\r\n".into(), true);
        assert_eq!(
            outcome,
            Outcome::Ok(Reply {
                response: "\r\n+CMQTTSTART: 23\r\n\r\nERROR\r\n".into(),
                tolerated: Some("+CMQTTSTART: 23"),
            })
        );
    }

    #[test]
    fn allow_listed_code_without_terminator() {
        let outcome = Command::new("AT+CMQTTSTOP")
            .ignore(&["+CMQTTSTOP: 21"])
            .classify("\r\n+CMQTTSTOP: 21\r\n".into(), false);
        assert_eq!(Ack::from(&outcome), Ack::Tolerated("+CMQTTSTOP: 21"));
    }

    #[test]
    fn nothing_matched_is_timeout() {
        let outcome = Command::new("AT").classify(RawResponse::new(), false);
        assert!(matches!(outcome, Outcome::Timeout(_)));
        assert_eq!(outcome.name(), "timeout");
    }

    #[test]
    fn terminator_without_expected_marker_is_unexpected() {
        let command = Command::new("AT+CMQTTCONNECT=0")
            .until(CONNECT_UNTIL)
            .expect(&["+CMQTTCONNECT: 0,0"]);

        let outcome = command.classify("\r\nOK\r\n\r\n+CMQTTCONNECT: 0,12\r\n".into(), true);
        assert!(matches!(outcome, Outcome::UnexpectedPattern(_)));

        let outcome = command.classify("\r\nOK\r\n\r\n+CMQTTCONNECT: 0,0\r\n".into(), true);
        assert!(outcome.is_ok());
    }
}
