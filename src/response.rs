//! Response accumulation for a single in-flight command.

use embassy_futures::yield_now;
use embassy_time::Instant;
use heapless::Vec;

use crate::console::Console;
use crate::error::Error;
use crate::transport::{Transport, Uart};

pub const MAX_RESPONSE_LEN: usize = 1024;

/// Bytes received from the modem since a command was sent.
///
/// When the buffer fills up, the oldest half is discarded so terminators
/// at the tail can still be detected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    buf: Vec<u8, MAX_RESPONSE_LEN>,
    truncated: bool,
}

impl RawResponse {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            truncated: false,
        }
    }

    pub(crate) fn push(&mut self, byte: u8) {
        if self.buf.is_full() {
            let keep = self.buf.len() / 2;
            let start = self.buf.len() - keep;
            self.buf.copy_within(start.., 0);
            self.buf.truncate(keep);
            self.truncated = true;
        }
        // Cannot fail, room was made above
        self.buf.push(byte).ok();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The response as text, cut at the first invalid UTF-8 sequence.
    pub fn as_str(&self) -> &str {
        utf8_prefix(&self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// `true` if older bytes were dropped to make room.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.find(needle).is_some()
    }

    pub fn find(&self, needle: &str) -> Option<usize> {
        find(&self.buf, needle.as_bytes())
    }

    /// Non-empty lines, stripped of `\r`. Lines that are not valid UTF-8 are
    /// skipped.
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.buf
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .filter_map(|line| core::str::from_utf8(line).ok())
    }
}

impl From<&str> for RawResponse {
    fn from(s: &str) -> Self {
        let mut response = Self::new();
        s.bytes().for_each(|b| response.push(b));
        response
    }
}

/// The longest valid UTF-8 prefix of `bytes`.
pub(crate) fn utf8_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Pattern that ends response collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Marker<'a> {
    /// Matches as soon as the text appears anywhere in the response.
    Text(&'a str),
    /// Matches once a complete line containing the prefix has arrived.
    Line(&'a str),
}

impl Marker<'_> {
    pub fn matches(&self, response: &RawResponse) -> bool {
        match self {
            Self::Text(text) => response.contains(text),
            Self::Line(prefix) => response
                .find(prefix)
                .map(|at| response.as_bytes()[at..].contains(&b'\n'))
                .unwrap_or(false),
        }
    }
}

/// Poll `transport` until one of `markers` matches or `deadline` passes.
///
/// Every received byte is relayed to `sink` as it arrives. The loop yields
/// to the executor once per pass so other tasks keep running. An empty
/// marker set collects until the deadline.
pub async fn collect_until<U: Uart, C: Console>(
    transport: &mut Transport<U>,
    sink: &mut C,
    deadline: Instant,
    markers: &[Marker<'_>],
) -> Result<(RawResponse, bool), Error> {
    let mut response = RawResponse::new();

    loop {
        let mut received = false;
        while let Some(byte) = transport.poll_byte().await? {
            response.push(byte);
            sink.write_bytes(&[byte]);
            received = true;
            if Instant::now() >= deadline {
                break;
            }
        }

        if received && markers.iter().any(|m| m.matches(&response)) {
            return Ok((response, true));
        }

        if Instant::now() >= deadline {
            return Ok((response, false));
        }

        yield_now().await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helpers::*;
    use embassy_time::Duration;

    #[test]
    fn line_marker_waits_for_line_end() {
        let partial = RawResponse::from("\r\nOK\r\n\r\n+CMQTTCONNECT: 0,");
        assert!(!Marker::Line("+CMQTTCONNECT:").matches(&partial));
        assert!(Marker::Text("+CMQTTCONNECT:").matches(&partial));

        let full = RawResponse::from("\r\nOK\r\n\r\n+CMQTTCONNECT: 0,0\r\n");
        assert!(Marker::Line("+CMQTTCONNECT:").matches(&full));
    }

    #[test]
    fn overflow_keeps_tail() {
        let mut response = RawResponse::new();
        for _ in 0..MAX_RESPONSE_LEN {
            response.push(b'x');
        }
        for b in b"\r\nOK\r\n" {
            response.push(*b);
        }
        assert!(response.truncated());
        assert!(response.contains("OK"));
        assert!(response.len() <= MAX_RESPONSE_LEN);
    }

    #[test]
    fn lines_skip_blank_and_strip_cr() {
        let response = RawResponse::from("\r\n+CSQ: 18,99\r\n\r\nOK\r\n");
        let lines: std::vec::Vec<&str> = response.lines().collect();
        assert_eq!(lines, ["+CSQ: 18,99", "OK"]);
    }

    #[test]
    fn collect_stops_on_marker_and_echoes() {
        let mut transport = Transport::new(MockModem::new(), 115_200);
        transport.uart_mut().push_rx("AT\r\nOK\r\nleftover");
        let mut console = CaptureConsole::new();

        let deadline = Instant::now() + Duration::from_secs(1);
        let (response, matched) = block_on(collect_until(
            &mut transport,
            &mut console,
            deadline,
            &[Marker::Text("OK")],
        ))
        .unwrap();

        assert!(matched);
        assert!(response.contains("OK"));
        assert_eq!(console.output, response.as_str());
    }

    #[test]
    fn endless_output_cannot_outrun_deadline() {
        let mut transport = Transport::new(MockModem::new().chatter(b'x'), 115_200);
        let mut console = CaptureConsole::new();

        let start = Instant::now();
        let (response, matched) = block_on(collect_until(
            &mut transport,
            &mut console,
            start + Duration::from_millis(20),
            &[Marker::Text("OK")],
        ))
        .unwrap();

        assert!(!matched);
        assert!(!response.is_empty());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn collect_without_match_returns_at_deadline() {
        let mut transport = Transport::new(MockModem::new(), 115_200);
        transport.uart_mut().push_rx("+CMQTTSTOP: 21\r\n");
        let mut console = CaptureConsole::new();

        let start = Instant::now();
        let (response, matched) = block_on(collect_until(
            &mut transport,
            &mut console,
            start + Duration::from_millis(30),
            &[Marker::Text("OK")],
        ))
        .unwrap();

        assert!(!matched);
        assert!(response.contains("+CMQTTSTOP: 21"));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
