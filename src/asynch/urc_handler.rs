//! Capture of MQTT receive blocks from the modem output stream.
//!
//! Every byte the engine takes off the UART passes through [`UrcHandler`],
//! whichever sequence happens to be running, so a message that arrives in
//! the middle of a publish or a settle delay is still delivered.

use heapless::{Deque, String, Vec};

use crate::command::mqtt;
use crate::console::MAX_LINE_LEN;
use crate::response::utf8_prefix;

pub const MAX_TOPIC_LEN: usize = 128;
pub const MAX_PAYLOAD_LEN: usize = 512;

/// Completed messages held until drained
pub const INBOUND_QUEUE_LEN: usize = 4;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: String<MAX_PAYLOAD_LEN>,
    /// `false` if the block ended before `+CMQTTRXEND` was seen.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Topic,
    Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    /// Outside a receive block
    Idle,
    /// Inside a block, reading header lines
    Block,
    /// Exactly `remaining` body bytes follow
    Body { section: Section, remaining: usize },
    /// Header without a usable length; the next line is the body
    BodyLine(Section),
}

pub struct UrcHandler {
    line: Vec<u8, MAX_LINE_LEN>,
    state: RxState,
    topic: Vec<u8, MAX_TOPIC_LEN>,
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
    ready: Deque<InboundMessage, INBOUND_QUEUE_LEN>,
}

impl Default for UrcHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl UrcHandler {
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            state: RxState::Idle,
            topic: Vec::new(),
            payload: Vec::new(),
            ready: Deque::new(),
        }
    }

    pub fn feed(&mut self, byte: u8) {
        if let RxState::Body { section, remaining } = self.state {
            self.push_body(section, byte);
            self.state = match remaining {
                0 | 1 => RxState::Block,
                n => RxState::Body {
                    section,
                    remaining: n - 1,
                },
            };
            return;
        }

        match byte {
            b'\n' => {
                let line = core::mem::take(&mut self.line);
                self.on_line(utf8_prefix(&line));
            }
            b'\r' => {}
            b => {
                // Overlong lines are cut; none of the block headers come close
                self.line.push(b).ok();
            }
        }
    }

    /// `true` while a receive block has started but not ended.
    pub fn in_block(&self) -> bool {
        self.state != RxState::Idle
    }

    /// Give up on the open block, queueing what arrived so far as an
    /// incomplete message.
    pub fn abandon(&mut self) {
        if self.in_block() {
            warn!("Receive block ended without {}", mqtt::RX_END);
            self.finish(false);
        }
    }

    /// Oldest completed message.
    pub fn pop(&mut self) -> Option<InboundMessage> {
        self.ready.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    fn on_line(&mut self, text: &str) {
        match self.state {
            RxState::Idle => {
                if mqtt::is_inbound_start(text) {
                    self.topic.clear();
                    self.payload.clear();
                    self.state = RxState::Block;
                    self.header(text);
                }
            }
            RxState::Block => self.header(text),
            RxState::BodyLine(section) => {
                if !text.is_empty() {
                    text.bytes().for_each(|b| self.push_body(section, b));
                    self.state = RxState::Block;
                }
            }
            RxState::Body { .. } => {}
        }
    }

    fn header(&mut self, text: &str) {
        if text.contains(mqtt::RX_END) {
            self.finish(true);
            return;
        }

        let section = if text.contains(mqtt::RX_TOPIC) {
            Section::Topic
        } else if text.contains(mqtt::RX_PAYLOAD) {
            Section::Payload
        } else {
            return;
        };

        self.state = match body_len(text) {
            Some(0) => RxState::Block,
            Some(remaining) => RxState::Body { section, remaining },
            None => RxState::BodyLine(section),
        };
    }

    fn push_body(&mut self, section: Section, byte: u8) {
        let overflow = match section {
            Section::Topic => self.topic.push(byte).is_err(),
            Section::Payload => self.payload.push(byte).is_err(),
        };
        if overflow {
            trace!("Inbound message truncated");
        }
    }

    fn finish(&mut self, complete: bool) {
        let mut message = InboundMessage {
            complete,
            ..Default::default()
        };
        // Both fit, the byte buffers share the string capacities
        message.topic.push_str(utf8_prefix(&self.topic)).ok();
        message.payload.push_str(utf8_prefix(&self.payload)).ok();
        self.topic.clear();
        self.payload.clear();
        self.state = RxState::Idle;

        if self.ready.is_full() {
            warn!("Inbound queue full, dropping oldest message");
            self.ready.pop_front();
        }
        debug!("Received message on {}", message.topic.as_str());
        self.ready.push_back(message).ok();
    }
}

/// `<len>` out of `+CMQTTRXTOPIC: <client>,<len>`.
fn body_len(header: &str) -> Option<usize> {
    let (_, params) = header.split_once(':')?;
    params.split(',').nth(1)?.trim().parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed_all(urc: &mut UrcHandler, data: &str) {
        data.bytes().for_each(|b| urc.feed(b));
    }

    #[test]
    fn block_between_other_output() {
        let mut urc = UrcHandler::new();
        feed_all(
            &mut urc,
            concat!(
                "\r\nOK\r\n",
                "+CMQTTRXSTART: 0,9,5\r\n",
                "+CMQTTRXTOPIC: 0,9\r\n",
                "dev/reset\r\n",
                "+CMQTTRXPAYLOAD: 0,5\r\n",
                "now!!\r\n",
                "+CMQTTRXEND: 0\r\n",
                "\r\n+CMQTTPUB: 0,0\r\n",
            ),
        );

        assert!(!urc.in_block());
        assert_eq!(urc.pending(), 1);
        let message = urc.pop().unwrap();
        assert_eq!(message.topic.as_str(), "dev/reset");
        assert_eq!(message.payload.as_str(), "now!!");
        assert!(message.complete);
        assert!(urc.pop().is_none());
    }

    #[test]
    fn payload_keeps_line_breaks() {
        let mut urc = UrcHandler::new();
        feed_all(
            &mut urc,
            concat!(
                "+CMQTTRXSTART: 0,1,6\r\n",
                "+CMQTTRXTOPIC: 0,1\r\n",
                "t\r\n",
                "+CMQTTRXPAYLOAD: 0,6\r\n",
                "a\r\n\r\nb\r\n",
                "+CMQTTRXEND: 0\r\n",
            ),
        );

        assert_eq!(urc.pop().unwrap().payload.as_str(), "a\r\n\r\nb");
    }

    #[test]
    fn chunked_payload_is_concatenated() {
        let mut urc = UrcHandler::new();
        feed_all(
            &mut urc,
            concat!(
                "+CMQTTRXSTART: 0,1,6\r\n",
                "+CMQTTRXTOPIC: 0,1\r\n",
                "t\r\n",
                "+CMQTTRXPAYLOAD: 0,3\r\n",
                "abc\r\n",
                "+CMQTTRXPAYLOAD: 0,3\r\n",
                "def\r\n",
                "+CMQTTRXEND: 0\r\n",
            ),
        );

        assert_eq!(urc.pop().unwrap().payload.as_str(), "abcdef");
    }

    #[test]
    fn header_without_length_takes_next_line() {
        let mut urc = UrcHandler::new();
        feed_all(
            &mut urc,
            "+CMQTTRXTOPIC: 0\r\ncmd\r\n+CMQTTRXPAYLOAD\r\n\r\nping\r\n+CMQTTRXEND: 0\r\n",
        );

        let message = urc.pop().unwrap();
        assert_eq!(message.topic.as_str(), "cmd");
        assert_eq!(message.payload.as_str(), "ping");
    }

    #[test]
    fn abandoned_block_is_incomplete() {
        let mut urc = UrcHandler::new();
        feed_all(&mut urc, "+CMQTTRXSTART: 0,3,2\r\n+CMQTTRXTOPIC: 0,3\r\na/b\r\n");
        assert!(urc.in_block());
        assert!(urc.pop().is_none());

        urc.abandon();
        let message = urc.pop().unwrap();
        assert_eq!(message.topic.as_str(), "a/b");
        assert!(!message.complete);
        assert!(!urc.in_block());
    }

    #[test]
    fn full_queue_keeps_newest() {
        let mut urc = UrcHandler::new();
        for i in 0..INBOUND_QUEUE_LEN + 1 {
            feed_all(&mut urc, "+CMQTTRXSTART: 0,1,1\r\n+CMQTTRXTOPIC: 0,1\r\nt\r\n");
            feed_all(&mut urc, "+CMQTTRXPAYLOAD: 0,1\r\n");
            urc.feed(b'0' + i as u8);
            feed_all(&mut urc, "\r\n+CMQTTRXEND: 0\r\n");
        }

        assert_eq!(urc.pending(), INBOUND_QUEUE_LEN);
        assert_eq!(urc.pop().unwrap().payload.as_str(), "1");
    }
}
