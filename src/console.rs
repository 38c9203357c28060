//! Operator console: a line-oriented text channel to a human.

use heapless::String;

pub const MAX_LINE_LEN: usize = 256;

pub type Line = String<MAX_LINE_LEN>;

pub trait Console {
    fn write_str(&mut self, text: &str);

    /// Relay raw modem output. Non UTF-8 bytes are passed through untouched.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Next complete line typed by the operator, without its terminator.
    /// Must not block.
    fn read_line(&mut self) -> Option<Line>;
}

impl<C: Console> Console for &mut C {
    fn write_str(&mut self, text: &str) {
        (**self).write_str(text)
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        (**self).write_bytes(bytes)
    }

    fn read_line(&mut self) -> Option<Line> {
        (**self).read_line()
    }
}

/// Console that discards output and never produces input.
pub struct NoConsole;

impl Console for NoConsole {
    fn write_str(&mut self, _text: &str) {}

    fn write_bytes(&mut self, _bytes: &[u8]) {}

    fn read_line(&mut self) -> Option<Line> {
        None
    }
}
