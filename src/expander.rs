//! Digital output expander driving the modem `PWRKEY`.

use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin, PinState};

/// Number of addressable output lines on the expander
pub const LINES: u8 = 16;

/// Minimal capability needed from a 16-line I/O expander (e.g. MCP23017).
pub trait IoExpander {
    type Error: core::fmt::Debug;

    /// Configure `line` as a push-pull output.
    fn set_output(&mut self, line: u8) -> Result<(), Self::Error>;

    fn write(&mut self, line: u8, state: PinState) -> Result<(), Self::Error>;
}

impl<E: IoExpander> IoExpander for &mut E {
    type Error = E::Error;

    fn set_output(&mut self, line: u8) -> Result<(), Self::Error> {
        (**self).set_output(line)
    }

    fn write(&mut self, line: u8, state: PinState) -> Result<(), Self::Error> {
        (**self).write(line, state)
    }
}

/// A single expander line exposed as an [`OutputPin`].
pub struct ExpanderPin<E: IoExpander> {
    expander: E,
    line: u8,
}

impl<E: IoExpander> ExpanderPin<E> {
    pub fn new(expander: E, line: u8) -> Self {
        Self { expander, line }
    }

    pub fn line(&self) -> u8 {
        self.line
    }

    pub fn release(self) -> E {
        self.expander
    }
}

impl<E: IoExpander> ErrorType for ExpanderPin<E> {
    type Error = ErrorKind;
}

impl<E: IoExpander> OutputPin for ExpanderPin<E> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set_state(PinState::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set_state(PinState::High)
    }

    fn set_state(&mut self, state: PinState) -> Result<(), Self::Error> {
        self.expander.write(self.line, state).map_err(|_e| {
            error!("Expander write to line {} failed", self.line);
            ErrorKind::Other
        })
    }
}
