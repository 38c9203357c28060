//! ### SMS commands
use core::fmt::Write;

use embassy_time::Duration;

use super::{Command, CommandLine, Marker, RawResponse, ERROR, OK, PROMPT};
use crate::error::Error;

/// Message format: text mode
pub const TEXT_MODE: Command<'static> =
    Command::new("AT+CMGF=1").timeout(Duration::from_millis(2000));

/// TE character set: GSM 7 bit default alphabet
pub const CHARSET_GSM: Command<'static> =
    Command::new("AT+CSCS=\"GSM\"").timeout(Duration::from_millis(2000));

pub const PROMPT_UNTIL: &[Marker<'static>] = &[PROMPT, ERROR];
pub const PROMPT_OK: &[&str] = &[">"];

/// Terminates the message body and submits it
pub const CTRL_Z: u8 = 0x1A;

pub const CONFIRM_UNTIL: &[Marker<'static>] = &[OK, ERROR, Marker::Line("+CMGS")];

/// `AT+CMGS="<number>"`
pub fn send(number: &str) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(line, "AT+CMGS=\"{}\"", number)?;
    Ok(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Confirmation {
    Sent,
    Failed,
    Unclear,
}

/// Judge the response collected after submitting a message body.
pub fn confirmation(response: &RawResponse) -> Confirmation {
    if response.contains("OK") || response.contains("+CMGS") {
        Confirmation::Sent
    } else if response.contains("ERROR") {
        Confirmation::Failed
    } else {
        Confirmation::Unclear
    }
}
