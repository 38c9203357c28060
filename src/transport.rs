//! Thin synchronous-style wrapper over the modem UART.
//!
//! No retries and no timing live here; callers own both.

use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};

use crate::error::Error;

/// Line terminator the modem expects after every command
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// A UART that can be torn down and reopened at a different baud rate.
#[allow(async_fn_in_trait)]
pub trait Uart: Read + Write + ReadReady {
    /// Close the channel and reopen it at `baud_rate`.
    async fn reopen(&mut self, baud_rate: u32) -> Result<(), Self::Error>;
}

pub struct Transport<U: Uart> {
    uart: U,
    baud_rate: u32,
}

impl<U: Uart> Transport<U> {
    /// Wrap a UART that is already open at `baud_rate`.
    pub fn new(uart: U, baud_rate: u32) -> Self {
        Self { uart, baud_rate }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Transmit `line` followed by the line terminator.
    pub async fn write_line(&mut self, line: &str) -> Result<(), Error> {
        self.write_raw(line.as_bytes()).await?;
        self.write_raw(LINE_TERMINATOR).await
    }

    /// Transmit `bytes` as-is.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.uart.write_all(bytes).await.map_err(|_| Error::Transport)?;
        self.uart.flush().await.map_err(|_| Error::Transport)
    }

    /// Next buffered byte, or `None` when nothing is waiting. Never blocks.
    pub async fn poll_byte(&mut self) -> Result<Option<u8>, Error> {
        if !self.uart.read_ready().map_err(|_| Error::Transport)? {
            return Ok(None);
        }

        let mut buf = [0u8; 1];
        match self.uart.read(&mut buf).await {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(_) => Err(Error::Transport),
        }
    }

    pub async fn reconfigure(&mut self, baud_rate: u32) -> Result<(), Error> {
        debug!("Reopening UART at {} baud", baud_rate);
        self.uart
            .reopen(baud_rate)
            .await
            .map_err(|_| Error::Transport)?;
        self.baud_rate = baud_rate;
        Ok(())
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    pub fn release(self) -> U {
        self.uart
    }
}
